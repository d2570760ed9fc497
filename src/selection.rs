//! Selection Filter (C4)
//!
//! Decides whether a container is eligible for healing, per the decision
//! order in §4.4. Ported from `should_monitor_container`, including the
//! back-compat lookup by runtime id / short id / name / compose service
//! for `excluded` and `selected` membership (Q3).

use glob::Pattern;

use crate::config::{Configuration, FiltersConfig};
use crate::identity::{LABEL_COMPOSE_PROJECT, LABEL_COMPOSE_SERVICE};
use crate::runtime::Container;

/// All identifiers a container could legitimately be looked up by, for
/// back-compat membership checks against `selected`/`excluded`.
fn legacy_identifiers(container: &Container) -> Vec<String> {
    let mut ids = vec![container.id.clone(), container.name.clone()];
    if container.id.len() > 12 {
        ids.push(container.id[..12].to_string());
    }
    if let (Some(project), Some(service)) = (
        container.labels.get(LABEL_COMPOSE_PROJECT),
        container.labels.get(LABEL_COMPOSE_SERVICE),
    ) {
        ids.push(format!("{}_{}", project, service));
    }
    ids
}

fn any_identifier_in(container: &Container, stable_id: &str, set: &std::collections::HashSet<String>) -> bool {
    if set.contains(stable_id) {
        return true;
    }
    legacy_identifiers(container).iter().any(|id| set.contains(id))
}

fn matches_any_glob(name: &str, patterns: &[String]) -> bool {
    patterns
        .iter()
        .filter_map(|p| Pattern::new(p).ok())
        .any(|p| p.matches(name))
}

/// `key=value` label filters: match if any configured pair is present
/// with an equal value.
fn matches_any_label(container: &Container, pairs: &[String]) -> bool {
    pairs.iter().any(|pair| {
        let Some((key, value)) = pair.split_once('=') else {
            return false;
        };
        container.labels.get(key).map(|v| v.as_str()) == Some(value)
    })
}

fn passes_filters(container: &Container, filters: &FiltersConfig) -> bool {
    if matches_any_glob(&container.name, &filters.blacklist_names) {
        return false;
    }
    if !filters.whitelist_names.is_empty() && !matches_any_glob(&container.name, &filters.whitelist_names) {
        return false;
    }
    if matches_any_label(container, &filters.blacklist_labels) {
        return false;
    }
    if !filters.whitelist_labels.is_empty() && !matches_any_label(container, &filters.whitelist_labels) {
        return false;
    }
    true
}

/// Decide whether `container` (with derived `stable_id`) is eligible for
/// healing, per the decision order in §4.4 — first hit wins.
pub fn is_monitored(config: &Configuration, stable_id: &str, container: &Container) -> bool {
    if any_identifier_in(container, stable_id, &config.selection.excluded) {
        return false;
    }

    if any_identifier_in(container, stable_id, &config.selection.selected) {
        return true;
    }

    if !config.monitor.include_all {
        let matches_enrollment = container
            .labels
            .get(&config.monitor.enrollment_label_key)
            .map(|v| v == &config.monitor.enrollment_label_value)
            .unwrap_or(false);
        if !matches_enrollment {
            return false;
        }
    }

    passes_filters(container, &config.filters)
}
