//! Identity Resolver (C3)
//!
//! Pure function mapping an inspected container to its stable identifier,
//! ported 1:1 from `monitoring_engine.py::get_stable_identifier`. Strict
//! priority: explicit label, else compose project+service, else name.

use crate::runtime::Container;

pub const LABEL_STABLE_ID: &str = "monitoring.id";
pub const LABEL_COMPOSE_PROJECT: &str = "com.docker.compose.project";
pub const LABEL_COMPOSE_SERVICE: &str = "com.docker.compose.service";

/// Derive the stable identifier for a container. Pure, deterministic, no
/// side effects.
pub fn stable_id(container: &Container) -> String {
    if let Some(explicit) = container.labels.get(LABEL_STABLE_ID) {
        if !explicit.is_empty() {
            return explicit.clone();
        }
    }

    let project = container.labels.get(LABEL_COMPOSE_PROJECT);
    let service = container.labels.get(LABEL_COMPOSE_SERVICE);
    if let (Some(project), Some(service)) = (project, service) {
        return format!("{}_{}", project, service);
    }

    container.name.clone()
}
