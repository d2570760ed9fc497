//! System utilities: the keyed mutual-exclusion primitive the restart
//! scheduler uses to enforce at-most-one-restart-in-flight per stable_id.

pub mod locker;

pub use locker::{Locker, LockerGuard};
