//! Process-wide prometheus registry.

use lazy_static::lazy_static;
use prometheus::Registry;

lazy_static! {
    static ref GLOBAL: Registry = Registry::new();
}

pub fn global_registry() -> &'static Registry {
    &GLOBAL
}

/// Register every kernel crate's collectors. Safe to call repeatedly.
pub fn register_metrics() {
    toolgate_scheduler::metrics::register_metrics(&GLOBAL);
    toolgate_registry::metrics::register_metrics(&GLOBAL);
}
