use std::time::Duration;

use lazy_static::lazy_static;
use prometheus::{core::Collector, Histogram, HistogramOpts, IntCounter, IntGauge, Registry};
use tracing::error;

lazy_static! {
    static ref ADMITTED_TOTAL: IntCounter = IntCounter::new(
        "toolgate_admissions_total",
        "Execution slots granted since start",
    )
    .unwrap();
    static ref IN_FLIGHT: IntGauge = IntGauge::new(
        "toolgate_admissions_in_flight",
        "Execution slots currently held",
    )
    .unwrap();
    static ref WAIT_SECONDS: Histogram = Histogram::with_opts(HistogramOpts::new(
        "toolgate_admission_wait_seconds",
        "Time spent queued before a slot was granted",
    ))
    .unwrap();
}

fn register<C>(registry: &Registry, collector: C)
where
    C: Collector + Clone + Send + Sync + 'static,
{
    if let Err(err) = registry.register(Box::new(collector.clone())) {
        if !matches!(err, prometheus::Error::AlreadyReg) {
            error!(?err, "failed to register admission metric");
        }
    }
}

pub fn register_metrics(registry: &Registry) {
    register(registry, ADMITTED_TOTAL.clone());
    register(registry, IN_FLIGHT.clone());
    register(registry, WAIT_SECONDS.clone());
}

pub fn record_admitted(wait: Duration) {
    ADMITTED_TOTAL.inc();
    IN_FLIGHT.inc();
    WAIT_SECONDS.observe(wait.as_secs_f64());
}

pub fn record_released() {
    IN_FLIGHT.dec();
}
