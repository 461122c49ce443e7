use std::time::Duration;

use lazy_static::lazy_static;
use prometheus::{core::Collector, opts, Histogram, HistogramOpts, IntCounterVec, Registry};
use tracing::error;

lazy_static! {
    static ref DISPATCH_TOTAL: IntCounterVec = IntCounterVec::new(
        opts!(
            "toolgate_dispatch_total",
            "Tool calls grouped by tool and outcome"
        ),
        &["tool", "outcome"]
    )
    .unwrap();
    static ref RUN_SECONDS: Histogram = Histogram::with_opts(HistogramOpts::new(
        "toolgate_dispatch_run_seconds",
        "Handler execution time",
    ))
    .unwrap();
}

fn register<C>(registry: &Registry, collector: C)
where
    C: Collector + Clone + Send + Sync + 'static,
{
    if let Err(err) = registry.register(Box::new(collector.clone())) {
        if !matches!(err, prometheus::Error::AlreadyReg) {
            error!(?err, "failed to register dispatch metric");
        }
    }
}

pub fn register_metrics(registry: &Registry) {
    register(registry, DISPATCH_TOTAL.clone());
    register(registry, RUN_SECONDS.clone());
}

pub fn record_dispatch(tool: &str, outcome: &str, run: Duration) {
    DISPATCH_TOTAL.with_label_values(&[tool, outcome]).inc();
    RUN_SECONDS.observe(run.as_secs_f64());
}
