//! Thin wrappers over the `prometheus` crate, in the same shape as
//! `quickwit_common::metrics`. These back process-wide gauges/counters
//! (live instance count, total activities processed across a runtime);
//! per-instance counters returned from `getState` are plain struct fields,
//! not Prometheus metrics; see `agent_runtime::state`.

pub use prometheus::{Histogram, IntCounter, IntGauge};
use prometheus::{HistogramOpts, Opts};

pub fn new_counter(name: &str, description: &str, namespace: &str) -> IntCounter {
    let opts = Opts::new(name, description).namespace(namespace);
    let counter = IntCounter::with_opts(opts).expect("failed to create counter");
    let _ = prometheus::register(Box::new(counter.clone()));
    counter
}

pub fn new_gauge(name: &str, description: &str, namespace: &str) -> IntGauge {
    let opts = Opts::new(name, description).namespace(namespace);
    let gauge = IntGauge::with_opts(opts).expect("failed to create gauge");
    let _ = prometheus::register(Box::new(gauge.clone()));
    gauge
}

pub fn new_histogram(name: &str, description: &str, namespace: &str) -> Histogram {
    let opts = HistogramOpts::new(name, description).namespace(namespace);
    let histogram = Histogram::with_opts(opts).expect("failed to create histogram");
    let _ = prometheus::register(Box::new(histogram.clone()));
    histogram
}

/// Decrements the wrapped gauge on drop. Used to track "instances currently
/// alive" without remembering to decrement on every exit path.
pub struct GaugeGuard(IntGauge);

impl GaugeGuard {
    pub fn from_gauge(gauge: IntGauge) -> Self {
        gauge.inc();
        Self(gauge)
    }
}

impl Drop for GaugeGuard {
    fn drop(&mut self) {
        self.0.dec();
    }
}
