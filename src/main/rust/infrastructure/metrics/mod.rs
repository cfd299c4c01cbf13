mod prometheus_reporter;

pub use prometheus_reporter::{PrometheusReporter, REGISTRY};
