/// Injected observability sink. The engine never takes a hard dependency
/// on a concrete metrics backend; tests and headless runs use the no-op.
pub trait MetricsSink: Send + Sync {
    fn incr_counter(&self, name: &str, labels: &[(&str, &str)]) -> anyhow::Result<()>;
    fn record_gauge(&self, name: &str, value: f64, labels: &[(&str, &str)]) -> anyhow::Result<()>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoopMetrics;

impl MetricsSink for NoopMetrics {
    fn incr_counter(&self, _name: &str, _labels: &[(&str, &str)]) -> anyhow::Result<()> {
        Ok(())
    }

    fn record_gauge(&self, _name: &str, _value: f64, _labels: &[(&str, &str)]) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Record a counter, swallowing sink failures with a warning. Metric
/// recording must never abort the pipeline that calls it.
pub fn incr_counter_quietly(sink: &dyn MetricsSink, name: &str, labels: &[(&str, &str)]) {
    if let Err(e) = sink.incr_counter(name, labels) {
        tracing::warn!(metric = name, error = %e, "failed to record counter metric");
    }
}

/// Record a gauge, swallowing sink failures with a warning.
pub fn record_gauge_quietly(sink: &dyn MetricsSink, name: &str, value: f64, labels: &[(&str, &str)]) {
    if let Err(e) = sink.record_gauge(name, value, labels) {
        tracing::warn!(metric = name, error = %e, "failed to record gauge metric");
    }
}
