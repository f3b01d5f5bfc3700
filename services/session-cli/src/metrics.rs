//! Prometheus exposition for `--print-metrics`
//!
//! The library crates emit through the `metrics` facade; this installs the
//! recorder that collects them for one CLI run.

use metrics_exporter_prometheus::{BuildError, Matcher, PrometheusBuilder, PrometheusHandle};
use session_client::metrics::REFRESH_WAITERS;

/// Callers released per refresh cycle.
const WAITER_BUCKETS: &[f64] = &[1.0, 2.0, 5.0, 10.0, 25.0, 50.0, 100.0];

fn builder() -> Result<PrometheusBuilder, BuildError> {
    PrometheusBuilder::new()
        .set_buckets_for_metric(Matcher::Full(REFRESH_WAITERS.to_string()), WAITER_BUCKETS)
}

/// Install the Prometheus recorder and return a handle for rendering metrics.
pub fn install_recorder() -> anyhow::Result<PrometheusHandle> {
    Ok(builder()?.install_recorder()?)
}
