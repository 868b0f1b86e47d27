//! Prometheus rendering for the metrics recorded by `auth-client`
//!
//! See `auth_client::telemetry` for the metric names. `--metrics` installs the
//! recorder and prints the exposition text to stderr when the command ends.

use auth_client::telemetry::REFRESH_DURATION;
use metrics_exporter_prometheus::{BuildError, Matcher, PrometheusBuilder, PrometheusHandle};

/// Buckets for refresh latency, 10ms to 30s.
const REFRESH_BUCKETS: &[f64] = &[0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0];

fn builder() -> Result<PrometheusBuilder, BuildError> {
    PrometheusBuilder::new()
        .set_buckets_for_metric(Matcher::Full(REFRESH_DURATION.to_string()), REFRESH_BUCKETS)
}

/// Install the global recorder and return a handle for rendering.
pub fn install_recorder() -> anyhow::Result<PrometheusHandle> {
    Ok(builder()?.install_recorder()?)
}
