//! Prometheus metrics recorder and metric names.

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use tracing::info;

/// Install the Prometheus metrics recorder (global).
///
/// Returns the handle used to render `/metrics`. Fails if another recorder
/// is already installed.
pub fn install_recorder() -> Result<PrometheusHandle, BuildError> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    info!("prometheus metrics recorder installed");
    Ok(handle)
}

/// WebSocket connections admitted (counter).
pub const CONNECTIONS_TOTAL: &str = "clipsync_connections_total";
/// WebSocket connections closed (counter, labels: reason).
pub const DISCONNECTIONS_TOTAL: &str = "clipsync_disconnections_total";
/// Currently open WebSocket connections (gauge).
pub const CONNECTIONS_ACTIVE: &str = "clipsync_connections_active";
/// Connection lifetime (histogram).
pub const CONNECTION_DURATION_SECONDS: &str = "clipsync_connection_duration_seconds";
/// Upgrade attempts refused before the handshake (counter, labels: reason).
pub const ADMISSION_REJECTIONS_TOTAL: &str = "clipsync_admission_rejections_total";
/// Connections dropped for a full or closed outbound queue (counter).
pub const SLOW_CONSUMER_EVICTIONS_TOTAL: &str = "clipsync_slow_consumer_evictions_total";
/// Payloads handed to local connections (counter).
pub const DELIVERIES_TOTAL: &str = "clipsync_deliveries_total";
/// Envelopes published to the backbone (counter).
pub const ENVELOPES_PUBLISHED_TOTAL: &str = "clipsync_envelopes_published_total";
/// Backbone publish failures (counter).
pub const PUBLISH_FAILURES_TOTAL: &str = "clipsync_publish_failures_total";
/// Backbone messages that did not decode as an envelope (counter).
pub const DECODE_FAILURES_TOTAL: &str = "clipsync_decode_failures_total";
/// Per-user backbone subscriptions held by this instance (gauge).
pub const SUBSCRIPTIONS_ACTIVE: &str = "clipsync_subscriptions_active";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_without_global_install() {
        let handle = PrometheusBuilder::new().build_recorder().handle();
        let output = handle.render();
        assert!(output.is_empty() || output.contains('\n'));
    }

    #[test]
    fn metric_names_are_prefixed_snake_case() {
        let names = [
            CONNECTIONS_TOTAL,
            DISCONNECTIONS_TOTAL,
            CONNECTIONS_ACTIVE,
            CONNECTION_DURATION_SECONDS,
            ADMISSION_REJECTIONS_TOTAL,
            SLOW_CONSUMER_EVICTIONS_TOTAL,
            DELIVERIES_TOTAL,
            ENVELOPES_PUBLISHED_TOTAL,
            PUBLISH_FAILURES_TOTAL,
            DECODE_FAILURES_TOTAL,
            SUBSCRIPTIONS_ACTIVE,
        ];
        for name in names {
            assert!(name.starts_with("clipsync_"), "{name}");
            assert!(
                name.chars().all(|c| c.is_ascii_lowercase() || c == '_'),
                "metric name '{name}' must be snake_case"
            );
        }
    }
}
