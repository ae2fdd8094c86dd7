//! Prometheus metrics recorder and `/metrics` rendering.

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use tracing::info;

/// Install the Prometheus metrics recorder (global).
///
/// Returns the `PrometheusHandle` used to render the `/metrics` endpoint.
/// Call once at startup before any metrics are recorded.
pub fn install_recorder() -> Result<PrometheusHandle, BuildError> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    info!("prometheus metrics recorder installed");
    Ok(handle)
}

/// Render Prometheus text format from the installed recorder.
pub fn render(handle: &PrometheusHandle) -> String {
    handle.render()
}

// Metric name constants to avoid typos across modules.

/// WebSocket connections opened total (counter).
pub const WS_CONNECTIONS_TOTAL: &str = "ws_connections_total";
/// WebSocket disconnections total (counter).
pub const WS_DISCONNECTIONS_TOTAL: &str = "ws_disconnections_total";
/// Active WebSocket connections (gauge).
pub const WS_CONNECTIONS_ACTIVE: &str = "ws_connections_active";
/// Connection lifetime seconds (histogram).
pub const WS_CONNECTION_DURATION_SECONDS: &str = "ws_connection_duration_seconds";
/// Live group channels (gauge).
pub const RELAY_GROUPS_ACTIVE: &str = "relay_groups_active";
/// Frames read from peers (counter, labels: kind).
pub const RELAY_FRAMES_RECEIVED_TOTAL: &str = "relay_frames_received_total";
/// Frames accepted into a group mailbox (counter).
pub const RELAY_FRAMES_POSTED_TOTAL: &str = "relay_frames_posted_total";
/// Frames dropped because a mailbox was full (counter).
pub const RELAY_MAILBOX_DROPS_TOTAL: &str = "relay_mailbox_drops_total";
/// Failed fan-out writes (counter).
pub const RELAY_DELIVERY_FAILURES_TOTAL: &str = "relay_delivery_failures_total";
/// Direct PONG replies sent (counter).
pub const RELAY_PONGS_SENT_TOTAL: &str = "relay_pongs_sent_total";
/// Text frames ignored as malformed (counter).
pub const RELAY_INVALID_FRAMES_TOTAL: &str = "relay_invalid_frames_total";
/// Connections closed because another took over their identity (counter).
pub const RELAY_SUPERSEDED_TOTAL: &str = "relay_superseded_total";
