//! Prometheus metrics collection for social-hub.
//!
//! Tracks hub health, delivery throughput and handler behaviour:
//!
//! - `hub_connected_clients` / `hub_live_groups` - registry size (gauges)
//! - `hub_frames_delivered_total` / `hub_frames_dropped_total` - outbound queue results
//! - `hub_message_total{kind}` / `hub_message_duration_seconds{kind}` - handler invocations
//! - `hub_message_errors_total{kind,code}` - typed errors sent back to clients
//! - `hub_message_fanout` - recipients per multicast/broadcast

use prometheus::{
    Encoder, Histogram, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts,
    Registry, TextEncoder,
};
use std::sync::OnceLock;

/// Global Prometheus registry for all metrics.
pub static REGISTRY: OnceLock<Registry> = OnceLock::new();

pub fn registry() -> &'static Registry {
    REGISTRY.get_or_init(Registry::new)
}

// ========================================================================
// Counters
// ========================================================================

/// Frames accepted by a recipient's outbound queue.
pub static FRAMES_DELIVERED: OnceLock<IntCounter> = OnceLock::new();

/// Frames dropped because the recipient's queue was full or closed.
pub static FRAMES_DROPPED: OnceLock<IntCounter> = OnceLock::new();

/// Inbound frames rejected by the per-connection rate limiter.
pub static RATE_LIMITED: OnceLock<IntCounter> = OnceLock::new();

/// Connections closed, by reason.
pub static CONNECTIONS_CLOSED: OnceLock<IntCounterVec> = OnceLock::new();

/// Upgrade requests rejected before a client existed, by reason.
pub static UPGRADES_REJECTED: OnceLock<IntCounterVec> = OnceLock::new();

// ========================================================================
// Gauges
// ========================================================================

pub static CONNECTED_CLIENTS: OnceLock<IntGauge> = OnceLock::new();

pub static LIVE_GROUPS: OnceLock<IntGauge> = OnceLock::new();

// ========================================================================
// Handler metrics
// ========================================================================

/// Messages handled by kind.
pub static MESSAGE_COUNTER: OnceLock<IntCounterVec> = OnceLock::new();

/// Handler latency by kind.
pub static MESSAGE_LATENCY: OnceLock<HistogramVec> = OnceLock::new();

/// Handler errors by kind and error code.
pub static MESSAGE_ERRORS: OnceLock<IntCounterVec> = OnceLock::new();

/// Recipients per fan-out delivery.
pub static MESSAGE_FANOUT: OnceLock<Histogram> = OnceLock::new();

/// Initialize the Prometheus metrics registry.
///
/// Must be called once at startup before any metrics are recorded. Recording
/// before `init` is a no-op.
pub fn init() {
    let r = registry();

    macro_rules! register {
        ($metric:ident, $init:expr) => {
            match $init {
                Ok(m) => {
                    if let Err(e) = r.register(Box::new(m.clone())) {
                        tracing::warn!(
                            error = %e,
                            concat!("Failed to register metric ", stringify!($metric))
                        );
                    }
                    let _ = $metric.set(m);
                }
                Err(e) => {
                    tracing::warn!(
                        error = %e,
                        concat!("Failed to create metric ", stringify!($metric))
                    );
                }
            }
        };
    }

    register!(
        FRAMES_DELIVERED,
        IntCounter::new("hub_frames_delivered_total", "Frames accepted by recipient queues")
    );
    register!(
        FRAMES_DROPPED,
        IntCounter::new(
            "hub_frames_dropped_total",
            "Frames dropped on full or closed recipient queues"
        )
    );
    register!(
        RATE_LIMITED,
        IntCounter::new("hub_rate_limited_total", "Inbound frames rejected by rate limiting")
    );
    register!(
        CONNECTIONS_CLOSED,
        IntCounterVec::new(
            Opts::new("hub_connections_closed_total", "Connections closed by reason"),
            &["reason"]
        )
    );
    register!(
        UPGRADES_REJECTED,
        IntCounterVec::new(
            Opts::new("hub_upgrades_rejected_total", "Upgrade requests rejected by reason"),
            &["reason"]
        )
    );
    register!(
        CONNECTED_CLIENTS,
        IntGauge::new("hub_connected_clients", "Currently registered clients")
    );
    register!(
        LIVE_GROUPS,
        IntGauge::new("hub_live_groups", "Groups with at least one connected member")
    );

    register!(
        MESSAGE_COUNTER,
        IntCounterVec::new(
            Opts::new("hub_message_total", "Inbound messages handled by kind"),
            &["kind"]
        )
    );
    register!(MESSAGE_LATENCY, HistogramVec::new(
        HistogramOpts::new("hub_message_duration_seconds", "Handler latency by kind")
            .buckets(vec![0.0001, 0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0]),
        &["kind"]));
    register!(
        MESSAGE_ERRORS,
        IntCounterVec::new(
            Opts::new("hub_message_errors_total", "Handler errors by kind and code"),
            &["kind", "code"]
        )
    );
    register!(MESSAGE_FANOUT, Histogram::with_opts(
        HistogramOpts::new("hub_message_fanout", "Recipients per fan-out delivery")
            .buckets(vec![1.0, 5.0, 10.0, 25.0, 50.0, 100.0, 250.0, 500.0, 1000.0])));
}

/// Gather all metrics and encode them in Prometheus text format.
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = registry().gather();
    let mut buffer = vec![];
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!(error = %e, "Failed to encode Prometheus metrics");
        return String::new();
    }
    match String::from_utf8(buffer) {
        Ok(s) => s,
        Err(e) => {
            tracing::error!(error = %e, "Prometheus metrics were not valid UTF-8");
            String::new()
        }
    }
}

// ============================================================================
// Update helpers
// ============================================================================

#[inline]
pub fn record_delivery(delivered: usize, dropped: usize) {
    if let Some(c) = FRAMES_DELIVERED.get() {
        c.inc_by(delivered as u64);
    }
    if let Some(c) = FRAMES_DROPPED.get() {
        c.inc_by(dropped as u64);
    }
}

/// Record how many recipients a multicast or broadcast targeted.
#[inline]
pub fn record_fanout(recipients: usize) {
    if let Some(h) = MESSAGE_FANOUT.get() {
        h.observe(recipients as f64);
    }
}

#[inline]
pub fn set_registry_size(clients: usize, groups: usize) {
    if let Some(g) = CONNECTED_CLIENTS.get() {
        g.set(clients as i64);
    }
    if let Some(g) = LIVE_GROUPS.get() {
        g.set(groups as i64);
    }
}

/// Record a handled message with latency.
#[inline]
pub fn record_message(kind: &str, duration_secs: f64) {
    if let Some(c) = MESSAGE_COUNTER.get() {
        c.with_label_values(&[kind]).inc();
    }
    if let Some(h) = MESSAGE_LATENCY.get() {
        h.with_label_values(&[kind]).observe(duration_secs);
    }
}

#[inline]
pub fn record_message_error(kind: &str, code: &str) {
    if let Some(c) = MESSAGE_ERRORS.get() {
        c.with_label_values(&[kind, code]).inc();
    }
}

#[inline]
pub fn record_rate_limited() {
    if let Some(c) = RATE_LIMITED.get() {
        c.inc();
    }
}

#[inline]
pub fn record_connection_closed(reason: &str) {
    if let Some(c) = CONNECTIONS_CLOSED.get() {
        c.with_label_values(&[reason]).inc();
    }
}

#[inline]
pub fn record_upgrade_rejected(reason: &str) {
    if let Some(c) = UPGRADES_REJECTED.get() {
        c.with_label_values(&[reason]).inc();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metrics_lifecycle() {
        init();
        // A second init only logs duplicate-registration warnings.
        init();

        record_delivery(3, 1);
        record_fanout(4);
        record_message("group_message", 0.002);
        record_message_error("follow_request", "self_action");
        record_connection_closed("client_closed");

        let output = gather_metrics();
        assert!(output.contains("hub_frames_delivered_total"));
        assert!(output.contains("hub_message_total{kind=\"group_message\"}"));
        assert!(output.contains("code=\"self_action\""));
    }
}
