use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};
use tracing::info;

use crate::alerts::Direction;
use crate::errors::{NotifierError, Result};
use crate::stream::DropReason;

/// Prometheus collectors for the notification pipeline.
///
/// Each instance owns its registry, so independent pipelines (and tests) do
/// not collide on metric names.
#[derive(Clone)]
pub struct NotifierMetrics {
    registry: Registry,

    // Fan-out
    pub connected_clients: IntGauge,
    pub events_broadcast_total: IntCounter,
    pub events_dropped_total: IntCounterVec,
    pub heartbeats_sent_total: IntCounter,

    // Evaluation
    pub ticks_processed_total: IntCounter,
    pub alerts_fired_total: IntCounterVec,
    pub alerts_suppressed_total: IntCounter,
    pub cooldown_entries: IntGauge,
    pub cooldown_evicted_total: IntCounter,

    // Relay
    pub publish_failures_total: IntCounter,
    pub relay_receive_errors_total: IntCounter,
    pub relay_malformed_total: IntCounter,
}

impl NotifierMetrics {
    pub fn new() -> Result<Self> {
        let registry = Registry::new_custom(Some("price_notifier".to_string()), None)?;

        let connected_clients =
            IntGauge::new("connected_clients", "Streaming clients currently connected")?;
        let events_broadcast_total = IntCounter::new(
            "events_broadcast_total",
            "Notification events handed to the fan-out registry",
        )?;
        let events_dropped_total = IntCounterVec::new(
            Opts::new("events_dropped_total", "Per-client deliveries dropped"),
            &["reason"],
        )?;
        let heartbeats_sent_total =
            IntCounter::new("heartbeats_sent_total", "Heartbeats enqueued to client sinks")?;

        let ticks_processed_total =
            IntCounter::new("ticks_processed_total", "Price ticks evaluated")?;
        let alerts_fired_total = IntCounterVec::new(
            Opts::new("alerts_fired_total", "Notification events emitted by the engine"),
            &["direction"],
        )?;
        let alerts_suppressed_total = IntCounter::new(
            "alerts_suppressed_total",
            "Alerts skipped because their cooldown was active",
        )?;
        let cooldown_entries =
            IntGauge::new("cooldown_entries", "Cooldown keys currently tracked")?;
        let cooldown_evicted_total =
            IntCounter::new("cooldown_evicted_total", "Cooldown keys evicted by the sweep")?;

        let publish_failures_total =
            IntCounter::new("publish_failures_total", "Notifications lost on publish")?;
        let relay_receive_errors_total = IntCounter::new(
            "relay_receive_errors_total",
            "Relay receive failures followed by backoff",
        )?;
        let relay_malformed_total =
            IntCounter::new("relay_malformed_total", "Relay messages that failed to decode")?;

        registry.register(Box::new(connected_clients.clone()))?;
        registry.register(Box::new(events_broadcast_total.clone()))?;
        registry.register(Box::new(events_dropped_total.clone()))?;
        registry.register(Box::new(heartbeats_sent_total.clone()))?;
        registry.register(Box::new(ticks_processed_total.clone()))?;
        registry.register(Box::new(alerts_fired_total.clone()))?;
        registry.register(Box::new(alerts_suppressed_total.clone()))?;
        registry.register(Box::new(cooldown_entries.clone()))?;
        registry.register(Box::new(cooldown_evicted_total.clone()))?;
        registry.register(Box::new(publish_failures_total.clone()))?;
        registry.register(Box::new(relay_receive_errors_total.clone()))?;
        registry.register(Box::new(relay_malformed_total.clone()))?;

        info!(
            collectors = registry.gather().len(),
            "Prometheus metrics initialized"
        );

        Ok(Self {
            registry,
            connected_clients,
            events_broadcast_total,
            events_dropped_total,
            heartbeats_sent_total,
            ticks_processed_total,
            alerts_fired_total,
            alerts_suppressed_total,
            cooldown_entries,
            cooldown_evicted_total,
            publish_failures_total,
            relay_receive_errors_total,
            relay_malformed_total,
        })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn set_connected_clients(&self, count: usize) {
        self.connected_clients.set(count as i64);
    }

    pub fn event_broadcast(&self) {
        self.events_broadcast_total.inc();
    }

    pub fn events_dropped(&self, reason: DropReason, count: usize) {
        if count > 0 {
            self.events_dropped_total
                .with_label_values(&[reason.as_str()])
                .inc_by(count as u64);
        }
    }

    pub fn dropped(&self, reason: DropReason) -> u64 {
        self.events_dropped_total
            .with_label_values(&[reason.as_str()])
            .get()
    }

    pub fn heartbeat_sent(&self) {
        self.heartbeats_sent_total.inc();
    }

    pub fn tick_processed(&self) {
        self.ticks_processed_total.inc();
    }

    pub fn alert_fired(&self, direction: Direction) {
        self.alerts_fired_total
            .with_label_values(&[&direction.to_string()])
            .inc();
    }

    pub fn alert_suppressed(&self) {
        self.alerts_suppressed_total.inc();
    }

    pub fn set_cooldown_entries(&self, count: usize) {
        self.cooldown_entries.set(count as i64);
    }

    pub fn cooldown_evicted(&self, count: usize) {
        self.cooldown_evicted_total.inc_by(count as u64);
    }

    pub fn publish_failed(&self) {
        self.publish_failures_total.inc();
    }

    pub fn relay_receive_error(&self) {
        self.relay_receive_errors_total.inc();
    }

    pub fn relay_malformed(&self) {
        self.relay_malformed_total.inc();
    }

    /// Render every collector in the Prometheus text exposition format.
    pub fn encode(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;

        String::from_utf8(buffer)
            .map_err(|e| NotifierError::config(format!("Metrics output is not UTF-8: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_instances_do_not_collide() {
        let first = NotifierMetrics::new().unwrap();
        let second = NotifierMetrics::new().unwrap();

        first.event_broadcast();

        assert_eq!(first.events_broadcast_total.get(), 1);
        assert_eq!(second.events_broadcast_total.get(), 0);
    }

    #[test]
    fn test_drop_counter_by_reason() {
        let metrics = NotifierMetrics::new().unwrap();
        metrics.events_dropped(DropReason::Backpressure, 2);
        metrics.events_dropped(DropReason::NoSubscribers, 1);
        metrics.events_dropped(DropReason::Closed, 0);

        assert_eq!(metrics.dropped(DropReason::Backpressure), 2);
        assert_eq!(metrics.dropped(DropReason::NoSubscribers), 1);
        assert_eq!(metrics.dropped(DropReason::Closed), 0);
    }

    #[test]
    fn test_encode_text_format() {
        let metrics = NotifierMetrics::new().unwrap();
        metrics.alert_fired(Direction::Below);
        metrics.set_connected_clients(3);

        let body = metrics.encode().unwrap();
        assert!(body.contains("price_notifier_alerts_fired_total{direction=\"below\"} 1"));
        assert!(body.contains("price_notifier_connected_clients 3"));
    }
}
