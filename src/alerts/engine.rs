use chrono::{DateTime, TimeDelta, Utc};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use super::cooldown::CooldownStore;
use super::types::{AlertDefinition, Direction, NotificationEvent, PriceTick};
use crate::constants::DEFAULT_COOLDOWN_RETENTION_FACTOR;
use crate::monitoring::NotifierMetrics;

/// Decides which alerts a tick fires, with per-(user, symbol) cooldown.
pub struct AlertMatchingEngine {
    cooldowns: CooldownStore,
    window: TimeDelta,
    retention: TimeDelta,
    metrics: Option<Arc<NotifierMetrics>>,
}

impl AlertMatchingEngine {
    pub fn new(cooldown_window: Duration) -> Self {
        let window = TimeDelta::from_std(cooldown_window).unwrap_or(TimeDelta::MAX);
        Self {
            cooldowns: CooldownStore::new(),
            window,
            retention: Self::retention_for(window, DEFAULT_COOLDOWN_RETENTION_FACTOR),
            metrics: None,
        }
    }

    /// Keep cooldown entries for `factor` windows before the sweep evicts them.
    pub fn with_retention_factor(mut self, factor: u32) -> Self {
        self.retention = Self::retention_for(self.window, factor.max(1));
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<NotifierMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    fn retention_for(window: TimeDelta, factor: u32) -> TimeDelta {
        i32::try_from(factor)
            .ok()
            .and_then(|f| window.checked_mul(f))
            .unwrap_or(TimeDelta::MAX)
    }

    /// Evaluate one tick against the alert definitions for its symbol.
    ///
    /// An alert inside its cooldown is skipped entirely. Otherwise the lower
    /// and upper thresholds are checked independently, so an inverted
    /// definition can yield both a `below` and an `above` event for one tick.
    /// Any firing resets the cooldown for the whole (user, symbol) key once.
    pub fn evaluate(
        &self,
        tick: &PriceTick,
        alerts: &[AlertDefinition],
        now: DateTime<Utc>,
    ) -> Vec<NotificationEvent> {
        let mut events = Vec::new();

        for alert in alerts {
            let key = alert.cooldown_key();

            if self.cooldowns.should_suppress(&key, now, self.window) {
                debug!(key = %key, "Alert suppressed (cooldown active)");
                if let Some(metrics) = &self.metrics {
                    metrics.alert_suppressed();
                }
                continue;
            }

            let mut fired = false;

            if let Some(lower) = alert.lower_threshold {
                if tick.price <= lower {
                    events.push(self.notification(alert, tick, lower, Direction::Below, now));
                    fired = true;
                }
            }

            if let Some(upper) = alert.upper_threshold {
                if tick.price >= upper {
                    events.push(self.notification(alert, tick, upper, Direction::Above, now));
                    fired = true;
                }
            }

            if fired {
                self.cooldowns.record_fired(key, now);
            }
        }

        if let Some(metrics) = &self.metrics {
            metrics.set_cooldown_entries(self.cooldowns.len());
        }

        events
    }

    fn notification(
        &self,
        alert: &AlertDefinition,
        tick: &PriceTick,
        threshold: f64,
        direction: Direction,
        now: DateTime<Utc>,
    ) -> NotificationEvent {
        info!(
            alert_id = %alert.id,
            user_id = %alert.user_id,
            symbol = %tick.symbol,
            price = tick.price,
            threshold,
            triggered = %direction,
            "Alert triggered"
        );
        if let Some(metrics) = &self.metrics {
            metrics.alert_fired(direction);
        }

        NotificationEvent {
            user_id: alert.user_id.clone(),
            symbol: tick.symbol.clone(),
            threshold,
            triggered: direction,
            timestamp: now,
        }
    }

    /// Evict cooldown entries older than the retention horizon.
    pub fn sweep_cooldowns(&self, now: DateTime<Utc>) -> usize {
        let evicted = self.cooldowns.sweep(now, self.retention);
        if evicted > 0 {
            debug!(evicted, remaining = self.cooldowns.len(), "Swept cooldown entries");
        }
        if let Some(metrics) = &self.metrics {
            metrics.cooldown_evicted(evicted);
            metrics.set_cooldown_entries(self.cooldowns.len());
        }
        evicted
    }

    pub fn cooldowns(&self) -> &CooldownStore {
        &self.cooldowns
    }

    #[cfg(test)]
    pub(crate) fn retention(&self) -> TimeDelta {
        self.retention
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alert(upper: Option<f64>, lower: Option<f64>) -> AlertDefinition {
        let now = Utc::now();
        AlertDefinition {
            id: "a1".to_string(),
            user_id: "U1".to_string(),
            symbol: "SOL-USD".to_string(),
            upper_threshold: upper,
            lower_threshold: lower,
            created_at: now,
            updated_at: now,
        }
    }

    fn tick(price: f64) -> PriceTick {
        PriceTick {
            symbol: "SOL-USD".to_string(),
            price,
            timestamp: Utc::now(),
            source: "coinbase".to_string(),
        }
    }

    #[test]
    fn test_threshold_comparisons_are_inclusive() {
        let now = Utc::now();

        let engine = AlertMatchingEngine::new(Duration::from_secs(30));
        let events = engine.evaluate(&tick(150.0), &[alert(Some(150.0), None)], now);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].triggered, Direction::Above);

        let engine = AlertMatchingEngine::new(Duration::from_secs(30));
        let events = engine.evaluate(&tick(100.0), &[alert(None, Some(100.0))], now);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].triggered, Direction::Below);
    }

    #[test]
    fn test_no_crossing_records_nothing() {
        let engine = AlertMatchingEngine::new(Duration::from_secs(30));
        let events = engine.evaluate(&tick(120.0), &[alert(Some(150.0), Some(100.0))], Utc::now());

        assert!(events.is_empty());
        assert!(engine.cooldowns().is_empty());
    }

    #[test]
    fn test_inverted_thresholds_fire_both_directions_once() {
        let engine = AlertMatchingEngine::new(Duration::from_secs(30));
        let now = Utc::now();

        // upper <= lower: a price between them crosses both
        let events = engine.evaluate(&tick(120.0), &[alert(Some(100.0), Some(150.0))], now);

        assert_eq!(events.len(), 2);
        assert_eq!(events[0].triggered, Direction::Below);
        assert_eq!(events[0].threshold, 150.0);
        assert_eq!(events[1].triggered, Direction::Above);
        assert_eq!(events[1].threshold, 100.0);
        assert_eq!(engine.cooldowns().len(), 1);
    }

    #[test]
    fn test_event_carries_tick_symbol_and_evaluation_time() {
        let engine = AlertMatchingEngine::new(Duration::from_secs(30));
        let now = Utc::now();
        let events = engine.evaluate(&tick(90.0), &[alert(None, Some(100.0))], now);

        assert_eq!(events[0].user_id, "U1");
        assert_eq!(events[0].symbol, "SOL-USD");
        assert_eq!(events[0].timestamp, now);
    }

    #[test]
    fn test_retention_scales_with_window() {
        let engine = AlertMatchingEngine::new(Duration::from_secs(30)).with_retention_factor(4);
        assert_eq!(engine.retention(), TimeDelta::seconds(120));

        // a zero factor is clamped so retention never undercuts the window
        let engine = AlertMatchingEngine::new(Duration::from_secs(30)).with_retention_factor(0);
        assert_eq!(engine.retention(), TimeDelta::seconds(30));
    }
}
