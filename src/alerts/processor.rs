use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use super::engine::AlertMatchingEngine;
use super::store::AlertStore;
use super::types::PriceTick;
use crate::constants::{DEFAULT_COOLDOWN_SWEEP_SECS, DEFAULT_RELAY_BACKOFF_MS};
use crate::errors::Result;
use crate::feed::TickSource;
use crate::monitoring::NotifierMetrics;
use crate::relay::NotificationPublisher;
use crate::utils::{sleep_unless_shutdown, wait_for_shutdown};

/// What happened to one tick.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickOutcome {
    pub alerts_checked: usize,
    pub fired: usize,
    pub published: usize,
    pub publish_failures: usize,
}

/// Store lookup, evaluation and publish for every inbound tick.
pub struct TickProcessor {
    store: Arc<dyn AlertStore>,
    engine: Arc<AlertMatchingEngine>,
    publisher: Arc<dyn NotificationPublisher>,
    sweep_interval: Duration,
    retry_backoff: Duration,
    metrics: Option<Arc<NotifierMetrics>>,
}

impl TickProcessor {
    pub fn new(
        store: Arc<dyn AlertStore>,
        engine: Arc<AlertMatchingEngine>,
        publisher: Arc<dyn NotificationPublisher>,
    ) -> Self {
        Self {
            store,
            engine,
            publisher,
            sweep_interval: Duration::from_secs(DEFAULT_COOLDOWN_SWEEP_SECS),
            retry_backoff: Duration::from_millis(DEFAULT_RELAY_BACKOFF_MS),
            metrics: None,
        }
    }

    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }

    pub fn with_retry_backoff(mut self, backoff: Duration) -> Self {
        self.retry_backoff = backoff;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<NotifierMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Evaluate one tick and publish whatever fires.
    ///
    /// Only the store lookup can fail; publish failures are counted in the
    /// outcome and the notification is lost.
    pub async fn process_tick(&self, tick: &PriceTick) -> Result<TickOutcome> {
        let alerts = self.store.list_by_symbol(&tick.symbol).await?;
        let events = self.engine.evaluate(tick, &alerts, Utc::now());

        let mut outcome = TickOutcome {
            alerts_checked: alerts.len(),
            fired: events.len(),
            ..TickOutcome::default()
        };

        for event in &events {
            match self.publisher.publish(event).await {
                Ok(()) => outcome.published += 1,
                Err(e) => {
                    outcome.publish_failures += 1;
                    warn!(
                        user_id = %event.user_id,
                        symbol = %event.symbol,
                        error = %e,
                        "Failed to publish notification, dropping it"
                    );
                    if let Some(metrics) = &self.metrics {
                        metrics.publish_failed();
                    }
                }
            }
        }

        if let Some(metrics) = &self.metrics {
            metrics.tick_processed();
        }
        debug!(symbol = %tick.symbol, price = tick.price, ?outcome, "Processed tick");
        Ok(outcome)
    }

    /// Consume `source` until it is exhausted or shutdown is signalled.
    ///
    /// Every delivery is acknowledged after processing, including ticks
    /// dropped because the alert lookup failed. Only shutdown interrupts a
    /// pending `recv`; the cooldown sweep runs on its own task.
    pub async fn run<S: TickSource>(&self, source: &mut S, mut shutdown: watch::Receiver<bool>) {
        info!(sweep_secs = self.sweep_interval.as_secs(), "Tick processor started");

        let sweeper = tokio::spawn(sweep_cooldowns(
            Arc::clone(&self.engine),
            self.sweep_interval,
            shutdown.clone(),
        ));

        loop {
            let received = tokio::select! {
                biased;
                _ = wait_for_shutdown(&mut shutdown) => break,
                received = source.recv() => received,
            };

            let delivery = match received {
                Ok(Some(delivery)) => delivery,
                Ok(None) => {
                    info!("Tick source exhausted");
                    break;
                }
                Err(e) => {
                    if e.is_transient() {
                        warn!(error = %e, "Failed to read tick, retrying");
                    } else {
                        error!(error = %e, "Tick source returned a non-transient error, retrying");
                    }
                    if !sleep_unless_shutdown(self.retry_backoff, &mut shutdown).await {
                        break;
                    }
                    continue;
                }
            };

            if let Err(e) = self.process_tick(&delivery.tick).await {
                warn!(symbol = %delivery.tick.symbol, error = %e, "Alert lookup failed, skipping tick");
            }

            if let Some(receipt) = delivery.receipt {
                if let Err(e) = source.ack(&receipt).await {
                    warn!(receipt = %receipt, error = %e, "Failed to acknowledge tick");
                }
            }
        }

        sweeper.abort();
        info!("Tick processor stopped");
    }
}

/// Periodic cooldown eviction, independent of tick receipt.
async fn sweep_cooldowns(
    engine: Arc<AlertMatchingEngine>,
    every: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut sweep = interval_at(Instant::now() + every, every);
    sweep.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = wait_for_shutdown(&mut shutdown) => break,
            _ = sweep.tick() => {
                engine.sweep_cooldowns(Utc::now());
            }
        }
    }
    debug!("Cooldown sweeper stopped");
}
