use parking_lot::RwLock;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use super::{decode_event, NotificationSource};
use crate::errors::NotifierError;
use crate::monitoring::NotifierMetrics;
use crate::stream::{BroadcastReport, FanoutRegistry};
use crate::utils::{sleep_unless_shutdown, wait_for_shutdown, with_timeout};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RelayState {
    Connecting,
    Subscribed,
    Receiving,
    Backoff,
    Stopped,
}

/// Shared view of the subscriber's state, read by the health endpoint.
#[derive(Clone)]
pub struct RelayStatus {
    state: Arc<RwLock<RelayState>>,
}

impl Default for RelayStatus {
    fn default() -> Self {
        Self {
            state: Arc::new(RwLock::new(RelayState::Connecting)),
        }
    }
}

impl RelayStatus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> RelayState {
        *self.state.read()
    }

    pub fn set(&self, state: RelayState) {
        let mut current = self.state.write();
        if *current != state {
            debug!(from = ?*current, to = ?state, "Relay state changed");
            *current = state;
        }
    }
}

/// Receive loop feeding relayed notifications into the fan-out registry.
///
/// Bad payloads are skipped. Transport errors, timeouts included, are followed
/// by a fixed backoff and another receive. Only shutdown ends the loop.
pub struct RelaySubscriber<S> {
    source: S,
    registry: Arc<FanoutRegistry>,
    status: RelayStatus,
    recv_timeout: Duration,
    backoff: Duration,
    metrics: Option<Arc<NotifierMetrics>>,
}

impl<S: NotificationSource> RelaySubscriber<S> {
    /// `source` must already hold its subscription.
    pub fn new(
        source: S,
        registry: Arc<FanoutRegistry>,
        status: RelayStatus,
        recv_timeout: Duration,
        backoff: Duration,
    ) -> Self {
        status.set(RelayState::Subscribed);
        Self {
            source,
            registry,
            status,
            recv_timeout,
            backoff,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<NotifierMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn status(&self) -> RelayStatus {
        self.status.clone()
    }

    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        info!(
            timeout_secs = self.recv_timeout.as_secs(),
            backoff_ms = self.backoff.as_millis() as u64,
            "Relay subscriber started"
        );

        loop {
            let received = tokio::select! {
                biased;
                _ = wait_for_shutdown(&mut shutdown) => break,
                received = with_timeout(self.source.recv(), self.recv_timeout, "relay receive") => received,
            };

            match received {
                Ok(payload) => {
                    self.status.set(RelayState::Receiving);
                    self.deliver(&payload);
                }
                Err(e) => {
                    if let Some(metrics) = &self.metrics {
                        metrics.relay_receive_error();
                    }
                    match &e {
                        NotifierError::Timeout { .. } => {
                            debug!("No relay message within timeout, retrying")
                        }
                        other if other.is_transient() => warn!(
                            error = %other,
                            backoff_ms = self.backoff.as_millis() as u64,
                            "Relay receive failed, backing off"
                        ),
                        other => error!(
                            error = %other,
                            backoff_ms = self.backoff.as_millis() as u64,
                            "Relay source returned a non-transient error, backing off"
                        ),
                    }

                    self.status.set(RelayState::Backoff);
                    if !sleep_unless_shutdown(self.backoff, &mut shutdown).await {
                        break;
                    }
                }
            }
        }

        self.status.set(RelayState::Stopped);
        info!("Relay subscriber stopped");
    }

    fn deliver(&self, payload: &[u8]) -> Option<BroadcastReport> {
        let event = match decode_event(payload) {
            Ok(event) => event,
            Err(e) => {
                warn!(error = %e, bytes = payload.len(), "Dropping malformed relay message");
                if let Some(metrics) = &self.metrics {
                    metrics.relay_malformed();
                }
                return None;
            }
        };

        debug!(user_id = %event.user_id, symbol = %event.symbol, "Relaying notification");
        Some(self.registry.broadcast(event))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::Result;
    use async_trait::async_trait;
    use std::collections::VecDeque;

    /// Replays scripted results, then waits forever.
    struct ScriptedSource(VecDeque<Result<Vec<u8>>>);

    #[async_trait]
    impl NotificationSource for ScriptedSource {
        async fn recv(&mut self) -> Result<Vec<u8>> {
            match self.0.pop_front() {
                Some(item) => item,
                None => std::future::pending().await,
            }
        }
    }

    const GOOD: &[u8] = br#"{"user_id":"U1","symbol":"BTC-USD","threshold":90000.0,"triggered":"below","timestamp":"2025-03-01T12:00:00Z"}"#;

    #[tokio::test(start_paused = true)]
    async fn test_survives_errors_and_poison_messages() {
        let registry = Arc::new(FanoutRegistry::new(10));
        let mut sink = registry.connect();
        let status = RelayStatus::new();

        let source = ScriptedSource(VecDeque::from(vec![
            Ok(b"not json".to_vec()),
            Err(NotifierError::transport("connection reset")),
            Ok(GOOD.to_vec()),
        ]));
        let subscriber = RelaySubscriber::new(
            source,
            Arc::clone(&registry),
            status.clone(),
            Duration::from_secs(30),
            Duration::from_secs(1),
        );

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(subscriber.run(shutdown_rx));

        let delivered = sink.recv().await.unwrap();
        assert_eq!(delivered.seq(), Some(1));
        assert_eq!(status.get(), RelayState::Receiving);

        shutdown_tx.send(true).unwrap();
        handle.await.unwrap();
        assert_eq!(status.get(), RelayState::Stopped);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_backs_off_and_shutdown_ends_loop() {
        let registry = Arc::new(FanoutRegistry::new(10));
        let status = RelayStatus::new();
        let subscriber = RelaySubscriber::new(
            ScriptedSource(VecDeque::new()),
            Arc::clone(&registry),
            status.clone(),
            Duration::from_secs(5),
            Duration::from_secs(60),
        );
        assert_eq!(status.get(), RelayState::Subscribed);

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(subscriber.run(shutdown_rx));

        tokio::time::sleep(Duration::from_secs(6)).await;
        assert_eq!(status.get(), RelayState::Backoff);

        shutdown_tx.send(true).unwrap();
        handle.await.unwrap();
        assert_eq!(status.get(), RelayState::Stopped);
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_transient_error_still_backs_off_and_continues() {
        let registry = Arc::new(FanoutRegistry::new(10));
        let mut sink = registry.connect();
        let status = RelayStatus::new();

        let source = ScriptedSource(VecDeque::from(vec![
            Err(NotifierError::config("subscription rejected")),
            Ok(GOOD.to_vec()),
        ]));
        let subscriber = RelaySubscriber::new(
            source,
            Arc::clone(&registry),
            status.clone(),
            Duration::from_secs(30),
            Duration::from_secs(1),
        );

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(subscriber.run(shutdown_rx));

        let delivered = sink.recv().await.unwrap();
        assert_eq!(delivered.seq(), Some(1));

        shutdown_tx.send(true).unwrap();
        handle.await.unwrap();
    }
}
