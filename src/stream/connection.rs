use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use super::registry::{ClientId, ClientSink, FanoutRegistry, HeartbeatOutcome, StreamEvent};
use crate::errors::Result;

/// Transport-level writer for one streaming client.
#[async_trait]
pub trait EventWriter: Send {
    async fn write(&mut self, event: StreamEvent) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectReason {
    /// The client went away or the server is shutting down.
    Cancelled,
    WriteFailed,
    /// The sink was deregistered from elsewhere.
    SinkClosed,
}

/// Deregisters the client and stops its heartbeat on every exit path,
/// including when the serving future itself is dropped.
struct ConnectionGuard {
    registry: Arc<FanoutRegistry>,
    id: ClientId,
    _stop_heartbeat: oneshot::Sender<()>,
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.registry.disconnect(self.id);
    }
}

fn spawn_heartbeat(
    registry: Arc<FanoutRegistry>,
    id: ClientId,
    every: Duration,
    mut stop: oneshot::Receiver<()>,
) {
    tokio::spawn(async move {
        let mut ticker = interval_at(Instant::now() + every, every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = &mut stop => break,
                _ = ticker.tick() => {
                    if registry.heartbeat(id) == HeartbeatOutcome::Gone {
                        break;
                    }
                }
            }
        }
        debug!(client_id = %id, "Heartbeat task stopped");
    });
}

/// Drive one connected client until it goes away.
///
/// Drains the sink into `writer`, with a heartbeat task running alongside
/// for exactly as long as this call does. Returns when `cancelled`
/// resolves, a write fails, or the sink is closed; the client is
/// deregistered in every case.
pub async fn serve_connection<W, C>(
    registry: Arc<FanoutRegistry>,
    mut sink: ClientSink,
    mut writer: W,
    cancelled: C,
    heartbeat_every: Duration,
) -> DisconnectReason
where
    W: EventWriter,
    C: Future<Output = ()>,
{
    let id = sink.id();
    let (stop_tx, stop_rx) = oneshot::channel();
    let _guard = ConnectionGuard {
        registry: Arc::clone(&registry),
        id,
        _stop_heartbeat: stop_tx,
    };
    spawn_heartbeat(Arc::clone(&registry), id, heartbeat_every, stop_rx);

    tokio::pin!(cancelled);

    let reason = loop {
        let next = tokio::select! {
            biased;
            _ = &mut cancelled => break DisconnectReason::Cancelled,
            next = sink.recv() => next,
        };

        let Some(event) = next else {
            break DisconnectReason::SinkClosed;
        };

        if let Err(e) = writer.write(event).await {
            warn!(client_id = %id, error = %e, "Write to streaming client failed");
            break DisconnectReason::WriteFailed;
        }
    };

    info!(client_id = %id, reason = ?reason, "Streaming connection finished");
    reason
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerts::{Direction, NotificationEvent};
    use crate::errors::NotifierError;
    use chrono::Utc;
    use tokio::sync::mpsc;

    struct ChannelWriter(mpsc::UnboundedSender<StreamEvent>);

    #[async_trait]
    impl EventWriter for ChannelWriter {
        async fn write(&mut self, event: StreamEvent) -> Result<()> {
            self.0.send(event).map_err(|_| NotifierError::ClientGone)
        }
    }

    struct FailingWriter;

    #[async_trait]
    impl EventWriter for FailingWriter {
        async fn write(&mut self, _event: StreamEvent) -> Result<()> {
            Err(NotifierError::ClientGone)
        }
    }

    fn event() -> NotificationEvent {
        NotificationEvent {
            user_id: "U1".to_string(),
            symbol: "BTC-USD".to_string(),
            threshold: 90_000.0,
            triggered: Direction::Below,
            timestamp: Utc::now(),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_heartbeats_flow_until_cancelled() {
        let registry = Arc::new(FanoutRegistry::new(10));
        let sink = registry.connect();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let (cancel_tx, cancel_rx) = oneshot::channel::<()>();

        let handle = tokio::spawn(serve_connection(
            Arc::clone(&registry),
            sink,
            ChannelWriter(tx),
            async move {
                let _ = cancel_rx.await;
            },
            Duration::from_secs(15),
        ));

        tokio::time::sleep(Duration::from_secs(46)).await;
        cancel_tx.send(()).unwrap();
        let reason = handle.await.unwrap();

        let mut heartbeats = 0;
        while let Ok(item) = rx.try_recv() {
            assert!(item.is_heartbeat());
            heartbeats += 1;
        }
        assert_eq!(heartbeats, 3);
        assert_eq!(reason, DisconnectReason::Cancelled);
        assert_eq!(registry.connected_count(), 0);
    }

    #[tokio::test]
    async fn test_write_failure_disconnects() {
        let registry = Arc::new(FanoutRegistry::new(10));
        let sink = registry.connect();
        registry.broadcast(event());

        let reason = serve_connection(
            Arc::clone(&registry),
            sink,
            FailingWriter,
            std::future::pending::<()>(),
            Duration::from_secs(15),
        )
        .await;

        assert_eq!(reason, DisconnectReason::WriteFailed);
        assert_eq!(registry.connected_count(), 0);
    }

    #[tokio::test]
    async fn test_notifications_reach_writer_in_order() {
        let registry = Arc::new(FanoutRegistry::new(10));
        let sink = registry.connect();
        let id = sink.id();
        let (tx, mut rx) = mpsc::unbounded_channel();

        let handle = tokio::spawn(serve_connection(
            Arc::clone(&registry),
            sink,
            ChannelWriter(tx),
            std::future::pending::<()>(),
            Duration::from_secs(15),
        ));

        let first = registry.broadcast(event()).seq;
        let second = registry.broadcast(event()).seq;

        assert_eq!(rx.recv().await.unwrap().seq(), Some(first));
        assert_eq!(rx.recv().await.unwrap().seq(), Some(second));

        // deregistering drops the sender, which ends the loop
        registry.disconnect(id);
        assert_eq!(handle.await.unwrap(), DisconnectReason::SinkClosed);
    }
}
