use async_trait::async_trait;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::debug;

use super::{encode_event, NotificationPublisher, NotificationSource};
use crate::alerts::NotificationEvent;
use crate::errors::{NotifierError, Result};

/// Process-local relay for the standalone role and tests.
#[derive(Clone)]
pub struct InMemoryRelay {
    tx: broadcast::Sender<Vec<u8>>,
}

impl InMemoryRelay {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> InMemorySource {
        InMemorySource {
            rx: self.tx.subscribe(),
        }
    }

    /// Push raw bytes onto the channel, bypassing encoding.
    pub fn publish_raw(&self, payload: Vec<u8>) -> usize {
        self.tx.send(payload).unwrap_or(0)
    }
}

#[async_trait]
impl NotificationPublisher for InMemoryRelay {
    async fn publish(&self, event: &NotificationEvent) -> Result<()> {
        let receivers = self.publish_raw(encode_event(event)?);
        debug!(symbol = %event.symbol, receivers, "Published notification");
        Ok(())
    }
}

pub struct InMemorySource {
    rx: broadcast::Receiver<Vec<u8>>,
}

#[async_trait]
impl NotificationSource for InMemorySource {
    async fn recv(&mut self) -> Result<Vec<u8>> {
        match self.rx.recv().await {
            Ok(payload) => Ok(payload),
            Err(RecvError::Lagged(skipped)) => Err(NotifierError::transport(format!(
                "Relay subscriber lagged, {} messages skipped",
                skipped
            ))),
            Err(RecvError::Closed) => Err(NotifierError::transport("Relay channel closed")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_lag_is_a_transport_error() {
        let relay = InMemoryRelay::new(2);
        let mut source = relay.subscribe();

        for i in 0..3u8 {
            relay.publish_raw(vec![i]);
        }

        assert!(matches!(source.recv().await, Err(NotifierError::Transport(_))));
        // the receiver resumes from the oldest retained message
        assert_eq!(source.recv().await.unwrap(), vec![1]);
    }

    #[tokio::test]
    async fn test_publish_without_subscribers_is_not_an_error() {
        let relay = InMemoryRelay::new(8);
        assert_eq!(relay.publish_raw(b"{}".to_vec()), 0);
    }
}
