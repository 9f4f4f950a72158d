//! Inbound price ticks.

pub mod redis_stream;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::alerts::PriceTick;
use crate::errors::Result;

pub use redis_stream::{publish_tick, RedisTickStream};

/// One tick plus whatever the transport needs to acknowledge it.
#[derive(Debug, Clone)]
pub struct TickDelivery {
    pub tick: PriceTick,
    pub receipt: Option<String>,
}

impl TickDelivery {
    pub fn unacknowledged(tick: PriceTick) -> Self {
        Self {
            tick,
            receipt: None,
        }
    }
}

#[async_trait]
pub trait TickSource: Send {
    /// Next tick, or `None` once the source is exhausted.
    async fn recv(&mut self) -> Result<Option<TickDelivery>>;

    /// Mark a delivery as processed.
    async fn ack(&mut self, receipt: &str) -> Result<()>;
}

/// Ticks pushed through a tokio channel; nothing to acknowledge.
pub struct ChannelTickSource {
    rx: mpsc::Receiver<PriceTick>,
}

impl ChannelTickSource {
    pub fn new(rx: mpsc::Receiver<PriceTick>) -> Self {
        Self { rx }
    }

    pub fn channel(capacity: usize) -> (mpsc::Sender<PriceTick>, Self) {
        let (tx, rx) = mpsc::channel(capacity);
        (tx, Self::new(rx))
    }
}

#[async_trait]
impl TickSource for ChannelTickSource {
    async fn recv(&mut self) -> Result<Option<TickDelivery>> {
        Ok(self.rx.recv().await.map(TickDelivery::unacknowledged))
    }

    async fn ack(&mut self, _receipt: &str) -> Result<()> {
        Ok(())
    }
}
