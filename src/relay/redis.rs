use async_trait::async_trait;
use futures::stream::{BoxStream, StreamExt};
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client, Msg};
use tracing::{debug, info, warn};

use super::{encode_event, NotificationPublisher, NotificationSource};
use crate::alerts::NotificationEvent;
use crate::errors::{NotifierError, Result};

/// `PUBLISH`es notifications on a Redis channel.
#[derive(Clone)]
pub struct RedisPublisher {
    conn: ConnectionManager,
    channel: String,
}

impl RedisPublisher {
    pub async fn connect(redis_url: &str, channel: impl Into<String>) -> Result<Self> {
        let client = Client::open(redis_url)?;
        let conn = client.get_connection_manager().await?;
        let channel = channel.into();

        info!(channel = %channel, "Relay publisher connected");
        Ok(Self { conn, channel })
    }
}

#[async_trait]
impl NotificationPublisher for RedisPublisher {
    async fn publish(&self, event: &NotificationEvent) -> Result<()> {
        let payload = encode_event(event)?;
        let mut conn = self.conn.clone();

        let receivers: i64 = conn.publish(&self.channel, payload).await?;
        debug!(
            channel = %self.channel,
            user_id = %event.user_id,
            symbol = %event.symbol,
            receivers,
            "Published notification"
        );
        Ok(())
    }
}

/// Long-lived `SUBSCRIBE` on the notification channel.
pub struct RedisNotificationSource {
    client: Client,
    channel: String,
    messages: Option<BoxStream<'static, Msg>>,
}

impl RedisNotificationSource {
    /// Subscribe before returning, so an unreachable relay fails startup.
    pub async fn connect(redis_url: &str, channel: impl Into<String>) -> Result<Self> {
        let client = Client::open(redis_url)?;
        let mut source = Self {
            client,
            channel: channel.into(),
            messages: None,
        };
        source.subscribe().await?;
        Ok(source)
    }

    async fn subscribe(&mut self) -> Result<()> {
        let mut pubsub = self.client.get_async_pubsub().await?;
        pubsub.subscribe(&self.channel).await?;
        self.messages = Some(pubsub.into_on_message().boxed());

        info!(channel = %self.channel, "Subscribed to relay channel");
        Ok(())
    }
}

#[async_trait]
impl NotificationSource for RedisNotificationSource {
    async fn recv(&mut self) -> Result<Vec<u8>> {
        if self.messages.is_none() {
            self.subscribe().await?;
        }

        let next = match self.messages.as_mut() {
            Some(messages) => messages.next().await,
            None => None,
        };

        match next {
            Some(msg) => Ok(msg.get_payload_bytes().to_vec()),
            None => {
                warn!(channel = %self.channel, "Relay subscription closed, will resubscribe");
                self.messages = None;
                Err(NotifierError::transport("Relay subscription closed"))
            }
        }
    }
}
