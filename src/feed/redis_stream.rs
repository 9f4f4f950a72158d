use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::streams::{StreamId, StreamReadOptions, StreamReadReply};
use redis::AsyncCommands;
use std::collections::VecDeque;
use tracing::{debug, info, warn};

use super::{TickDelivery, TickSource};
use crate::alerts::PriceTick;
use crate::constants::TICK_PAYLOAD_FIELD;
use crate::errors::{NotifierError, Result};

const READ_BATCH: usize = 64;
const BLOCK_MS: usize = 5_000;

/// Consumer-group reader over the tick log.
///
/// On start it replays this consumer's unacknowledged entries, then follows
/// new ones. Entries are acknowledged by the caller after processing.
pub struct RedisTickStream {
    conn: MultiplexedConnection,
    stream: String,
    group: String,
    consumer: String,
    buffered: VecDeque<StreamId>,
    replaying: bool,
}

impl RedisTickStream {
    /// Uses a dedicated connection, since reads block it for up to five seconds.
    pub async fn connect(
        redis_url: &str,
        stream: impl Into<String>,
        group: impl Into<String>,
        consumer: impl Into<String>,
    ) -> Result<Self> {
        let client = redis::Client::open(redis_url)?;
        let mut conn = client.get_multiplexed_async_connection().await?;
        let stream = stream.into();
        let group = group.into();

        let created: redis::RedisResult<()> =
            conn.xgroup_create_mkstream(&stream, &group, "0").await;
        match created {
            Ok(()) => info!(stream = %stream, group = %group, "Created consumer group"),
            Err(e) if e.code() == Some("BUSYGROUP") => {
                debug!(stream = %stream, group = %group, "Consumer group already exists")
            }
            Err(e) => return Err(e.into()),
        }

        Ok(Self {
            conn,
            stream,
            group,
            consumer: consumer.into(),
            buffered: VecDeque::new(),
            replaying: true,
        })
    }

    async fn fill(&mut self) -> Result<()> {
        let start = if self.replaying { "0" } else { ">" };
        let mut options = StreamReadOptions::default()
            .group(&self.group, &self.consumer)
            .count(READ_BATCH);
        if !self.replaying {
            options = options.block(BLOCK_MS);
        }

        let reply: Option<StreamReadReply> = self
            .conn
            .xread_options(&[&self.stream], &[start], &options)
            .await?;

        let entries: Vec<StreamId> = reply
            .map(|r| r.keys.into_iter().flat_map(|key| key.ids).collect())
            .unwrap_or_default();

        if self.replaying && entries.is_empty() {
            info!(stream = %self.stream, consumer = %self.consumer, "Pending ticks replayed");
            self.replaying = false;
        }

        self.buffered.extend(entries);
        Ok(())
    }

    fn parse(entry: &StreamId) -> Result<PriceTick> {
        let payload: String = entry.get(TICK_PAYLOAD_FIELD).ok_or_else(|| {
            NotifierError::validation(format!("Entry {} has no {} field", entry.id, TICK_PAYLOAD_FIELD))
        })?;
        Ok(serde_json::from_str(&payload)?)
    }
}

#[async_trait]
impl TickSource for RedisTickStream {
    async fn recv(&mut self) -> Result<Option<TickDelivery>> {
        loop {
            let Some(entry) = self.buffered.pop_front() else {
                self.fill().await?;
                continue;
            };

            match Self::parse(&entry) {
                Ok(tick) => {
                    return Ok(Some(TickDelivery {
                        tick,
                        receipt: Some(entry.id),
                    }))
                }
                Err(e) => {
                    warn!(entry_id = %entry.id, error = %e, "Skipping malformed tick");
                    self.ack(&entry.id).await?;
                }
            }
        }
    }

    async fn ack(&mut self, receipt: &str) -> Result<()> {
        let _: i64 = self.conn.xack(&self.stream, &self.group, &[receipt]).await?;
        Ok(())
    }
}

/// Append a tick to the log (`XADD`). Returns the entry id.
pub async fn publish_tick<C>(conn: &mut C, stream: &str, tick: &PriceTick) -> Result<String>
where
    C: AsyncCommands,
{
    let payload = serde_json::to_string(tick)?;
    let id: String = conn
        .xadd(stream, "*", &[(TICK_PAYLOAD_FIELD, payload)])
        .await?;
    Ok(id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn entry(fields: &[(&str, &str)]) -> StreamId {
        let map: HashMap<String, redis::Value> = fields
            .iter()
            .map(|(k, v)| (k.to_string(), redis::Value::BulkString(v.as_bytes().to_vec())))
            .collect();
        StreamId {
            id: "1700000000000-0".to_string(),
            map,
        }
    }

    #[test]
    fn test_parse_payload_field() {
        let tick = RedisTickStream::parse(&entry(&[(
            "payload",
            r#"{"exchange":"coinbase","symbol":"BTC-USD","price":89000.0,"timestamp":"2025-03-01T12:00:00Z"}"#,
        )]))
        .unwrap();

        assert_eq!(tick.symbol, "BTC-USD");
        assert_eq!(tick.price, 89_000.0);
    }

    #[test]
    fn test_parse_rejects_missing_or_bad_payload() {
        assert!(RedisTickStream::parse(&entry(&[("other", "x")])).is_err());
        assert!(RedisTickStream::parse(&entry(&[("payload", "{not json")])).is_err());
    }
}
