//! Cross-process hop between the tick processor and the streaming gateway.

pub mod memory;
pub mod redis;
pub mod subscriber;

use async_trait::async_trait;

use crate::alerts::NotificationEvent;
use crate::errors::Result;

pub use self::memory::{InMemoryRelay, InMemorySource};
pub use self::redis::{RedisNotificationSource, RedisPublisher};
pub use self::subscriber::{RelayState, RelayStatus, RelaySubscriber};

/// Publish side. A failed publish loses that notification; there is no retry.
#[async_trait]
pub trait NotificationPublisher: Send + Sync {
    async fn publish(&self, event: &NotificationEvent) -> Result<()>;
}

/// Subscribe side: one raw message per call, blocking until one arrives.
#[async_trait]
pub trait NotificationSource: Send {
    async fn recv(&mut self) -> Result<Vec<u8>>;
}

pub fn encode_event(event: &NotificationEvent) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec(event)?)
}

pub fn decode_event(payload: &[u8]) -> Result<NotificationEvent> {
    Ok(serde_json::from_slice(payload)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerts::Direction;
    use chrono::{TimeZone, Utc};

    #[test]
    fn test_decoded_event_matches_published_one() {
        let event = NotificationEvent {
            user_id: "U7".to_string(),
            symbol: "SOL-USD".to_string(),
            threshold: 142.5,
            triggered: Direction::Above,
            timestamp: Utc.with_ymd_and_hms(2025, 6, 2, 8, 30, 15).unwrap(),
        };

        let decoded = decode_event(&encode_event(&event).unwrap()).unwrap();
        assert_eq!(decoded, event);
    }

    #[test]
    fn test_decode_rejects_unknown_direction() {
        let raw = br#"{"user_id":"U1","symbol":"BTC-USD","threshold":1.0,"triggered":"sideways","timestamp":"2025-01-01T00:00:00Z"}"#;
        assert!(decode_event(raw).is_err());
    }
}
