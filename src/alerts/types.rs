use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A stored threshold alert. Read-only to the evaluation core.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertDefinition {
    pub id: String,
    pub user_id: String,
    pub symbol: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upper_threshold: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lower_threshold: Option<f64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Request body for creating an alert.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewAlert {
    pub user_id: String,
    pub symbol: String,
    #[serde(default)]
    pub upper_threshold: Option<f64>,
    #[serde(default)]
    pub lower_threshold: Option<f64>,
}

/// Partial update; absent fields keep their stored value.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AlertUpdate {
    #[serde(default)]
    pub symbol: Option<String>,
    #[serde(default)]
    pub upper_threshold: Option<f64>,
    #[serde(default)]
    pub lower_threshold: Option<f64>,
}

impl AlertDefinition {
    pub fn from_request(request: NewAlert, now: DateTime<Utc>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: request.user_id,
            symbol: request.symbol,
            upper_threshold: request.upper_threshold,
            lower_threshold: request.lower_threshold,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn apply(&mut self, update: AlertUpdate, now: DateTime<Utc>) {
        if let Some(symbol) = update.symbol.filter(|s| !s.is_empty()) {
            self.symbol = symbol;
        }
        if update.upper_threshold.is_some() {
            self.upper_threshold = update.upper_threshold;
        }
        if update.lower_threshold.is_some() {
            self.lower_threshold = update.lower_threshold;
        }
        self.updated_at = now;
    }

    pub fn cooldown_key(&self) -> CooldownKey {
        CooldownKey::new(&self.user_id, &self.symbol)
    }
}

/// One normalized price observation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceTick {
    pub symbol: String,
    pub price: f64,
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "exchange")]
    pub source: String,
}

/// Which side of a threshold the price crossed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Above,
    Below,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Above => write!(f, "above"),
            Direction::Below => write!(f, "below"),
        }
    }
}

/// A triggered notification as carried over the relay and to clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationEvent {
    pub user_id: String,
    pub symbol: String,
    pub threshold: f64,
    pub triggered: Direction,
    pub timestamp: DateTime<Utc>,
}

/// Cooldown identity: one clock per (user, symbol), shared by both directions.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CooldownKey {
    pub user_id: String,
    pub symbol: String,
}

impl CooldownKey {
    pub fn new(user_id: impl Into<String>, symbol: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            symbol: symbol.into(),
        }
    }
}

impl fmt::Display for CooldownKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.user_id, self.symbol)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_notification_wire_format() {
        let event = NotificationEvent {
            user_id: "U1".to_string(),
            symbol: "BTC-USD".to_string(),
            threshold: 90_000.0,
            triggered: Direction::Below,
            timestamp: Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap(),
        };

        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["user_id"], "U1");
        assert_eq!(value["symbol"], "BTC-USD");
        assert_eq!(value["threshold"], 90_000.0);
        assert_eq!(value["triggered"], "below");
        assert_eq!(value["timestamp"], "2025-03-01T12:00:00Z");
    }

    #[test]
    fn test_tick_reads_exchange_field() {
        let raw = r#"{"exchange":"coinbase","symbol":"BTC-USD","price":89000.5,"timestamp":"2025-03-01T12:00:00Z"}"#;
        let tick: PriceTick = serde_json::from_str(raw).unwrap();
        assert_eq!(tick.source, "coinbase");
        assert_eq!(tick.price, 89_000.5);
    }

    #[test]
    fn test_apply_update_keeps_absent_fields() {
        let now = Utc::now();
        let mut alert = AlertDefinition::from_request(
            NewAlert {
                user_id: "U1".to_string(),
                symbol: "ETH-USD".to_string(),
                upper_threshold: Some(4_000.0),
                lower_threshold: Some(3_000.0),
            },
            now,
        );

        alert.apply(
            AlertUpdate {
                lower_threshold: Some(2_500.0),
                ..AlertUpdate::default()
            },
            now,
        );

        assert_eq!(alert.symbol, "ETH-USD");
        assert_eq!(alert.upper_threshold, Some(4_000.0));
        assert_eq!(alert.lower_threshold, Some(2_500.0));
    }

    #[test]
    fn test_cooldown_key_display() {
        assert_eq!(CooldownKey::new("U1", "BTC-USD").to_string(), "U1_BTC-USD");
    }
}
