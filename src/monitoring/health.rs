use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::relay::RelayState;
use crate::stream::FanoutStats;

/// Health status levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

/// Snapshot served by `GET /health`.
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub instance_id: String,
    pub version: String,
    pub uptime_seconds: u64,
    pub connected_clients: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub relay: Option<RelayState>,
    pub fanout: FanoutStats,
    pub timestamp: DateTime<Utc>,
}

pub struct HealthCheck {
    instance_id: String,
    version: String,
    started_at: DateTime<Utc>,
}

impl HealthCheck {
    pub fn new(instance_id: impl Into<String>) -> Self {
        Self {
            instance_id: instance_id.into(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            started_at: Utc::now(),
        }
    }

    pub fn report(&self, fanout: FanoutStats, relay: Option<RelayState>) -> HealthReport {
        let now = Utc::now();
        let uptime = now.signed_duration_since(self.started_at).num_seconds().max(0) as u64;

        HealthReport {
            status: Self::status_for(relay),
            instance_id: self.instance_id.clone(),
            version: self.version.clone(),
            uptime_seconds: uptime,
            connected_clients: fanout.connected_clients,
            relay,
            fanout,
            timestamp: now,
        }
    }

    /// A gateway without a live relay subscription can still serve the API,
    /// so backoff only degrades it.
    fn status_for(relay: Option<RelayState>) -> HealthStatus {
        match relay {
            None | Some(RelayState::Subscribed) | Some(RelayState::Receiving) => HealthStatus::Healthy,
            Some(RelayState::Connecting) | Some(RelayState::Backoff) => HealthStatus::Degraded,
            Some(RelayState::Stopped) => HealthStatus::Unhealthy,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_follows_relay_state() {
        let health = HealthCheck::new("gateway-1");

        assert_eq!(health.report(FanoutStats::default(), None).status, HealthStatus::Healthy);
        assert_eq!(
            health.report(FanoutStats::default(), Some(RelayState::Backoff)).status,
            HealthStatus::Degraded
        );
        assert_eq!(
            health.report(FanoutStats::default(), Some(RelayState::Stopped)).status,
            HealthStatus::Unhealthy
        );
    }

    #[test]
    fn test_report_serializes_relay_state() {
        let health = HealthCheck::new("gateway-1");
        let value = serde_json::to_value(health.report(FanoutStats::default(), Some(RelayState::Receiving))).unwrap();

        assert_eq!(value["status"], "healthy");
        assert_eq!(value["relay"], "receiving");
        assert_eq!(value["instance_id"], "gateway-1");
    }
}
