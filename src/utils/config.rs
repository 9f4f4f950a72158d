use serde::{Deserialize, Serialize};
use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::constants::*;
use crate::errors::{NotifierError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    // Transport
    pub redis_url: String,
    pub alerts_channel: String,
    pub ticks_stream: String,
    pub ticks_group: String,
    pub ticks_consumer: String,

    // Gateway
    pub http_host: String,
    pub http_port: u16,
    pub instance_id: String,

    // Alert evaluation
    pub cooldown_secs: u64,
    pub cooldown_retention_factor: u32,
    pub cooldown_sweep_secs: u64,

    // Fan-out
    pub sink_capacity: usize,
    pub heartbeat_secs: u64,
    pub relay_recv_timeout_secs: u64,
    pub relay_backoff_ms: u64,

    // Logging
    pub log_level: String,
    pub log_format: LogFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogFormat {
    Pretty,
    Compact,
    Json,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            redis_url: DEFAULT_REDIS_URL.to_string(),
            alerts_channel: DEFAULT_ALERTS_CHANNEL.to_string(),
            ticks_stream: DEFAULT_TICKS_STREAM.to_string(),
            ticks_group: DEFAULT_TICKS_GROUP.to_string(),
            ticks_consumer: DEFAULT_TICKS_CONSUMER.to_string(),
            http_host: DEFAULT_HTTP_HOST.to_string(),
            http_port: DEFAULT_HTTP_PORT,
            instance_id: DEFAULT_INSTANCE_ID.to_string(),
            cooldown_secs: DEFAULT_COOLDOWN_SECS,
            cooldown_retention_factor: DEFAULT_COOLDOWN_RETENTION_FACTOR,
            cooldown_sweep_secs: DEFAULT_COOLDOWN_SWEEP_SECS,
            sink_capacity: MIN_SINK_CAPACITY,
            heartbeat_secs: DEFAULT_HEARTBEAT_SECS,
            relay_recv_timeout_secs: DEFAULT_RELAY_RECV_TIMEOUT_SECS,
            relay_backoff_ms: DEFAULT_RELAY_BACKOFF_MS,
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
        }
    }
}

impl Config {
    /// Load configuration from the environment (and a `.env` file if present).
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();
        let defaults = Self::default();

        let config = Self {
            redis_url: env_or("REDIS_URL", defaults.redis_url),
            alerts_channel: env_or("ALERTS_CHANNEL", defaults.alerts_channel),
            ticks_stream: env_or("TICKS_STREAM", defaults.ticks_stream),
            ticks_group: env_or("TICKS_GROUP", defaults.ticks_group),
            ticks_consumer: env_or("TICKS_CONSUMER", defaults.ticks_consumer),

            http_host: env_or("HTTP_HOST", defaults.http_host),
            http_port: parse_env("HTTP_PORT", defaults.http_port)?,
            instance_id: env_or("INSTANCE_ID", defaults.instance_id),

            cooldown_secs: parse_env("COOLDOWN_SECS", defaults.cooldown_secs)?,
            cooldown_retention_factor: parse_env(
                "COOLDOWN_RETENTION_FACTOR",
                defaults.cooldown_retention_factor,
            )?,
            cooldown_sweep_secs: parse_env("COOLDOWN_SWEEP_SECS", defaults.cooldown_sweep_secs)?,

            sink_capacity: parse_env("SINK_CAPACITY", defaults.sink_capacity)?
                .max(MIN_SINK_CAPACITY),
            heartbeat_secs: parse_env("HEARTBEAT_SECS", defaults.heartbeat_secs)?,
            relay_recv_timeout_secs: parse_env(
                "RELAY_RECV_TIMEOUT_SECS",
                defaults.relay_recv_timeout_secs,
            )?,
            relay_backoff_ms: parse_env("RELAY_BACKOFF_MS", defaults.relay_backoff_ms)?,

            log_level: env_or("LOG_LEVEL", defaults.log_level),
            log_format: Self::parse_log_format(
                &env::var("LOG_FORMAT").unwrap_or_else(|_| "pretty".to_string()),
            ),
        };

        config.validate()?;
        Ok(config)
    }

    fn parse_log_format(format: &str) -> LogFormat {
        match format.to_lowercase().as_str() {
            "json" => LogFormat::Json,
            "compact" => LogFormat::Compact,
            _ => LogFormat::Pretty,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.alerts_channel.trim().is_empty() {
            return Err(NotifierError::config("ALERTS_CHANNEL must not be empty"));
        }

        if self.ticks_stream.trim().is_empty() || self.ticks_group.trim().is_empty() {
            return Err(NotifierError::config(
                "TICKS_STREAM and TICKS_GROUP must not be empty",
            ));
        }

        if self.http_port == 0 {
            return Err(NotifierError::config("HTTP_PORT must be non-zero"));
        }

        if self.cooldown_retention_factor == 0 {
            return Err(NotifierError::config(
                "COOLDOWN_RETENTION_FACTOR must be at least 1",
            ));
        }

        if self.heartbeat_secs == 0 || self.cooldown_sweep_secs == 0 {
            return Err(NotifierError::config(
                "HEARTBEAT_SECS and COOLDOWN_SWEEP_SECS must be non-zero",
            ));
        }

        if self.relay_recv_timeout_secs == 0 {
            return Err(NotifierError::config("RELAY_RECV_TIMEOUT_SECS must be non-zero"));
        }

        Ok(())
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.http_host, self.http_port)
    }

    pub fn cooldown_window(&self) -> Duration {
        Duration::from_secs(self.cooldown_secs)
    }

    pub fn cooldown_sweep_interval(&self) -> Duration {
        Duration::from_secs(self.cooldown_sweep_secs)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_secs)
    }

    pub fn relay_recv_timeout(&self) -> Duration {
        Duration::from_secs(self.relay_recv_timeout_secs)
    }

    pub fn relay_backoff(&self) -> Duration {
        Duration::from_millis(self.relay_backoff_ms)
    }
}

fn env_or(key: &str, default: String) -> String {
    env::var(key)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or(default)
}

fn parse_env<T: FromStr>(key: &str, default: T) -> Result<T> {
    match env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map_err(|_| NotifierError::config(format!("{} has an invalid value: {}", key, raw))),
        _ => Ok(default),
    }
}
