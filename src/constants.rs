// Relay and tick log
pub const DEFAULT_REDIS_URL: &str = "redis://127.0.0.1:6379";
pub const DEFAULT_ALERTS_CHANNEL: &str = "price_alerts";
pub const DEFAULT_TICKS_STREAM: &str = "price.updates";
pub const DEFAULT_TICKS_GROUP: &str = "price-processing-group";
pub const DEFAULT_TICKS_CONSUMER: &str = "processor-1";
pub const TICK_PAYLOAD_FIELD: &str = "payload";

// Gateway
pub const DEFAULT_HTTP_HOST: &str = "0.0.0.0";
pub const DEFAULT_HTTP_PORT: u16 = 8081;
pub const DEFAULT_INSTANCE_ID: &str = "gateway-1";

// Alert evaluation
pub const DEFAULT_COOLDOWN_SECS: u64 = 30;
pub const DEFAULT_COOLDOWN_RETENTION_FACTOR: u32 = 10;
pub const DEFAULT_COOLDOWN_SWEEP_SECS: u64 = 60;

// Fan-out
pub const MIN_SINK_CAPACITY: usize = 10;
pub const DEFAULT_HEARTBEAT_SECS: u64 = 15;
pub const DEFAULT_RELAY_RECV_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_RELAY_BACKOFF_MS: u64 = 1_000;

// Redis key layout for alert definitions
pub const ALERT_KEY_PREFIX: &str = "alert:";
pub const ALERTS_BY_SYMBOL_PREFIX: &str = "alerts:symbol:";
pub const ALERTS_BY_USER_PREFIX: &str = "alerts:user:";
pub const ALERTS_INDEX_KEY: &str = "alerts:all";
