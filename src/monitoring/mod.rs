pub mod health;
pub mod prometheus;

pub use self::health::{HealthCheck, HealthReport, HealthStatus};
pub use self::prometheus::NotifierMetrics;
