pub mod cooldown;
pub mod engine;
pub mod processor;
pub mod redis_store;
pub mod store;
pub mod types;

pub use cooldown::CooldownStore;
pub use engine::AlertMatchingEngine;
pub use processor::{TickOutcome, TickProcessor};
pub use redis_store::RedisAlertStore;
pub use store::{AlertStore, InMemoryAlertStore};
pub use types::{
    AlertDefinition, AlertUpdate, CooldownKey, Direction, NewAlert, NotificationEvent, PriceTick,
};
