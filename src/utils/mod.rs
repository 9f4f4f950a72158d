mod config;
mod validation;
pub mod timeout;

pub use config::{Config, LogFormat};
pub use validation::Validator;
pub use timeout::{sleep_unless_shutdown, wait_for_shutdown, with_timeout};
