//! Price alert evaluation with cross-process relay and live fan-out to
//! streaming clients.

pub mod alerts;
pub mod api;
pub mod app;
pub mod constants;
pub mod errors;
pub mod feed;
pub mod monitoring;
pub mod observability;
pub mod relay;
pub mod stream;
pub mod utils;

pub use errors::{NotifierError, Result};
