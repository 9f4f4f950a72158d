use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer, Registry};

use crate::errors::{NotifierError, Result};
use crate::utils::{Config, LogFormat};

/// Install the global subscriber.
///
/// `RUST_LOG` takes precedence over the configured level. Returns an error if
/// a subscriber is already installed, which callers that may run more than
/// once (tests, the standalone role) are free to ignore.
pub fn init_tracing(config: &Config) -> Result<()> {
    let mut layers: Vec<Box<dyn Layer<Registry> + Send + Sync>> = Vec::new();

    match config.log_format {
        LogFormat::Json => {
            let json_layer = tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(true)
                .with_target(true)
                .with_thread_ids(true)
                .with_file(true)
                .with_line_number(true);
            layers.push(json_layer.boxed());
        }
        LogFormat::Compact => {
            let compact_layer = tracing_subscriber::fmt::layer()
                .compact()
                .with_target(true)
                .with_thread_ids(true);
            layers.push(compact_layer.boxed());
        }
        LogFormat::Pretty => {
            let console_layer = tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_file(true)
                .with_line_number(true);
            layers.push(console_layer.boxed());
        }
    }

    tracing_subscriber::registry()
        .with(layers)
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.log_level)),
        )
        .try_init()
        .map_err(|e| NotifierError::config(format!("Failed to install tracing subscriber: {}", e)))?;

    info!(
        level = %config.log_level,
        format = ?config.log_format,
        "Tracing initialized"
    );
    Ok(())
}
