use anyhow::Context;
use tokio::sync::watch;
use tracing::{info, warn};

use price_notifier::app::{self, Role};
use price_notifier::observability::init_tracing;
use price_notifier::utils::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env().context("failed to load configuration")?;
    config.validate().context("invalid configuration")?;
    init_tracing(&config)?;

    let role: Role = std::env::args()
        .nth(1)
        .as_deref()
        .unwrap_or("standalone")
        .parse()?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Shutdown signal received");
                let _ = shutdown_tx.send(true);
            }
            Err(e) => {
                warn!(error = %e, "Cannot listen for Ctrl-C, running until killed");
                // dropping the sender would read as a shutdown
                std::future::pending::<()>().await;
            }
        }
    });

    app::run(role, config, shutdown_rx)
        .await
        .with_context(|| format!("{:?} role failed", role))?;

    info!("Price notifier stopped");
    Ok(())
}
