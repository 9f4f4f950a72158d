use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info};

use crate::alerts::{AlertMatchingEngine, AlertStore, RedisAlertStore, TickProcessor};
use crate::api::{AppState, GatewayServer};
use crate::errors::{NotifierError, Result};
use crate::feed::RedisTickStream;
use crate::monitoring::{HealthCheck, NotifierMetrics};
use crate::relay::{
    InMemoryRelay, NotificationPublisher, NotificationSource, RedisNotificationSource,
    RedisPublisher, RelayStatus, RelaySubscriber,
};
use crate::stream::FanoutRegistry;
use crate::utils::Config;

/// Which half of the pipeline this process runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Relay subscriber, fan-out and HTTP API.
    Gateway,
    /// Tick log, matching engine and relay publisher.
    Processor,
    /// Both, joined by an in-process relay.
    Standalone,
}

impl FromStr for Role {
    type Err = NotifierError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "gateway" => Ok(Role::Gateway),
            "processor" => Ok(Role::Processor),
            "standalone" => Ok(Role::Standalone),
            other => Err(NotifierError::config(format!(
                "Unknown role '{}', expected gateway, processor or standalone",
                other
            ))),
        }
    }
}

pub async fn run(role: Role, config: Config, shutdown: watch::Receiver<bool>) -> Result<()> {
    info!(?role, instance = %config.instance_id, "Starting price notifier");

    let metrics = Arc::new(NotifierMetrics::new()?);
    let store: Arc<dyn AlertStore> = Arc::new(RedisAlertStore::connect(&config.redis_url).await?);

    match role {
        Role::Gateway => {
            let source =
                RedisNotificationSource::connect(&config.redis_url, &config.alerts_channel).await?;
            run_gateway(&config, store, source, metrics, shutdown).await
        }
        Role::Processor => {
            let publisher: Arc<dyn NotificationPublisher> = Arc::new(
                RedisPublisher::connect(&config.redis_url, &config.alerts_channel).await?,
            );
            run_processor(&config, store, publisher, metrics, shutdown).await
        }
        Role::Standalone => {
            let relay = InMemoryRelay::new(config.sink_capacity * 16);
            let source = relay.subscribe();
            let publisher: Arc<dyn NotificationPublisher> = Arc::new(relay);

            let processor = run_processor(
                &config,
                Arc::clone(&store),
                publisher,
                Arc::clone(&metrics),
                shutdown.clone(),
            );
            let gateway = run_gateway(&config, store, source, metrics, shutdown);

            let (processed, served) = tokio::join!(processor, gateway);
            processed.and(served)
        }
    }
}

async fn run_gateway<S>(
    config: &Config,
    store: Arc<dyn AlertStore>,
    source: S,
    metrics: Arc<NotifierMetrics>,
    shutdown: watch::Receiver<bool>,
) -> Result<()>
where
    S: NotificationSource + 'static,
{
    let registry = Arc::new(FanoutRegistry::new(config.sink_capacity).with_metrics(Arc::clone(&metrics)));
    let status = RelayStatus::new();

    let subscriber = RelaySubscriber::new(
        source,
        Arc::clone(&registry),
        status.clone(),
        config.relay_recv_timeout(),
        config.relay_backoff(),
    )
    .with_metrics(Arc::clone(&metrics));
    let relay_task = tokio::spawn(subscriber.run(shutdown.clone()));

    let state = AppState {
        store,
        registry,
        metrics,
        health: Arc::new(HealthCheck::new(config.instance_id.clone())),
        relay_status: Some(status),
        heartbeat_interval: config.heartbeat_interval(),
        shutdown: shutdown.clone(),
    };
    let served = GatewayServer::new(config.bind_addr(), state).serve(shutdown).await;

    if let Err(e) = relay_task.await {
        error!(error = %e, "Relay subscriber task failed");
    }
    served
}

async fn run_processor(
    config: &Config,
    store: Arc<dyn AlertStore>,
    publisher: Arc<dyn NotificationPublisher>,
    metrics: Arc<NotifierMetrics>,
    shutdown: watch::Receiver<bool>,
) -> Result<()> {
    let mut source = RedisTickStream::connect(
        &config.redis_url,
        &config.ticks_stream,
        &config.ticks_group,
        &config.ticks_consumer,
    )
    .await?;

    let engine = AlertMatchingEngine::new(config.cooldown_window())
        .with_retention_factor(config.cooldown_retention_factor)
        .with_metrics(Arc::clone(&metrics));

    TickProcessor::new(store, Arc::new(engine), publisher)
        .with_sweep_interval(config.cooldown_sweep_interval())
        .with_retry_backoff(config.relay_backoff())
        .with_metrics(metrics)
        .run(&mut source, shutdown)
        .await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_parsing() {
        assert_eq!("gateway".parse::<Role>().unwrap(), Role::Gateway);
        assert_eq!("Processor".parse::<Role>().unwrap(), Role::Processor);
        assert_eq!("standalone".parse::<Role>().unwrap(), Role::Standalone);
        assert!(matches!("worker".parse::<Role>(), Err(NotifierError::Config(_))));
    }
}
