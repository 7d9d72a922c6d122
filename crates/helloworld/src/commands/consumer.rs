//! `helloworld consumer`

use crate::signal;
use anyhow::{Context, Result, anyhow};
use servicecenter_client::http::{HeaderMap, Method, StatusCode};
use servicecenter_client::{CancellationToken, Config, MicroService, ServiceCenter};
use std::path::Path;
use std::time::Duration;
use tracing::{info, warn};

/// Discover the provider and call it once, or repeatedly with `watch`
pub async fn run(config_path: &Path, watch: bool) -> Result<()> {
    let config = Config::from_file(config_path)
        .with_context(|| format!("Failed to load config {}", config_path.display()))?;
    let provider = config
        .provider
        .as_ref()
        .ok_or_else(|| anyhow!("provider is empty"))?
        .to_service();
    let center = ServiceCenter::from_config(&config)?;

    let shutdown = CancellationToken::new();
    signal::cancel_on_signal(shutdown.clone())?;

    let interval = config.settings.heartbeat_interval();
    consume(&center, &provider, watch.then_some(interval), &shutdown).await
}

/// Register the consumer, call the provider, then unregister whatever the
/// calls did
async fn consume(
    center: &ServiceCenter,
    provider: &MicroService,
    repeat: Option<Duration>,
    shutdown: &CancellationToken,
) -> Result<()> {
    let mut session = center.registration();
    let registration = session
        .register()
        .await
        .context("Failed to register consumer service")?;
    info!("Consumer registered as {}", registration.service_id);

    let consumer_id = registration.service_id.as_str();
    let outcome = call_provider(center, consumer_id, provider, repeat, shutdown).await;
    let unregistered = session
        .shutdown()
        .await
        .context("Failed to unregister consumer service");

    outcome?;
    unregistered?;
    Ok(())
}

async fn call_provider(
    center: &ServiceCenter,
    consumer_id: &str,
    provider: &MicroService,
    repeat: Option<Duration>,
    shutdown: &CancellationToken,
) -> Result<()> {
    let provider_id = center
        .discover(consumer_id, provider)
        .await
        .with_context(|| format!("Failed to discover {}", provider.service_name))?;
    let watcher = center.watch_provider(&provider_id, shutdown);

    let outcome = match repeat {
        Some(interval) => {
            say_hello_until(center, &provider_id, interval, shutdown).await;
            Ok(())
        }
        None => say_hello(center, &provider_id).await.map(|_| ()),
    };

    if let Err(e) = watcher.stop().await {
        warn!("Watch on {} ended with error: {}", provider_id, e);
    }
    outcome
}

async fn say_hello(center: &ServiceCenter, provider_id: &str) -> Result<String> {
    let transport = center.provider_transport(provider_id)?;
    let reply = transport
        .call(Method::GET, "/hello", &HeaderMap::new(), None)
        .await?
        .text(StatusCode::OK)?;
    info!("Provider replied: {}", reply);
    Ok(reply)
}

async fn say_hello_until(
    center: &ServiceCenter,
    provider_id: &str,
    interval: Duration,
    shutdown: &CancellationToken,
) {
    loop {
        // Endpoints are re-read every round so watch updates take effect
        if let Err(e) = say_hello(center, provider_id).await {
            warn!("Say hello failed: {}", e);
        }

        tokio::select! {
            _ = shutdown.cancelled() => return,
            _ = tokio::time::sleep(interval) => {}
        }
    }
}
