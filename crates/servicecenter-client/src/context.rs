//! Process-wide service center context
//!
//! Built once at startup and handed to whatever needs the registry: it owns the
//! registry client and the provider cache so nothing lives in globals.

use crate::{
    cache::ProviderCache,
    client::RegistryClient,
    config::{Config, Settings},
    error::{Error, Result},
    models::{MicroService, MicroServiceInstance},
    session::{RegistrationSession, WatchSession},
    transport::Transport,
};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Shared registry client, provider cache and local service declaration
pub struct ServiceCenter {
    client: Arc<RegistryClient>,
    cache: Arc<ProviderCache>,
    service: MicroService,
    instance: Option<MicroServiceInstance>,
    settings: Settings,
}

impl ServiceCenter {
    /// Context for a validated configuration
    pub fn from_config(config: &Config) -> Result<Self> {
        let client = RegistryClient::new(config.tenant.clone(), config.registry.endpoints.clone())?;
        Ok(Self::from_parts(
            client,
            config.service.to_service(),
            config.service.instance.as_ref().map(|i| i.to_instance()),
            config.settings.clone(),
        ))
    }

    /// Context from prebuilt parts
    pub fn from_parts(
        client: RegistryClient,
        service: MicroService,
        instance: Option<MicroServiceInstance>,
        settings: Settings,
    ) -> Self {
        Self {
            client: Arc::new(client),
            cache: Arc::new(ProviderCache::new()),
            service,
            instance,
            settings,
        }
    }

    /// Registry client
    pub fn client(&self) -> &Arc<RegistryClient> {
        &self.client
    }

    /// Provider cache
    pub fn cache(&self) -> &Arc<ProviderCache> {
        &self.cache
    }

    /// A registration session for the local service
    pub fn registration(&self) -> RegistrationSession {
        RegistrationSession::new(
            self.client.clone(),
            self.service.clone(),
            self.instance.clone(),
            self.settings.clone(),
        )
    }

    /// Discover `provider` and cache its instances; returns its service id
    pub async fn discover(&self, consumer_id: &str, provider: &MicroService) -> Result<String> {
        let instances = self.client.discover(consumer_id, provider).await?;
        let service_id = instances
            .first()
            .map(|i| i.service_id.clone())
            .filter(|id| !id.is_empty())
            .ok_or_else(|| Error::ProviderNotFound {
                app_id: provider.app_id.clone(),
                name: provider.service_name.clone(),
                version: provider.version.clone(),
            })?;

        info!(
            "Provider {} resolved to {} with {} instance(s)",
            provider.service_name,
            service_id,
            instances.len()
        );
        self.cache.replace(&service_id, instances);
        Ok(service_id)
    }

    /// Keep a discovered provider's cache entry fresh until `token` fires
    pub fn watch_provider(&self, service_id: &str, token: &CancellationToken) -> WatchSession {
        WatchSession::start(self.client.clone(), self.cache.clone(), service_id, token)
    }

    /// Callable addresses of a discovered provider
    pub fn provider_endpoints(&self, service_id: &str) -> Result<Vec<String>> {
        if !self.cache.contains(service_id) {
            return Err(Error::ProviderNotCached(service_id.to_string()));
        }
        let endpoints = self.cache.endpoints(service_id);
        if endpoints.is_empty() {
            return Err(Error::NoInstance(service_id.to_string()));
        }
        Ok(endpoints)
    }

    /// Round-robin, failover-aware transport over a provider's current
    /// instances
    pub fn provider_transport(&self, service_id: &str) -> Result<Transport> {
        Transport::new(self.provider_endpoints(service_id)?)
    }
}
