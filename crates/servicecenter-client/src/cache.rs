//! Provider cache: current instances of every discovered provider

use crate::models::{MicroServiceInstance, WatchInstanceResponse};
use dashmap::DashMap;
use tracing::{debug, warn};
use url::{Position, Url};

/// What applying one watch event did to the cache
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// New instance appended
    Inserted,
    /// Existing instance replaced in place
    Replaced,
    /// Existing instance removed
    Removed,
    /// Delete for an instance that was not cached
    Ignored,
    /// Provider was never discovered, event dropped
    UnknownProvider,
}

/// Concurrent map from provider service id to its instances.
///
/// Discovery fills an entry by full replacement; watch events splice it.
/// Watch events never create an entry and never remove one.
#[derive(Debug, Default)]
pub struct ProviderCache {
    providers: DashMap<String, Vec<MicroServiceInstance>>,
}

impl ProviderCache {
    /// Empty cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the instance list of a provider
    pub fn replace(&self, service_id: &str, instances: Vec<MicroServiceInstance>) {
        debug!("Caching {} instance(s) of {}", instances.len(), service_id);
        self.providers.insert(service_id.to_string(), instances);
    }

    /// Snapshot of a provider's instances
    pub fn instances(&self, service_id: &str) -> Option<Vec<MicroServiceInstance>> {
        self.providers.get(service_id).map(|entry| entry.value().clone())
    }

    /// Whether a provider was discovered
    pub fn contains(&self, service_id: &str) -> bool {
        self.providers.contains_key(service_id)
    }

    /// Discovered provider ids
    pub fn providers(&self) -> Vec<String> {
        self.providers.iter().map(|entry| entry.key().clone()).collect()
    }

    /// Apply one watch event to the provider it names
    pub fn apply(&self, event: &WatchInstanceResponse) -> ApplyOutcome {
        let service_id = &event.instance.service_id;

        // The per-key write guard makes the splice atomic for readers
        let Some(mut entry) = self.providers.get_mut(service_id) else {
            warn!(
                "Dropping {:?} event for undiscovered provider {}",
                event.action, service_id
            );
            return ApplyOutcome::UnknownProvider;
        };
        let instances = entry.value_mut();

        let position = instances
            .iter()
            .position(|cached| cached.instance_id == event.instance.instance_id);

        let outcome = match (position, event.action.is_delete()) {
            (Some(index), true) => {
                instances.remove(index);
                ApplyOutcome::Removed
            }
            (Some(index), false) => {
                instances[index] = event.instance.clone();
                ApplyOutcome::Replaced
            }
            (None, false) => {
                instances.push(event.instance.clone());
                ApplyOutcome::Inserted
            }
            (None, true) => ApplyOutcome::Ignored,
        };

        debug!(
            "Watch {:?} of instance {} on {}: {:?}",
            event.action, event.instance.instance_id, service_id, outcome
        );
        outcome
    }

    /// Callable addresses of a provider, `rest` normalized to `http`
    pub fn endpoints(&self, service_id: &str) -> Vec<String> {
        let Some(entry) = self.providers.get(service_id) else {
            return Vec::new();
        };

        entry
            .value()
            .iter()
            .flat_map(|instance| instance.endpoints.iter())
            .filter_map(|endpoint| match normalize_endpoint(endpoint) {
                Some(address) => Some(address),
                None => {
                    warn!("Skipping unusable endpoint {} of {}", endpoint, service_id);
                    None
                }
            })
            .collect()
    }
}

fn normalize_endpoint(endpoint: &str) -> Option<String> {
    let (scheme, address) = endpoint.split_once("://")?;
    let scheme = match scheme {
        "rest" => "http",
        "rests" => "https",
        other => other,
    };

    let url = Url::parse(&format!("{}://{}", scheme, address)).ok()?;
    url.host_str()?;
    // Drop query parameters such as `?sslEnabled=false`
    Some(format!(
        "{}://{}",
        url.scheme(),
        &url[Position::BeforeHost..Position::AfterPort]
    ))
}
