//! Configuration for the local service, its registry and the provider it calls
//!
//! Loaded from a `microservice.yaml` file, validated and normalized once at
//! startup so the rest of the crate can rely on complete values.

use crate::error::{Error, Result};
use crate::models::{MicroService, MicroServiceInstance};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Root configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// The local service
    pub service: ServiceConfig,

    /// The provider to discover (consumers only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<ProviderConfig>,

    /// Where the registry lives
    pub registry: RegistryConfig,

    /// Tenant all calls are scoped to
    #[serde(default)]
    pub tenant: Tenant,

    /// Timing knobs
    #[serde(default)]
    pub settings: Settings,
}

/// Local service declaration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceConfig {
    /// Application id
    pub app_id: String,
    /// Service name
    pub name: String,
    /// Service version
    pub version: String,
    /// Instance to register; consumer-only processes leave it out
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instance: Option<InstanceConfig>,
}

/// Local instance declaration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceConfig {
    /// Hostname, defaults to the machine hostname
    #[serde(default)]
    pub hostname: String,
    /// Endpoint scheme, defaults to `rest`
    #[serde(default = "default_protocol")]
    pub protocol: String,
    /// `host:port` the instance listens on
    #[serde(default)]
    pub listen_address: String,
}

/// Provider to discover
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderConfig {
    /// Application id
    pub app_id: String,
    /// Service name
    pub name: String,
    /// Version rule, e.g. `latest` or `1.0.0+`
    #[serde(default = "default_version_rule", alias = "version")]
    pub version_rule: String,
}

/// Registry location
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Comma-separated registry endpoints
    #[serde(default)]
    pub address: String,
    /// Parsed endpoint list, filled in by validation
    #[serde(skip)]
    pub endpoints: Vec<String>,
}

/// Tenant qualifier attached to every registry call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tenant {
    /// Domain name
    #[serde(default = "default_tenant_part")]
    pub domain: String,
    /// Project name
    #[serde(default = "default_tenant_part")]
    pub project: String,
}

impl Default for Tenant {
    fn default() -> Self {
        Self {
            domain: default_tenant_part(),
            project: default_tenant_part(),
        }
    }
}

/// Timing knobs, in seconds
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    /// Interval between heartbeats
    #[serde(default = "default_heartbeat_interval")]
    pub heartbeat_interval: u64,
    /// Best-effort pause between instance and service removal, giving the
    /// registry time to propagate the instance deletion
    #[serde(default = "default_unregister_delay")]
    pub unregister_delay: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            heartbeat_interval: default_heartbeat_interval(),
            unregister_delay: default_unregister_delay(),
        }
    }
}

impl Settings {
    /// Heartbeat interval as a duration
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval)
    }

    /// Unregister delay as a duration
    pub fn unregister_delay(&self) -> Duration {
        Duration::from_secs(self.unregister_delay)
    }
}

fn default_protocol() -> String {
    "rest".to_string()
}

fn default_version_rule() -> String {
    "latest".to_string()
}

fn default_tenant_part() -> String {
    "default".to_string()
}

fn default_heartbeat_interval() -> u64 {
    30
}

fn default_unregister_delay() -> u64 {
    3
}

/// Shape of the file before validation; missing sections get named errors
#[derive(Deserialize)]
struct RawConfig {
    service: Option<ServiceConfig>,
    provider: Option<ProviderConfig>,
    registry: Option<RegistryConfig>,
    #[serde(default)]
    tenant: Option<Tenant>,
    #[serde(default)]
    settings: Option<Settings>,
}

impl Config {
    /// Load and validate a YAML configuration file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::parse_str(&content)
    }

    /// Parse and validate YAML configuration from a string
    pub fn parse_str(content: &str) -> Result<Self> {
        let raw: RawConfig = serde_yaml::from_str(content)?;

        let mut service = raw
            .service
            .ok_or_else(|| Error::Config("microservice is empty".to_string()))?;
        if let Some(instance) = service.instance.as_mut() {
            instance.normalize()?;
        }

        let mut registry = raw
            .registry
            .filter(|r| !r.address.trim().is_empty())
            .ok_or_else(|| Error::Config("registry is empty".to_string()))?;
        registry.endpoints = parse_endpoints(&registry.address)?;
        if registry.endpoints.is_empty() {
            return Err(Error::Config("registry is empty".to_string()));
        }

        let mut tenant = raw.tenant.unwrap_or_default();
        if tenant.domain.is_empty() {
            tenant.domain = default_tenant_part();
        }
        if tenant.project.is_empty() {
            tenant.project = default_tenant_part();
        }

        let settings = raw.settings.unwrap_or_default();
        if settings.heartbeat_interval == 0 {
            return Err(Error::Config("heartbeat interval must be positive".to_string()));
        }

        Ok(Self {
            service,
            provider: raw.provider,
            registry,
            tenant,
            settings,
        })
    }
}

impl InstanceConfig {
    fn normalize(&mut self) -> Result<()> {
        if self.hostname.is_empty() {
            self.hostname = nix::unistd::gethostname()
                .map(|h| h.to_string_lossy().into_owned())
                .unwrap_or_default();
        }
        if self.protocol.is_empty() {
            self.protocol = default_protocol();
        }
        if self.listen_address.is_empty() {
            return Err(Error::Config("instance listen address is empty".to_string()));
        }

        let (host, port) = self.listen_address.rsplit_once(':').ok_or_else(|| {
            Error::Config(format!(
                "instance listen address is wrong: missing port in {}",
                self.listen_address
            ))
        })?;
        let host = if host.is_empty() { "127.0.0.1" } else { host };
        match port.parse::<u16>() {
            Ok(num) if num > 0 => {}
            _ => {
                return Err(Error::Config(format!(
                    "instance listen port {} is wrong",
                    port
                )));
            }
        }

        self.listen_address = format!("{}:{}", host, port);
        Ok(())
    }

    /// The instance as it is registered
    pub fn to_instance(&self) -> MicroServiceInstance {
        MicroServiceInstance {
            host_name: self.hostname.clone(),
            endpoints: vec![format!("{}://{}", self.protocol, self.listen_address)],
            ..Default::default()
        }
    }
}

impl ServiceConfig {
    /// The service identity as it is registered
    pub fn to_service(&self) -> MicroService {
        MicroService::new(&self.app_id, &self.name, &self.version)
    }
}

impl ProviderConfig {
    /// The provider identity used for discovery
    pub fn to_service(&self) -> MicroService {
        MicroService::new(&self.app_id, &self.name, &self.version_rule)
    }
}

fn parse_endpoints(address: &str) -> Result<Vec<String>> {
    address
        .split(',')
        .map(str::trim)
        .filter(|e| !e.is_empty())
        .map(|endpoint| {
            url::Url::parse(endpoint)
                .map(|_| endpoint.to_string())
                .map_err(|e| {
                    Error::Config(format!("parse registry address {} failed: {}", endpoint, e))
                })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const PROVIDER_YAML: &str = r#"
service:
  appId: helloworld
  name: provider
  version: 1.0.0
  instance:
    hostname: node-1
    listenAddress: ":8080"
registry:
  address: "http://127.0.0.1:30100, https://10.0.0.2:30100"
"#;

    #[test]
    fn test_defaults_and_normalization() {
        let config = Config::parse_str(PROVIDER_YAML).unwrap();

        assert_eq!(config.tenant, Tenant::default());
        assert_eq!(config.settings.heartbeat_interval(), Duration::from_secs(30));
        assert_eq!(config.settings.unregister_delay(), Duration::from_secs(3));
        assert_eq!(
            config.registry.endpoints,
            vec!["http://127.0.0.1:30100", "https://10.0.0.2:30100"]
        );

        let instance = config.service.instance.unwrap();
        assert_eq!(instance.protocol, "rest");
        assert_eq!(instance.listen_address, "127.0.0.1:8080");
        assert_eq!(
            instance.to_instance().endpoints,
            vec!["rest://127.0.0.1:8080".to_string()]
        );
    }

    #[test]
    fn test_consumer_config() {
        let yaml = r#"
service: { appId: helloworld, name: consumer, version: 1.0.0 }
provider: { appId: helloworld, name: provider, version: 1.0.0+ }
registry: { address: "http://127.0.0.1:30100" }
tenant: { domain: acme }
settings: { heartbeatInterval: 5, unregisterDelay: 0 }
"#;
        let config = Config::parse_str(yaml).unwrap();
        assert!(config.service.instance.is_none());
        assert_eq!(config.tenant.domain, "acme");
        assert_eq!(config.tenant.project, "default");
        assert_eq!(config.provider.unwrap().version_rule, "1.0.0+");
        assert_eq!(config.settings.unregister_delay(), Duration::ZERO);
    }

    #[test]
    fn test_validation_errors() {
        let missing_service = "registry: { address: \"http://a:1\" }";
        let err = Config::parse_str(missing_service).unwrap_err();
        assert!(err.to_string().contains("microservice is empty"));

        let missing_registry = "service: { appId: a, name: b, version: 1.0.0 }";
        let err = Config::parse_str(missing_registry).unwrap_err();
        assert!(err.to_string().contains("registry is empty"));

        let bad_port = r#"
service: { appId: a, name: b, version: 1.0.0, instance: { listenAddress: "127.0.0.1:0" } }
registry: { address: "http://a:1" }
"#;
        let err = Config::parse_str(bad_port).unwrap_err();
        assert!(err.to_string().contains("port"));

        let no_listen = r#"
service: { appId: a, name: b, version: 1.0.0, instance: { hostname: h } }
registry: { address: "http://a:1" }
"#;
        let err = Config::parse_str(no_listen).unwrap_err();
        assert!(err.to_string().contains("listen address is empty"));

        let bad_registry = r#"
service: { appId: a, name: b, version: 1.0.0 }
registry: { address: "not a url" }
"#;
        assert!(matches!(Config::parse_str(bad_registry), Err(Error::Config(_))));
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("microservice.yaml");
        std::fs::write(&path, PROVIDER_YAML).unwrap();

        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.service.name, "provider");
        assert!(Config::from_file(dir.path().join("missing.yaml")).is_err());
    }
}
