//! Data models exchanged with the service center

use serde::{Deserialize, Serialize};

/// A micro service record
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MicroService {
    /// Registry-assigned id, empty until registered
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub service_id: String,

    /// Application the service belongs to
    pub app_id: String,

    /// Service name
    pub service_name: String,

    /// Service version (or version rule when discovering)
    pub version: String,
}

impl MicroService {
    /// Build a service identity without an id
    pub fn new(
        app_id: impl Into<String>,
        service_name: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        Self {
            service_id: String::new(),
            app_id: app_id.into(),
            service_name: service_name.into(),
            version: version.into(),
        }
    }
}

/// An instance of a micro service
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MicroServiceInstance {
    /// Registry-assigned id, empty until registered
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub instance_id: String,

    /// Owning service id
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub service_id: String,

    /// Host the instance runs on
    #[serde(default)]
    pub host_name: String,

    /// Scheme-qualified addresses, e.g. `rest://127.0.0.1:8080`
    #[serde(default)]
    pub endpoints: Vec<String>,

    /// Instance status as reported by the registry
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

/// `POST /microservices` body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateServiceRequest {
    /// Service to create
    pub service: MicroService,
}

/// `POST /microservices` reply
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateServiceResponse {
    /// Assigned service id
    #[serde(default)]
    pub service_id: String,
}

/// `GET /existence` reply
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetExistenceResponse {
    /// Id of the existing service
    #[serde(default)]
    pub service_id: String,
}

/// `POST /microservices/{id}/instances` body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterInstanceRequest {
    /// Instance to register
    pub instance: MicroServiceInstance,
}

/// `POST /microservices/{id}/instances` reply
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterInstanceResponse {
    /// Assigned instance id
    #[serde(default)]
    pub instance_id: String,
}

/// `GET /instances` reply
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GetInstancesResponse {
    /// Current provider instances
    #[serde(default)]
    pub instances: Vec<MicroServiceInstance>,
}

/// One `{serviceId, instanceId}` pair kept alive by a heartbeat
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeartbeatSetElement {
    /// Service id
    pub service_id: String,
    /// Instance id
    pub instance_id: String,
}

/// `PUT /heartbeats` body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeartbeatSetRequest {
    /// Instances to renew
    #[serde(rename = "Instances")]
    pub instances: Vec<HeartbeatSetElement>,
}

/// Membership change kind carried by a watch event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum WatchAction {
    /// Instance registered
    Create,
    /// Instance changed
    Update,
    /// Instance removed
    Delete,
    /// Anything else the registry may send, handled as an upsert
    #[serde(other)]
    Other,
}

impl WatchAction {
    /// `DELETE` removes, every other action upserts
    pub fn is_delete(self) -> bool {
        self == WatchAction::Delete
    }
}

/// An event pushed on the watcher stream
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatchInstanceResponse {
    /// What happened
    pub action: WatchAction,

    /// Identity of the provider the event refers to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<MicroService>,

    /// Affected instance
    pub instance: MicroServiceInstance,
}
