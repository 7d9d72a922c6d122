//! In-memory registry answering the v3 HTTP API

use async_trait::async_trait;
use async_tungstenite::tungstenite::http::{HeaderMap, Method, StatusCode};
use servicecenter_client::transport::{Connector, EventStream, HttpRequest, Response};
use servicecenter_client::{
    CreateServiceRequest, Error, HeartbeatSetRequest, MicroService, MicroServiceInstance,
    RegisterInstanceRequest, Result,
};
use std::collections::HashMap;
use std::sync::Mutex;
use url::Url;

#[derive(Default)]
struct State {
    next_id: usize,
    services: HashMap<String, MicroService>,
    instances: HashMap<String, Vec<MicroServiceInstance>>,
    heartbeats: usize,
    requests: Vec<HttpRequest>,
}

/// Fake registry plugged in below the transport
#[derive(Default)]
pub struct FakeRegistry {
    state: Mutex<State>,
    /// Heartbeats after this many successes answer 404
    heartbeat_budget: Option<usize>,
}

impl FakeRegistry {
    /// Registry that accepts every heartbeat
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry that rejects heartbeats once `budget` succeeded
    pub fn with_heartbeat_budget(budget: usize) -> Self {
        Self {
            heartbeat_budget: Some(budget),
            ..Default::default()
        }
    }

    /// Heartbeat calls received, successful or not
    pub fn heartbeat_calls(&self) -> usize {
        self.state.lock().unwrap().heartbeats
    }

    /// `METHOD path` of every request, in order
    pub fn request_log(&self) -> Vec<String> {
        self.state
            .lock()
            .unwrap()
            .requests
            .iter()
            .map(|r| format!("{} {}", r.method, r.url.path()))
            .collect()
    }

    /// Headers of every request
    pub fn request_headers(&self) -> Vec<HeaderMap> {
        self.state
            .lock()
            .unwrap()
            .requests
            .iter()
            .map(|r| r.headers.clone())
            .collect()
    }

    /// Registered services
    pub fn service_count(&self) -> usize {
        self.state.lock().unwrap().services.len()
    }

    /// Registered instances of a service
    pub fn instances_of(&self, service_id: &str) -> Vec<MicroServiceInstance> {
        self.state
            .lock()
            .unwrap()
            .instances
            .get(service_id)
            .cloned()
            .unwrap_or_default()
    }

    fn handle(&self, request: &HttpRequest) -> Response {
        let mut state = self.state.lock().unwrap();
        state.requests.push(request.clone());

        let query: HashMap<String, String> = request.url.query_pairs().into_owned().collect();
        let segments: Vec<&str> = request
            .url
            .path()
            .trim_start_matches("/registry/v3/")
            .split('/')
            .collect();
        let body = request.body.as_deref().unwrap_or_default();

        match (&request.method, segments.as_slice()) {
            (&Method::GET, ["existence"]) => {
                let found = state.services.values().find(|s| {
                    s.app_id == query["appId"]
                        && s.service_name == query["serviceName"]
                        && s.version == query["version"]
                });
                match found {
                    Some(service) => ok(serde_json::json!({ "serviceId": service.service_id })),
                    None => not_exist("Micro-service does not exist"),
                }
            }
            (&Method::POST, ["microservices"]) => {
                let Ok(create) = serde_json::from_slice::<CreateServiceRequest>(body) else {
                    return bad_request("invalid body");
                };
                let mut service = create.service;
                let duplicate = state.services.values().any(|s| {
                    s.app_id == service.app_id
                        && s.service_name == service.service_name
                        && s.version == service.version
                });
                if duplicate {
                    return bad_request("Micro-service version already exists");
                }
                state.next_id += 1;
                service.service_id = format!("svc-{}", state.next_id);
                let service_id = service.service_id.clone();
                state.services.insert(service_id.clone(), service);
                ok(serde_json::json!({ "serviceId": service_id }))
            }
            (&Method::DELETE, ["microservices", service_id]) => {
                match state.services.remove(*service_id) {
                    Some(_) => {
                        state.instances.remove(*service_id);
                        ok(serde_json::json!({}))
                    }
                    None => not_exist("Service does not exist"),
                }
            }
            (&Method::POST, ["microservices", service_id, "instances"]) => {
                if !state.services.contains_key(*service_id) {
                    return not_exist("Service does not exist");
                }
                let Ok(register) = serde_json::from_slice::<RegisterInstanceRequest>(body) else {
                    return bad_request("invalid body");
                };
                state.next_id += 1;
                let mut instance = register.instance;
                instance.instance_id = format!("inst-{}", state.next_id);
                instance.service_id = service_id.to_string();
                let instance_id = instance.instance_id.clone();
                state
                    .instances
                    .entry(service_id.to_string())
                    .or_default()
                    .push(instance);
                ok(serde_json::json!({ "instanceId": instance_id }))
            }
            (&Method::DELETE, ["microservices", service_id, "instances", instance_id]) => {
                let instances = state.instances.entry(service_id.to_string()).or_default();
                let before = instances.len();
                instances.retain(|i| i.instance_id != *instance_id);
                if instances.len() == before {
                    return not_exist("Instance does not exist");
                }
                ok(serde_json::json!({}))
            }
            (&Method::GET, ["instances"]) => {
                let provider = state.services.values().find(|s| {
                    s.app_id == query["appId"]
                        && s.service_name == query["serviceName"]
                        && (query["version"] == "latest" || s.version == query["version"])
                });
                let instances = provider
                    .and_then(|s| state.instances.get(&s.service_id))
                    .cloned()
                    .unwrap_or_default();
                ok(serde_json::json!({ "instances": instances }))
            }
            (&Method::PUT, ["heartbeats"]) => {
                let Ok(beat) = serde_json::from_slice::<HeartbeatSetRequest>(body) else {
                    return bad_request("invalid body");
                };
                state.heartbeats += 1;
                if self.heartbeat_budget.is_some_and(|budget| state.heartbeats > budget) {
                    return not_exist("Instance does not exist");
                }
                let all_known = beat.instances.iter().all(|element| {
                    state
                        .instances
                        .get(&element.service_id)
                        .is_some_and(|list| {
                            list.iter().any(|i| i.instance_id == element.instance_id)
                        })
                });
                if all_known {
                    ok(serde_json::json!({}))
                } else {
                    not_exist("Instance does not exist")
                }
            }
            _ => Response::new(StatusCode::NOT_FOUND, "no such route"),
        }
    }
}

fn ok(body: serde_json::Value) -> Response {
    Response::new(StatusCode::OK, body.to_string())
}

fn bad_request(message: &str) -> Response {
    Response::new(
        StatusCode::BAD_REQUEST,
        serde_json::json!({ "errorCode": "400001", "errorMessage": message }).to_string(),
    )
}

fn not_exist(message: &str) -> Response {
    Response::new(
        StatusCode::BAD_REQUEST,
        serde_json::json!({ "errorCode": "400012", "errorMessage": message }).to_string(),
    )
}

#[async_trait]
impl Connector for FakeRegistry {
    async fn send(&self, request: HttpRequest) -> Result<Response> {
        Ok(self.handle(&request))
    }

    async fn dial(&self, url: Url, _headers: HeaderMap) -> Result<EventStream> {
        Err(Error::Transport {
            method: "GET".to_string(),
            url: url.to_string(),
            reason: "fake registry has no stream API".to_string(),
        })
    }
}
