//! Registration of the local service and its heartbeat loop

use crate::{
    client::RegistryClient,
    config::Settings,
    error::{Error, Result},
    models::{HeartbeatSetElement, MicroService, MicroServiceInstance},
};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Where a session stands with the registry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistrationState {
    /// Nothing registered (initial and terminal)
    Unregistered,
    /// Service record exists
    ServiceRegistered,
    /// Instance record exists, no heartbeats running
    InstanceRegistered,
    /// Heartbeat loop running
    HeartbeatActive,
}

/// Ids assigned by the registry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registration {
    /// Service id
    pub service_id: String,
    /// Instance id, when an instance is declared
    pub instance_id: Option<String>,
}

/// Why a heartbeat loop stopped
#[derive(Debug)]
pub enum HeartbeatExit {
    /// The token fired
    Cancelled,
    /// A heartbeat call failed; the instance will expire registry-side
    Failed(Error),
}

/// Outcome of one heartbeat loop
#[derive(Debug)]
pub struct HeartbeatReport {
    /// Successful heartbeats
    pub sent: usize,
    /// Why the loop ended
    pub exit: HeartbeatExit,
}

/// Send a heartbeat every `interval` until cancelled or until one fails.
///
/// The first heartbeat fires one interval after the call. A failure is not
/// retried.
pub async fn heartbeat_loop(
    client: &RegistryClient,
    element: HeartbeatSetElement,
    interval: Duration,
    token: CancellationToken,
) -> HeartbeatReport {
    let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut sent = 0;

    info!(
        "Heartbeat for instance {} every {:?}",
        element.instance_id, interval
    );

    loop {
        tokio::select! {
            _ = token.cancelled() => {
                debug!("Heartbeat loop cancelled after {} beat(s)", sent);
                return HeartbeatReport { sent, exit: HeartbeatExit::Cancelled };
            }
            _ = ticker.tick() => {}
        }

        match client.heartbeat(std::slice::from_ref(&element)).await {
            Ok(()) => {
                sent += 1;
                debug!("Heartbeat {} for instance {} ok", sent, element.instance_id);
            }
            Err(e) => {
                error!(
                    "Heartbeat for instance {} failed, stopping: {}",
                    element.instance_id, e
                );
                return HeartbeatReport {
                    sent,
                    exit: HeartbeatExit::Failed(e),
                };
            }
        }
    }
}

/// Lifecycle of one local service and its optional instance
pub struct RegistrationSession {
    client: Arc<RegistryClient>,
    service: MicroService,
    instance: Option<MicroServiceInstance>,
    settings: Settings,
    state: RegistrationState,
    heartbeat: Option<(CancellationToken, JoinHandle<HeartbeatReport>)>,
}

impl RegistrationSession {
    /// Session for `service`; consumer-only processes pass no instance
    pub fn new(
        client: Arc<RegistryClient>,
        service: MicroService,
        instance: Option<MicroServiceInstance>,
        settings: Settings,
    ) -> Self {
        Self {
            client,
            service,
            instance,
            settings,
            state: RegistrationState::Unregistered,
            heartbeat: None,
        }
    }

    /// Current state; a heartbeat loop that ended on its own no longer counts
    /// as active
    pub fn state(&self) -> RegistrationState {
        match &self.heartbeat {
            Some((_, task)) if task.is_finished() => RegistrationState::InstanceRegistered,
            _ => self.state,
        }
    }

    /// Ids assigned so far
    pub fn registration(&self) -> Option<Registration> {
        if self.service.service_id.is_empty() {
            return None;
        }
        Some(Registration {
            service_id: self.service.service_id.clone(),
            instance_id: self
                .instance
                .as_ref()
                .map(|i| i.instance_id.clone())
                .filter(|id| !id.is_empty()),
        })
    }

    /// Register the service (existence first) and the declared instance
    pub async fn register(&mut self) -> Result<Registration> {
        if self.service.service_id.is_empty() {
            self.service.service_id = self.client.register_service(&self.service).await?;
        }
        if self.state == RegistrationState::Unregistered {
            self.state = RegistrationState::ServiceRegistered;
        }

        let service_id = self.service.service_id.clone();
        if let Some(instance) = self.instance.as_mut() {
            if instance.instance_id.is_empty() {
                instance.service_id = service_id.clone();
                instance.instance_id = self.client.register_instance(&service_id, instance).await?;
            } else {
                debug!("Instance {} already registered", instance.instance_id);
            }
            if self.state == RegistrationState::ServiceRegistered {
                self.state = RegistrationState::InstanceRegistered;
            }
        }

        self.registration()
            .ok_or_else(|| Error::Task("registration produced no service id".to_string()))
    }

    /// Spawn the heartbeat loop under a child of `token`
    pub fn start_heartbeat(&mut self, token: &CancellationToken) -> Result<()> {
        let element = match self.registration() {
            Some(Registration {
                service_id,
                instance_id: Some(instance_id),
            }) => HeartbeatSetElement {
                service_id,
                instance_id,
            },
            _ => return Err(Error::NoInstance(self.service.service_name.clone())),
        };
        if self.heartbeat.is_some() {
            return Err(Error::Task("heartbeat already started".to_string()));
        }

        let child = token.child_token();
        let client = self.client.clone();
        let interval = self.settings.heartbeat_interval();
        let loop_token = child.clone();
        let task = tokio::spawn(async move {
            heartbeat_loop(&client, element, interval, loop_token).await
        });

        self.heartbeat = Some((child, task));
        self.state = RegistrationState::HeartbeatActive;
        Ok(())
    }

    /// Stop heartbeats, then remove the instance and the service.
    ///
    /// Between the two removals the session waits the configured unregister
    /// delay so the registry can propagate the instance deletion. This is a
    /// best-effort pause, not a synchronization guarantee.
    ///
    /// The service removal is attempted even when the instance removal
    /// failed; the registry may reject it while the instance still exists.
    pub async fn shutdown(&mut self) -> Result<Option<HeartbeatReport>> {
        let mut first_err = None;
        let report = match self.heartbeat.take() {
            Some((token, task)) => {
                token.cancel();
                match task.await {
                    Ok(report) => {
                        info!("Heartbeat loop stopped after {} beat(s)", report.sent);
                        Some(report)
                    }
                    Err(e) => {
                        error!("Heartbeat task failed: {}", e);
                        first_err = Some(Error::Task(e.to_string()));
                        None
                    }
                }
            }
            None => None,
        };

        let service_id = self.service.service_id.clone();

        if let Some(instance) = self.instance.as_mut().filter(|i| !i.instance_id.is_empty()) {
            match self
                .client
                .unregister_instance(&service_id, &instance.instance_id)
                .await
            {
                Ok(()) => instance.instance_id.clear(),
                Err(e) => {
                    warn!("Unregister instance {} failed: {}", instance.instance_id, e);
                    first_err.get_or_insert(e);
                }
            }

            let delay = self.settings.unregister_delay();
            if !delay.is_zero() {
                debug!("Waiting {:?} before removing service {}", delay, service_id);
                tokio::time::sleep(delay).await;
            }
        }

        if !service_id.is_empty() {
            match self.client.unregister_service(&service_id).await {
                Ok(()) => self.service.service_id.clear(),
                Err(e) => {
                    warn!("Unregister service {} failed: {}", service_id, e);
                    first_err.get_or_insert(e);
                }
            }
        }

        self.state = RegistrationState::Unregistered;
        match first_err {
            Some(e) => Err(e),
            None => Ok(report),
        }
    }

    /// Register, keep the instance alive until `token` fires, then unregister
    pub async fn run(&mut self, token: &CancellationToken) -> Result<Option<HeartbeatReport>> {
        let registration = self.register().await?;
        info!(
            "Service {} registered as {:?}",
            self.service.service_name, registration
        );

        if registration.instance_id.is_some() {
            self.start_heartbeat(token)?;
        }

        token.cancelled().await;
        info!("Shutting down registration of {}", self.service.service_name);
        self.shutdown().await
    }
}
