//! Watch session: keeps one provider's cache entry in sync

use crate::{
    cache::ProviderCache,
    client::RegistryClient,
    error::{Error, Result},
};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// One running subscription to a provider's membership changes.
///
/// The session owns a child of the token it was started with: [`stop`] ends
/// only this watch, cancelling the parent ends it too. Dropping the session
/// aborts the task. Stream failures end the session; there is no reconnect.
///
/// [`stop`]: WatchSession::stop
pub struct WatchSession {
    service_id: String,
    token: CancellationToken,
    task: JoinHandle<Result<()>>,
}

impl WatchSession {
    /// Spawn a watch of `service_id` that applies every event to `cache`
    pub fn start(
        client: Arc<RegistryClient>,
        cache: Arc<ProviderCache>,
        service_id: impl Into<String>,
        parent: &CancellationToken,
    ) -> Self {
        let service_id = service_id.into();
        let token = parent.child_token();

        let task = {
            let service_id = service_id.clone();
            let token = token.clone();
            tokio::spawn(async move {
                let result = client
                    .watch(&service_id, &token, |event| {
                        cache.apply(&event);
                    })
                    .await;
                match &result {
                    Ok(()) => info!("Watch session for {} finished", service_id),
                    Err(e) => warn!("Watch session for {} ended: {}", service_id, e),
                }
                result
            })
        };

        Self {
            service_id,
            token,
            task,
        }
    }

    /// Watched provider
    pub fn service_id(&self) -> &str {
        &self.service_id
    }

    /// Whether the watch already ended
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Cancel the watch and wait for it
    pub async fn stop(mut self) -> Result<()> {
        self.token.cancel();
        self.wait().await
    }

    /// Wait for the watch to end on its own or through the parent token
    pub async fn join(mut self) -> Result<()> {
        self.wait().await
    }

    async fn wait(&mut self) -> Result<()> {
        match (&mut self.task).await {
            Ok(result) => result,
            Err(e) => Err(Error::Task(e.to_string())),
        }
    }
}

impl Drop for WatchSession {
    fn drop(&mut self) {
        self.task.abort();
    }
}
