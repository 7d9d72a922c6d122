//! `helloworld provider`

use crate::{hello::HelloServer, signal};
use anyhow::{Context, Result};
use servicecenter_client::{CancellationToken, Config, HeartbeatExit, ServiceCenter};
use std::path::Path;
use tracing::{error, info, warn};

/// Serve `/hello` and keep the instance registered until a signal arrives
pub async fn run(config_path: &Path) -> Result<()> {
    let config = Config::from_file(config_path)
        .with_context(|| format!("Failed to load config {}", config_path.display()))?;
    let center = ServiceCenter::from_config(&config)?;

    let shutdown = CancellationToken::new();
    signal::cancel_on_signal(shutdown.clone())?;

    let listener = match &config.service.instance {
        Some(instance) => {
            let server = HelloServer::bind(&instance.listen_address).await?;
            Some(tokio::spawn(server.serve(shutdown.clone())))
        }
        None => {
            warn!("No instance declared for {}, nothing to serve", config.service.name);
            None
        }
    };

    let mut session = center.registration();
    let result = session.run(&shutdown).await;

    // Registration failure ends the listener too
    shutdown.cancel();
    if let Some(listener) = listener {
        if let Err(e) = listener.await {
            warn!("Hello listener task failed: {}", e);
        }
    }

    match result {
        Ok(Some(report)) => {
            info!("Sent {} heartbeat(s)", report.sent);
            if let HeartbeatExit::Failed(e) = report.exit {
                warn!("Heartbeats had stopped early: {}", e);
            }
            Ok(())
        }
        Ok(None) => Ok(()),
        Err(e) => {
            error!("Provider {} failed: {}", config.service.name, e);
            Err(e.into())
        }
    }
}
