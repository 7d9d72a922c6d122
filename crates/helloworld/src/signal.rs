//! SIGINT/SIGTERM to cancellation

use anyhow::Result;
use servicecenter_client::CancellationToken;
use signal_hook::consts::{SIGINT, SIGTERM};
use signal_hook::iterator::Signals;
use tracing::info;

/// Cancel `token` on the first SIGINT or SIGTERM
pub fn cancel_on_signal(token: CancellationToken) -> Result<()> {
    let mut signals = Signals::new([SIGINT, SIGTERM])?;
    std::thread::Builder::new()
        .name("signal".to_string())
        .spawn(move || {
            if let Some(signal) = signals.forever().next() {
                info!("Received signal {}, shutting down", signal);
                token.cancel();
            }
        })?;
    Ok(())
}
