use tokio::signal::unix::{signal, SignalKind};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::Result;

/// Cancel `token` when the process receives SIGTERM or SIGINT.
///
/// Signal streams are registered before returning, so a signal delivered right after this call
/// is not lost. Coordinators derive their lifetimes from the token and stop on cancellation.
pub fn cancel_on_signal(token: CancellationToken) -> Result<JoinHandle<()>> {
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;

    Ok(tokio::spawn(async move {
        tokio::select! {
            _ = sigterm.recv() => {
                tracing::info!("Received SIGTERM, stopping coordinators");
            }
            _ = sigint.recv() => {
                tracing::info!("Received SIGINT, stopping coordinators");
            }
            _ = token.cancelled() => return,
        }
        token.cancel();
    }))
}
