use tokio::signal;
#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal as unix_signal};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownSignal {
    Interrupt,
    Terminate,
}

/// Resolves on the first SIGINT or SIGTERM.
pub async fn wait_for_signal() -> ShutdownSignal {
    #[cfg(unix)]
    {
        let mut sigterm = match unix_signal(SignalKind::terminate()) {
            Ok(sigterm) => sigterm,
            Err(err) => {
                error!("Failed to create SIGTERM handler: {}", err);
                return wait_for_ctrl_c().await;
            }
        };

        tokio::select! {
            received = wait_for_ctrl_c() => received,
            _ = sigterm.recv() => {
                info!("Received SIGTERM, initiating graceful shutdown");
                ShutdownSignal::Terminate
            }
        }
    }

    #[cfg(not(unix))]
    {
        wait_for_ctrl_c().await
    }
}

async fn wait_for_ctrl_c() -> ShutdownSignal {
    match signal::ctrl_c().await {
        Ok(()) => {
            info!("Received SIGINT (Ctrl+C), initiating graceful shutdown");
            ShutdownSignal::Interrupt
        }
        Err(err) => {
            error!("Failed to listen for SIGINT: {}", err);
            // Never resolve, so a broken handler does not look like a signal
            std::future::pending::<ShutdownSignal>().await
        }
    }
}

/// Cancels `token` when a shutdown signal arrives.
pub fn spawn_signal_listener(token: CancellationToken) {
    tokio::spawn(async move {
        tokio::select! {
            _ = token.cancelled() => {}
            _ = wait_for_signal() => token.cancel(),
        }
    });
}
