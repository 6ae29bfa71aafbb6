//! Ctrl+C / SIGTERM handling
//!
//! A signal cancels the shared [`CancellationToken`]; the download engine
//! stops pulling work and reports unfinished items as cancelled.

use tokio::signal;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Cancels a token when the process receives a shutdown signal
pub struct SignalHandler {
    cancel: CancellationToken,
}

impl SignalHandler {
    pub fn new(cancel: CancellationToken) -> Self {
        Self { cancel }
    }

    /// Spawn the background task watching for signals
    ///
    /// The task also ends quietly if the token is cancelled by someone else.
    pub fn setup(&self) -> JoinHandle<()> {
        let cancel = self.cancel.clone();

        tokio::spawn(async move {
            let ctrl_c = async {
                if let Err(e) = signal::ctrl_c().await {
                    warn!("Could not install Ctrl+C handler: {}", e);
                    std::future::pending::<()>().await;
                }
            };

            #[cfg(unix)]
            let terminate = async {
                match signal::unix::signal(signal::unix::SignalKind::terminate()) {
                    Ok(mut stream) => {
                        stream.recv().await;
                    }
                    Err(e) => {
                        warn!("Could not install SIGTERM handler: {}", e);
                        std::future::pending::<()>().await;
                    }
                }
            };

            #[cfg(not(unix))]
            let terminate = std::future::pending::<()>();

            tokio::select! {
                _ = ctrl_c => {
                    info!("Received Ctrl+C, cancelling outstanding downloads");
                },
                _ = terminate => {
                    info!("Received terminate signal, cancelling outstanding downloads");
                },
                _ = cancel.cancelled() => return,
            }

            cancel.cancel();
        })
    }
}

/// Token cancelled on Ctrl+C or SIGTERM
pub fn shutdown_token() -> CancellationToken {
    let cancel = CancellationToken::new();
    // Handle is not needed; the task ends with the token
    let _ = SignalHandler::new(cancel.clone()).setup();
    cancel
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::timeout;

    #[tokio::test]
    async fn test_handler_task_ends_when_token_is_cancelled() {
        let cancel = CancellationToken::new();
        let handle = SignalHandler::new(cancel.clone()).setup();

        tokio::time::sleep(Duration::from_millis(10)).await;
        cancel.cancel();

        let result = timeout(Duration::from_millis(200), handle).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_shutdown_token_starts_uncancelled() {
        let token = shutdown_token();
        assert!(!token.is_cancelled());
        token.cancel();
    }
}
