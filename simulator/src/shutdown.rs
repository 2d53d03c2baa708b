use tokio::signal::unix::{SignalKind, signal};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Owns the process-wide cancellation token and turns OS signals into it.
pub struct ShutdownHandler {
    token: CancellationToken,
}

/// Cloneable view of the shutdown token handed to every component.
#[derive(Clone, Debug)]
pub struct ShutdownSignals {
    pub token: CancellationToken,
}

impl Default for ShutdownHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl ShutdownHandler {
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
        }
    }

    pub fn signals(&self) -> ShutdownSignals {
        ShutdownSignals {
            token: self.token.clone(),
        }
    }

    /// Waits for SIGINT or SIGTERM, then cancels the token.
    pub async fn wait_for_signals(&self) {
        let mut terminate = match signal(SignalKind::terminate()) {
            Ok(stream) => Some(stream),
            Err(err) => {
                warn!("Failed to install SIGTERM handler: {err}");
                None
            }
        };

        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                if let Err(err) = result {
                    warn!("Failed to listen for SIGINT: {err}");
                }
                info!("Received SIGINT");
            }
            _ = async {
                match terminate.as_mut() {
                    Some(stream) => { stream.recv().await; }
                    None => std::future::pending::<()>().await,
                }
            } => {
                info!("Received SIGTERM");
            }
            _ = self.token.cancelled() => {}
        }

        self.token.cancel();
    }
}

impl ShutdownSignals {
    /// Token for a single device unit. Cancelled whenever the parent is.
    pub fn child(&self) -> ShutdownSignals {
        ShutdownSignals {
            token: self.token.child_token(),
        }
    }

    pub fn is_shutting_down(&self) -> bool {
        self.token.is_cancelled()
    }
}
