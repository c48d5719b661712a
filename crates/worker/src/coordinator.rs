//! Process-wide cancellation and ordered shutdown.
//!
//! One [`CancellationToken`] is created here and cloned into every loop.
//! Stop stages run strictly one after another, in registration order, so a
//! later stage only starts once everything before it has fully exited.

use futures::future::BoxFuture;
use futures::FutureExt;
use std::future::Future;
use std::time::Instant;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::info;

struct Stage {
    name: &'static str,
    stop: Box<dyn FnOnce() -> BoxFuture<'static, ()> + Send>,
}

pub struct ShutdownCoordinator {
    token: CancellationToken,
    stages: Vec<Stage>,
}

impl ShutdownCoordinator {
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
            stages: Vec::new(),
        }
    }

    /// A handle on the shared cancellation signal.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Appends a stop stage.
    pub fn with_stage<F, Fut>(mut self, name: &'static str, stop: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.stages.push(Stage {
            name,
            stop: Box::new(move || stop().boxed()),
        });
        self
    }

    /// Waits for Ctrl+C, SIGTERM, or an earlier cancellation, then cancels
    /// the shared token.
    pub async fn wait_for_signal(&self) {
        tokio::select! {
            _ = shutdown_signal() => {}
            _ = self.token.cancelled() => {
                info!("Cancellation requested internally");
            }
        }
        self.token.cancel();
    }

    /// Cancels the shared token and runs every stage in order.
    pub async fn shutdown(self) {
        self.token.cancel();
        let total = Instant::now();

        for stage in self.stages {
            info!(stage = stage.name, "Stopping");
            let start = Instant::now();
            (stage.stop)().await;
            info!(
                stage = stage.name,
                elapsed_ms = start.elapsed().as_millis() as u64,
                "Stopped"
            );
        }

        info!(
            elapsed_ms = total.elapsed().as_millis() as u64,
            "Shutdown complete"
        );
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

/// Resolves on Ctrl+C or SIGTERM. A handler that cannot be installed never
/// fires.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if signal::ctrl_c().await.is_err() {
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        }
        _ = terminate => {
            info!("Received terminate signal");
        }
    }
}
