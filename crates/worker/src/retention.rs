//! Periodic deletion of objects that have not been seen recently.

use chrono::Utc;
use engine_core::{ObjectRepository, RetentionPolicy};
use parking_lot::Mutex;
use std::sync::Arc;
use telemetry::metrics;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

pub struct RetentionSweeper {
    store: Arc<dyn ObjectRepository>,
    policy: RetentionPolicy,
    token: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl RetentionSweeper {
    pub fn new(
        store: Arc<dyn ObjectRepository>,
        policy: RetentionPolicy,
        token: CancellationToken,
    ) -> Self {
        Self {
            store,
            policy,
            token,
            task: Mutex::new(None),
        }
    }

    /// Launches the sweep loop. Only the first call has any effect.
    pub fn start(&self) {
        let mut task = self.task.lock();
        if task.is_some() {
            warn!("Retention sweeper already started");
            return;
        }

        info!(
            window_ms = self.policy.window_ms,
            tick_ms = self.policy.tick_ms,
            "Starting retention sweeper"
        );
        *task = Some(tokio::spawn(run(
            self.store.clone(),
            self.policy,
            self.token.clone(),
        )));
    }

    /// Cancels the shared token and waits for the loop to exit.
    pub async fn stop(&self) {
        self.token.cancel();

        let handle = self.task.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                error!(error = %e, "Retention sweeper task failed");
            }
        }

        info!("Retention sweeper stopped");
    }
}

async fn run(store: Arc<dyn ObjectRepository>, policy: RetentionPolicy, token: CancellationToken) {
    let tick = policy.tick();
    let mut ticker = interval_at(Instant::now() + tick, tick);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = token.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let cutoff = policy.cutoff(Utc::now());
        match store.delete_expired(cutoff).await {
            Ok(0) => {}
            Ok(expired) => {
                metrics().objects_expired.inc_by(expired);
                info!(expired, cutoff = %cutoff, "Removed expired objects");
            }
            Err(e) if e.is_canceled() => break,
            Err(e) => {
                metrics().sweep_errors.inc();
                error!(error = %e, "Failed to delete expired objects");
            }
        }
    }

    debug!("Retention loop exited");
}
