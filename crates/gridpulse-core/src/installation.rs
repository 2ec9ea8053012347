// Copyright (c) 2025 SOLARE S.R.O.
//
// This file is part of GridPulse.
//
// Licensed under the Creative Commons Attribution-NonCommercial-NoDerivatives 4.0 International
// (CC BY-NC-ND 4.0). You may use and share this file for non-commercial purposes only and you may not
// create derivatives. See <https://creativecommons.org/licenses/by-nc-nd/4.0/>.
//
// This software is provided "AS IS", without warranty of any kind.
//
// For commercial licensing, please contact: info@solare.cz

use chrono::Utc;
use gridpulse_types::{
    InstallationHealth, InstallationId, InstallationStatus, PollerConfig, Snapshot,
};
use parking_lot::RwLock;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::coordinator::{Coordinator, CycleError};

/// Retry schedule after a failed cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    pub initial: Duration,
}

impl BackoffPolicy {
    pub const DEFAULT_INITIAL: Duration = Duration::from_secs(30);

    pub fn new(initial: Duration) -> Self {
        Self { initial }
    }

    /// Delay before the next attempt after `failures` consecutive failures,
    /// doubling from `initial` and never longer than `cap`
    pub fn delay(&self, failures: u32, cap: Duration) -> Duration {
        let exponent = failures.saturating_sub(1).min(16);
        self.initial
            .checked_mul(1 << exponent)
            .unwrap_or(cap)
            .min(cap)
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::new(Self::DEFAULT_INITIAL)
    }
}

struct Shared {
    id: InstallationId,
    coordinator: RwLock<Arc<Coordinator>>,
    /// At most one cycle in flight, whether from the timer or `refresh_now`
    cycle_lock: Mutex<()>,
    /// Bumped on stop/reconfigure; cycles started under an older value never publish
    generation: AtomicU64,
    backoff: BackoffPolicy,
    snapshot_tx: watch::Sender<Option<Arc<Snapshot>>>,
    health_tx: watch::Sender<InstallationHealth>,
}

impl Shared {
    fn coordinator(&self) -> Arc<Coordinator> {
        self.coordinator.read().clone()
    }

    /// Run one cycle and publish its outcome
    ///
    /// A stopped installation, or one waiting for new credentials, never polls.
    async fn refresh(&self) -> Result<Arc<Snapshot>, CycleError> {
        let _guard = self.cycle_lock.lock().await;
        if matches!(
            self.health_tx.borrow().status,
            InstallationStatus::Stopped | InstallationStatus::ReauthRequired { .. }
        ) {
            return Err(CycleError::Inactive);
        }
        let generation = self.generation.load(Ordering::SeqCst);
        let coordinator = self.coordinator();
        let attempted = Utc::now();

        let result = coordinator.run_cycle().await;

        if self.generation.load(Ordering::SeqCst) != generation {
            warn!(installation = %self.id, "Discarding result of a superseded cycle");
            return result.map(Arc::new);
        }

        let previous = self.health_tx.borrow().clone();
        match result {
            Ok(snapshot) => {
                let snapshot = Arc::new(snapshot);
                self.snapshot_tx.send_replace(Some(snapshot.clone()));
                self.health_tx.send_replace(InstallationHealth {
                    status: InstallationStatus::Ready,
                    last_attempt: Some(attempted),
                    last_success: Some(snapshot.fetched_at),
                });
                Ok(snapshot)
            }
            Err(err) => {
                let status = if err.is_auth() {
                    InstallationStatus::ReauthRequired {
                        reason: err.to_string(),
                    }
                } else {
                    InstallationStatus::UpdateFailed {
                        reason: err.to_string(),
                        consecutive_failures: previous.consecutive_failures() + 1,
                    }
                };
                self.health_tx.send_replace(InstallationHealth {
                    status,
                    last_attempt: Some(attempted),
                    last_success: previous.last_success,
                });
                Err(err)
            }
        }
    }
}

async fn run_loop(shared: Arc<Shared>, mut stop_rx: watch::Receiver<bool>) {
    info!(installation = %shared.id, "Polling started");

    loop {
        let outcome = tokio::select! {
            biased;
            _ = stop_rx.changed() => break,
            outcome = shared.refresh() => outcome,
        };

        let interval = shared.coordinator().config().poll_interval;
        let delay = match outcome {
            Ok(_) => interval,
            Err(CycleError::Inactive) => break,
            Err(err) if err.is_auth() => {
                error!(
                    installation = %shared.id,
                    error = %err,
                    "API key rejected, polling stopped until reconfigured"
                );
                break;
            }
            Err(err) => {
                let failures = shared.health_tx.borrow().consecutive_failures();
                let delay = shared.backoff.delay(failures, interval);
                warn!(
                    installation = %shared.id,
                    error = %err,
                    failures,
                    retry_in_secs = delay.as_secs(),
                    "Update failed"
                );
                delay
            }
        };

        tokio::select! {
            biased;
            _ = stop_rx.changed() => break,
            () = tokio::time::sleep(delay) => {}
        }
    }

    info!(installation = %shared.id, "Polling stopped");
}

/// One configured poller with its tick loop and published state
pub struct Installation {
    shared: Arc<Shared>,
    stop_tx: watch::Sender<bool>,
    task: Option<JoinHandle<()>>,
}

impl Installation {
    /// Create a stopped installation; call [`Installation::start`] to begin polling
    pub fn new(id: InstallationId, coordinator: Coordinator, backoff: BackoffPolicy) -> Self {
        let (snapshot_tx, _) = watch::channel(None);
        let (health_tx, _) = watch::channel(InstallationHealth::starting());
        let (stop_tx, _) = watch::channel(false);

        Self {
            shared: Arc::new(Shared {
                id,
                coordinator: RwLock::new(Arc::new(coordinator)),
                cycle_lock: Mutex::new(()),
                generation: AtomicU64::new(0),
                backoff,
                snapshot_tx,
                health_tx,
            }),
            stop_tx,
            task: None,
        }
    }

    /// Spawn the tick loop; the first refresh runs immediately
    ///
    /// Restarts a shut-down installation. One waiting for new credentials
    /// stays stopped until [`Installation::reconfigure`].
    pub fn start(&mut self) {
        if self.is_running() {
            return;
        }
        self.shared.health_tx.send_if_modified(|health| {
            if health.status == InstallationStatus::Stopped {
                health.status = InstallationStatus::Starting;
                true
            } else {
                false
            }
        });
        self.stop_tx.send_replace(false);
        let stop_rx = self.stop_tx.subscribe();
        self.task = Some(tokio::spawn(run_loop(self.shared.clone(), stop_rx)));
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    async fn stop_loop(&mut self) {
        self.shared.generation.fetch_add(1, Ordering::SeqCst);
        self.stop_tx.send_replace(true);
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                if e.is_panic() {
                    error!(installation = %self.shared.id, error = %e, "Poll loop panicked");
                }
            }
        }
    }

    /// Stop polling; the last snapshot stays readable
    pub async fn shutdown(&mut self) {
        self.stop_loop().await;
        let last_success = self.shared.health_tx.borrow().last_success;
        self.shared.health_tx.send_replace(InstallationHealth {
            status: InstallationStatus::Stopped,
            last_attempt: None,
            last_success,
        });
    }

    /// Replace the coordinator (and with it the config) and restart from scratch
    pub async fn reconfigure(&mut self, coordinator: Coordinator) {
        self.stop_loop().await;
        info!(
            installation = %self.shared.id,
            config = ?coordinator.config(),
            "Reconfiguring installation"
        );
        *self.shared.coordinator.write() = Arc::new(coordinator);
        self.shared.snapshot_tx.send_replace(None);
        self.shared
            .health_tx
            .send_replace(InstallationHealth::starting());
        self.start();
    }

    /// Run one cycle now, outside the timer
    ///
    /// Fails with [`CycleError::Inactive`] after `shutdown` or an auth failure.
    pub async fn refresh_now(&self) -> Result<Arc<Snapshot>, CycleError> {
        self.shared.refresh().await
    }

    pub fn id(&self) -> &InstallationId {
        &self.shared.id
    }

    pub fn config(&self) -> PollerConfig {
        self.shared.coordinator().config().clone()
    }

    pub fn snapshot(&self) -> Option<Arc<Snapshot>> {
        self.shared.snapshot_tx.borrow().clone()
    }

    pub fn health(&self) -> InstallationHealth {
        self.shared.health_tx.borrow().clone()
    }

    pub fn subscribe_snapshot(&self) -> watch::Receiver<Option<Arc<Snapshot>>> {
        self.shared.snapshot_tx.subscribe()
    }

    pub fn subscribe_health(&self) -> watch::Receiver<InstallationHealth> {
        self.shared.health_tx.subscribe()
    }
}

impl Drop for Installation {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl std::fmt::Debug for Installation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Installation")
            .field("id", &self.shared.id)
            .field("running", &self.is_running())
            .field("health", &self.health())
            .finish_non_exhaustive()
    }
}
