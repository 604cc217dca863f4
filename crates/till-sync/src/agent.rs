//! # Sync Agent
//!
//! The background task that decides WHEN to drain; the processor decides
//! HOW. Spawned once per device.
//!
//! ## Triggers
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │  recurring timer tick ──────────────┐                               │
//! │                                     ├──► try_drain()                │
//! │  connectivity-restored signal ──────┘       │                       │
//! │                                             ▼                       │
//! │                              ┌──────────────────────────┐           │
//! │                              │ offline?    → skip       │           │
//! │                              │ gate held?  → no-op      │           │
//! │                              │ otherwise   → one drain  │           │
//! │                              └──────────────────────────┘           │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Only one drain cycle runs at a time: the gate is a `try_lock`, so a tick
//! that fires mid-drain is a no-op rather than queued work. Missed timer
//! ticks are skipped, not replayed.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch, Mutex};
use tracing::{debug, error, info};

use till_db::LocalStore;

use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::gateway::ServerGateway;
use crate::processor::{DrainReport, OutboxProcessor};

// =============================================================================
// Status
// =============================================================================

/// Point-in-time view of the sync engine, for status displays.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncStatus {
    /// Last-signalled connectivity state.
    pub online: bool,
    /// Queued items awaiting delivery.
    pub pending: i64,
    /// Terminally rejected items awaiting operator review.
    pub rejected: i64,
}

// =============================================================================
// Agent Internals
// =============================================================================

struct AgentInner<G> {
    processor: OutboxProcessor<G>,
    /// Re-entrancy guard: held for the duration of one drain cycle.
    drain_gate: Mutex<()>,
    connectivity: watch::Receiver<bool>,
}

impl<G: ServerGateway> AgentInner<G> {
    /// Runs one drain cycle unless offline or already draining.
    async fn try_drain(&self) -> Option<DrainReport> {
        if !*self.connectivity.borrow() {
            debug!("Offline; skipping drain cycle");
            return None;
        }
        match self.drain_gate.try_lock() {
            Ok(_guard) => match self.processor.drain().await {
                Ok(report) => Some(report),
                Err(e) => {
                    error!(?e, "Drain cycle failed");
                    None
                }
            },
            Err(_) => {
                debug!("Drain already in progress; tick is a no-op");
                None
            }
        }
    }

    async fn status(&self) -> SyncResult<SyncStatus> {
        let store = self.processor.store();
        Ok(SyncStatus {
            online: *self.connectivity.borrow(),
            pending: store.outbox().count_pending().await?,
            rejected: store.outbox().rejected().await?.len() as i64,
        })
    }
}

// =============================================================================
// Sync Agent
// =============================================================================

/// The sync background task. Create with [`SyncAgent::new`], then spawn
/// [`SyncAgent::run`].
pub struct SyncAgent<G: ServerGateway> {
    inner: Arc<AgentInner<G>>,
    connectivity_rx: watch::Receiver<bool>,
    shutdown_rx: mpsc::Receiver<()>,
    poll_interval: Duration,
}

/// Handle for controlling a running [`SyncAgent`].
pub struct SyncAgentHandle<G: ServerGateway> {
    inner: Arc<AgentInner<G>>,
    connectivity_tx: watch::Sender<bool>,
    shutdown_tx: mpsc::Sender<()>,
}

impl<G: ServerGateway> Clone for SyncAgentHandle<G> {
    fn clone(&self) -> Self {
        SyncAgentHandle {
            inner: Arc::clone(&self.inner),
            connectivity_tx: self.connectivity_tx.clone(),
            shutdown_tx: self.shutdown_tx.clone(),
        }
    }
}

impl<G: ServerGateway> SyncAgent<G> {
    /// Creates an agent and its handle. The agent starts in the online
    /// state; callers signal outages through the handle.
    pub fn new(
        store: LocalStore,
        gateway: Arc<G>,
        config: &SyncConfig,
    ) -> (Self, SyncAgentHandle<G>) {
        let (connectivity_tx, connectivity_rx) = watch::channel(true);
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);

        let inner = Arc::new(AgentInner {
            processor: OutboxProcessor::new(store, gateway, config.sync.batch_size),
            drain_gate: Mutex::new(()),
            connectivity: connectivity_rx.clone(),
        });

        let agent = SyncAgent {
            inner: Arc::clone(&inner),
            connectivity_rx,
            shutdown_rx,
            poll_interval: Duration::from_secs(config.sync.poll_interval_secs),
        };

        let handle = SyncAgentHandle { inner, connectivity_tx, shutdown_tx };

        (agent, handle)
    }

    /// Runs the agent loop. Spawn as a background task.
    pub async fn run(mut self) {
        info!(poll_interval = ?self.poll_interval, "Sync agent starting");

        let mut interval = tokio::time::interval(self.poll_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        let mut connectivity_open = true;

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.inner.try_drain().await;
                }

                changed = self.connectivity_rx.changed(), if connectivity_open => {
                    match changed {
                        Ok(()) => {
                            let online = *self.connectivity_rx.borrow_and_update();
                            if online {
                                info!("Connectivity restored; draining immediately");
                                self.inner.try_drain().await;
                            } else {
                                info!("Connectivity lost");
                            }
                        }
                        // Handle dropped; the timer keeps the loop alive.
                        Err(_) => connectivity_open = false,
                    }
                }

                _ = self.shutdown_rx.recv() => {
                    info!("Sync agent shutting down");
                    break;
                }
            }
        }

        info!("Sync agent stopped");
    }
}

impl<G: ServerGateway> SyncAgentHandle<G> {
    /// Signals that the server is reachable again; the agent drains
    /// immediately.
    pub fn notify_online(&self) {
        let _ = self.connectivity_tx.send(true);
    }

    /// Signals an outage; timer ticks become no-ops until restored.
    pub fn notify_offline(&self) {
        let _ = self.connectivity_tx.send(false);
    }

    /// Runs a drain cycle right now, subject to the same gate and
    /// connectivity check as the timer.
    pub async fn drain_now(&self) -> Option<DrainReport> {
        self.inner.try_drain().await
    }

    /// Current queue depth and connectivity.
    pub async fn status(&self) -> SyncResult<SyncStatus> {
        self.inner.status().await
    }

    /// Triggers graceful shutdown.
    pub async fn shutdown(&self) -> SyncResult<()> {
        self.shutdown_tx
            .send(())
            .await
            .map_err(|_| SyncError::ChannelError("Shutdown channel closed".into()))
    }
}
