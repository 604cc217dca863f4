//! # Outbox Processor
//!
//! Converts queued operations into gateway calls, one drain cycle at a time.
//!
//! ## Drain Cycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │  1. Load queued items, creation order (oldest first)                │
//! │                                                                     │
//! │  2. Per item, sequentially:                                         │
//! │     a. Resolve dependencies through the sync log                    │
//! │        └─ any missing → SKIP silently (no retry bump); the item     │
//! │           becomes sendable the cycle after its predecessor maps     │
//! │     b. Swap local references for server ids                         │
//! │     c. Dispatch to the gateway with the item's idempotency key      │
//! │     d. Ack (incl. idempotent replay) → delete + sync-log append     │
//! │        Transient error              → retry_count += 1, stay queued │
//! │        Terminal rejection           → park for operator review      │
//! │                                                                     │
//! │  3. Report the cycle's tally                                        │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Items run strictly sequentially within a cycle; the only suspension
//! points are the per-item store reads and the gateway call. Creation order
//! plus dependency-skip is sufficient for correctness because a dependent
//! operation is always created after its predecessor.

use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

use till_core::operation::{Operation, OperationKind};
use till_core::types::{IdempotencyKey, OutboxItem};
use till_db::{LocalStore, StoreError};

use crate::error::{GatewayError, SyncResult};
use crate::gateway::{ServerAck, ServerGateway};

// =============================================================================
// Drain Report
// =============================================================================

/// Tally of one drain cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainReport {
    /// Items acknowledged and removed from the queue.
    pub acknowledged: u32,
    /// Items skipped because a dependency has not synced yet.
    pub skipped: u32,
    /// Items that failed transiently and stay queued.
    pub retried: u32,
    /// Items terminally rejected and parked.
    pub rejected: u32,
}

impl DrainReport {
    /// True when the cycle did not touch anything.
    pub fn is_idle(&self) -> bool {
        *self == DrainReport::default()
    }
}

// =============================================================================
// Outbox Processor
// =============================================================================

/// Drains the outbox against a server gateway.
pub struct OutboxProcessor<G> {
    store: LocalStore,
    gateway: Arc<G>,
    batch_size: u32,
}

impl<G: ServerGateway> OutboxProcessor<G> {
    pub fn new(store: LocalStore, gateway: Arc<G>, batch_size: u32) -> Self {
        OutboxProcessor { store, gateway, batch_size }
    }

    /// The local store this processor works against.
    pub fn store(&self) -> &LocalStore {
        &self.store
    }

    /// Runs one drain cycle. Callers serialize cycles (see the agent's
    /// re-entrancy guard); the processor itself assumes it is the only
    /// drainer.
    pub async fn drain(&self) -> SyncResult<DrainReport> {
        let items = self.store.outbox().pending(self.batch_size).await?;
        let mut report = DrainReport::default();

        if items.is_empty() {
            debug!("No queued outbox items");
            return Ok(report);
        }

        info!(count = items.len(), "Draining outbox");

        for item in items {
            self.process_item(&item, &mut report).await?;
        }

        info!(
            acknowledged = report.acknowledged,
            skipped = report.skipped,
            retried = report.retried,
            rejected = report.rejected,
            "Drain cycle complete"
        );

        Ok(report)
    }

    async fn process_item(&self, item: &OutboxItem, report: &mut DrainReport) -> SyncResult<()> {
        // Dependency gate: every predecessor must already have a sync-log
        // entry. A miss is a normal state, not a failure.
        let mut mappings: HashMap<String, String> = HashMap::new();
        for dep in item.operation.dependencies() {
            match self.store.sync_log().resolve(&dep).await? {
                Some(server_id) => {
                    mappings.insert(dep, server_id);
                }
                None => {
                    debug!(
                        id = %item.id,
                        kind = %item.operation.kind(),
                        dependency = %dep,
                        "Dependency not ready; leaving item queued"
                    );
                    report.skipped += 1;
                    return Ok(());
                }
            }
        }

        let operation = item.operation.with_resolved_refs(&mappings);

        match self.dispatch(&item.idempotency_key, &operation).await {
            Ok(ack) => {
                if ack.replayed {
                    debug!(
                        id = %item.id,
                        server_id = %ack.server_id,
                        "Idempotent replay; adopting original result"
                    );
                }
                self.store
                    .outbox()
                    .acknowledge(&item.id, &operation.sync_key(), &ack.server_id)
                    .await?;
                self.mark_draft_synced(&operation).await?;
                report.acknowledged += 1;
            }
            Err(GatewayError::Transient(reason)) => {
                debug!(id = %item.id, reason = %reason, "Transient failure; will retry");
                self.store.outbox().bump_retry(&item.id, &reason).await?;
                report.retried += 1;
            }
            Err(GatewayError::Rejected(reason)) => {
                warn!(id = %item.id, reason = %reason, "Terminal rejection; parking item");
                self.store.outbox().mark_rejected(&item.id, &reason).await?;
                report.rejected += 1;
            }
        }

        Ok(())
    }

    /// The dispatch table: variant → endpoint contract. Adding an operation
    /// kind extends this match, checked at compile time.
    async fn dispatch(
        &self,
        key: &IdempotencyKey,
        operation: &Operation,
    ) -> Result<ServerAck, GatewayError> {
        match operation {
            Operation::CreateSale(op) => self.gateway.create_sale(key, op).await,
            Operation::AddPayment(op) => self.gateway.add_payment(key, op).await,
            Operation::CreateReturn(op) => self.gateway.create_return(key, op).await,
            Operation::CreateExchange(op) => self.gateway.create_exchange(key, op).await,
            Operation::RedeemCoupon(op) => self.gateway.redeem_coupon(key, op).await,
            Operation::IssueCredit(op) => self.gateway.issue_credit(key, op).await,
            Operation::RedeemCredit(op) => self.gateway.redeem_credit(key, op).await,
        }
    }

    /// Flips the backing draft to synced for operations that carry one.
    /// Standalone operations (coupon/credit movements) have no draft; that
    /// is not an error.
    async fn mark_draft_synced(&self, operation: &Operation) -> SyncResult<()> {
        match operation.kind() {
            OperationKind::CreateSale
            | OperationKind::CreateReturn
            | OperationKind::CreateExchange => {
                match self.store.drafts().mark_synced(operation.local_id()).await {
                    Ok(()) => Ok(()),
                    Err(StoreError::NotFound { .. }) => {
                        debug!(local_id = %operation.local_id(), "No draft for operation");
                        Ok(())
                    }
                    Err(e) => Err(e.into()),
                }
            }
            _ => Ok(()),
        }
    }
}
