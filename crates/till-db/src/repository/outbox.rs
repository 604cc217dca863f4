//! # Outbox Repository
//!
//! The pending-operations queue.
//!
//! ## Item Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │  enqueue / draft commit                                             │
//! │       │                                                             │
//! │       ▼                                                             │
//! │  queued ──► in-flight ──► acknowledged: DELETE + sync-log append    │
//! │    ▲            │          (single transaction)                     │
//! │    │            ├──► transient failure: retry_count += 1            │
//! │    └────────────┘                                                   │
//! │                 └──► terminal rejection: rejected_at set,           │
//! │                      excluded from drains, surfaced to operator     │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The acknowledge transaction is what makes the queue exactly-once in
//! effect: an item can never be retried after its sync-log entry exists,
//! and a crash between the server call and the acknowledge is recovered by
//! the idempotency key on the next attempt.

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tracing::{debug, warn};

use crate::error::{StoreError, StoreResult};
use till_core::operation::Operation;
use till_core::types::{IdempotencyKey, OutboxItem};

/// Repository for outbox operations.
#[derive(Debug, Clone)]
pub struct OutboxRepository {
    pool: SqlitePool,
}

#[derive(sqlx::FromRow)]
struct OutboxRow {
    id: String,
    payload: String,
    idempotency_key: String,
    retry_count: i64,
    last_error: Option<String>,
    rejected_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl OutboxRow {
    fn into_item(self) -> StoreResult<OutboxItem> {
        let operation: Operation =
            serde_json::from_str(&self.payload).map_err(|e| StoreError::corrupt("outbox", e))?;
        Ok(OutboxItem {
            id: self.id,
            operation,
            idempotency_key: IdempotencyKey::from(self.idempotency_key),
            created_at: self.created_at,
            retry_count: self.retry_count,
            last_error: self.last_error,
            rejected_at: self.rejected_at,
        })
    }
}

const SELECT_COLUMNS: &str =
    "id, payload, idempotency_key, retry_count, last_error, rejected_at, created_at";

impl OutboxRepository {
    pub fn new(pool: SqlitePool) -> Self {
        OutboxRepository { pool }
    }

    /// Enqueues a standalone operation (coupon redemption, credit movement)
    /// that has no draft of its own.
    pub async fn enqueue(&self, item: &OutboxItem) -> StoreResult<()> {
        let payload =
            serde_json::to_string(&item.operation).map_err(|e| StoreError::corrupt("outbox", e))?;

        debug!(id = %item.id, kind = %item.operation.kind(), "Enqueuing operation");

        sqlx::query(
            r#"
            INSERT INTO outbox (id, kind, payload, idempotency_key, retry_count, last_error, rejected_at, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, NULL, NULL, ?6)
            "#,
        )
        .bind(&item.id)
        .bind(item.operation.kind().as_str())
        .bind(payload)
        .bind(item.idempotency_key.as_str())
        .bind(item.retry_count)
        .bind(item.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Queued items in creation order (oldest first), excluding terminally
    /// rejected ones.
    pub async fn pending(&self, limit: u32) -> StoreResult<Vec<OutboxItem>> {
        let rows: Vec<OutboxRow> = sqlx::query_as(&format!(
            r#"
            SELECT {SELECT_COLUMNS}
            FROM outbox
            WHERE rejected_at IS NULL
            ORDER BY created_at ASC, rowid ASC
            LIMIT ?1
            "#
        ))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(OutboxRow::into_item).collect()
    }

    /// Records a transient failure: the retry counter is bumped and the item
    /// stays queued. The idempotency key never changes.
    pub async fn bump_retry(&self, id: &str, error: &str) -> StoreResult<()> {
        let result = sqlx::query(
            "UPDATE outbox SET retry_count = retry_count + 1, last_error = ?2 WHERE id = ?1",
        )
        .bind(id)
        .bind(error)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("Outbox item", id));
        }
        Ok(())
    }

    /// Records a terminal server rejection. The item is kept for operator
    /// review but never drained again.
    pub async fn mark_rejected(&self, id: &str, reason: &str) -> StoreResult<()> {
        warn!(id = %id, reason = %reason, "Outbox item terminally rejected");
        let result =
            sqlx::query("UPDATE outbox SET rejected_at = ?2, last_error = ?3 WHERE id = ?1")
                .bind(id)
                .bind(Utc::now())
                .bind(reason)
                .execute(&self.pool)
                .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("Outbox item", id));
        }
        Ok(())
    }

    /// Items awaiting operator attention after a terminal rejection.
    pub async fn rejected(&self) -> StoreResult<Vec<OutboxItem>> {
        let rows: Vec<OutboxRow> = sqlx::query_as(&format!(
            "SELECT {SELECT_COLUMNS} FROM outbox WHERE rejected_at IS NOT NULL ORDER BY created_at ASC"
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(OutboxRow::into_item).collect()
    }

    /// Confirms a server acknowledgment: deletes the item and appends the
    /// sync-log entry in one transaction.
    ///
    /// The sync-log insert is append-once: if the key already exists (a
    /// replay that lost the race), the existing mapping stands untouched.
    pub async fn acknowledge(&self, id: &str, sync_key: &str, server_id: &str) -> StoreResult<()> {
        debug!(id = %id, key = %sync_key, server_id = %server_id, "Acknowledging outbox item");

        let mut tx = self.pool.begin().await?;

        let deleted = sqlx::query("DELETE FROM outbox WHERE id = ?1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        if deleted.rows_affected() == 0 {
            return Err(StoreError::not_found("Outbox item", id));
        }

        sqlx::query(
            r#"
            INSERT INTO sync_log (key, server_id, updated_at) VALUES (?1, ?2, ?3)
            ON CONFLICT(key) DO NOTHING
            "#,
        )
        .bind(sync_key)
        .bind(server_id)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    /// Number of queued, non-rejected items.
    pub async fn count_pending(&self) -> StoreResult<i64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM outbox WHERE rejected_at IS NULL")
                .fetch_one(&self.pool)
                .await?;
        Ok(count)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use crate::pool::{LocalStore, StoreConfig};
    use chrono::Utc;
    use till_core::operation::{CouponRedemptionOp, Operation, SaleOp, SaleRef};
    use till_core::tax::Totals;
    use till_core::types::OutboxItem;

    fn sale_item(local_id: &str) -> OutboxItem {
        OutboxItem::new(Operation::CreateSale(SaleOp {
            local_id: local_id.to_string(),
            lines: Vec::new(),
            discounts: Vec::new(),
            totals: Totals::default(),
            settlement: None,
            created_at: Utc::now(),
        }))
    }

    fn coupon_item(sale: SaleRef) -> OutboxItem {
        OutboxItem::new(Operation::RedeemCoupon(CouponRedemptionOp {
            local_id: "redeem-1".to_string(),
            code: "SAVE10".to_string(),
            sale,
            created_at: Utc::now(),
        }))
    }

    #[tokio::test]
    async fn test_pending_is_oldest_first() {
        let store = LocalStore::new(StoreConfig::in_memory()).await.unwrap();
        let outbox = store.outbox();

        let first = sale_item("sale-1");
        let second = coupon_item(SaleRef::Local("sale-1".into()));
        outbox.enqueue(&first).await.unwrap();
        outbox.enqueue(&second).await.unwrap();

        let pending = outbox.pending(10).await.unwrap();
        assert_eq!(pending.len(), 2);
        assert_eq!(pending[0].id, first.id);
        assert_eq!(pending[1].id, second.id);
    }

    #[tokio::test]
    async fn test_bump_retry_keeps_item_queued_and_key_stable() {
        let store = LocalStore::new(StoreConfig::in_memory()).await.unwrap();
        let outbox = store.outbox();
        let item = sale_item("sale-1");
        outbox.enqueue(&item).await.unwrap();

        outbox.bump_retry(&item.id, "connection refused").await.unwrap();
        outbox.bump_retry(&item.id, "connection refused").await.unwrap();

        let pending = outbox.pending(10).await.unwrap();
        assert_eq!(pending[0].retry_count, 2);
        assert_eq!(pending[0].last_error.as_deref(), Some("connection refused"));
        assert_eq!(pending[0].idempotency_key, item.idempotency_key);
    }

    #[tokio::test]
    async fn test_acknowledge_deletes_and_maps_atomically() {
        let store = LocalStore::new(StoreConfig::in_memory()).await.unwrap();
        let outbox = store.outbox();
        let item = sale_item("sale-1");
        outbox.enqueue(&item).await.unwrap();

        outbox.acknowledge(&item.id, "sale:sale-1", "srv-77").await.unwrap();

        assert_eq!(outbox.count_pending().await.unwrap(), 0);
        assert_eq!(
            store.sync_log().resolve("sale:sale-1").await.unwrap().as_deref(),
            Some("srv-77")
        );
        // Acknowledging a deleted item is an error, not a silent success.
        assert!(outbox.acknowledge(&item.id, "sale:sale-1", "srv-77").await.is_err());
    }

    #[tokio::test]
    async fn test_sync_log_is_append_once() {
        let store = LocalStore::new(StoreConfig::in_memory()).await.unwrap();
        let outbox = store.outbox();

        let a = sale_item("sale-1");
        let b = sale_item("sale-1");
        outbox.enqueue(&a).await.unwrap();
        outbox.enqueue(&b).await.unwrap();

        outbox.acknowledge(&a.id, "sale:sale-1", "srv-1").await.unwrap();
        outbox.acknowledge(&b.id, "sale:sale-1", "srv-2").await.unwrap();

        // The first mapping stands.
        assert_eq!(
            store.sync_log().resolve("sale:sale-1").await.unwrap().as_deref(),
            Some("srv-1")
        );
    }

    #[tokio::test]
    async fn test_rejected_items_leave_the_queue_but_stay_visible() {
        let store = LocalStore::new(StoreConfig::in_memory()).await.unwrap();
        let outbox = store.outbox();
        let item = sale_item("sale-1");
        outbox.enqueue(&item).await.unwrap();

        outbox.mark_rejected(&item.id, "insufficient stock").await.unwrap();

        assert!(outbox.pending(10).await.unwrap().is_empty());
        let rejected = outbox.rejected().await.unwrap();
        assert_eq!(rejected.len(), 1);
        assert_eq!(rejected[0].last_error.as_deref(), Some("insufficient stock"));
    }

    #[tokio::test]
    async fn test_duplicate_idempotency_key_is_refused() {
        let store = LocalStore::new(StoreConfig::in_memory()).await.unwrap();
        let outbox = store.outbox();
        let item = sale_item("sale-1");
        outbox.enqueue(&item).await.unwrap();

        let mut clone = sale_item("sale-2");
        clone.idempotency_key = item.idempotency_key.clone();
        assert!(outbox.enqueue(&clone).await.is_err());
    }
}
