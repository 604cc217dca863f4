//! # Draft Repository
//!
//! Client-local transactions awaiting server confirmation.
//!
//! ## The Commit Boundary
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                       SINGLE TRANSACTION                            │
//! │                                                                     │
//! │  1. INSERT INTO drafts (local_id, kind, payload, ...)               │
//! │  2. INSERT INTO outbox (id, kind, payload, idempotency_key, ...)    │
//! │                                                                     │
//! └─────────────────────────────────────────────────────────────────────┘
//!         Both succeed or both fail. A draft can never exist without its
//!         queue entry ("ghost sale"), and a queue entry can never exist
//!         without its draft.
//! ```

use sqlx::SqlitePool;
use tracing::debug;

use crate::error::{StoreError, StoreResult};
use till_core::types::{DraftTransaction, OutboxItem};

/// Repository for draft transactions.
#[derive(Debug, Clone)]
pub struct DraftRepository {
    pool: SqlitePool,
}

#[derive(sqlx::FromRow)]
struct DraftRow {
    payload: String,
}

impl DraftRepository {
    pub fn new(pool: SqlitePool) -> Self {
        DraftRepository { pool }
    }

    /// Commits a draft together with its outbox item, atomically.
    pub async fn commit(&self, draft: &DraftTransaction, item: &OutboxItem) -> StoreResult<()> {
        let draft_payload =
            serde_json::to_string(draft).map_err(|e| StoreError::corrupt("draft", e))?;
        let op_payload =
            serde_json::to_string(&item.operation).map_err(|e| StoreError::corrupt("outbox", e))?;

        debug!(
            local_id = %draft.local_id,
            kind = %item.operation.kind(),
            "Committing draft with outbox entry"
        );

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO drafts (local_id, kind, payload, status, created_at)
            VALUES (?1, ?2, ?3, 'pending', ?4)
            "#,
        )
        .bind(&draft.local_id)
        .bind(draft.kind.as_str())
        .bind(draft_payload)
        .bind(draft.created_at)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO outbox (id, kind, payload, idempotency_key, retry_count, last_error, rejected_at, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, NULL, NULL, ?6)
            "#,
        )
        .bind(&item.id)
        .bind(item.operation.kind().as_str())
        .bind(op_payload)
        .bind(item.idempotency_key.as_str())
        .bind(item.retry_count)
        .bind(item.created_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    /// Fetches a draft by its local id.
    pub async fn by_id(&self, local_id: &str) -> StoreResult<Option<DraftTransaction>> {
        let row: Option<DraftRow> =
            sqlx::query_as("SELECT payload FROM drafts WHERE local_id = ?1")
                .bind(local_id)
                .fetch_optional(&self.pool)
                .await?;

        row.map(|r| serde_json::from_str(&r.payload).map_err(|e| StoreError::corrupt("draft", e)))
            .transpose()
    }

    /// Flips a draft to synced once its operation is acknowledged.
    pub async fn mark_synced(&self, local_id: &str) -> StoreResult<()> {
        let result = sqlx::query("UPDATE drafts SET status = 'synced' WHERE local_id = ?1")
            .bind(local_id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("Draft", local_id));
        }
        Ok(())
    }

    /// Drafts still awaiting acknowledgment, oldest first.
    pub async fn pending(&self) -> StoreResult<Vec<DraftTransaction>> {
        let rows: Vec<DraftRow> = sqlx::query_as(
            "SELECT payload FROM drafts WHERE status = 'pending' ORDER BY created_at ASC",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|r| serde_json::from_str(&r.payload).map_err(|e| StoreError::corrupt("draft", e)))
            .collect()
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
