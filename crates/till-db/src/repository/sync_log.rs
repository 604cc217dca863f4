//! # Sync Log Repository
//!
//! The append-only local→server identity mapping. A row exists if and only
//! if the creating operation for that entity was acknowledged; everything
//! that needs a server identifier for a still-local entity resolves through
//! here rather than caching one prematurely.
//!
//! Rows are written by [`crate::repository::outbox::OutboxRepository::acknowledge`]
//! inside the acknowledge transaction; this repository is the read side.

use sqlx::SqlitePool;

use crate::error::StoreResult;
use till_core::types::SyncLogEntry;

/// Repository for the sync log.
#[derive(Debug, Clone)]
pub struct SyncLogRepository {
    pool: SqlitePool,
}

#[derive(sqlx::FromRow)]
struct SyncLogRow {
    key: String,
    server_id: String,
    updated_at: chrono::DateTime<chrono::Utc>,
}

impl SyncLogRepository {
    pub fn new(pool: SqlitePool) -> Self {
        SyncLogRepository { pool }
    }

    /// Resolves a local key (e.g. `"sale:<local id>"`) to its server
    /// identifier, if the entity has synced.
    pub async fn resolve(&self, key: &str) -> StoreResult<Option<String>> {
        let server_id: Option<String> =
            sqlx::query_scalar("SELECT server_id FROM sync_log WHERE key = ?1")
                .bind(key)
                .fetch_optional(&self.pool)
                .await?;
        Ok(server_id)
    }

    /// All mapping entries, oldest first. Diagnostic surface.
    pub async fn entries(&self) -> StoreResult<Vec<SyncLogEntry>> {
        let rows: Vec<SyncLogRow> =
            sqlx::query_as("SELECT key, server_id, updated_at FROM sync_log ORDER BY updated_at ASC, key ASC")
                .fetch_all(&self.pool)
                .await?;

        Ok(rows
            .into_iter()
            .map(|r| SyncLogEntry { key: r.key, server_id: r.server_id, updated_at: r.updated_at })
            .collect())
    }

    /// Number of mapped entities.
    pub async fn count(&self) -> StoreResult<i64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM sync_log").fetch_one(&self.pool).await?;
        Ok(count)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
