//! # Catalog Snapshot Repository
//!
//! The cached catalog/price snapshot used for offline lookup. The snapshot
//! is replaced wholesale on each refresh and read per-sku or per-barcode at
//! the register. Staleness is tolerated; a refresh never blocks a sale.

use chrono::Utc;
use sqlx::SqlitePool;
use tracing::debug;

use crate::error::StoreResult;
use till_core::types::CatalogItem;

/// Repository for the catalog snapshot cache.
#[derive(Debug, Clone)]
pub struct CatalogRepository {
    pool: SqlitePool,
}

#[derive(sqlx::FromRow)]
struct CatalogRow {
    sku: String,
    name: String,
    price_cents: i64,
    barcode: Option<String>,
    size: Option<String>,
    color: Option<String>,
}

impl From<CatalogRow> for CatalogItem {
    fn from(row: CatalogRow) -> Self {
        CatalogItem {
            sku: row.sku,
            name: row.name,
            price_cents: row.price_cents,
            barcode: row.barcode,
            size: row.size,
            color: row.color,
        }
    }
}

impl CatalogRepository {
    pub fn new(pool: SqlitePool) -> Self {
        CatalogRepository { pool }
    }

    /// Replaces the whole snapshot in one transaction, so readers see either
    /// the old or the new catalog, never a mix.
    pub async fn replace_snapshot(&self, items: &[CatalogItem]) -> StoreResult<u64> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM catalog_snapshot").execute(&mut *tx).await?;

        for item in items {
            sqlx::query(
                r#"
                INSERT INTO catalog_snapshot (sku, name, price_cents, barcode, size, color, refreshed_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                "#,
            )
            .bind(&item.sku)
            .bind(&item.name)
            .bind(item.price_cents)
            .bind(&item.barcode)
            .bind(&item.size)
            .bind(&item.color)
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        debug!(count = items.len(), "Catalog snapshot replaced");
        Ok(items.len() as u64)
    }

    /// Looks a product up by sku.
    pub async fn by_sku(&self, sku: &str) -> StoreResult<Option<CatalogItem>> {
        let row: Option<CatalogRow> = sqlx::query_as(
            "SELECT sku, name, price_cents, barcode, size, color FROM catalog_snapshot WHERE sku = ?1",
        )
        .bind(sku)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(CatalogItem::from))
    }

    /// Looks a product up by barcode.
    pub async fn by_barcode(&self, barcode: &str) -> StoreResult<Option<CatalogItem>> {
        let row: Option<CatalogRow> = sqlx::query_as(
            "SELECT sku, name, price_cents, barcode, size, color FROM catalog_snapshot WHERE barcode = ?1",
        )
        .bind(barcode)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(CatalogItem::from))
    }

    /// Number of cached products.
    pub async fn count(&self) -> StoreResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM catalog_snapshot")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
