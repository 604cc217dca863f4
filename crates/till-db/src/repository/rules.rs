//! # Rule Index & Settings Repository
//!
//! Local cache of the promotion/coupon rule index and the settings bundle,
//! so evaluation works fully offline. Settings reads are last-known-good:
//! the most recent successfully saved value is served until a newer one
//! lands.
//!
//! Rule payloads are stored as JSON; the priority and active columns are
//! denormalized for the hot read path.

use chrono::Utc;
use sqlx::SqlitePool;
use tracing::debug;

use crate::error::{StoreError, StoreResult};
use till_core::promo::{CouponRule, PromotionRule};
use till_core::types::Settings;

const SETTINGS_KEY: &str = "settings";

/// Repository for cached rules and settings.
#[derive(Debug, Clone)]
pub struct RulesRepository {
    pool: SqlitePool,
}

impl RulesRepository {
    pub fn new(pool: SqlitePool) -> Self {
        RulesRepository { pool }
    }

    /// Replaces the promotion index in one transaction.
    pub async fn replace_promotions(&self, rules: &[PromotionRule]) -> StoreResult<()> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM promotion_rules").execute(&mut *tx).await?;

        for rule in rules {
            let payload =
                serde_json::to_string(rule).map_err(|e| StoreError::corrupt("promotion", e))?;
            sqlx::query(
                r#"
                INSERT INTO promotion_rules (id, payload, priority, active, refreshed_at)
                VALUES (?1, ?2, ?3, ?4, ?5)
                "#,
            )
            .bind(&rule.id)
            .bind(payload)
            .bind(rule.priority)
            .bind(rule.active)
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        debug!(count = rules.len(), "Promotion index replaced");
        Ok(())
    }

    /// Active promotions in ascending priority order, ready for evaluation.
    pub async fn active_promotions(&self) -> StoreResult<Vec<PromotionRule>> {
        let payloads: Vec<String> = sqlx::query_scalar(
            "SELECT payload FROM promotion_rules WHERE active = 1 ORDER BY priority ASC, id ASC",
        )
        .fetch_all(&self.pool)
        .await?;

        payloads
            .iter()
            .map(|p| serde_json::from_str(p).map_err(|e| StoreError::corrupt("promotion", e)))
            .collect()
    }

    /// Replaces the coupon index in one transaction.
    pub async fn replace_coupons(&self, coupons: &[CouponRule]) -> StoreResult<()> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM coupon_rules").execute(&mut *tx).await?;

        for coupon in coupons {
            let payload =
                serde_json::to_string(coupon).map_err(|e| StoreError::corrupt("coupon", e))?;
            sqlx::query(
                "INSERT INTO coupon_rules (code, payload, refreshed_at) VALUES (?1, ?2, ?3)",
            )
            .bind(&coupon.code)
            .bind(payload)
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        debug!(count = coupons.len(), "Coupon index replaced");
        Ok(())
    }

    /// Looks a coupon up by code. An unknown code is simply absent, not an
    /// error; validity is the caller's concern.
    pub async fn coupon_by_code(&self, code: &str) -> StoreResult<Option<CouponRule>> {
        let payload: Option<String> =
            sqlx::query_scalar("SELECT payload FROM coupon_rules WHERE code = ?1")
                .bind(code)
                .fetch_optional(&self.pool)
                .await?;

        payload
            .map(|p| serde_json::from_str(&p).map_err(|e| StoreError::corrupt("coupon", e)))
            .transpose()
    }

    /// Saves the settings bundle as the new last-known-good value.
    pub async fn save_settings(&self, settings: &Settings) -> StoreResult<()> {
        let payload =
            serde_json::to_string(settings).map_err(|e| StoreError::corrupt("settings", e))?;
        sqlx::query(
            r#"
            INSERT INTO settings_cache (key, payload, updated_at) VALUES (?1, ?2, ?3)
            ON CONFLICT(key) DO UPDATE SET payload = excluded.payload, updated_at = excluded.updated_at
            "#,
        )
        .bind(SETTINGS_KEY)
        .bind(payload)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// The last-known-good settings, or None before the first save.
    pub async fn settings(&self) -> StoreResult<Option<Settings>> {
        let payload: Option<String> =
            sqlx::query_scalar("SELECT payload FROM settings_cache WHERE key = ?1")
                .bind(SETTINGS_KEY)
                .fetch_optional(&self.pool)
                .await?;

        payload
            .map(|p| serde_json::from_str(&p).map_err(|e| StoreError::corrupt("settings", e)))
            .transpose()
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use crate::pool::{LocalStore, StoreConfig};
    use till_core::promo::{
        CouponRule, PromotionRule, RuleConstraints, RuleKind, RuleLevel, RuleScope, Schedule,
    };
    use till_core::types::Settings;

    fn promo(id: &str, priority: i32, active: bool) -> PromotionRule {
        PromotionRule {
            id: id.to_string(),
            label: format!("promo {id}"),
            kind: RuleKind::Percent { bps: 1_000 },
            level: RuleLevel::Order,
            scope: RuleScope::default(),
            constraints: RuleConstraints::default(),
            schedule: Schedule::default(),
            priority,
            active,
        }
    }

    #[tokio::test]
    async fn test_promotions_round_trip_in_priority_order() {
        let store = LocalStore::new(StoreConfig::in_memory()).await.unwrap();
        let rules = store.rules();

        rules
            .replace_promotions(&[promo("late", 10, true), promo("early", 1, true), promo("off", 0, false)])
            .await
            .unwrap();

        let active = rules.active_promotions().await.unwrap();
        let ids: Vec<&str> = active.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["early", "late"]);
    }

    #[tokio::test]
    async fn test_coupon_lookup() {
        let store = LocalStore::new(StoreConfig::in_memory()).await.unwrap();
        let rules = store.rules();

        let coupon = CouponRule {
            code: "SAVE10".to_string(),
            rule: promo("SAVE10", 0, true),
            expires_at: None,
            per_code_limit: Some(1),
            global_limit: Some(100),
        };
        rules.replace_coupons(std::slice::from_ref(&coupon)).await.unwrap();

        let found = rules.coupon_by_code("SAVE10").await.unwrap().unwrap();
        assert_eq!(found.per_code_limit, Some(1));
        assert!(rules.coupon_by_code("TYPO").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_settings_last_known_good() {
        let store = LocalStore::new(StoreConfig::in_memory()).await.unwrap();
        let rules = store.rules();

        assert!(rules.settings().await.unwrap().is_none());

        let mut settings = Settings::default();
        settings.tax.default_rate_bps = 1_500;
        rules.save_settings(&settings).await.unwrap();

        settings.tax.default_rate_bps = 2_000;
        rules.save_settings(&settings).await.unwrap();

        let cached = rules.settings().await.unwrap().unwrap();
        assert_eq!(cached.tax.default_rate_bps, 2_000);
    }
}
