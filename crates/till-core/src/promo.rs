//! # Discount Evaluation Engine
//!
//! Pure evaluation of promotion and coupon rules against a cart snapshot.
//!
//! ## Evaluation Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │  Cart + Rules + StackingPolicy + Context                            │
//! │       │                                                             │
//! │       ▼                                                             │
//! │  Gate each rule ──► schedule window, channel, min subtotal,         │
//! │       │             first-purchase flag, coupon expiry              │
//! │       ▼                                                             │
//! │  Scope each rule ──► include filters OR'd, any exclude match vetoes │
//! │       │                                                             │
//! │       ▼                                                             │
//! │  Candidate amounts ──► percent / amount / threshold / BOGO          │
//! │       │                                                             │
//! │       ▼                                                             │
//! │  Policy selection ──► none / promos_only / coupons_only /           │
//! │       │               allow_both                                    │
//! │       ▼                                                             │
//! │  Manual discount appended post-selection, clamped                   │
//! │       │                                                             │
//! │       ▼                                                             │
//! │  Ordered AppliedDiscount[] + {subtotal, discounts, grand total}     │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Invalid or out-of-range inputs are clamped, never thrown: an oversized
//! percentage becomes 100%, a negative amount becomes zero, and an expired
//! coupon simply contributes nothing. Checkout is never blocked here.
//!
//! Coupon usage caps are deliberately NOT checked during evaluation; they are
//! enforced at redemption time by the server so a stale local cache cannot
//! produce false negatives.

use chrono::{DateTime, Datelike, Timelike, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::allocate::prorate;
use crate::money::{Money, RoundingStrategy, BPS_SCALE};
use crate::types::Cart;

// =============================================================================
// Rule Model
// =============================================================================

/// Whether a rule discounts the whole order or a subset of lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleLevel {
    Order,
    Line,
}

fn default_full_discount_bps() -> u32 {
    BPS_SCALE as u32
}

/// The discount mechanics of a rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RuleKind {
    /// Percentage off the eligible base, in basis points.
    Percent { bps: u32 },
    /// Fixed amount off, clamped to the eligible base.
    Amount { cents: i64 },
    /// Activates once the cart subtotal reaches `min_subtotal_cents`, then
    /// discounts the eligible base by `discount_bps`.
    Threshold { min_subtotal_cents: i64, discount_bps: u32 },
    /// Buy `buy`, get `get` discounted by `discount_bps` (default 100%).
    /// The cheapest eligible units are the discounted ones.
    Bogo {
        buy: u32,
        get: u32,
        #[serde(default = "default_full_discount_bps")]
        discount_bps: u32,
    },
}

/// Line and channel scoping for a rule.
///
/// Include filters are OR'd: a line is in scope when it matches any of them
/// (or when no include filter is set at all). Any exclude match vetoes the
/// line regardless of includes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleScope {
    #[serde(default)]
    pub include_skus: Vec<String>,
    #[serde(default)]
    pub include_categories: Vec<String>,
    #[serde(default)]
    pub include_brands: Vec<String>,
    #[serde(default)]
    pub exclude_skus: Vec<String>,
    #[serde(default)]
    pub exclude_categories: Vec<String>,
    #[serde(default)]
    pub exclude_brands: Vec<String>,
    /// Sales channels the rule applies to; empty = all channels.
    #[serde(default)]
    pub channels: Vec<String>,
}

impl RuleScope {
    pub fn allows_channel(&self, channel: &str) -> bool {
        self.channels.is_empty() || self.channels.iter().any(|c| c == channel)
    }

    pub fn matches_line(&self, line: &crate::types::CartLine) -> bool {
        if self.exclude_skus.iter().any(|s| s == &line.sku) {
            return false;
        }
        if let Some(cat) = &line.category {
            if self.exclude_categories.iter().any(|c| c == cat) {
                return false;
            }
        }
        if let Some(brand) = &line.brand {
            if self.exclude_brands.iter().any(|b| b == brand) {
                return false;
            }
        }

        let has_includes = !self.include_skus.is_empty()
            || !self.include_categories.is_empty()
            || !self.include_brands.is_empty();
        if !has_includes {
            return true;
        }

        self.include_skus.iter().any(|s| s == &line.sku)
            || line
                .category
                .as_ref()
                .map(|cat| self.include_categories.iter().any(|c| c == cat))
                .unwrap_or(false)
            || line
                .brand
                .as_ref()
                .map(|brand| self.include_brands.iter().any(|b| b == brand))
                .unwrap_or(false)
    }
}

/// Date, day-of-week, and time-of-day activation window.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schedule {
    #[serde(default)]
    pub starts_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub ends_at: Option<DateTime<Utc>>,
    /// ISO weekday numbers (1 = Monday … 7 = Sunday); empty = every day.
    #[serde(default)]
    pub days: Vec<u32>,
    /// Daily window start, minutes from midnight UTC.
    #[serde(default)]
    pub start_minute: Option<u32>,
    /// Daily window end, minutes from midnight UTC. A start greater than the
    /// end wraps over midnight.
    #[serde(default)]
    pub end_minute: Option<u32>,
}

impl Schedule {
    pub fn contains(&self, now: DateTime<Utc>) -> bool {
        if let Some(starts) = self.starts_at {
            if now < starts {
                return false;
            }
        }
        if let Some(ends) = self.ends_at {
            if now > ends {
                return false;
            }
        }
        if !self.days.is_empty() {
            let today = now.weekday().number_from_monday();
            if !self.days.contains(&today) {
                return false;
            }
        }
        if let (Some(start), Some(end)) = (self.start_minute, self.end_minute) {
            let minute = now.hour() * 60 + now.minute();
            let inside = if start <= end {
                minute >= start && minute <= end
            } else {
                minute >= start || minute <= end
            };
            if !inside {
                return false;
            }
        }
        true
    }
}

/// Additional gating constraints.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleConstraints {
    #[serde(default)]
    pub min_subtotal_cents: Option<i64>,
    /// Final clamp on the candidate amount.
    #[serde(default)]
    pub max_discount_cents: Option<i64>,
    #[serde(default)]
    pub first_purchase_only: bool,
}

/// An active promotion rule from the cached rule index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromotionRule {
    pub id: String,
    pub label: String,
    pub kind: RuleKind,
    pub level: RuleLevel,
    #[serde(default)]
    pub scope: RuleScope,
    #[serde(default)]
    pub constraints: RuleConstraints,
    #[serde(default)]
    pub schedule: Schedule,
    /// Lower number wins ties.
    #[serde(default)]
    pub priority: i32,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

/// A coupon: a promotion keyed by a unique code, with usage caps and an
/// expiry. Caps are enforced at redemption, not here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CouponRule {
    pub code: String,
    #[serde(flatten)]
    pub rule: PromotionRule,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub per_code_limit: Option<u32>,
    #[serde(default)]
    pub global_limit: Option<u32>,
}

// =============================================================================
// Evaluation Inputs
// =============================================================================

/// How many discounts (and from which sources) may combine on one cart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StackingPolicy {
    /// Single highest-amount candidate across all sources.
    #[default]
    None,
    PromosOnly,
    CouponsOnly,
    /// Best order-level candidate plus all line-level candidates.
    AllowBoth,
}

/// Context the rules are gated against.
#[derive(Debug, Clone)]
pub struct EvalContext {
    pub channel: String,
    pub now: DateTime<Utc>,
    pub first_purchase: bool,
    /// Policy cap on operator-entered percentage discounts (basis points).
    pub manual_discount_cap_bps: Option<u32>,
}

impl EvalContext {
    pub fn new(channel: impl Into<String>, now: DateTime<Utc>) -> Self {
        EvalContext {
            channel: channel.into(),
            now,
            first_purchase: false,
            manual_discount_cap_bps: None,
        }
    }
}

/// An operator-entered discount, appended after policy selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ManualDiscount {
    Percent { bps: u32 },
    Amount { cents: i64 },
}

// =============================================================================
// Evaluation Outputs
// =============================================================================

/// Where an applied discount came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscountSource {
    Promotion,
    Coupon,
    Manual,
}

/// Per-line share of a line-level discount.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineShare {
    pub sku: String,
    pub quantity: i64,
    pub discount_cents: i64,
}

/// The audit record of why a discount applied. Reproducible from the rule
/// set and the cart snapshot alone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppliedDiscount {
    /// Rule id, coupon code, or `"manual"`.
    pub id: String,
    pub source: DiscountSource,
    pub level: RuleLevel,
    pub label: String,
    pub amount_cents: i64,
    /// Populated for line-level discounts; empty for order-level ones, whose
    /// allocation across lines is the tax engine's pro-ration step.
    #[serde(default)]
    pub line_shares: Vec<LineShare>,
    pub trace_id: String,
}

/// The engine's result: the winning discount set and the cart-level totals.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscountOutcome {
    pub applied: Vec<AppliedDiscount>,
    pub subtotal_cents: i64,
    pub discount_cents: i64,
    pub grand_total_cents: i64,
}

// =============================================================================
// Candidate Computation
// =============================================================================

struct Candidate {
    id: String,
    label: String,
    source: DiscountSource,
    level: RuleLevel,
    amount: Money,
    line_shares: Vec<LineShare>,
    priority: i32,
}

use crate::validation::clamp_percent_bps as clamp_bps;

/// Computes a rule's candidate discount, or None when the rule is gated out
/// or produces nothing.
fn candidate(
    rule: &PromotionRule,
    source: DiscountSource,
    id: &str,
    cart: &Cart,
    ctx: &EvalContext,
) -> Option<Candidate> {
    if !rule.active || !rule.schedule.contains(ctx.now) || !rule.scope.allows_channel(&ctx.channel)
    {
        return None;
    }
    let subtotal = cart.subtotal();
    if let Some(min) = rule.constraints.min_subtotal_cents {
        if subtotal.cents() < min {
            return None;
        }
    }
    if rule.constraints.first_purchase_only && !ctx.first_purchase {
        return None;
    }

    let eligible: Vec<&crate::types::CartLine> =
        cart.lines.iter().filter(|l| rule.scope.matches_line(l)).collect();
    if eligible.is_empty() {
        return None;
    }
    let eligible_subtotal: Money = eligible.iter().map(|l| l.base()).sum();

    let (mut amount, mut shares) = match &rule.kind {
        RuleKind::Percent { bps } => percent_candidate(rule.level, clamp_bps(*bps), subtotal, &eligible),
        RuleKind::Amount { cents } => {
            amount_candidate(rule.level, Money::from_cents((*cents).max(0)), subtotal, eligible_subtotal, &eligible)
        }
        RuleKind::Threshold { min_subtotal_cents, discount_bps } => {
            if subtotal.cents() < *min_subtotal_cents {
                return None;
            }
            percent_candidate(rule.level, clamp_bps(*discount_bps), subtotal, &eligible)
        }
        RuleKind::Bogo { buy, get, discount_bps } => {
            bogo_candidate(*buy, *get, clamp_bps(*discount_bps), &eligible)?
        }
    };

    // Final clamp per candidate; line shares are re-spread when it bites.
    if let Some(max) = rule.constraints.max_discount_cents {
        let max = Money::from_cents(max.max(0));
        if amount > max {
            if !shares.is_empty() {
                let weights: Vec<i64> = shares.iter().map(|s| s.discount_cents).collect();
                let respread = prorate(max, &weights);
                for (share, spread) in shares.iter_mut().zip(respread) {
                    share.discount_cents = spread.cents();
                }
            }
            amount = max;
        }
    }

    if amount.cents() <= 0 {
        return None;
    }

    Some(Candidate {
        id: id.to_string(),
        label: rule.label.clone(),
        source,
        level: rule.level,
        amount,
        line_shares: shares,
        priority: rule.priority,
    })
}

fn percent_candidate(
    level: RuleLevel,
    bps: u32,
    subtotal: Money,
    eligible: &[&crate::types::CartLine],
) -> (Money, Vec<LineShare>) {
    match level {
        RuleLevel::Order => {
            let amount = subtotal.percent_bps(bps, RoundingStrategy::HalfUp).min(subtotal);
            (amount, Vec::new())
        }
        RuleLevel::Line => {
            let mut shares = Vec::with_capacity(eligible.len());
            let mut total = Money::zero();
            for line in eligible {
                let share = line.base().percent_bps(bps, RoundingStrategy::HalfUp).min(line.base());
                if !share.is_zero() {
                    shares.push(LineShare {
                        sku: line.sku.clone(),
                        quantity: line.quantity,
                        discount_cents: share.cents(),
                    });
                    total += share;
                }
            }
            (total, shares)
        }
    }
}

fn amount_candidate(
    level: RuleLevel,
    cents: Money,
    subtotal: Money,
    eligible_subtotal: Money,
    eligible: &[&crate::types::CartLine],
) -> (Money, Vec<LineShare>) {
    match level {
        RuleLevel::Order => (cents.min(subtotal), Vec::new()),
        RuleLevel::Line => {
            let amount = cents.min(eligible_subtotal);
            let weights: Vec<i64> = eligible.iter().map(|l| l.base().cents()).collect();
            let spread = prorate(amount, &weights);
            let shares = eligible
                .iter()
                .zip(spread)
                .filter(|(_, s)| !s.is_zero())
                .map(|(line, s)| LineShare {
                    sku: line.sku.clone(),
                    quantity: line.quantity,
                    discount_cents: s.cents(),
                })
                .collect();
            (amount, shares)
        }
    }
}

/// Expands eligible lines into unit-quantity items, forms complete
/// `buy + get` groups, and discounts exactly the cheapest `get`-count units.
fn bogo_candidate(
    buy: u32,
    get: u32,
    discount_bps: u32,
    eligible: &[&crate::types::CartLine],
) -> Option<(Money, Vec<LineShare>)> {
    let group_size = (buy + get) as usize;
    if group_size == 0 || get == 0 {
        return None;
    }

    // (unit price, sku) expansion, cheapest first; price ties break on
    // expansion order for determinism.
    let mut units: Vec<(i64, &str)> = Vec::new();
    for line in eligible {
        for _ in 0..line.quantity {
            units.push((line.unit_price_cents, line.sku.as_str()));
        }
    }
    let groups = units.len() / group_size;
    if groups == 0 {
        return None;
    }
    units.sort_by(|a, b| a.0.cmp(&b.0));

    let discounted_count = groups * get as usize;
    let mut per_sku: Vec<LineShare> = Vec::new();
    let mut total = Money::zero();
    for (price, sku) in units.iter().take(discounted_count) {
        let unit_discount =
            Money::from_cents(*price).percent_bps(discount_bps, RoundingStrategy::HalfUp);
        total += unit_discount;
        match per_sku.iter_mut().find(|s| s.sku == *sku) {
            Some(share) => {
                share.quantity += 1;
                share.discount_cents += unit_discount.cents();
            }
            None => per_sku.push(LineShare {
                sku: (*sku).to_string(),
                quantity: 1,
                discount_cents: unit_discount.cents(),
            }),
        }
    }

    Some((total, per_sku))
}

// =============================================================================
// Policy Selection & Evaluation
// =============================================================================

/// Evaluates the active rules against a cart and returns the winning
/// discount set plus totals.
///
/// Ordering: promotions are considered in ascending `priority` (stable on
/// input order); the coupon, if any, is considered last. Under every policy
/// the result is deterministic for a given input.
pub fn evaluate(
    cart: &Cart,
    promotions: &[PromotionRule],
    coupon: Option<&CouponRule>,
    policy: StackingPolicy,
    manual: Option<&ManualDiscount>,
    ctx: &EvalContext,
) -> DiscountOutcome {
    let subtotal = cart.subtotal();

    let mut ordered: Vec<&PromotionRule> = promotions.iter().collect();
    ordered.sort_by_key(|r| r.priority);

    let mut pool: Vec<Candidate> = ordered
        .iter()
        .filter_map(|rule| candidate(rule, DiscountSource::Promotion, &rule.id, cart, ctx))
        .collect();

    if let Some(coupon) = coupon {
        let expired = coupon.expires_at.map(|at| ctx.now > at).unwrap_or(false);
        if !expired {
            if let Some(c) = candidate(&coupon.rule, DiscountSource::Coupon, &coupon.code, cart, ctx)
            {
                pool.push(c);
            }
        }
    }

    let selected: Vec<Candidate> = match policy {
        StackingPolicy::None => best(pool).into_iter().collect(),
        StackingPolicy::PromosOnly => {
            pool.retain(|c| c.source == DiscountSource::Promotion);
            best(pool).into_iter().collect()
        }
        StackingPolicy::CouponsOnly => {
            pool.retain(|c| c.source == DiscountSource::Coupon);
            best(pool).into_iter().collect()
        }
        StackingPolicy::AllowBoth => {
            let (order_level, line_level): (Vec<_>, Vec<_>) =
                pool.into_iter().partition(|c| c.level == RuleLevel::Order);
            let mut picked: Vec<Candidate> = best(order_level).into_iter().collect();
            picked.extend(line_level);
            picked
        }
    };

    // Walk the selection in order, clamping so the running total never
    // exceeds the subtotal.
    let mut applied: Vec<AppliedDiscount> = Vec::with_capacity(selected.len() + 1);
    let mut remaining = subtotal;
    for c in selected {
        let amount = c.amount.min(remaining);
        if amount.cents() <= 0 {
            continue;
        }
        remaining -= amount;
        applied.push(AppliedDiscount {
            id: c.id,
            source: c.source,
            level: c.level,
            label: c.label,
            amount_cents: amount.cents(),
            line_shares: c.line_shares,
            trace_id: Uuid::new_v4().to_string(),
        });
    }

    if let Some(manual) = manual {
        let amount = manual_amount(manual, subtotal, ctx).min(remaining);
        if amount.cents() > 0 {
            remaining -= amount;
            applied.push(AppliedDiscount {
                id: "manual".to_string(),
                source: DiscountSource::Manual,
                level: RuleLevel::Order,
                label: "Manual discount".to_string(),
                amount_cents: amount.cents(),
                line_shares: Vec::new(),
                trace_id: Uuid::new_v4().to_string(),
            });
        }
    }

    let discount_total = subtotal - remaining;
    DiscountOutcome {
        applied,
        subtotal_cents: subtotal.cents(),
        discount_cents: discount_total.cents(),
        grand_total_cents: remaining.cents(),
    }
}

/// Highest amount wins; ties go to the lower priority number, then to the
/// earlier candidate.
fn best(pool: Vec<Candidate>) -> Option<Candidate> {
    pool.into_iter().reduce(|best, c| {
        if c.amount > best.amount || (c.amount == best.amount && c.priority < best.priority) {
            c
        } else {
            best
        }
    })
}

fn manual_amount(manual: &ManualDiscount, subtotal: Money, ctx: &EvalContext) -> Money {
    match manual {
        ManualDiscount::Percent { bps } => {
            let cap = ctx.manual_discount_cap_bps.unwrap_or(BPS_SCALE as u32);
            let bps = clamp_bps(*bps).min(cap);
            subtotal.percent_bps(bps, RoundingStrategy::HalfUp)
        }
        ManualDiscount::Amount { cents } => Money::from_cents((*cents).max(0)).min(subtotal),
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::CartLine;
    use chrono::TimeZone;

    fn ctx() -> EvalContext {
        EvalContext::new("in_store", Utc.with_ymd_and_hms(2026, 3, 2, 12, 0, 0).unwrap())
    }

    fn percent_order(id: &str, bps: u32) -> PromotionRule {
        PromotionRule {
            id: id.to_string(),
            label: format!("{bps} bps off order"),
            kind: RuleKind::Percent { bps },
            level: RuleLevel::Order,
            scope: RuleScope::default(),
            constraints: RuleConstraints::default(),
            schedule: Schedule::default(),
            priority: 0,
            active: true,
        }
    }

    fn cart_100() -> Cart {
        Cart::new(vec![CartLine::new("A", 1, 10_000)])
    }

    #[test]
    fn test_single_order_percent() {
        // Subtotal 100.00, one 10% order promotion → 10.00 off, 90.00 due.
        let outcome = evaluate(
            &cart_100(),
            &[percent_order("p1", 1000)],
            None,
            StackingPolicy::AllowBoth,
            None,
            &ctx(),
        );
        assert_eq!(outcome.subtotal_cents, 10_000);
        assert_eq!(outcome.discount_cents, 1_000);
        assert_eq!(outcome.grand_total_cents, 9_000);
        assert_eq!(outcome.applied.len(), 1);
        assert_eq!(outcome.applied[0].source, DiscountSource::Promotion);
    }

    #[test]
    fn test_stacking_none_keeps_single_max() {
        let outcome = evaluate(
            &cart_100(),
            &[percent_order("small", 500), percent_order("big", 2000)],
            None,
            StackingPolicy::None,
            None,
            &ctx(),
        );
        assert_eq!(outcome.applied.len(), 1);
        assert_eq!(outcome.applied[0].id, "big");
        assert_eq!(outcome.discount_cents, 2_000);
    }

    #[test]
    fn test_stacking_none_tie_breaks_on_priority() {
        let mut low_priority = percent_order("low", 1000);
        low_priority.priority = 5;
        let mut high_priority = percent_order("high", 1000);
        high_priority.priority = 1;
        let outcome = evaluate(
            &cart_100(),
            &[low_priority, high_priority],
            None,
            StackingPolicy::None,
            None,
            &ctx(),
        );
        assert_eq!(outcome.applied[0].id, "high");
    }

    #[test]
    fn test_allow_both_keeps_order_winner_and_all_line_candidates() {
        let order = percent_order("order", 1000);
        let line = PromotionRule {
            id: "line".to_string(),
            label: "line deal".to_string(),
            kind: RuleKind::Percent { bps: 500 },
            level: RuleLevel::Line,
            scope: RuleScope { include_skus: vec!["B".into()], ..RuleScope::default() },
            constraints: RuleConstraints::default(),
            schedule: Schedule::default(),
            priority: 0,
            active: true,
        };
        let cart = Cart::new(vec![CartLine::new("A", 1, 10_000), CartLine::new("B", 2, 2_000)]);
        let outcome =
            evaluate(&cart, &[order, line], None, StackingPolicy::AllowBoth, None, &ctx());
        assert_eq!(outcome.applied.len(), 2);
        // Order-level 10% of 14 000 = 1 400; line-level 5% of 4 000 = 200.
        assert_eq!(outcome.discount_cents, 1_600);
    }

    #[test]
    fn test_coupon_only_policy_ignores_promotions() {
        let coupon = CouponRule {
            code: "SAVE5".to_string(),
            rule: percent_order("SAVE5", 500),
            expires_at: None,
            per_code_limit: Some(1),
            global_limit: None,
        };
        let outcome = evaluate(
            &cart_100(),
            &[percent_order("promo", 2000)],
            Some(&coupon),
            StackingPolicy::CouponsOnly,
            None,
            &ctx(),
        );
        assert_eq!(outcome.applied.len(), 1);
        assert_eq!(outcome.applied[0].source, DiscountSource::Coupon);
        assert_eq!(outcome.discount_cents, 500);
    }

    #[test]
    fn test_expired_coupon_contributes_nothing() {
        let coupon = CouponRule {
            code: "OLD".to_string(),
            rule: percent_order("OLD", 500),
            expires_at: Some(Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap()),
            per_code_limit: None,
            global_limit: None,
        };
        let outcome =
            evaluate(&cart_100(), &[], Some(&coupon), StackingPolicy::AllowBoth, None, &ctx());
        assert!(outcome.applied.is_empty());
        assert_eq!(outcome.grand_total_cents, 10_000);
    }

    #[test]
    fn test_bogo_discounts_cheapest_units() {
        // Buy 1 get 1 free on 3 units at 20.00: one complete group, one free
        // unit worth 20.00.
        let rule = PromotionRule {
            id: "bogo".to_string(),
            label: "buy one get one".to_string(),
            kind: RuleKind::Bogo { buy: 1, get: 1, discount_bps: 10_000 },
            level: RuleLevel::Line,
            scope: RuleScope::default(),
            constraints: RuleConstraints::default(),
            schedule: Schedule::default(),
            priority: 0,
            active: true,
        };
        let cart = Cart::new(vec![CartLine::new("TEE", 3, 2_000)]);
        let outcome = evaluate(&cart, &[rule], None, StackingPolicy::AllowBoth, None, &ctx());
        assert_eq!(outcome.discount_cents, 2_000);
        assert_eq!(outcome.applied[0].line_shares.len(), 1);
        assert_eq!(outcome.applied[0].line_shares[0].quantity, 1);
    }

    #[test]
    fn test_bogo_picks_cheapest_across_skus() {
        let rule = PromotionRule {
            id: "bogo".to_string(),
            label: "buy 2 get 1 half".to_string(),
            kind: RuleKind::Bogo { buy: 2, get: 1, discount_bps: 5_000 },
            level: RuleLevel::Line,
            scope: RuleScope::default(),
            constraints: RuleConstraints::default(),
            schedule: Schedule::default(),
            priority: 0,
            active: true,
        };
        let cart = Cart::new(vec![
            CartLine::new("EXPENSIVE", 2, 3_000),
            CartLine::new("CHEAP", 1, 1_000),
        ]);
        // 3 units, one group of 3, one discounted unit: the cheap one at 50%.
        let outcome = evaluate(&cart, &[rule], None, StackingPolicy::AllowBoth, None, &ctx());
        assert_eq!(outcome.discount_cents, 500);
        assert_eq!(outcome.applied[0].line_shares[0].sku, "CHEAP");
    }

    #[test]
    fn test_threshold_gates_on_subtotal() {
        let rule = PromotionRule {
            id: "spend50".to_string(),
            label: "spend 50 save 10%".to_string(),
            kind: RuleKind::Threshold { min_subtotal_cents: 5_000, discount_bps: 1_000 },
            level: RuleLevel::Order,
            scope: RuleScope::default(),
            constraints: RuleConstraints::default(),
            schedule: Schedule::default(),
            priority: 0,
            active: true,
        };
        let below = Cart::new(vec![CartLine::new("A", 1, 4_999)]);
        let outcome = evaluate(&below, std::slice::from_ref(&rule), None, StackingPolicy::None, None, &ctx());
        assert!(outcome.applied.is_empty());

        let outcome = evaluate(&cart_100(), &[rule], None, StackingPolicy::None, None, &ctx());
        assert_eq!(outcome.discount_cents, 1_000);
    }

    #[test]
    fn test_max_discount_clamps_candidate() {
        let mut rule = percent_order("cap", 5_000);
        rule.constraints.max_discount_cents = Some(1_500);
        let outcome = evaluate(&cart_100(), &[rule], None, StackingPolicy::None, None, &ctx());
        assert_eq!(outcome.discount_cents, 1_500);
    }

    #[test]
    fn test_exclude_vetoes_included_line() {
        let rule = PromotionRule {
            id: "shoes".to_string(),
            label: "shoes deal".to_string(),
            kind: RuleKind::Percent { bps: 1_000 },
            level: RuleLevel::Line,
            scope: RuleScope {
                include_categories: vec!["shoes".into()],
                exclude_brands: vec!["LuxBrand".into()],
                ..RuleScope::default()
            },
            constraints: RuleConstraints::default(),
            schedule: Schedule::default(),
            priority: 0,
            active: true,
        };
        let mut lux = CartLine::new("LUX-1", 1, 50_000);
        lux.category = Some("shoes".into());
        lux.brand = Some("LuxBrand".into());
        let mut plain = CartLine::new("PLAIN-1", 1, 5_000);
        plain.category = Some("shoes".into());
        let cart = Cart::new(vec![lux, plain]);
        let outcome = evaluate(&cart, &[rule], None, StackingPolicy::AllowBoth, None, &ctx());
        // Only the non-excluded line participates: 10% of 5 000.
        assert_eq!(outcome.discount_cents, 500);
    }

    #[test]
    fn test_schedule_window_gates_rule() {
        let mut rule = percent_order("lunch", 1_000);
        rule.schedule.start_minute = Some(11 * 60);
        rule.schedule.end_minute = Some(14 * 60);
        // ctx() is at 12:00 UTC — inside.
        let outcome = evaluate(&cart_100(), std::slice::from_ref(&rule), None, StackingPolicy::None, None, &ctx());
        assert_eq!(outcome.discount_cents, 1_000);

        let evening =
            EvalContext::new("in_store", Utc.with_ymd_and_hms(2026, 3, 2, 20, 0, 0).unwrap());
        let outcome = evaluate(&cart_100(), &[rule], None, StackingPolicy::None, None, &evening);
        assert!(outcome.applied.is_empty());
    }

    #[test]
    fn test_manual_discount_appended_and_clamped() {
        // 150% manual percent clamps to 100%; combined with a promotion the
        // total can never exceed the subtotal.
        let outcome = evaluate(
            &cart_100(),
            &[percent_order("p", 1_000)],
            None,
            StackingPolicy::AllowBoth,
            Some(&ManualDiscount::Percent { bps: 15_000 }),
            &ctx(),
        );
        assert_eq!(outcome.discount_cents, 10_000);
        assert_eq!(outcome.grand_total_cents, 0);
        assert_eq!(outcome.applied.last().unwrap().source, DiscountSource::Manual);
    }

    #[test]
    fn test_manual_fixed_clamped_to_subtotal() {
        let outcome = evaluate(
            &cart_100(),
            &[],
            None,
            StackingPolicy::AllowBoth,
            Some(&ManualDiscount::Amount { cents: 999_999 }),
            &ctx(),
        );
        assert_eq!(outcome.discount_cents, 10_000);
        assert_eq!(outcome.grand_total_cents, 0);
    }

    #[test]
    fn test_manual_percent_respects_policy_cap() {
        let mut context = ctx();
        context.manual_discount_cap_bps = Some(2_000);
        let outcome = evaluate(
            &cart_100(),
            &[],
            None,
            StackingPolicy::AllowBoth,
            Some(&ManualDiscount::Percent { bps: 5_000 }),
            &context,
        );
        assert_eq!(outcome.discount_cents, 2_000);
    }

    #[test]
    fn test_grand_total_never_negative() {
        for bps in [0u32, 1, 9_999, 10_000, 60_000] {
            let outcome = evaluate(
                &cart_100(),
                &[percent_order("p", bps)],
                None,
                StackingPolicy::None,
                None,
                &ctx(),
            );
            assert!(outcome.grand_total_cents >= 0, "bps {bps}");
            assert!(outcome.discount_cents <= outcome.subtotal_cents);
        }
    }

    #[test]
    fn test_min_subtotal_constraint() {
        let mut rule = percent_order("big-spender", 1_000);
        rule.constraints.min_subtotal_cents = Some(20_000);
        let outcome = evaluate(&cart_100(), &[rule], None, StackingPolicy::None, None, &ctx());
        assert!(outcome.applied.is_empty());
    }
}
