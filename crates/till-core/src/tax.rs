//! # Tax Computation Engine
//!
//! Pure computation of per-line and receipt totals from a cart snapshot, the
//! winning discount set, and the tax configuration.
//!
//! ## Computation Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │  Lines + AppliedDiscounts + TaxConfig + PaymentMethod               │
//! │       │                                                             │
//! │       ▼                                                             │
//! │  Pro-rate order-level discounts across lines (largest remainder)    │
//! │       │                                                             │
//! │       ▼                                                             │
//! │  Resolve each line's rate:                                          │
//! │    taxExempt → exempt                                               │
//! │    zeroRated → 0%                                                   │
//! │    first matching rule (sku, then category, then brand) → rule      │
//! │    otherwise → default rate                                         │
//! │       │                                                             │
//! │       ▼                                                             │
//! │  Per-line tax in micro-cents (full precision)                       │
//! │       │                                                             │
//! │       ├── receiptRounding = none: round each line individually      │
//! │       │                                                             │
//! │       └── receiptRounding set: round the receipt-level sum once,    │
//! │           assign the delta to the line with the largest fractional  │
//! │           remainder so line taxes always sum to the displayed total │
//! │       │                                                             │
//! │       ▼                                                             │
//! │  Cash rounding of the grand total (separate ledger adjustment)      │
//! │       │                                                             │
//! │       ▼                                                             │
//! │  Totals + per-line breakdown + taxByRate summary                    │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```

use serde::{Deserialize, Serialize};

use crate::allocate::prorate;
use crate::money::{round_micros, Money, RoundingStrategy, BPS_SCALE, MICROS_PER_CENT};
use crate::promo::{AppliedDiscount, RuleLevel};
use crate::types::{CartLine, PaymentMethod};

// =============================================================================
// Configuration
// =============================================================================

/// Whether listed prices already contain tax.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriceMode {
    /// Price + tax shown separately.
    #[default]
    TaxExclusive,
    /// Price includes tax; the net is backed out.
    TaxInclusive,
}

/// Where rounding is applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReceiptRounding {
    /// Round each line individually.
    #[default]
    None,
    /// Keep lines at full precision, round the receipt-level sums half-up.
    HalfUp,
    /// Keep lines at full precision, round the receipt-level sums to even.
    Bankers,
}

impl ReceiptRounding {
    fn strategy(&self) -> Option<RoundingStrategy> {
        match self {
            ReceiptRounding::None => None,
            ReceiptRounding::HalfUp => Some(RoundingStrategy::HalfUp),
            ReceiptRounding::Bankers => Some(RoundingStrategy::Bankers),
        }
    }
}

/// Rounding of the payable amount to a physical cash increment. Applied only
/// when the chosen payment method is cash, and tracked as its own ledger
/// adjustment, never folded into tax or discount figures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CashRounding {
    pub enabled: bool,
    /// e.g. 5 for rounding to the nearest 0.05.
    pub increment_cents: i64,
}

/// Currency descriptor from the settings source. Amounts everywhere are
/// integer minor units, so `exponent` fixes the precision of the whole
/// computation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrencyConfig {
    pub code: String,
    pub exponent: u8,
}

impl Default for CurrencyConfig {
    fn default() -> Self {
        CurrencyConfig { code: "USD".to_string(), exponent: 2 }
    }
}

/// What a matched tax rule does to a line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TaxTreatment {
    Rate { bps: u32 },
    ZeroRated,
    Exempt,
}

/// Line matching for a tax rule; checked by sku, then category, then brand.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaxScope {
    #[serde(default)]
    pub skus: Vec<String>,
    #[serde(default)]
    pub categories: Vec<String>,
    #[serde(default)]
    pub brands: Vec<String>,
}

impl TaxScope {
    fn matches(&self, line: &CartLine) -> bool {
        if self.skus.iter().any(|s| s == &line.sku) {
            return true;
        }
        if let Some(cat) = &line.category {
            if self.categories.iter().any(|c| c == cat) {
                return true;
            }
        }
        if let Some(brand) = &line.brand {
            if self.brands.iter().any(|b| b == brand) {
                return true;
            }
        }
        false
    }
}

/// One configured tax rule. Rules are scanned in order; the first whose
/// scope matches a line wins.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaxRule {
    pub scope: TaxScope,
    pub treatment: TaxTreatment,
}

/// The tax configuration from the settings source.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaxConfig {
    #[serde(default)]
    pub price_mode: PriceMode,
    #[serde(default)]
    pub default_rate_bps: u32,
    #[serde(default)]
    pub rules: Vec<TaxRule>,
    #[serde(default)]
    pub rounding: RoundingStrategy,
    #[serde(default)]
    pub receipt_rounding: ReceiptRounding,
    #[serde(default)]
    pub cash_rounding: Option<CashRounding>,
}

// =============================================================================
// Output Types
// =============================================================================

/// Per-line tax breakdown.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineTax {
    pub sku: String,
    pub quantity: i64,
    /// Effective rate; 0 for exempt and zero-rated lines.
    pub rate_bps: u32,
    pub exempt: bool,
    pub discount_cents: i64,
    pub net_cents: i64,
    pub tax_cents: i64,
    pub gross_cents: i64,
}

/// Taxable base and tax grouped by effective rate, for fiscal reporting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateSummary {
    pub rate_bps: u32,
    pub taxable_cents: i64,
    pub tax_cents: i64,
}

/// Receipt-level totals. Derived, never stored independently of the line
/// data that produced them.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Totals {
    pub subtotal_excl_tax_cents: i64,
    pub discount_cents: i64,
    pub tax_cents: i64,
    /// Signed cash-rounding adjustment; 0 when not applied.
    #[serde(default)]
    pub rounding_adj_cents: i64,
    pub grand_total_cents: i64,
    pub price_mode: PriceMode,
    pub tax_by_rate: Vec<RateSummary>,
}

/// The engine's full result: totals plus the per-line breakdown.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaxBreakdown {
    pub lines: Vec<LineTax>,
    pub totals: Totals,
}

// =============================================================================
// Computation
// =============================================================================

struct LineWork {
    rate_bps: u32,
    exempt: bool,
    discount: i64,
    /// Tax-exclusive: the net. Tax-inclusive: the gross.
    taxable: i64,
    tax_micros: i128,
}

/// Computes per-line and receipt totals for a discounted cart.
///
/// `discounts` is the engine's winning set: line-level shares attach to
/// their lines directly, order-level (and manual) amounts are pro-rated
/// across lines in proportion to each line's base.
pub fn compute(
    lines: &[CartLine],
    discounts: &[AppliedDiscount],
    config: &TaxConfig,
    method: PaymentMethod,
) -> TaxBreakdown {
    let bases: Vec<i64> = lines.iter().map(|l| l.base().cents()).collect();

    // Line-level shares, keyed to the first line with the matching sku.
    let mut line_discounts = vec![0i64; lines.len()];
    let mut order_total = Money::zero();
    for discount in discounts {
        match discount.level {
            RuleLevel::Order => order_total += Money::from_cents(discount.amount_cents),
            RuleLevel::Line => {
                for share in &discount.line_shares {
                    if let Some(idx) = lines.iter().position(|l| l.sku == share.sku) {
                        line_discounts[idx] += share.discount_cents;
                    }
                }
            }
        }
    }

    // The named pro-ration step: order-level discount spread by share of
    // base, exact to the cent.
    let order_shares = prorate(order_total, &bases);
    for (idx, share) in order_shares.iter().enumerate() {
        line_discounts[idx] += share.cents();
    }

    let mut work: Vec<LineWork> = Vec::with_capacity(lines.len());
    for (idx, line) in lines.iter().enumerate() {
        let (rate_bps, exempt) = resolve_rate(line, config);
        let discount = line_discounts[idx].min(bases[idx]).max(0);
        let taxable = (bases[idx] - discount).max(0);
        let tax_micros = match config.price_mode {
            // net × rate, exact in micro-cents: ×bps×1e6/1e4 = ×bps×100.
            PriceMode::TaxExclusive => taxable as i128 * rate_bps as i128 * 100,
            // Back the net out of the gross: tax = gross − gross/(1+rate).
            PriceMode::TaxInclusive => {
                let gross_micros = taxable as i128 * MICROS_PER_CENT;
                let net_micros = gross_micros * BPS_SCALE / (BPS_SCALE + rate_bps as i128);
                gross_micros - net_micros
            }
        };
        work.push(LineWork { rate_bps, exempt, discount, taxable, tax_micros });
    }

    // Resolve per-line tax cents under the configured regime.
    let mut line_tax: Vec<i64> =
        work.iter().map(|w| round_micros(w.tax_micros, config.rounding)).collect();

    if let Some(receipt_strategy) = config.receipt_rounding.strategy() {
        let raw_total: i128 = work.iter().map(|w| w.tax_micros).sum();
        let receipt_tax = round_micros(raw_total, receipt_strategy);
        let delta = receipt_tax - line_tax.iter().sum::<i64>();
        if delta != 0 && !work.is_empty() {
            // The whole delta lands on the single line with the largest
            // fractional remainder, keeping line taxes summing to the
            // displayed total.
            let idx = work
                .iter()
                .enumerate()
                .max_by(|(ai, a), (bi, b)| {
                    (a.tax_micros % MICROS_PER_CENT)
                        .cmp(&(b.tax_micros % MICROS_PER_CENT))
                        .then(bi.cmp(ai))
                })
                // max_by keeps the later of equal elements; the reversed
                // index tie-break above pins it to the first line instead.
                .map(|(idx, _)| idx)
                .unwrap_or(0);
            line_tax[idx] += delta;
        }
    }

    // Assemble the per-line breakdown.
    let mut out_lines: Vec<LineTax> = Vec::with_capacity(lines.len());
    for ((line, w), tax) in lines.iter().zip(&work).zip(&line_tax) {
        let (net, gross) = match config.price_mode {
            PriceMode::TaxExclusive => (w.taxable, w.taxable + tax),
            PriceMode::TaxInclusive => (w.taxable - tax, w.taxable),
        };
        out_lines.push(LineTax {
            sku: line.sku.clone(),
            quantity: line.quantity,
            rate_bps: w.rate_bps,
            exempt: w.exempt,
            discount_cents: w.discount,
            net_cents: net,
            tax_cents: *tax,
            gross_cents: gross,
        });
    }

    let subtotal_excl: i64 = out_lines.iter().map(|l| l.net_cents).sum();
    let tax_total: i64 = out_lines.iter().map(|l| l.tax_cents).sum();
    let mut grand = Money::from_cents(out_lines.iter().map(|l| l.gross_cents).sum::<i64>())
        .clamp_non_negative();

    // Cash rounding happens last, on the already-computed grand total, and
    // is reported as its own adjustment.
    let mut rounding_adj = 0i64;
    if method == PaymentMethod::Cash {
        if let Some(cash) = &config.cash_rounding {
            if cash.enabled && cash.increment_cents > 1 {
                let rounded = grand.round_to_increment(cash.increment_cents);
                rounding_adj = (rounded - grand).cents();
                grand = rounded;
            }
        }
    }

    let totals = Totals {
        subtotal_excl_tax_cents: subtotal_excl,
        discount_cents: discounts.iter().map(|d| d.amount_cents).sum(),
        tax_cents: tax_total,
        rounding_adj_cents: rounding_adj,
        grand_total_cents: grand.cents(),
        price_mode: config.price_mode,
        tax_by_rate: summarize_by_rate(&out_lines),
    };

    TaxBreakdown { lines: out_lines, totals }
}

/// Resolves a line's effective rate: the line's own flags short-circuit,
/// then the first matching configured rule wins, then the default rate.
fn resolve_rate(line: &CartLine, config: &TaxConfig) -> (u32, bool) {
    if line.tax_exempt {
        return (0, true);
    }
    if line.zero_rated {
        return (0, false);
    }
    for rule in &config.rules {
        if rule.scope.matches(line) {
            return match rule.treatment {
                TaxTreatment::Exempt => (0, true),
                TaxTreatment::ZeroRated => (0, false),
                TaxTreatment::Rate { bps } => (bps, false),
            };
        }
    }
    (config.default_rate_bps, false)
}

/// Groups displayed taxable base and tax by effective rate, ascending.
fn summarize_by_rate(lines: &[LineTax]) -> Vec<RateSummary> {
    let mut summary: Vec<RateSummary> = Vec::new();
    for line in lines {
        match summary.iter_mut().find(|s| s.rate_bps == line.rate_bps) {
            Some(entry) => {
                entry.taxable_cents += line.net_cents;
                entry.tax_cents += line.tax_cents;
            }
            None => summary.push(RateSummary {
                rate_bps: line.rate_bps,
                taxable_cents: line.net_cents,
                tax_cents: line.tax_cents,
            }),
        }
    }
    summary.sort_by_key(|s| s.rate_bps);
    summary
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::promo::{DiscountSource, LineShare};

    fn exclusive_config(rate_bps: u32) -> TaxConfig {
        TaxConfig { default_rate_bps: rate_bps, ..TaxConfig::default() }
    }

    fn order_discount(cents: i64) -> AppliedDiscount {
        AppliedDiscount {
            id: "p1".into(),
            source: DiscountSource::Promotion,
            level: RuleLevel::Order,
            label: "order deal".into(),
            amount_cents: cents,
            line_shares: Vec::new(),
            trace_id: "trace".into(),
        }
    }

    #[test]
    fn test_exclusive_no_discount() {
        // 100.00 at 15% exclusive → net 100.00, tax 15.00, grand 115.00.
        let lines = [CartLine::new("A", 1, 10_000)];
        let result = compute(&lines, &[], &exclusive_config(1_500), PaymentMethod::Card);
        assert_eq!(result.totals.subtotal_excl_tax_cents, 10_000);
        assert_eq!(result.totals.tax_cents, 1_500);
        assert_eq!(result.totals.grand_total_cents, 11_500);
        assert_eq!(result.totals.rounding_adj_cents, 0);
    }

    #[test]
    fn test_inclusive_backs_out_net() {
        // Gross 115.00 at 15% inclusive → net 100.00, tax 15.00.
        let mut config = exclusive_config(1_500);
        config.price_mode = PriceMode::TaxInclusive;
        let lines = [CartLine::new("A", 1, 11_500)];
        let result = compute(&lines, &[], &config, PaymentMethod::Card);
        assert_eq!(result.totals.subtotal_excl_tax_cents, 10_000);
        assert_eq!(result.totals.tax_cents, 1_500);
        assert_eq!(result.totals.grand_total_cents, 11_500);
    }

    #[test]
    fn test_cash_rounding_aligned_total_no_adjustment() {
        let mut config = exclusive_config(1_500);
        config.cash_rounding = Some(CashRounding { enabled: true, increment_cents: 5 });
        let lines = [CartLine::new("A", 1, 10_000)];
        let result = compute(&lines, &[], &config, PaymentMethod::Cash);
        assert_eq!(result.totals.grand_total_cents, 11_500);
        assert_eq!(result.totals.rounding_adj_cents, 0);
    }

    #[test]
    fn test_cash_rounding_records_adjustment() {
        // Pre-rounding total 115.03 → 115.05, adjustment +0.02.
        let mut config = exclusive_config(0);
        config.cash_rounding = Some(CashRounding { enabled: true, increment_cents: 5 });
        let lines = [CartLine::new("A", 1, 11_503)];
        let result = compute(&lines, &[], &config, PaymentMethod::Cash);
        assert_eq!(result.totals.grand_total_cents, 11_505);
        assert_eq!(result.totals.rounding_adj_cents, 2);
    }

    #[test]
    fn test_cash_rounding_skipped_for_card() {
        let mut config = exclusive_config(0);
        config.cash_rounding = Some(CashRounding { enabled: true, increment_cents: 5 });
        let lines = [CartLine::new("A", 1, 11_503)];
        let result = compute(&lines, &[], &config, PaymentMethod::Card);
        assert_eq!(result.totals.grand_total_cents, 11_503);
        assert_eq!(result.totals.rounding_adj_cents, 0);
    }

    #[test]
    fn test_order_discount_prorated_before_tax() {
        // 10.00 order discount over bases 100.00 / 50.00 → 6.67 / 3.33.
        let lines = [CartLine::new("A", 1, 10_000), CartLine::new("B", 1, 5_000)];
        let result =
            compute(&lines, &[order_discount(1_000)], &exclusive_config(1_000), PaymentMethod::Card);
        assert_eq!(result.lines[0].discount_cents, 667);
        assert_eq!(result.lines[1].discount_cents, 333);
        assert_eq!(result.totals.subtotal_excl_tax_cents, 14_000);
        assert_eq!(result.totals.discount_cents, 1_000);
    }

    #[test]
    fn test_line_share_attaches_directly() {
        let discount = AppliedDiscount {
            id: "line".into(),
            source: DiscountSource::Promotion,
            level: RuleLevel::Line,
            label: "line deal".into(),
            amount_cents: 500,
            line_shares: vec![LineShare { sku: "B".into(), quantity: 1, discount_cents: 500 }],
            trace_id: "trace".into(),
        };
        let lines = [CartLine::new("A", 1, 10_000), CartLine::new("B", 1, 5_000)];
        let result = compute(&lines, &[discount], &exclusive_config(1_000), PaymentMethod::Card);
        assert_eq!(result.lines[0].discount_cents, 0);
        assert_eq!(result.lines[1].discount_cents, 500);
    }

    #[test]
    fn test_exempt_flag_short_circuits() {
        let mut line = CartLine::new("A", 1, 10_000);
        line.tax_exempt = true;
        let result = compute(&[line], &[], &exclusive_config(1_500), PaymentMethod::Card);
        assert_eq!(result.totals.tax_cents, 0);
        assert!(result.lines[0].exempt);
        assert_eq!(result.lines[0].rate_bps, 0);
    }

    #[test]
    fn test_rule_scope_first_match_wins() {
        let mut config = exclusive_config(1_500);
        config.rules = vec![
            TaxRule {
                scope: TaxScope { skus: vec!["MILK".into()], ..TaxScope::default() },
                treatment: TaxTreatment::ZeroRated,
            },
            TaxRule {
                scope: TaxScope { categories: vec!["grocery".into()], ..TaxScope::default() },
                treatment: TaxTreatment::Rate { bps: 500 },
            },
        ];
        let mut milk = CartLine::new("MILK", 1, 300);
        milk.category = Some("grocery".into());
        let mut bread = CartLine::new("BREAD", 1, 400);
        bread.category = Some("grocery".into());
        let result = compute(&[milk, bread], &[], &config, PaymentMethod::Card);
        assert_eq!(result.lines[0].rate_bps, 0);
        assert_eq!(result.lines[0].tax_cents, 0);
        assert_eq!(result.lines[1].rate_bps, 500);
        assert_eq!(result.lines[1].tax_cents, 20);
    }

    #[test]
    fn test_receipt_rounding_assigns_delta_to_largest_remainder() {
        // Three lines of 10.10 at 5%: each raw tax 50.5¢. Per-line rounding
        // gives 51+51+51 = 153; the receipt-level sum 151.5 rounds to 152.
        // The −1 delta lands on a single line and the sums still agree.
        let mut config = exclusive_config(500);
        config.receipt_rounding = ReceiptRounding::HalfUp;
        let lines =
            [CartLine::new("A", 1, 1_010), CartLine::new("B", 1, 1_010), CartLine::new("C", 1, 1_010)];
        let result = compute(&lines, &[], &config, PaymentMethod::Card);
        assert_eq!(result.totals.tax_cents, 152);
        let line_sum: i64 = result.lines.iter().map(|l| l.tax_cents).sum();
        assert_eq!(line_sum, result.totals.tax_cents);
        // Exactly one line absorbed the delta.
        let taxes: Vec<i64> = result.lines.iter().map(|l| l.tax_cents).collect();
        assert_eq!(taxes.iter().filter(|&&t| t == 50).count(), 1);
        assert_eq!(taxes.iter().filter(|&&t| t == 51).count(), 2);
    }

    #[test]
    fn test_per_line_regime_rounds_independently() {
        let mut config = exclusive_config(500);
        config.receipt_rounding = ReceiptRounding::None;
        let lines =
            [CartLine::new("A", 1, 1_010), CartLine::new("B", 1, 1_010), CartLine::new("C", 1, 1_010)];
        let result = compute(&lines, &[], &config, PaymentMethod::Card);
        assert_eq!(result.totals.tax_cents, 153);
    }

    #[test]
    fn test_bankers_receipt_rounding() {
        // Raw total 151.5 rounds to 152 under half-up but to even 152 as
        // well; use 50.5 on a single line to see the difference: half-up
        // gives 51, bankers gives 50.
        let mut config = exclusive_config(500);
        config.rounding = RoundingStrategy::Bankers;
        let lines = [CartLine::new("A", 1, 1_010)];
        let result = compute(&lines, &[], &config, PaymentMethod::Card);
        assert_eq!(result.totals.tax_cents, 50);
    }

    #[test]
    fn test_tax_by_rate_round_trip() {
        let mut config = exclusive_config(1_500);
        config.rules = vec![TaxRule {
            scope: TaxScope { categories: vec!["food".into()], ..TaxScope::default() },
            treatment: TaxTreatment::Rate { bps: 500 },
        }];
        let mut food = CartLine::new("APPLE", 3, 250);
        food.category = Some("food".into());
        let mut exempt = CartLine::new("GIFTCARD", 1, 5_000);
        exempt.tax_exempt = true;
        let lines = [CartLine::new("TV", 1, 49_999), food, exempt];
        let result = compute(&lines, &[order_discount(1_234)], &config, PaymentMethod::Card);

        let taxable_sum: i64 = result.totals.tax_by_rate.iter().map(|s| s.taxable_cents).sum();
        let tax_sum: i64 = result.totals.tax_by_rate.iter().map(|s| s.tax_cents).sum();
        assert_eq!(taxable_sum, result.totals.subtotal_excl_tax_cents);
        assert_eq!(tax_sum, result.totals.tax_cents);

        // Ascending by rate.
        let rates: Vec<u32> = result.totals.tax_by_rate.iter().map(|s| s.rate_bps).collect();
        let mut sorted = rates.clone();
        sorted.sort_unstable();
        assert_eq!(rates, sorted);
    }

    #[test]
    fn test_discount_beyond_base_is_clamped_per_line() {
        let discount = AppliedDiscount {
            id: "line".into(),
            source: DiscountSource::Promotion,
            level: RuleLevel::Line,
            label: "oversized".into(),
            amount_cents: 9_000,
            line_shares: vec![LineShare { sku: "A".into(), quantity: 1, discount_cents: 9_000 }],
            trace_id: "trace".into(),
        };
        let lines = [CartLine::new("A", 1, 5_000)];
        let result = compute(&lines, &[discount], &exclusive_config(1_000), PaymentMethod::Card);
        assert_eq!(result.lines[0].net_cents, 0);
        assert!(result.totals.grand_total_cents >= 0);
    }
}
