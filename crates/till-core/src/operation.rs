//! # Outbox Operations
//!
//! The closed set of operation kinds that can be queued for replication.
//! Each variant is one server endpoint contract; adding a kind means adding
//! a variant and a gateway method, which the compiler enforces at every
//! dispatch site.
//!
//! ## Identity Resolution
//! Payloads reference sibling local entities through [`SaleRef`], which is
//! either a still-local identifier or an already-known server identifier.
//! An operation is sendable only once every `Local` reference can be
//! resolved through the sync log; until then the processor skips it without
//! counting a retry.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::promo::AppliedDiscount;
use crate::tax::Totals;
use crate::types::{CartLine, Settlement};

// =============================================================================
// References
// =============================================================================

/// A reference to a sale that may not have a server identity yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "ref", content = "id", rename_all = "snake_case")]
pub enum SaleRef {
    /// Identified by a local id; must be resolved before sending.
    Local(String),
    /// Identified by a server-assigned id.
    Server(String),
}

impl SaleRef {
    /// The sync-log key this reference depends on, if still local.
    fn dependency(&self) -> Option<String> {
        match self {
            SaleRef::Local(id) => Some(format!("sale:{id}")),
            SaleRef::Server(_) => None,
        }
    }

    /// Swaps a local reference for its server identity when the mapping is
    /// known.
    fn resolved(&self, mappings: &HashMap<String, String>) -> SaleRef {
        match self {
            SaleRef::Local(id) => match mappings.get(&format!("sale:{id}")) {
                Some(server_id) => SaleRef::Server(server_id.clone()),
                None => self.clone(),
            },
            SaleRef::Server(_) => self.clone(),
        }
    }
}

// =============================================================================
// Payloads
// =============================================================================

/// A committed sale: the cart snapshot, the winning discounts, the computed
/// totals, and the settlement if one was taken at commit time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SaleOp {
    pub local_id: String,
    pub lines: Vec<CartLine>,
    pub discounts: Vec<AppliedDiscount>,
    pub totals: Totals,
    #[serde(default)]
    pub settlement: Option<Settlement>,
    pub created_at: DateTime<Utc>,
}

/// A payment added to an existing sale (split tender, later settlement).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentOp {
    pub local_id: String,
    pub sale: SaleRef,
    pub settlement: Settlement,
    pub created_at: DateTime<Utc>,
}

/// A return against an original sale.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReturnOp {
    pub local_id: String,
    pub original: SaleRef,
    pub lines: Vec<CartLine>,
    pub refund_cents: i64,
    #[serde(default)]
    pub reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// An exchange: returned lines swapped for replacements in one operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExchangeOp {
    pub local_id: String,
    pub original: SaleRef,
    pub returned_lines: Vec<CartLine>,
    pub replacement_lines: Vec<CartLine>,
    /// Positive when the customer owes, negative when refunded.
    pub balance_cents: i64,
    pub created_at: DateTime<Utc>,
}

/// A coupon redemption: the idempotent usage-counter increment, distinct
/// from evaluation. Usage caps are enforced here, server-side.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CouponRedemptionOp {
    pub local_id: String,
    pub code: String,
    pub sale: SaleRef,
    pub created_at: DateTime<Utc>,
}

/// Store credit issued to a customer (e.g. from a return).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreditIssueOp {
    pub local_id: String,
    pub customer_id: String,
    pub amount_cents: i64,
    #[serde(default)]
    pub source_sale: Option<SaleRef>,
    pub created_at: DateTime<Utc>,
}

/// Store credit redeemed against a sale.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreditRedemptionOp {
    pub local_id: String,
    pub customer_id: String,
    pub amount_cents: i64,
    pub sale: SaleRef,
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Operation
// =============================================================================

/// One queued operation. The tag doubles as the wire-level operation kind.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Operation {
    CreateSale(SaleOp),
    AddPayment(PaymentOp),
    CreateReturn(ReturnOp),
    CreateExchange(ExchangeOp),
    RedeemCoupon(CouponRedemptionOp),
    IssueCredit(CreditIssueOp),
    RedeemCredit(CreditRedemptionOp),
}

/// Discriminant of [`Operation`], for storage and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    CreateSale,
    AddPayment,
    CreateReturn,
    CreateExchange,
    RedeemCoupon,
    IssueCredit,
    RedeemCredit,
}

impl OperationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::CreateSale => "create_sale",
            OperationKind::AddPayment => "add_payment",
            OperationKind::CreateReturn => "create_return",
            OperationKind::CreateExchange => "create_exchange",
            OperationKind::RedeemCoupon => "redeem_coupon",
            OperationKind::IssueCredit => "issue_credit",
            OperationKind::RedeemCredit => "redeem_credit",
        }
    }
}

impl std::fmt::Display for OperationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Operation {
    pub fn kind(&self) -> OperationKind {
        match self {
            Operation::CreateSale(_) => OperationKind::CreateSale,
            Operation::AddPayment(_) => OperationKind::AddPayment,
            Operation::CreateReturn(_) => OperationKind::CreateReturn,
            Operation::CreateExchange(_) => OperationKind::CreateExchange,
            Operation::RedeemCoupon(_) => OperationKind::RedeemCoupon,
            Operation::IssueCredit(_) => OperationKind::IssueCredit,
            Operation::RedeemCredit(_) => OperationKind::RedeemCredit,
        }
    }

    /// The locally generated identifier of the entity this operation creates.
    pub fn local_id(&self) -> &str {
        match self {
            Operation::CreateSale(op) => &op.local_id,
            Operation::AddPayment(op) => &op.local_id,
            Operation::CreateReturn(op) => &op.local_id,
            Operation::CreateExchange(op) => &op.local_id,
            Operation::RedeemCoupon(op) => &op.local_id,
            Operation::IssueCredit(op) => &op.local_id,
            Operation::RedeemCredit(op) => &op.local_id,
        }
    }

    /// The sync-log key written when this operation is acknowledged.
    pub fn sync_key(&self) -> String {
        let prefix = match self {
            Operation::CreateSale(_) => "sale",
            Operation::AddPayment(_) => "payment",
            Operation::CreateReturn(_) => "return",
            Operation::CreateExchange(_) => "exchange",
            Operation::RedeemCoupon(_) => "coupon-redemption",
            Operation::IssueCredit(_) => "credit-issue",
            Operation::RedeemCredit(_) => "credit-redemption",
        };
        format!("{prefix}:{}", self.local_id())
    }

    /// Sync-log keys that must exist before this operation can be sent.
    pub fn dependencies(&self) -> Vec<String> {
        match self {
            Operation::CreateSale(_) => Vec::new(),
            Operation::AddPayment(op) => op.sale.dependency().into_iter().collect(),
            Operation::CreateReturn(op) => op.original.dependency().into_iter().collect(),
            Operation::CreateExchange(op) => op.original.dependency().into_iter().collect(),
            Operation::RedeemCoupon(op) => op.sale.dependency().into_iter().collect(),
            Operation::IssueCredit(op) => {
                op.source_sale.as_ref().and_then(|s| s.dependency()).into_iter().collect()
            }
            Operation::RedeemCredit(op) => op.sale.dependency().into_iter().collect(),
        }
    }

    /// Returns a copy with every resolvable local reference swapped for its
    /// server identity. Callers check [`Operation::dependencies`] first, so
    /// an unresolved reference here means the mapping appeared between the
    /// two reads and the item is simply retried next cycle.
    pub fn with_resolved_refs(&self, mappings: &HashMap<String, String>) -> Operation {
        let mut op = self.clone();
        match &mut op {
            Operation::CreateSale(_) => {}
            Operation::AddPayment(p) => p.sale = p.sale.resolved(mappings),
            Operation::CreateReturn(r) => r.original = r.original.resolved(mappings),
            Operation::CreateExchange(e) => e.original = e.original.resolved(mappings),
            Operation::RedeemCoupon(c) => c.sale = c.sale.resolved(mappings),
            Operation::IssueCredit(c) => {
                if let Some(source) = &c.source_sale {
                    c.source_sale = Some(source.resolved(mappings));
                }
            }
            Operation::RedeemCredit(c) => c.sale = c.sale.resolved(mappings),
        }
        op
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
