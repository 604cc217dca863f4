//! # Domain Types
//!
//! Core domain types shared across the store and sync layers.
//!
//! ## Dual-Identity Pattern
//! Client-local entities carry a locally generated UUID (`local_id`) that is
//! valid offline; the server assigns its own identifier on first sync. The
//! sync log (one [`SyncLogEntry`] per local entity) is the only bridge
//! between the two identifier spaces.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::money::Money;
use crate::operation::Operation;
use crate::promo::AppliedDiscount;
use crate::tax::Totals;

// =============================================================================
// Cart
// =============================================================================

/// One line of a cart: an immutable snapshot taken at evaluation time.
///
/// Product attributes are frozen here so a price change between evaluation
/// and sync cannot alter a committed transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartLine {
    pub sku: String,
    pub quantity: i64,
    pub unit_price_cents: i64,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub brand: Option<String>,
    #[serde(default)]
    pub tax_exempt: bool,
    #[serde(default)]
    pub zero_rated: bool,
}

impl CartLine {
    /// Builds a line, clamping quantity to at least 1 and price to at
    /// least 0.
    pub fn new(sku: impl Into<String>, quantity: i64, unit_price_cents: i64) -> Self {
        CartLine {
            sku: sku.into(),
            quantity: quantity.max(1),
            unit_price_cents: unit_price_cents.max(0),
            category: None,
            brand: None,
            tax_exempt: false,
            zero_rated: false,
        }
    }

    /// Base amount before any discount or tax: `qty × unit price`.
    #[inline]
    pub fn base(&self) -> Money {
        Money::from_cents(self.unit_price_cents).multiply_quantity(self.quantity)
    }
}

/// A cart snapshot handed to the discount and tax engines.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Cart {
    pub lines: Vec<CartLine>,
}

impl Cart {
    pub fn new(lines: Vec<CartLine>) -> Self {
        Cart { lines }
    }

    /// Sum of line bases.
    pub fn subtotal(&self) -> Money {
        self.lines.iter().map(|l| l.base()).sum()
    }
}

// =============================================================================
// Settlement
// =============================================================================

/// How a transaction is settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    /// Physical cash. The only method subject to cash rounding.
    Cash,
    /// Card payment on an external terminal.
    Card,
    /// Store credit held by the customer.
    StoreCredit,
}

/// The settlement chosen for a draft.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settlement {
    pub method: PaymentMethod,
    /// Amount settled in cents.
    pub amount_cents: i64,
    /// For cash: amount the customer handed over.
    #[serde(default)]
    pub tendered_cents: Option<i64>,
    /// For cash: change returned.
    #[serde(default)]
    pub change_cents: Option<i64>,
}

// =============================================================================
// Draft Transactions
// =============================================================================

/// What kind of transaction a draft represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DraftKind {
    Sale,
    Return,
    Exchange,
}

impl DraftKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DraftKind::Sale => "sale",
            DraftKind::Return => "return",
            DraftKind::Exchange => "exchange",
        }
    }
}

/// Lifecycle of a draft on this device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DraftStatus {
    /// Committed locally, not yet acknowledged by the server.
    Pending,
    /// Acknowledged; the sync log holds its server identifier.
    Synced,
}

/// A client-local transaction awaiting server confirmation.
///
/// Holds the cart snapshot, the applied discounts, the computed totals, and
/// the chosen settlement. Immutable once enqueued to the outbox.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DraftTransaction {
    pub local_id: String,
    pub kind: DraftKind,
    pub lines: Vec<CartLine>,
    pub discounts: Vec<AppliedDiscount>,
    pub totals: Totals,
    #[serde(default)]
    pub settlement: Option<Settlement>,
    pub created_at: DateTime<Utc>,
    pub status: DraftStatus,
}

impl DraftTransaction {
    pub fn new(
        kind: DraftKind,
        lines: Vec<CartLine>,
        discounts: Vec<AppliedDiscount>,
        totals: Totals,
        settlement: Option<Settlement>,
    ) -> Self {
        DraftTransaction {
            local_id: Uuid::new_v4().to_string(),
            kind,
            lines,
            discounts,
            totals,
            settlement,
            created_at: Utc::now(),
            status: DraftStatus::Pending,
        }
    }
}

// =============================================================================
// Outbox
// =============================================================================

/// A caller-generated token attached to every mutating request so repeated
/// submission has a single server-side effect.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdempotencyKey(String);

impl IdempotencyKey {
    /// Generates a fresh key. Done once, at enqueue time; the key never
    /// changes across retries.
    pub fn generate() -> Self {
        IdempotencyKey(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for IdempotencyKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for IdempotencyKey {
    fn from(s: String) -> Self {
        IdempotencyKey(s)
    }
}

/// An entry in the pending-operations queue.
///
/// Created atomically with the draft it describes; deleted only after a
/// confirmed server acknowledgment; never mutated except `retry_count`,
/// `last_error`, and the terminal `rejected_at` marker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboxItem {
    pub id: String,
    pub operation: Operation,
    pub idempotency_key: IdempotencyKey,
    pub created_at: DateTime<Utc>,
    pub retry_count: i64,
    #[serde(default)]
    pub last_error: Option<String>,
    /// Set when the server terminally refused the operation; such items are
    /// excluded from drains and surfaced to the operator instead.
    #[serde(default)]
    pub rejected_at: Option<DateTime<Utc>>,
}

impl OutboxItem {
    pub fn new(operation: Operation) -> Self {
        OutboxItem {
            id: Uuid::new_v4().to_string(),
            operation,
            idempotency_key: IdempotencyKey::generate(),
            created_at: Utc::now(),
            retry_count: 0,
            last_error: None,
            rejected_at: None,
        }
    }
}

// =============================================================================
// Sync Log
// =============================================================================

/// One row of the local→server identity mapping, written exactly once per
/// successfully acknowledged creating operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncLogEntry {
    /// e.g. `"sale:<local id>"`.
    pub key: String,
    /// The server-assigned identifier.
    pub server_id: String,
    pub updated_at: DateTime<Utc>,
}

// =============================================================================
// Catalog Snapshot
// =============================================================================

/// One product row of the cached catalog/price snapshot used for offline
/// lookup. Refreshed opportunistically; staleness is tolerated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogItem {
    pub sku: String,
    pub name: String,
    pub price_cents: i64,
    #[serde(default)]
    pub barcode: Option<String>,
    #[serde(default)]
    pub size: Option<String>,
    #[serde(default)]
    pub color: Option<String>,
}

// =============================================================================
// Cached Settings
// =============================================================================

/// Payment-method policy from the settings source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentPolicy {
    pub enabled_methods: Vec<PaymentMethod>,
    /// Cap on operator-entered percentage discounts, in basis points.
    #[serde(default)]
    pub manual_discount_cap_bps: Option<u32>,
}

impl Default for PaymentPolicy {
    fn default() -> Self {
        PaymentPolicy {
            enabled_methods: vec![PaymentMethod::Cash, PaymentMethod::Card],
            manual_discount_cap_bps: None,
        }
    }
}

/// The settings bundle cached locally with last-known-good semantics.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    pub tax: crate::tax::TaxConfig,
    pub currency: crate::tax::CurrencyConfig,
    pub payments: PaymentPolicy,
}

// =============================================================================
// Unit Tests
// =============================================================================
