//! # till-core: Pure Business Logic for Till
//!
//! This crate is the heart of the transaction core. It contains the discount
//! and tax engines and every shared domain type, as pure functions with zero
//! I/O dependencies.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                    Operator actions (external)                      │
//! │        cart edits ──► price preview ──► commit ──► settle           │
//! ├───────────────────────────────┬─────────────────────────────────────┤
//! │                               │                                     │
//! │  ┌────────────────────────────▼────────────────────────────────┐    │
//! │  │               ★ till-core (THIS CRATE) ★                    │    │
//! │  │                                                             │    │
//! │  │  ┌─────────┐ ┌─────────┐ ┌─────────┐ ┌──────────────────┐   │    │
//! │  │  │  money  │ │  promo  │ │   tax   │ │    operation     │   │    │
//! │  │  │ rounding│ │ rules & │ │ rates & │ │ outbox payloads  │   │    │
//! │  │  │  & bps  │ │ stacking│ │ rounding│ │ & dependencies   │   │    │
//! │  │  └─────────┘ └─────────┘ └─────────┘ └──────────────────┘   │    │
//! │  │                                                             │    │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS        │    │
//! │  └────────────────────────────┬────────────────────────────────┘    │
//! │                               │                                     │
//! │        till-db (durable store)     till-sync (outbox drain)         │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`money`] - Integer-cent money and the rounding primitives
//! - [`promo`] - Discount evaluation (promotions, coupons, stacking, manual)
//! - [`tax`] - Tax computation (rate resolution, rounding regimes, cash rounding)
//! - [`allocate`] - Largest-remainder proportional allocation
//! - [`operation`] - The queued-operation sum type and identity resolution
//! - [`types`] - Domain types (cart, drafts, outbox, sync log, settings)
//! - [`validation`] - Boundary checks and clamps
//! - [`error`] - Domain error types
//!
//! ## Design Principles
//!
//! 1. **Pure Functions**: same input, same output; evaluation is reproducible
//!    for audit from the rule set and cart snapshot alone
//! 2. **No I/O**: database, network, and file system access are FORBIDDEN here
//! 3. **Integer Money**: all monetary values are minor units in `i64`
//! 4. **Clamp, don't throw**: out-of-range evaluation inputs are clamped so a
//!    typo never blocks checkout

// =============================================================================
// Module Declarations
// =============================================================================

pub mod allocate;
pub mod error;
pub mod money;
pub mod operation;
pub mod promo;
pub mod tax;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use error::{CoreError, CoreResult, ValidationError};
pub use money::{Money, RoundingStrategy};
pub use operation::{Operation, OperationKind, SaleRef};
pub use promo::{
    AppliedDiscount, CouponRule, DiscountOutcome, EvalContext, ManualDiscount, PromotionRule,
    StackingPolicy,
};
pub use tax::{TaxBreakdown, TaxConfig, Totals};
pub use types::*;
