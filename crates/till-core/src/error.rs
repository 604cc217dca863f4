//! # Error Types
//!
//! Domain-specific error types for till-core.
//!
//! ## Design Principles
//! 1. Use `thiserror` for derive macros (not manual impl)
//! 2. Include context in error messages (sku, code, amounts)
//! 3. Errors are enum variants, never String
//!
//! Discount and tax evaluation never return these for out-of-range numeric
//! input — those are clamped at the boundary so checkout is never blocked by
//! a typo. The variants here cover genuinely malformed data that cannot be
//! clamped into meaning.

use thiserror::Error;

// =============================================================================
// Core Error
// =============================================================================

/// Core business logic errors.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A cart line references a quantity that cannot be interpreted at all.
    #[error("Invalid quantity {quantity} for {sku}")]
    InvalidQuantity { sku: String, quantity: i64 },

    /// A settlement does not cover the amount due.
    #[error("Settlement of {tendered} cents does not cover {due} cents")]
    InsufficientSettlement { tendered: i64, due: i64 },

    /// A draft was mutated after it was enqueued for sync.
    #[error("Draft {0} is already enqueued and immutable")]
    DraftImmutable(String),

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors, used for early checks before business logic runs.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Numeric value is out of range.
    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: String, min: i64, max: i64 },

    /// Value must be positive.
    #[error("{field} must be positive")]
    MustBePositive { field: String },

    /// Invalid format (e.g., invalid code, invalid date).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;
