//! # Sync Error Types
//!
//! Two layers of failure live here:
//!
//! - [`GatewayError`] - what a server endpoint call can do to one outbox
//!   item. Transient failures retry on the next cycle; terminal rejections
//!   stop retrying and surface to the operator.
//! - [`SyncError`] - what the engine itself can fail on (configuration, the
//!   local store, channels).
//!
//! Dependency-not-ready is deliberately NOT an error: it is a normal queue
//! state, skipped silently and revisited next cycle.

use thiserror::Error;

/// Result type alias for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

// =============================================================================
// Gateway Error
// =============================================================================

/// Outcome of a failed server endpoint call for a single outbox item.
#[derive(Debug, Clone, Error)]
pub enum GatewayError {
    /// Network or server unavailability. Safe to retry indefinitely; the
    /// idempotency key makes the repeat effect-free.
    #[error("transient gateway failure: {0}")]
    Transient(String),

    /// The server refused the operation on business grounds (insufficient
    /// stock, exhausted coupon, unknown entity). Retrying cannot succeed;
    /// the item is parked for operator review.
    #[error("rejected by server: {0}")]
    Rejected(String),
}

impl GatewayError {
    /// True when retrying can never succeed.
    pub fn is_terminal(&self) -> bool {
        matches!(self, GatewayError::Rejected(_))
    }
}

// =============================================================================
// Sync Error
// =============================================================================

/// Sync engine failures.
#[derive(Debug, Error)]
pub enum SyncError {
    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// Invalid sync configuration.
    #[error("Invalid sync configuration: {0}")]
    InvalidConfig(String),

    /// Missing device ID (required for sync).
    #[error("Device ID not configured. Run initial setup first.")]
    MissingDeviceId,

    /// Failed to load config file.
    #[error("Failed to load config: {0}")]
    ConfigLoadFailed(String),

    /// Failed to save config file.
    #[error("Failed to save config: {0}")]
    ConfigSaveFailed(String),

    // =========================================================================
    // Store Errors
    // =========================================================================
    /// Local store operation failed.
    #[error("Store error: {0}")]
    Store(#[from] till_db::StoreError),

    /// Failed to (de)serialize a payload.
    #[error("Serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    // =========================================================================
    // Internal Errors
    // =========================================================================
    /// Channel send/receive failed.
    #[error("Channel error: {0}")]
    ChannelError(String),

    /// Agent is shutting down.
    #[error("Sync agent is shutting down")]
    ShuttingDown,
}

// =============================================================================
// Error Conversions
// =============================================================================

impl From<std::io::Error> for SyncError {
    fn from(err: std::io::Error) -> Self {
        SyncError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::de::Error> for SyncError {
    fn from(err: toml::de::Error) -> Self {
        SyncError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::ser::Error> for SyncError {
    fn from(err: toml::ser::Error) -> Self {
        SyncError::ConfigSaveFailed(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_classification() {
        assert!(!GatewayError::Transient("connection refused".into()).is_terminal());
        assert!(GatewayError::Rejected("insufficient stock".into()).is_terminal());
    }

    #[test]
    fn test_error_display() {
        let err = GatewayError::Rejected("coupon limit reached".into());
        assert!(err.to_string().contains("coupon limit reached"));
    }
}
