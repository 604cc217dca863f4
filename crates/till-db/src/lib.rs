//! # till-db: Local Transaction Store
//!
//! Durable client-side state on SQLite: the catalog/price snapshot, the
//! cached rule index and settings, draft transactions, the
//! pending-operations outbox, and the local→server sync log.
//!
//! ## Data Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │  Register commit                      Sync drain                    │
//! │       │                                    │                        │
//! │       ▼                                    ▼                        │
//! │  drafts().commit(draft, item)    outbox().pending(n)                │
//! │   └─ ONE txn: draft + outbox      └─ per item, on ack:              │
//! │                                      outbox().acknowledge(...)      │
//! │                                       └─ ONE txn: delete +          │
//! │                                          sync-log append            │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`pool`] - `LocalStore` handle, pool creation and configuration
//! - [`migrations`] - Embedded database migrations
//! - [`error`] - Store error types
//! - [`repository`] - Repository implementations

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{StoreError, StoreResult};
pub use pool::{LocalStore, StoreConfig};

pub use repository::catalog::CatalogRepository;
pub use repository::draft::DraftRepository;
pub use repository::outbox::OutboxRepository;
pub use repository::rules::RulesRepository;
pub use repository::sync_log::SyncLogRepository;
