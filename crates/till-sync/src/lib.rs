//! # till-sync: Outbox Synchronization Engine
//!
//! Guarantees that transactions created while disconnected are eventually
//! replicated to the server exactly once, in dependency order, across
//! crashes and retries.
//!
//! ## How the Guarantee Is Assembled
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │  durable queue        till-db outbox: survives crashes; an item     │
//! │                       only leaves on confirmed acknowledgment       │
//! │                                                                     │
//! │  exactly-once effect  idempotency key per item, never regenerated;  │
//! │                       the server's write-once guard absorbs every   │
//! │                       replay, lost ack, or cross-device duplicate   │
//! │                                                                     │
//! │  dependency order     creation-order drain + sync-log gating: a     │
//! │                       payment waits, unsent and uncounted, until    │
//! │                       its sale's mapping exists                     │
//! │                                                                     │
//! │  liveness             timer tick + connectivity-restored signal;    │
//! │                       transient failures retry forever, terminal    │
//! │                       rejections park for the operator              │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`agent`] - `SyncAgent` loop and control handle
//! - [`processor`] - `OutboxProcessor` drain cycle
//! - [`gateway`] - `ServerGateway` trait and the in-memory reference guard
//! - [`config`] - Sync configuration (device id, poll interval)
//! - [`error`] - Sync and gateway error types
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use till_db::{LocalStore, StoreConfig};
//! use till_sync::{MemoryGateway, SyncAgent, SyncConfig};
//!
//! let store = LocalStore::new(StoreConfig::new("till.db")).await?;
//! let gateway = Arc::new(MemoryGateway::new());
//! let config = SyncConfig::load_or_default(None);
//!
//! let (agent, handle) = SyncAgent::new(store, gateway, &config);
//! tokio::spawn(agent.run());
//!
//! // On a connectivity-restored event:
//! handle.notify_online();
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod agent;
pub mod config;
pub mod error;
pub mod gateway;
pub mod processor;

// =============================================================================
// Re-exports
// =============================================================================

pub use agent::{SyncAgent, SyncAgentHandle, SyncStatus};
pub use config::{DeviceConfig, SyncConfig, SyncSettings};
pub use error::{GatewayError, SyncError, SyncResult};
pub use gateway::{MemoryGateway, ServerAck, ServerGateway};
pub use processor::{DrainReport, OutboxProcessor};
