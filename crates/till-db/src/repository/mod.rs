//! Repository implementations, one per table group.
//!
//! Each repository is a thin, cloneable handle over the shared pool. The two
//! multi-table invariants of the store live here as single transactions:
//! [`draft::DraftRepository::commit`] (draft + outbox append) and
//! [`outbox::OutboxRepository::acknowledge`] (outbox delete + sync-log
//! append).

pub mod catalog;
pub mod draft;
pub mod outbox;
pub mod rules;
pub mod sync_log;
