//! Persistent domain store for the engine.
//!
//! The [`store::Store`] is the sole source of truth for all mutable
//! state. Every operation is the atomic unit of a state transition and
//! appends the corresponding lifecycle events inside the same
//! transaction (outbox pattern); a publisher drains pending events to
//! the work queue after commit.

pub mod entities;
pub mod error;
pub mod pools;
pub mod store;

#[cfg(test)]
mod tests;

pub use error::{Result, StorageError};
pub use pools::QueryPools;
pub use store::{
    AlertRow, EventRow, IssueRow, MonitorExecutionRow, MonitorRow, NoReactions, NotificationRow,
    ReactionLookup, Store, StoreSettings,
};
