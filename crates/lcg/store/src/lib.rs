//! LCG storage abstractions.
//!
//! This crate defines the storage contract for the governance engine:
//! - versioned content records (system of record, append-only versions)
//! - domain registry and per-domain entitlement grants
//! - append-only audit trail, written transactionally with record changes
//!
//! Design stance:
//! - SQLite is the transactional source of truth; guarded transitions are
//!   conditional updates, never read-modify-write.
//! - The in-memory adapter is a deterministic reference implementation for
//!   tests.

#![deny(unsafe_code)]
#![warn(rust_2018_idioms)]

mod error;
pub mod memory;
#[cfg(feature = "sqlite")]
pub mod sqlite;
mod traits;

pub use error::{StoreError, StoreResult};
pub use memory::MemoryStore;
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteStore;
pub use traits::{
    AuditStore, ConfirmRequest, DomainStore, EntitlementStore, GovernanceStore, QueryWindow,
    RecordStore, TaskRefState, TransitionUpdate,
};
