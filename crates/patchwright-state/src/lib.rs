//! Patchwright-State: project storage for Patchwright
//!
//! This crate holds everything the repair loop persists between requests:
//! the latest accepted source of each project file, the bounded per-file
//! repair memory, and an append-only audit trail of repair runs.
//!
//! ## Key Components
//!
//! - `ProjectStore`: async trait the core crate programs against
//! - `MemoryProjectStore`: in-memory implementation for tests and local runs
//! - `SurrealHandle` / `SurrealProjectStore`: SurrealDB-backed implementation

mod error;
pub mod fakes;
mod handle;
mod schema;
pub mod storage_traits;
mod surreal_store;

pub use error::StorageError;
pub use fakes::MemoryProjectStore;
pub use handle::{Credentials, SurrealHandle};
pub use storage_traits::{
    bound_memory, ContentDigest, FileRecord, ProjectStore, RepairAuditRecord, StorageResult,
    MAX_MEMORY_ENTRIES,
};
pub use surreal_store::SurrealProjectStore;
