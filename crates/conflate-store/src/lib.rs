//! Stores used by the conflation engine.
//!
//! Two stores take part in a run:
//!
//! - the **persistent store** holds the known address corpus and is only
//!   ever read by workers ([`PersistentStore`]);
//! - the **staging store** collects partial modifications from every worker
//!   and is read once, by the grouping pass, after all workers finished
//!   ([`StagingStore`]).
//!
//! # Storage Backends
//!
//! - [`MemoryProvider`] -- shared in-memory stores for tests and embedding
//! - [`SqliteProvider`] -- a SQLite database file; every allocation gets its
//!   own bounded connection pool
//!
//! # Design Rules
//!
//! 1. Workers never write the persistent store.
//! 2. Staging rows are never mutated in place; scans do not consume them.
//! 3. Grouped scans page by key so the full staging set is never materialized.
//! 4. All backend errors are propagated as [`StoreError`].

pub mod error;
pub mod memory;
pub mod sqlite;
pub mod traits;

pub use error::{StoreError, StoreResult};
pub use memory::{InMemoryPersistentStore, InMemoryStagingStore, MemoryProvider};
pub use sqlite::{ImportSummary, SqlitePersistentStore, SqliteProvider, SqliteStagingStore};
pub use traits::{PersistentStore, StagingStore, StoreProvider};
