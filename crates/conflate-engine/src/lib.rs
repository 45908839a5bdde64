//! Address conflation engine.
//!
//! Reconciles a stream of candidate addresses against a known corpus and
//! emits line-delimited GeoJSON describing the changes:
//!
//! - `create` for addresses with no matching known record;
//! - `modify` for known records that gain new street names, one feature per
//!   record no matter how many inputs contributed to it.
//!
//! # Run Lifecycle
//!
//! 1. [`Coordinator`] validates the [`Job`] and resets the staging store.
//! 2. N [`Worker`]s each read the full input and keep lines whose ordinal
//!    modulo N equals their id.
//! 3. Each record goes through the [`Matcher`]: creates stream straight to
//!    the output, modifications are staged.
//! 4. After every worker reported `End`, the [`GroupingPass`] merges staged
//!    rows per target record and appends the modify features.

pub mod config;
pub mod coordinator;
pub mod decision;
pub mod error;
pub mod grouping;
pub mod input;
pub mod mapping;
pub mod message;
pub mod sink;
pub mod worker;

pub use config::{default_workers, ConfigFile, EngineSettings, Job, MATCH_RADIUS_KM};
pub use coordinator::{CompletionBarrier, Coordinator, RunSummary};
pub use decision::{Decision, Matcher};
pub use error::{ConflateError, ConflateResult, RecordError};
pub use grouping::{merge_group, GroupCursor, GroupingPass};
pub use mapping::{lookup as lookup_mapper, Mapper, OpenAddresses, BUILTIN_MAPPERS};
pub use message::{Assignment, WorkerId, WorkerMessage, WorkerSummary};
pub use sink::{FeatureWriter, RejectWriter};
pub use worker::Worker;
