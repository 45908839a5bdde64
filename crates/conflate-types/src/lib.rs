//! Foundation types for the address conflation stage.
//!
//! Every other conflation crate depends on `conflate-types`. The types here
//! mirror the line-delimited GeoJSON documents exchanged with upstream and
//! downstream stages of the address toolchain.
//!
//! # Key Types
//!
//! - [`Point`] -- WGS84 point with GeoJSON codec and haversine distance
//! - [`StreetName`] -- a display name with priority
//! - [`InputRecord`] -- a candidate address read from the input stream
//! - [`KnownRecord`] -- an address already present in the persistent store
//! - [`StagedModification`] -- a partial update awaiting the grouping pass
//! - [`OutputFeature`] -- the create/modify unit handed downstream
//! - [`Context`] -- per-record country/region context for mapping functions

pub mod context;
pub mod error;
pub mod feature;
pub mod geometry;
pub mod record;
pub mod staged;
pub mod street;

pub use context::Context;
pub use error::TypeError;
pub use feature::{Action, FeatureKind, OutputFeature};
pub use geometry::{Point, EARTH_RADIUS_KM};
pub use record::{FeatureProperties, InputProperties, InputRecord, KnownRecord};
pub use staged::{GroupKey, StagedGroup, StagedModification};
pub use street::{dedup_by_display, StreetName};
