use std::sync::Arc;

use async_trait::async_trait;
use conflate_types::{GroupKey, KnownRecord, Point, StagedGroup, StagedModification};

use crate::error::StoreResult;

/// Read-only access to the corpus of known addresses.
///
/// Workers never write through this trait.
#[async_trait]
pub trait PersistentStore: Send + Sync {
    /// Known records whose address number equals `number` and whose geometry
    /// lies within `within_degrees` of latitude of `near`. The longitude bound
    /// is widened by `1/cos(lat)`, as in [`Point::within_window`].
    ///
    /// This is the cheap prefilter; callers refine by true distance. The
    /// order of the returned records is stable for a given store state.
    async fn candidates(
        &self,
        number: &str,
        near: Point,
        within_degrees: f64,
    ) -> StoreResult<Vec<KnownRecord>>;
}

/// Write-many/read-once holding area for partial modifications.
///
/// Inserts may arrive concurrently from every worker. Grouped reads happen
/// only after all writers are done, so implementations need no coordination
/// between the two phases.
#[async_trait]
pub trait StagingStore: Send + Sync {
    /// Append one staged row.
    async fn insert(&self, row: &StagedModification) -> StoreResult<()>;

    /// Up to `limit` groups whose key sorts strictly after `after`, in key
    /// order. Members of each group keep insertion order.
    ///
    /// Scanning never removes rows: repeating a scan over unchanged data
    /// yields the same groups.
    async fn scan_groups(
        &self,
        after: Option<&GroupKey>,
        limit: usize,
    ) -> StoreResult<Vec<StagedGroup>>;

    /// Remove every staged row.
    async fn reset(&self) -> StoreResult<()>;

    /// Number of staged rows.
    async fn len(&self) -> StoreResult<usize>;
}

/// Hands out independent store allocations.
///
/// Each worker and the grouping pass call these once and own what they get;
/// backends with connection pools give each call its own bounded pool.
pub trait StoreProvider: Send + Sync {
    fn persistent(&self) -> StoreResult<Arc<dyn PersistentStore>>;
    fn staging(&self) -> StoreResult<Arc<dyn StagingStore>>;
}
