use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use conflate_types::{
    FeatureProperties, GroupKey, KnownRecord, Point, StagedGroup, StagedModification,
};

use crate::error::StoreResult;
use crate::traits::{PersistentStore, StagingStore, StoreProvider};

/// In-memory persistent store.
///
/// Intended for tests and embedding. Candidates come back in insertion order.
pub struct InMemoryPersistentStore {
    records: RwLock<Vec<KnownRecord>>,
}

impl InMemoryPersistentStore {
    pub fn new() -> Self {
        Self {
            records: RwLock::new(Vec::new()),
        }
    }

    pub fn with_records(records: Vec<KnownRecord>) -> Self {
        Self {
            records: RwLock::new(records),
        }
    }

    pub fn insert(&self, record: KnownRecord) {
        self.records.write().expect("lock poisoned").push(record);
    }

    pub fn len(&self) -> usize {
        self.records.read().expect("lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().expect("lock poisoned").is_empty()
    }
}

impl Default for InMemoryPersistentStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PersistentStore for InMemoryPersistentStore {
    async fn candidates(
        &self,
        number: &str,
        near: Point,
        within_degrees: f64,
    ) -> StoreResult<Vec<KnownRecord>> {
        let records = self.records.read().expect("lock poisoned");
        Ok(records
            .iter()
            .filter(|r| r.properties.number.as_deref() == Some(number))
            .filter(|r| near.within_window(&r.geometry, within_degrees))
            .cloned()
            .collect())
    }
}

/// In-memory staging store backed by an append-only vector.
pub struct InMemoryStagingStore {
    rows: RwLock<Vec<StagedModification>>,
}

impl InMemoryStagingStore {
    pub fn new() -> Self {
        Self {
            rows: RwLock::new(Vec::new()),
        }
    }

    /// Snapshot of all staged rows in insertion order.
    pub fn rows(&self) -> Vec<StagedModification> {
        self.rows.read().expect("lock poisoned").clone()
    }
}

impl Default for InMemoryStagingStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StagingStore for InMemoryStagingStore {
    async fn insert(&self, row: &StagedModification) -> StoreResult<()> {
        self.rows.write().expect("lock poisoned").push(row.clone());
        Ok(())
    }

    async fn scan_groups(
        &self,
        after: Option<&GroupKey>,
        limit: usize,
    ) -> StoreResult<Vec<StagedGroup>> {
        let rows = self.rows.read().expect("lock poisoned");
        let mut groups: BTreeMap<GroupKey, Vec<FeatureProperties>> = BTreeMap::new();
        for row in rows.iter() {
            let key = row.key();
            if after.is_some_and(|a| key <= *a) {
                continue;
            }
            groups.entry(key).or_default().push(row.properties.clone());
        }
        Ok(groups
            .into_iter()
            .take(limit)
            .map(|(key, members)| StagedGroup { key, members })
            .collect())
    }

    async fn reset(&self) -> StoreResult<()> {
        self.rows.write().expect("lock poisoned").clear();
        Ok(())
    }

    async fn len(&self) -> StoreResult<usize> {
        Ok(self.rows.read().expect("lock poisoned").len())
    }
}

/// Provider sharing one in-memory store pair between all callers.
#[derive(Clone, Default)]
pub struct MemoryProvider {
    persistent: Arc<InMemoryPersistentStore>,
    staging: Arc<InMemoryStagingStore>,
}

impl MemoryProvider {
    pub fn new(persistent: Arc<InMemoryPersistentStore>, staging: Arc<InMemoryStagingStore>) -> Self {
        Self {
            persistent,
            staging,
        }
    }

    pub fn with_records(records: Vec<KnownRecord>) -> Self {
        Self::new(
            Arc::new(InMemoryPersistentStore::with_records(records)),
            Arc::new(InMemoryStagingStore::new()),
        )
    }

    pub fn persistent_store(&self) -> &Arc<InMemoryPersistentStore> {
        &self.persistent
    }

    pub fn staging_store(&self) -> &Arc<InMemoryStagingStore> {
        &self.staging
    }
}

impl StoreProvider for MemoryProvider {
    fn persistent(&self) -> StoreResult<Arc<dyn PersistentStore>> {
        Ok(self.persistent.clone())
    }

    fn staging(&self) -> StoreResult<Arc<dyn StagingStore>> {
        Ok(self.staging.clone())
    }
}
