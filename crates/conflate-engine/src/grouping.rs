//! Grouping pass: merges every staged modification of the same known record
//! into a single modify feature.

use std::sync::Arc;

use conflate_store::StagingStore;
use conflate_types::{GroupKey, OutputFeature, StagedGroup};
use tokio::io::AsyncWrite;
use tracing::{debug, info};

use crate::error::ConflateResult;
use crate::sink::FeatureWriter;

/// Merge one group into a modify feature.
///
/// The first member's properties are kept and the street lists of all
/// members are concatenated, then deduplicated by display string.
pub fn merge_group(group: StagedGroup) -> Option<OutputFeature> {
    let StagedGroup { key, members } = group;
    let mut members = members.into_iter();
    let mut merged = members.next()?;
    for member in members {
        merged.street.extend(member.street);
    }
    Some(OutputFeature::modify(&key, merged))
}

pub struct GroupingPass {
    staging: Arc<dyn StagingStore>,
    page_size: usize,
}

impl GroupingPass {
    pub fn new(staging: Arc<dyn StagingStore>, page_size: usize) -> Self {
        Self {
            staging,
            page_size: page_size.max(1),
        }
    }

    /// Stream merged features into `out`. Returns the number written.
    pub async fn run<W: AsyncWrite + Unpin>(&self, out: &mut FeatureWriter<W>) -> ConflateResult<u64> {
        let mut cursor = self.cursor();
        let mut written = 0;
        while let Some(page) = cursor.next_page().await? {
            for feature in &page {
                out.write(feature).await?;
            }
            written += page.len() as u64;
        }
        info!(modified = written, "grouping pass emitted features");
        Ok(written)
    }

    /// Materialize every merged feature. Meant for tests and small runs.
    pub async fn collect(&self) -> ConflateResult<Vec<OutputFeature>> {
        let mut cursor = self.cursor();
        let mut all = Vec::new();
        while let Some(page) = cursor.next_page().await? {
            all.extend(page);
        }
        Ok(all)
    }

    pub fn cursor(&self) -> GroupCursor<'_> {
        GroupCursor {
            staging: self.staging.as_ref(),
            page_size: self.page_size,
            after: None,
            done: false,
        }
    }
}

/// Keyset cursor over staged groups; pages hold at most `page_size` groups.
pub struct GroupCursor<'a> {
    staging: &'a dyn StagingStore,
    page_size: usize,
    after: Option<GroupKey>,
    done: bool,
}

impl GroupCursor<'_> {
    pub async fn next_page(&mut self) -> ConflateResult<Option<Vec<OutputFeature>>> {
        if self.done {
            return Ok(None);
        }
        let groups = self.staging.scan_groups(self.after.as_ref(), self.page_size).await?;
        if groups.len() < self.page_size {
            self.done = true;
        }
        let Some(last) = groups.last() else {
            return Ok(None);
        };
        self.after = Some(last.key);
        debug!(groups = groups.len(), "grouping page");
        Ok(Some(groups.into_iter().filter_map(merge_group).collect()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use conflate_store::InMemoryStagingStore;
    use conflate_types::{Action, FeatureProperties, Point, StagedModification, StreetName};
    use serde_json::json;

    fn at() -> Point {
        Point::new(2.0, 48.0).unwrap()
    }

    fn row(id: i64, streets: &[&str]) -> StagedModification {
        StagedModification {
            target_id: id,
            target_version: 1,
            properties: FeatureProperties {
                number: Some("4".into()),
                street: streets.iter().map(|s| StreetName::new(*s, 0)).collect(),
                ..Default::default()
            },
            geometry: at(),
        }
    }

    #[test]
    fn merge_concatenates_and_dedups() {
        let key = GroupKey::new(1, 1, at());
        let group = StagedGroup {
            key,
            members: vec![
                row(1, &["Main St", "A"]).properties,
                row(1, &["Main St", "B"]).properties,
            ],
        };
        let feature = merge_group(group).unwrap();
        assert_eq!(feature.action, Action::Modify);
        assert_eq!(feature.id, Some(1));
        let displays: Vec<&str> = feature.properties.street.iter().map(|s| s.display.as_str()).collect();
        assert_eq!(displays, vec!["Main St", "A", "B"]);
        assert_eq!(feature.properties.number.as_deref(), Some("4"));
    }

    #[test]
    fn single_member_is_unchanged() {
        let mut props = row(1, &["Main St", "Hwy 2"]).properties;
        props.extra.insert("unit".into(), json!("B"));
        let feature = merge_group(StagedGroup {
            key: GroupKey::new(1, 1, at()),
            members: vec![props.clone()],
        })
        .unwrap();
        assert_eq!(feature.properties, props);
    }

    #[test]
    fn empty_group_yields_nothing() {
        assert!(merge_group(StagedGroup {
            key: GroupKey::new(1, 1, at()),
            members: Vec::new(),
        })
        .is_none());
    }

    #[tokio::test]
    async fn two_rows_same_target_merge() {
        let staging = Arc::new(InMemoryStagingStore::new());
        staging.insert(&row(1, &["Main St", "A"])).await.unwrap();
        staging.insert(&row(1, &["Main St", "B"])).await.unwrap();
        staging.insert(&row(2, &["Oak"])).await.unwrap();

        let features = GroupingPass::new(staging, 1000).collect().await.unwrap();
        assert_eq!(features.len(), 2);
        assert_eq!(features[0].properties.street.len(), 3);
        assert_eq!(features[1].id, Some(2));
    }

    #[tokio::test]
    async fn paging_visits_every_group_once() {
        let staging = Arc::new(InMemoryStagingStore::new());
        for id in 1..=7 {
            staging.insert(&row(id, &["S"])).await.unwrap();
            staging.insert(&row(id, &["T"])).await.unwrap();
        }
        let features = GroupingPass::new(staging, 3).collect().await.unwrap();
        let ids: Vec<i64> = features.iter().filter_map(|f| f.id).collect();
        assert_eq!(ids, (1..=7).collect::<Vec<_>>());
        assert!(features.iter().all(|f| f.properties.street.len() == 2));
    }

    #[tokio::test]
    async fn pass_is_repeatable() {
        let staging = Arc::new(InMemoryStagingStore::new());
        staging.insert(&row(1, &["A"])).await.unwrap();
        staging.insert(&row(1, &["B"])).await.unwrap();
        let pass = GroupingPass::new(staging, 10);
        let first = pass.collect().await.unwrap();
        let second = pass.collect().await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn run_writes_lines() {
        let staging = Arc::new(InMemoryStagingStore::new());
        staging.insert(&row(5, &["A"])).await.unwrap();
        let mut out = FeatureWriter::new(Vec::new());
        let n = GroupingPass::new(staging, 10).run(&mut out).await.unwrap();
        assert_eq!(n, 1);
        let buf = out.finish().await.unwrap();
        let v: serde_json::Value = serde_json::from_slice(&buf).unwrap();
        assert_eq!(v["action"], "modify");
        assert_eq!(v["id"], 5);
    }
}
