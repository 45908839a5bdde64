use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::geometry::Point;
use crate::record::FeatureProperties;

/// A partial modification of a known record, written by a worker and read
/// once by the grouping pass.
///
/// Several rows may target the same `(target_id, target_version, geometry)`;
/// they describe the same known record and are merged later.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StagedModification {
    pub target_id: i64,
    pub target_version: i64,
    pub properties: FeatureProperties,
    pub geometry: Point,
}

impl StagedModification {
    pub fn key(&self) -> GroupKey {
        GroupKey::new(self.target_id, self.target_version, self.geometry)
    }
}

/// Identity of a known record for matching and grouping.
///
/// Ordered by id, version, then longitude and latitude under IEEE total
/// ordering, which is also the scan order of the staging stores.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct GroupKey {
    pub id: i64,
    pub version: i64,
    pub geometry: Point,
}

impl GroupKey {
    pub fn new(id: i64, version: i64, geometry: Point) -> Self {
        Self {
            id,
            version,
            geometry,
        }
    }
}

impl Ord for GroupKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.id
            .cmp(&other.id)
            .then(self.version.cmp(&other.version))
            .then(self.geometry.lon.total_cmp(&other.geometry.lon))
            .then(self.geometry.lat.total_cmp(&other.geometry.lat))
    }
}

impl PartialOrd for GroupKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for GroupKey {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for GroupKey {}

/// All staged rows sharing one [`GroupKey`], in insertion order.
#[derive(Clone, Debug, PartialEq)]
pub struct StagedGroup {
    pub key: GroupKey,
    pub members: Vec<FeatureProperties>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(lon: f64, lat: f64) -> Point {
        Point::new(lon, lat).unwrap()
    }

    #[test]
    fn keys_order_by_id_then_version_then_geometry() {
        let mut keys = vec![
            GroupKey::new(2, 1, p(0.0, 0.0)),
            GroupKey::new(1, 2, p(0.0, 0.0)),
            GroupKey::new(1, 1, p(1.0, 0.0)),
            GroupKey::new(1, 1, p(0.0, 5.0)),
        ];
        keys.sort();
        assert_eq!(keys[0], GroupKey::new(1, 1, p(0.0, 5.0)));
        assert_eq!(keys[1], GroupKey::new(1, 1, p(1.0, 0.0)));
        assert_eq!(keys[2], GroupKey::new(1, 2, p(0.0, 0.0)));
        assert_eq!(keys[3], GroupKey::new(2, 1, p(0.0, 0.0)));
    }

    #[test]
    fn geometry_is_part_of_identity() {
        let a = GroupKey::new(7, 1, p(1.0, 1.0));
        let b = GroupKey::new(7, 1, p(1.0, 1.000001));
        assert_ne!(a, b);
    }

    #[test]
    fn staged_key() {
        let row = StagedModification {
            target_id: 9,
            target_version: 4,
            properties: FeatureProperties::default(),
            geometry: p(3.0, 4.0),
        };
        assert_eq!(row.key(), GroupKey::new(9, 4, p(3.0, 4.0)));
    }
}
