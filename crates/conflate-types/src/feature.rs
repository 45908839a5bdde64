use serde::{Deserialize, Serialize};

use crate::geometry::Point;
use crate::record::{FeatureProperties, InputRecord};
use crate::staged::GroupKey;
use crate::street::dedup_by_display;

/// What the downstream consumer should do with a feature.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Create,
    Modify,
}

/// The GeoJSON `type` discriminator. Always `"Feature"`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum FeatureKind {
    #[default]
    Feature,
}

/// A line of conflation output.
///
/// ```text
/// {"action":"create","type":"Feature","properties":{"number","street","source"?},"geometry"}
/// {"action":"modify","type":"Feature","id","version","properties":{"street",..},"geometry"}
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OutputFeature {
    pub action: Action,
    #[serde(rename = "type", default)]
    pub kind: FeatureKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<i64>,
    pub properties: FeatureProperties,
    pub geometry: Point,
}

impl OutputFeature {
    /// A create feature carrying exactly `number`, `street` and `source`.
    pub fn create(record: InputRecord) -> Self {
        let mut properties = FeatureProperties::from(record.properties);
        properties.street = dedup_by_display(properties.street);
        Self {
            action: Action::Create,
            kind: FeatureKind::Feature,
            id: None,
            version: None,
            properties,
            geometry: record.geometry,
        }
    }

    /// A modify feature targeting the record identified by `key`.
    pub fn modify(key: &GroupKey, mut properties: FeatureProperties) -> Self {
        properties.street = dedup_by_display(properties.street);
        Self {
            action: Action::Modify,
            kind: FeatureKind::Feature,
            id: Some(key.id),
            version: Some(key.version),
            properties,
            geometry: key.geometry,
        }
    }
}
