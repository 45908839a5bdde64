use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::TypeError;
use crate::geometry::Point;
use crate::street::StreetName;

/// Properties of an incoming candidate address.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InputProperties {
    pub number: String,
    pub street: Vec<StreetName>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

/// A candidate address read from the input stream.
///
/// Created and consumed per input line; never persisted.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InputRecord {
    pub properties: InputProperties,
    pub geometry: Point,
}

impl InputRecord {
    pub fn new(number: impl Into<String>, street: Vec<StreetName>, geometry: Point) -> Self {
        Self {
            properties: InputProperties {
                number: number.into(),
                street,
                source: None,
            },
            geometry,
        }
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.properties.source = Some(source.into());
        self
    }

    /// Decode a single GeoJSON feature and validate it.
    pub fn from_json(line: &str) -> Result<Self, TypeError> {
        let record: InputRecord =
            serde_json::from_str(line).map_err(|e| TypeError::Serialization(e.to_string()))?;
        record.validate()?;
        Ok(record)
    }

    /// Check the properties the decision algorithm relies on.
    pub fn validate(&self) -> Result<(), TypeError> {
        if self.properties.number.trim().is_empty() {
            return Err(TypeError::MissingProperty("number"));
        }
        if self.properties.street.is_empty() {
            return Err(TypeError::MissingProperty("street"));
        }
        Ok(())
    }
}

/// Feature properties as stored in the persistent store and emitted downstream.
///
/// Keys other than `number`, `street` and `source` are carried through
/// untouched in `extra`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct FeatureProperties {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub number: Option<String>,
    #[serde(default)]
    pub street: Vec<StreetName>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl FeatureProperties {
    pub fn with_street(street: Vec<StreetName>) -> Self {
        Self {
            street,
            ..Default::default()
        }
    }
}

impl From<InputProperties> for FeatureProperties {
    fn from(p: InputProperties) -> Self {
        Self {
            number: Some(p.number),
            street: p.street,
            source: p.source,
            extra: Map::new(),
        }
    }
}

/// An address entity already present in the persistent store.
///
/// Read-only to the conflation engine.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct KnownRecord {
    pub id: i64,
    pub version: i64,
    pub properties: FeatureProperties,
    pub geometry: Point,
}

impl KnownRecord {
    /// Decode a persistent-corpus feature line.
    pub fn from_json(line: &str) -> Result<Self, TypeError> {
        let record: KnownRecord =
            serde_json::from_str(line).map_err(|e| TypeError::Serialization(e.to_string()))?;
        if record.properties.number.as_deref().map_or(true, |n| n.trim().is_empty()) {
            return Err(TypeError::MissingProperty("number"));
        }
        Ok(record)
    }
}
