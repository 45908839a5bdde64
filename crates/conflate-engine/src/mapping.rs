//! Mapping functions that adapt source-specific input to [`InputRecord`]s.

use std::sync::Arc;

use conflate_types::{Context, InputRecord, Point, StreetName};
use serde_json::Value;

use crate::error::RecordError;

/// Names accepted by [`lookup`].
pub const BUILTIN_MAPPERS: &[&str] = &["openaddresses"];

/// Transforms a raw decoded line into an [`InputRecord`].
///
/// `Ok(None)` marks the record as non-actionable; it is dropped silently.
pub trait Mapper: Send + Sync {
    fn name(&self) -> &'static str;

    fn map(&self, raw: Value, context: &Context) -> Result<Option<InputRecord>, RecordError>;
}

pub fn lookup(name: &str) -> Option<Arc<dyn Mapper>> {
    match name {
        "openaddresses" => Some(Arc::new(OpenAddresses)),
        _ => None,
    }
}

/// OpenAddresses GeoJSON features with a plain-string `street`.
pub struct OpenAddresses;

const OPENADDRESSES_SOURCE: &str = "openaddresses";

impl Mapper for OpenAddresses {
    fn name(&self) -> &'static str {
        "openaddresses"
    }

    fn map(&self, raw: Value, context: &Context) -> Result<Option<InputRecord>, RecordError> {
        let Value::Object(mut feature) = raw else {
            return Err(RecordError::Mapping("feature is not a JSON object".into()));
        };
        let Some(Value::Object(props)) = feature.remove("properties") else {
            return Err(RecordError::Mapping("missing properties object".into()));
        };

        if let (Some(expected), Some(Value::String(actual))) = (&context.country, props.get("country")) {
            if !expected.eq_ignore_ascii_case(actual) {
                return Ok(None);
            }
        }

        let number = match props.get("number") {
            Some(Value::String(s)) => s.trim().to_string(),
            Some(Value::Number(n)) => n.to_string(),
            _ => String::new(),
        };
        if number.is_empty() {
            return Ok(None);
        }

        let street = match props.get("street") {
            Some(Value::String(s)) if !s.trim().is_empty() => vec![StreetName::new(s.trim(), 0)],
            Some(list @ Value::Array(_)) => serde_json::from_value::<Vec<StreetName>>(list.clone())
                .map_err(|e| RecordError::Mapping(format!("street: {e}")))?,
            _ => Vec::new(),
        };
        if street.is_empty() {
            return Ok(None);
        }

        let geometry: Point = match feature.remove("geometry") {
            Some(g) => serde_json::from_value(g).map_err(|e| RecordError::Mapping(format!("geometry: {e}")))?,
            None => return Err(RecordError::Mapping("missing geometry".into())),
        };

        let source = match props.get("source") {
            Some(Value::String(s)) if !s.is_empty() => s.clone(),
            _ => OPENADDRESSES_SOURCE.to_string(),
        };

        Ok(Some(InputRecord::new(number, street, geometry).with_source(source)))
    }
}
