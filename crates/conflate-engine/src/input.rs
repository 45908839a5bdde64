use conflate_types::{Context, InputRecord};
use serde_json::Value;

use crate::error::RecordError;
use crate::mapping::Mapper;

const RECORD_SEPARATOR: char = '\u{1e}';

/// Strip GeoJSONSeq record separators and surrounding whitespace.
///
/// Returns `None` for lines with nothing left to parse.
pub fn clean_line(line: &str) -> Option<&str> {
    let trimmed = line.trim_matches(|c: char| c == RECORD_SEPARATOR || c.is_whitespace());
    (!trimmed.is_empty()).then_some(trimmed)
}

/// Decode one cleaned line into a validated record.
///
/// With a mapper, the raw JSON goes through it first and `Ok(None)` means
/// the mapper found nothing actionable.
pub fn parse_record(
    line: &str,
    mapper: Option<&dyn Mapper>,
    context: &Context,
) -> Result<Option<InputRecord>, RecordError> {
    let record = match mapper {
        Some(mapper) => {
            let raw: Value = serde_json::from_str(line).map_err(|e| RecordError::Parse(e.to_string()))?;
            match mapper.map(raw, context)? {
                Some(record) => record,
                None => return Ok(None),
            }
        }
        None => serde_json::from_str(line).map_err(|e| RecordError::Parse(e.to_string()))?,
    };
    record.validate()?;
    Ok(Some(record))
}
