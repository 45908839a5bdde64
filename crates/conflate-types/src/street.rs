use std::collections::HashSet;

use serde::{Deserialize, Serialize};

/// A single street name attached to an address.
///
/// `display` is the human-facing spelling; matching never compares it
/// directly but goes through the tokenizer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreetName {
    pub display: String,
    pub priority: i64,
}

impl StreetName {
    pub fn new(display: impl Into<String>, priority: i64) -> Self {
        Self {
            display: display.into(),
            priority,
        }
    }
}

/// Remove entries whose display string was already seen.
///
/// First occurrence wins and the relative order of survivors is kept.
pub fn dedup_by_display(names: Vec<StreetName>) -> Vec<StreetName> {
    let mut seen = HashSet::new();
    names
        .into_iter()
        .filter(|n| seen.insert(n.display.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dedup_keeps_first_occurrence() {
        let names = vec![
            StreetName::new("Main St", 1),
            StreetName::new("Main Street", 0),
            StreetName::new("Main St", 0),
        ];
        let out = dedup_by_display(names);
        assert_eq!(
            out,
            vec![StreetName::new("Main St", 1), StreetName::new("Main Street", 0)]
        );
    }

    #[test]
    fn dedup_is_case_sensitive() {
        let out = dedup_by_display(vec![StreetName::new("Main", 0), StreetName::new("MAIN", 0)]);
        assert_eq!(out.len(), 2);
    }
}
