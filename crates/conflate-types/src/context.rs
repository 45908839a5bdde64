use serde::{Deserialize, Serialize};

/// Per-record context handed to mapping functions.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Context {
    /// ISO 3166-1 alpha-2 country code.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    /// ISO 3166-2 region code.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
}

impl Context {
    pub fn new(country: Option<String>, region: Option<String>) -> Self {
        Self { country, region }
    }
}
