use serde::{Deserialize, Serialize};
use validator::Validate;

/// Query string of the index page
///
/// `define` only needs to be present; its value is ignored.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct IndexQuery {
    #[validate(length(max = 256))]
    pub q: Option<String>,
    #[validate(length(min = 1, max = 64))]
    pub db: Option<String>,
    #[validate(length(min = 1, max = 64))]
    pub strategy: Option<String>,
    pub server: Option<String>,
    pub define: Option<String>,
}

/// Query string of the JSON lookup endpoint
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct LookupRequest {
    #[validate(length(min = 1, max = 256))]
    pub q: String,
    #[serde(default = "default_database")]
    #[validate(length(min = 1, max = 64))]
    pub db: String,
    #[serde(default = "default_strategy")]
    #[validate(length(min = 1, max = 64))]
    pub strategy: String,
    pub server: Option<String>,
    #[serde(default)]
    pub define: bool,
}

fn default_database() -> String {
    "*".to_string()
}

fn default_strategy() -> String {
    ".".to_string()
}
