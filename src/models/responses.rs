use serde::{Deserialize, Serialize};
use crate::models::domain::LookupResult;

/// Response for the JSON lookup endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LookupResponse {
    pub server: String,
    pub query: String,
    #[serde(rename = "markupStyle")]
    pub markup_style: String,
    pub cached: bool,
    pub result: LookupResult,
}

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

/// Error response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    pub status_code: u16,
}
