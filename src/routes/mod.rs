/**
 * Routes Module
 * API route handlers
 */

pub mod auth;
pub mod badges;
pub mod health;
pub mod history;
pub mod projects;
pub mod resume;
pub mod sections;
pub mod settings;
pub mod upload;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

/// Shared client for outbound requests (badge scraping, screenshots).
pub(crate) static HTTP_CLIENT: Lazy<reqwest::Client> = Lazy::new(|| {
    reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(10))
        .user_agent("portfolio-cms-backend/1.0")
        .build()
        .unwrap_or_default()
});

/// Error payload shared by every route. `details` carries the aggregated
/// validation error list on 400 responses.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Vec<String>>,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            details: None,
        }
    }

    pub fn with_details(error: impl Into<String>, details: Vec<String>) -> Self {
        Self {
            error: error.into(),
            details: Some(details),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SuccessResponse {
    pub success: bool,
}
