/**
 * Resume Download Routes
 * Email-gated resume download log. One row per email; repeat downloads only
 * bump the timestamp, so the table doubles as a de-duplicated lead list.
 */
use axum::{
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::db::{self, guard, models::ResumeDownload};
use crate::routes::auth::verify_admin;
use crate::routes::ErrorResponse;

lazy_static! {
    // Deliberately loose: local@domain.tld with no spaces.
    static ref EMAIL_REGEX: Regex = Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").unwrap();
}

#[derive(Debug, Deserialize)]
pub struct DownloadRequest {
    pub email: String,
}

#[derive(Debug, Serialize)]
pub struct DownloadResponse {
    pub success: bool,
    pub resume_url: String,
}

pub fn is_valid_email(email: &str) -> bool {
    let email = email.trim();
    !email.is_empty() && email.len() <= 254 && EMAIL_REGEX.is_match(email)
}

/// POST /api/resume/download
/// Log the email (upsert keyed on it) and hand back the resume URL from site
/// settings.
pub async fn log_download(Json(payload): Json<DownloadRequest>) -> impl IntoResponse {
    let email = payload.email.trim().to_lowercase();
    if !is_valid_email(&email) {
        return (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse::new("A valid email address is required")),
        )
            .into_response();
    }

    let pool = match db::get_pool() {
        Some(p) => p,
        None => {
            return (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(ErrorResponse::new("Database not available")),
            )
                .into_response();
        }
    };

    let upsert = match guard::query(
        r#"
        INSERT INTO resume_downloads (email) VALUES ($1)
        ON CONFLICT (email) DO UPDATE SET downloaded_at = now()
        "#,
    ) {
        Ok(q) => q,
        Err(e) => {
            tracing::error!("resume log refused by guard: {}", e);
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse::new("Internal error")),
            )
                .into_response();
        }
    };

    if let Err(e) = upsert.bind(&email).execute(pool.as_ref()).await {
        tracing::error!("Database error logging resume download: {}", e);
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorResponse::new("Failed to log download")),
        )
            .into_response();
    }

    let resume_url = match guard::query_as::<(String,)>(
        "SELECT resume_url FROM site_settings WHERE id = $1",
    ) {
        Ok(q) => q
            .bind(1i32)
            .fetch_optional(pool.as_ref())
            .await
            .ok()
            .flatten()
            .map(|(url,)| url)
            .unwrap_or_default(),
        Err(e) => {
            tracing::error!("resume url lookup refused by guard: {}", e);
            String::new()
        }
    };

    (
        StatusCode::OK,
        Json(DownloadResponse {
            success: true,
            resume_url,
        }),
    )
        .into_response()
}

/// GET /api/resume/downloads (admin)
/// Newest-first download log.
pub async fn list_downloads(headers: HeaderMap) -> impl IntoResponse {
    if let Err(err) = verify_admin(&headers) {
        return err.into_response();
    }

    let pool = match db::get_pool() {
        Some(p) => p,
        None => {
            return (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(ErrorResponse::new("Database not available")),
            )
                .into_response();
        }
    };

    let rows = match guard::query_as::<ResumeDownload>(
        "SELECT id, email, downloaded_at FROM resume_downloads \
         ORDER BY downloaded_at DESC LIMIT $1",
    ) {
        Ok(q) => q.bind(1000i64).fetch_all(pool.as_ref()).await,
        Err(e) => {
            tracing::error!("download list refused by guard: {}", e);
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse::new("Internal error")),
            )
                .into_response();
        }
    };

    match rows {
        Ok(downloads) => (StatusCode::OK, Json(downloads)).into_response(),
        Err(e) => {
            tracing::error!("Database error listing resume downloads: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse::new("Database error")),
            )
                .into_response()
        }
    }
}
