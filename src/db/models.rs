//! Database Models - structs representing database tables (used by sqlx/serde).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A named, independently editable block of the public page.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct ContentSection {
    pub section_key: String,
    pub content: serde_json::Value,
    pub sort_order: i32,
    pub is_visible: bool,
    pub updated_at: DateTime<Utc>,
}

/// Append-only snapshot of a section write.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct ContentHistoryEntry {
    pub id: i64,
    pub section_key: String,
    pub content: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// History list item: id and timestamp only, to keep list payloads small.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct HistorySummary {
    pub id: i64,
    pub created_at: DateTime<Utc>,
}

/// Portfolio project row.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Project {
    pub id: i64,
    pub title: String,
    pub tagline: Option<String>,
    pub challenge: Option<String>,
    pub solution: Option<String>,
    pub impact: serde_json::Value,
    pub technologies: serde_json::Value,
    pub category: String,
    pub icon_name: Option<String>,
    pub year: Option<i32>,
    pub link: Option<String>,
    pub project_url: Option<String>,
    pub thumbnail_url: Option<String>,
    pub snapshot_url: Option<String>,
    pub has_snapshot: bool,
    pub sort_order: i32,
    pub is_visible: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Append-only snapshot of a project write.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct ProjectHistoryEntry {
    pub id: i64,
    pub project_id: i64,
    pub snapshot: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// Verified credential badge; title/image/issuer come from the scraper.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Badge {
    pub id: i64,
    pub badge_id: String,
    pub sort_order: i32,
    pub title: String,
    pub image_url: String,
    pub issuer: String,
}

/// Singleton branding/SEO configuration (row id = 1).
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct SiteSettings {
    pub id: i32,
    pub site_title: String,
    pub tagline: String,
    pub description: String,
    pub author_name: String,
    pub contact_email: String,
    pub github_url: String,
    pub linkedin_url: String,
    pub resume_url: String,
    pub logo_url: String,
    pub favicon_url: String,
    pub og_image_url: String,
    pub updated_at: DateTime<Utc>,
}

/// Email-gated resume download log, upserted by email.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct ResumeDownload {
    pub id: i64,
    pub email: String,
    pub downloaded_at: DateTime<Utc>,
}
