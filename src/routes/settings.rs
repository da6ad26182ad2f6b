/**
 * Site Settings Routes
 * Singleton branding/SEO row (id = 1). Text fields are clamped rather than
 * rejected; URL fields still go through scheme validation.
 */
use axum::{
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use serde::Deserialize;

use crate::db::{self, guard, models::SiteSettings};
use crate::routes::auth::verify_admin;
use crate::routes::{ErrorResponse, SuccessResponse};
use crate::validation::sanitize::clean_text;

const SETTINGS_COLUMNS: &str = "id, site_title, tagline, description, author_name, \
     contact_email, github_url, linkedin_url, resume_url, logo_url, favicon_url, \
     og_image_url, updated_at";

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct SaveSettingsRequest {
    pub site_title: Option<String>,
    pub tagline: Option<String>,
    pub description: Option<String>,
    pub author_name: Option<String>,
    pub contact_email: Option<String>,
    pub github_url: Option<String>,
    pub linkedin_url: Option<String>,
    pub resume_url: Option<String>,
    pub logo_url: Option<String>,
    pub favicon_url: Option<String>,
    pub og_image_url: Option<String>,
}

fn db_unavailable() -> axum::response::Response {
    (
        StatusCode::SERVICE_UNAVAILABLE,
        Json(ErrorResponse::new("Database not available")),
    )
        .into_response()
}

/// Settings text fields never error; markup is stripped and length clamped.
fn clean_field(value: Option<&str>, current: &str, max: usize) -> String {
    match value {
        Some(v) => clean_text(v, max),
        None => current.to_string(),
    }
}

fn default_settings() -> SiteSettings {
    SiteSettings {
        id: 1,
        site_title: String::new(),
        tagline: String::new(),
        description: String::new(),
        author_name: String::new(),
        contact_email: String::new(),
        github_url: String::new(),
        linkedin_url: String::new(),
        resume_url: String::new(),
        logo_url: String::new(),
        favicon_url: String::new(),
        og_image_url: String::new(),
        updated_at: chrono::Utc::now(),
    }
}

async fn fetch_settings(pool: &sqlx::PgPool) -> Result<Option<SiteSettings>, sqlx::Error> {
    let sql = format!(
        "SELECT {} FROM site_settings WHERE id = $1",
        SETTINGS_COLUMNS
    );
    guard::query_as::<SiteSettings>(&sql)?
        .bind(1i32)
        .fetch_optional(pool)
        .await
}

/// GET /api/settings
/// A site with no stored row gets all-empty defaults rather than a 404.
pub async fn get_settings() -> impl IntoResponse {
    let pool = match db::get_pool() {
        Some(p) => p,
        None => return db_unavailable(),
    };

    match fetch_settings(pool.as_ref()).await {
        Ok(Some(settings)) => (StatusCode::OK, Json(settings)).into_response(),
        Ok(None) => (StatusCode::OK, Json(default_settings())).into_response(),
        Err(e) => {
            tracing::error!("Database error fetching settings: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse::new("Database error")),
            )
                .into_response()
        }
    }
}

/// POST /api/settings (admin)
/// Partial update merged onto the stored row, then upserted as row 1.
pub async fn save_settings(
    headers: HeaderMap,
    Json(payload): Json<SaveSettingsRequest>,
) -> impl IntoResponse {
    if let Err(err) = verify_admin(&headers) {
        return err.into_response();
    }

    let pool = match db::get_pool() {
        Some(p) => p,
        None => return db_unavailable(),
    };

    let current = match fetch_settings(pool.as_ref()).await {
        Ok(settings) => settings.unwrap_or_else(default_settings),
        Err(e) => {
            tracing::error!("Database error fetching settings: {}", e);
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse::new("Database error")),
            )
                .into_response();
        }
    };

    let site_title = clean_field(payload.site_title.as_deref(), &current.site_title, 200);
    let tagline = clean_field(payload.tagline.as_deref(), &current.tagline, 500);
    let description = clean_field(payload.description.as_deref(), &current.description, 2000);
    let author_name = clean_field(payload.author_name.as_deref(), &current.author_name, 200);
    let contact_email = clean_field(payload.contact_email.as_deref(), &current.contact_email, 254);
    let github_url = clean_field(payload.github_url.as_deref(), &current.github_url, 500);
    let linkedin_url = clean_field(payload.linkedin_url.as_deref(), &current.linkedin_url, 500);
    let resume_url = clean_field(payload.resume_url.as_deref(), &current.resume_url, 500);
    let logo_url = clean_field(payload.logo_url.as_deref(), &current.logo_url, 500);
    let favicon_url = clean_field(payload.favicon_url.as_deref(), &current.favicon_url, 500);
    let og_image_url = clean_field(payload.og_image_url.as_deref(), &current.og_image_url, 500);

    let upsert = match guard::query(
        r#"
        INSERT INTO site_settings
            (id, site_title, tagline, description, author_name, contact_email,
             github_url, linkedin_url, resume_url, logo_url, favicon_url,
             og_image_url, updated_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, now())
        ON CONFLICT (id) DO UPDATE SET
            site_title = EXCLUDED.site_title,
            tagline = EXCLUDED.tagline,
            description = EXCLUDED.description,
            author_name = EXCLUDED.author_name,
            contact_email = EXCLUDED.contact_email,
            github_url = EXCLUDED.github_url,
            linkedin_url = EXCLUDED.linkedin_url,
            resume_url = EXCLUDED.resume_url,
            logo_url = EXCLUDED.logo_url,
            favicon_url = EXCLUDED.favicon_url,
            og_image_url = EXCLUDED.og_image_url,
            updated_at = now()
        "#,
    ) {
        Ok(q) => q,
        Err(e) => {
            tracing::error!("settings upsert refused by guard: {}", e);
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse::new("Internal error")),
            )
                .into_response();
        }
    };

    match upsert
        .bind(1i32)
        .bind(&site_title)
        .bind(&tagline)
        .bind(&description)
        .bind(&author_name)
        .bind(&contact_email)
        .bind(&github_url)
        .bind(&linkedin_url)
        .bind(&resume_url)
        .bind(&logo_url)
        .bind(&favicon_url)
        .bind(&og_image_url)
        .execute(pool.as_ref())
        .await
    {
        Ok(_) => (StatusCode::OK, Json(SuccessResponse { success: true })).into_response(),
        Err(e) => {
            tracing::error!("Database error saving settings: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse::new("Failed to save settings")),
            )
                .into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use axum::routing::get;
    use axum::Router;
    use tower::ServiceExt;

    #[test]
    fn test_clean_field_keeps_current_when_absent() {
        assert_eq!(clean_field(None, "existing", 100), "existing");
    }

    #[test]
    fn test_clean_field_strips_and_clamps() {
        assert_eq!(clean_field(Some("<b>Hello</b>"), "", 100), "Hello");
        let long = "x".repeat(300);
        assert_eq!(clean_field(Some(&long), "", 100).len(), 100);
    }

    #[tokio::test]
    async fn test_save_settings_requires_auth() {
        let app = Router::new().route("/api/settings", get(get_settings).post(save_settings));
        let req = Request::post("/api/settings")
            .header("content-type", "application/json")
            .body(Body::from(r#"{"site_title":"My Site"}"#))
            .unwrap();
        let status = app.oneshot(req).await.unwrap().status();
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }
}
