/**
 * Badge Routes
 * Verified credential badges. Metadata (title, image, issuer) is scraped
 * from the badge page's OpenGraph tags; a badge id is validated as
 * alphanumeric before it is ever interpolated into the outbound URL.
 */
use axum::{
    extract::Query,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::db::{self, guard, models::Badge};
use crate::routes::auth::verify_admin;
use crate::routes::{ErrorResponse, SuccessResponse, HTTP_CLIENT};
use crate::validation::{is_valid_badge_id, parse_positive_id};

lazy_static! {
    // <meta property="og:x" content="..."> in either attribute order.
    static ref OG_PROP_FIRST: Regex = Regex::new(
        r#"(?i)<meta[^>]*?property\s*=\s*"og:(title|image|site_name)"[^>]*?content\s*=\s*"([^"]*)""#
    )
    .unwrap();
    static ref OG_CONTENT_FIRST: Regex = Regex::new(
        r#"(?i)<meta[^>]*?content\s*=\s*"([^"]*)"[^>]*?property\s*=\s*"og:(title|image|site_name)""#
    )
    .unwrap();
}

/// Scraped OpenGraph metadata. Missing tags degrade to empty strings rather
/// than failing the whole badge.
#[derive(Debug, Default, Clone, PartialEq, Serialize)]
pub struct BadgeMetadata {
    pub title: String,
    pub image_url: String,
    pub issuer: String,
}

#[derive(Debug, Deserialize)]
pub struct AddBadgeRequest {
    pub badge_id: String,
    #[serde(default)]
    pub sort_order: i32,
}

#[derive(Debug, Deserialize)]
pub struct IdQuery {
    pub id: String,
}

#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    pub id: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct RefreshResponse {
    pub refreshed: usize,
    pub failed: usize,
}

fn db_unavailable() -> axum::response::Response {
    (
        StatusCode::SERVICE_UNAVAILABLE,
        Json(ErrorResponse::new("Database not available")),
    )
        .into_response()
}

fn internal(msg: &str) -> axum::response::Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorResponse::new(msg)),
    )
        .into_response()
}

// ============================================================================
// OpenGraph scraping
// ============================================================================

/// Pull og:title / og:image / og:site_name out of an HTML document. The
/// og:title on a credential page reads "<name> was issued to <holder>"; only
/// the part before " was issued to" is kept.
fn parse_og_metadata(html: &str) -> BadgeMetadata {
    let mut meta = BadgeMetadata::default();

    let mut set = |prop: &str, content: &str| {
        let slot = match prop {
            "title" => &mut meta.title,
            "image" => &mut meta.image_url,
            "site_name" => &mut meta.issuer,
            _ => return,
        };
        if slot.is_empty() {
            *slot = content.trim().to_string();
        }
    };

    for caps in OG_PROP_FIRST.captures_iter(html) {
        set(&caps[1].to_ascii_lowercase(), &caps[2]);
    }
    for caps in OG_CONTENT_FIRST.captures_iter(html) {
        set(&caps[2].to_ascii_lowercase(), &caps[1]);
    }

    if let Some(idx) = meta.title.find(" was issued to") {
        meta.title.truncate(idx);
    }

    meta
}

/// Fetch the badge page and scrape its metadata. Any network or parse
/// failure degrades to empty metadata; the caller decides whether empty is
/// acceptable.
pub async fn fetch_badge_metadata(badge_id: &str) -> BadgeMetadata {
    // The id has already passed the alphanumeric check; this is the last
    // line before URL interpolation.
    if !is_valid_badge_id(badge_id) {
        return BadgeMetadata::default();
    }

    let url = format!("https://www.credly.com/badges/{}", badge_id);
    let html = match HTTP_CLIENT.get(&url).send().await {
        Ok(response) if response.status().is_success() => match response.text().await {
            Ok(html) => html,
            Err(e) => {
                tracing::warn!("Failed to read badge page for '{}': {}", badge_id, e);
                return BadgeMetadata::default();
            }
        },
        Ok(response) => {
            tracing::warn!(
                "Badge page for '{}' returned {}",
                badge_id,
                response.status()
            );
            return BadgeMetadata::default();
        }
        Err(e) => {
            tracing::warn!("Failed to fetch badge page for '{}': {}", badge_id, e);
            return BadgeMetadata::default();
        }
    };

    parse_og_metadata(&html)
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /api/badges
pub async fn list_badges() -> impl IntoResponse {
    let pool = match db::get_pool() {
        Some(p) => p,
        None => return db_unavailable(),
    };

    let rows = match guard::query_as::<Badge>(
        "SELECT id, badge_id, sort_order, title, image_url, issuer \
         FROM badges ORDER BY sort_order, id LIMIT $1",
    ) {
        Ok(q) => q.bind(200i64).fetch_all(pool.as_ref()).await,
        Err(e) => {
            tracing::error!("badge list refused by guard: {}", e);
            return internal("Internal error");
        }
    };

    match rows {
        Ok(badges) => (StatusCode::OK, Json(badges)).into_response(),
        Err(e) => {
            tracing::error!("Database error listing badges: {}", e);
            internal("Database error")
        }
    }
}

/// POST /api/badges (admin)
/// Validate the id, scrape metadata, then upsert keyed on badge_id.
pub async fn add_badge(
    headers: HeaderMap,
    Json(payload): Json<AddBadgeRequest>,
) -> impl IntoResponse {
    if let Err(err) = verify_admin(&headers) {
        return err.into_response();
    }

    let badge_id = payload.badge_id.trim();
    if !is_valid_badge_id(badge_id) {
        return (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse::new(
                "badge_id must be alphanumeric (max 100 characters)",
            )),
        )
            .into_response();
    }
    if payload.sort_order < 0 {
        return (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse::new("sort_order must be a non-negative integer")),
        )
            .into_response();
    }

    let pool = match db::get_pool() {
        Some(p) => p,
        None => return db_unavailable(),
    };

    let meta = fetch_badge_metadata(badge_id).await;

    let upsert = match guard::query_as::<Badge>(
        r#"
        INSERT INTO badges (badge_id, sort_order, title, image_url, issuer)
        VALUES ($1, $2, $3, $4, $5)
        ON CONFLICT (badge_id) DO UPDATE SET
            sort_order = EXCLUDED.sort_order,
            title = EXCLUDED.title,
            image_url = EXCLUDED.image_url,
            issuer = EXCLUDED.issuer
        RETURNING id, badge_id, sort_order, title, image_url, issuer
        "#,
    ) {
        Ok(q) => q,
        Err(e) => {
            tracing::error!("badge upsert refused by guard: {}", e);
            return internal("Internal error");
        }
    };

    match upsert
        .bind(badge_id)
        .bind(payload.sort_order)
        .bind(&meta.title)
        .bind(&meta.image_url)
        .bind(&meta.issuer)
        .fetch_one(pool.as_ref())
        .await
    {
        Ok(badge) => (StatusCode::OK, Json(badge)).into_response(),
        Err(e) => {
            tracing::error!("Database error saving badge '{}': {}", badge_id, e);
            internal("Failed to save badge")
        }
    }
}

/// DELETE /api/badges?id=... (admin)
pub async fn delete_badge(headers: HeaderMap, Query(query): Query<IdQuery>) -> impl IntoResponse {
    if let Err(err) = verify_admin(&headers) {
        return err.into_response();
    }

    let id = match parse_positive_id(&query.id) {
        Some(id) => id,
        None => {
            return (
                StatusCode::BAD_REQUEST,
                Json(ErrorResponse::new("id must be a positive integer")),
            )
                .into_response();
        }
    };

    let pool = match db::get_pool() {
        Some(p) => p,
        None => return db_unavailable(),
    };

    let result = match guard::query("DELETE FROM badges WHERE id = $1") {
        Ok(q) => q.bind(id).execute(pool.as_ref()).await,
        Err(e) => {
            tracing::error!("badge delete refused by guard: {}", e);
            return internal("Internal error");
        }
    };

    match result {
        Ok(done) if done.rows_affected() > 0 => {
            (StatusCode::OK, Json(SuccessResponse { success: true })).into_response()
        }
        Ok(_) => (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse::new("Badge not found")),
        )
            .into_response(),
        Err(e) => {
            tracing::error!("Database error deleting badge {}: {}", id, e);
            internal("Failed to delete badge")
        }
    }
}

/// PATCH /api/badges (admin)
/// Re-scrape metadata for one badge (body `{"id": n}`) or for every stored
/// badge (empty body). Scrapes that come back empty leave the stored
/// metadata alone.
pub async fn refresh_badges(
    headers: HeaderMap,
    Json(payload): Json<RefreshRequest>,
) -> impl IntoResponse {
    if let Err(err) = verify_admin(&headers) {
        return err.into_response();
    }

    let pool = match db::get_pool() {
        Some(p) => p,
        None => return db_unavailable(),
    };

    let badges = if let Some(id) = payload.id {
        if id <= 0 {
            return (
                StatusCode::BAD_REQUEST,
                Json(ErrorResponse::new("id must be a positive integer")),
            )
                .into_response();
        }
        match guard::query_as::<Badge>(
            "SELECT id, badge_id, sort_order, title, image_url, issuer \
             FROM badges WHERE id = $1",
        ) {
            Ok(q) => match q.bind(id).fetch_optional(pool.as_ref()).await {
                Ok(Some(badge)) => vec![badge],
                Ok(None) => {
                    return (
                        StatusCode::NOT_FOUND,
                        Json(ErrorResponse::new("Badge not found")),
                    )
                        .into_response();
                }
                Err(e) => {
                    tracing::error!("Database error fetching badge {}: {}", id, e);
                    return internal("Database error");
                }
            },
            Err(e) => {
                tracing::error!("badge lookup refused by guard: {}", e);
                return internal("Internal error");
            }
        }
    } else {
        match guard::query_as::<Badge>(
            "SELECT id, badge_id, sort_order, title, image_url, issuer \
             FROM badges ORDER BY sort_order, id LIMIT $1",
        ) {
            Ok(q) => match q.bind(200i64).fetch_all(pool.as_ref()).await {
                Ok(badges) => badges,
                Err(e) => {
                    tracing::error!("Database error listing badges for refresh: {}", e);
                    return internal("Database error");
                }
            },
            Err(e) => {
                tracing::error!("badge list refused by guard: {}", e);
                return internal("Internal error");
            }
        }
    };

    let mut refreshed = 0usize;
    let mut failed = 0usize;

    for badge in badges {
        let meta = fetch_badge_metadata(&badge.badge_id).await;
        if meta == BadgeMetadata::default() {
            failed += 1;
            continue;
        }

        let update = match guard::query(
            "UPDATE badges SET title = $1, image_url = $2, issuer = $3 WHERE id = $4",
        ) {
            Ok(q) => q,
            Err(e) => {
                tracing::error!("badge refresh refused by guard: {}", e);
                return internal("Internal error");
            }
        };

        match update
            .bind(&meta.title)
            .bind(&meta.image_url)
            .bind(&meta.issuer)
            .bind(badge.id)
            .execute(pool.as_ref())
            .await
        {
            Ok(_) => refreshed += 1,
            Err(e) => {
                tracing::error!("Database error refreshing badge {}: {}", badge.id, e);
                failed += 1;
            }
        }
    }

    (
        StatusCode::OK,
        Json(RefreshResponse { refreshed, failed }),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use axum::routing::get;
    use axum::Router;
    use tower::ServiceExt;

    const CREDLY_SAMPLE: &str = r#"
        <html><head>
        <meta property="og:title" content="Cloud Architect Expert was issued to Jane Doe" />
        <meta property="og:image" content="https://images.credly.com/size/680x680/abc.png" />
        <meta property="og:site_name" content="Credly" />
        </head><body></body></html>
    "#;

    #[test]
    fn test_parse_og_metadata_basic() {
        let meta = parse_og_metadata(CREDLY_SAMPLE);
        assert_eq!(meta.title, "Cloud Architect Expert");
        assert_eq!(
            meta.image_url,
            "https://images.credly.com/size/680x680/abc.png"
        );
        assert_eq!(meta.issuer, "Credly");
    }

    #[test]
    fn test_parse_og_metadata_content_first_attribute_order() {
        let html = r#"<meta content="Reversed Badge" property="og:title">"#;
        let meta = parse_og_metadata(html);
        assert_eq!(meta.title, "Reversed Badge");
    }

    #[test]
    fn test_parse_og_metadata_missing_tags_degrade_to_empty() {
        let meta = parse_og_metadata("<html><head></head></html>");
        assert_eq!(meta, BadgeMetadata::default());
    }

    #[test]
    fn test_parse_og_metadata_title_without_issuance_suffix_kept_whole() {
        let html = r#"<meta property="og:title" content="Plain Title">"#;
        let meta = parse_og_metadata(html);
        assert_eq!(meta.title, "Plain Title");
    }

    #[test]
    fn test_parse_og_metadata_first_occurrence_wins() {
        let html = r#"
            <meta property="og:title" content="First was issued to A">
            <meta property="og:title" content="Second was issued to B">
        "#;
        let meta = parse_og_metadata(html);
        assert_eq!(meta.title, "First");
    }

    fn badge_router() -> Router {
        Router::new()
            .route(
                "/api/badges",
                get(list_badges)
                    .post(add_badge)
                    .delete(delete_badge)
                    .patch(refresh_badges),
            )
    }

    async fn send(app: Router, req: Request<Body>) -> StatusCode {
        app.oneshot(req).await.unwrap().status()
    }

    #[tokio::test]
    async fn test_add_badge_requires_auth() {
        let req = Request::post("/api/badges")
            .header("content-type", "application/json")
            .body(Body::from(r#"{"badge_id":"abc123"}"#))
            .unwrap();
        assert_eq!(send(badge_router(), req).await, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_delete_badge_requires_auth() {
        let req = Request::delete("/api/badges?id=1")
            .body(Body::empty())
            .unwrap();
        assert_eq!(send(badge_router(), req).await, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_refresh_requires_auth() {
        let req = Request::patch("/api/badges")
            .header("content-type", "application/json")
            .body(Body::from("{}"))
            .unwrap();
        assert_eq!(send(badge_router(), req).await, StatusCode::UNAUTHORIZED);
    }
}
