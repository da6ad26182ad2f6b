/**
 * Section History Routes
 * Append-only snapshots of section writes, plus restore. Restored snapshots
 * are pushed back through the sanitizer before they touch the live table, so
 * a row written under older validation rules cannot smuggle stale markup
 * back in.
 */
use axum::{
    extract::Query,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use serde_json::Value;
use sqlx::PgPool;

use crate::db::{self, guard, models::{ContentHistoryEntry, HistorySummary}};
use crate::routes::auth::verify_admin;
use crate::routes::{ErrorResponse, SuccessResponse};
use crate::validation::{is_allowed_section_key, sanitize_section_content};

/// How many summaries a history listing returns, newest first.
const HISTORY_PAGE_SIZE: i64 = 20;

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub key: Option<String>,
    pub id: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct RestoreRequest {
    pub history_id: i64,
}

/// Record one accepted section write. Called after the live row is updated.
pub async fn append_section_history(
    pool: &PgPool,
    section_key: &str,
    content: &Value,
) -> Result<(), sqlx::Error> {
    guard::query("INSERT INTO content_history (section_key, content) VALUES ($1, $2)")?
        .bind(section_key)
        .bind(content)
        .execute(pool)
        .await?;
    Ok(())
}

/// GET /api/history?key=... | ?id=... (admin)
/// With `key`: the 20 newest snapshot summaries for that section.
/// With `id`: the full stored snapshot.
pub async fn get_history(headers: HeaderMap, Query(query): Query<HistoryQuery>) -> impl IntoResponse {
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

    if let Some(id) = query.id {
        if id <= 0 {
            return (
                StatusCode::BAD_REQUEST,
                Json(ErrorResponse::new("id must be a positive integer")),
            )
                .into_response();
        }

        let entry = match guard::query_as::<ContentHistoryEntry>(
            "SELECT id, section_key, content, created_at FROM content_history WHERE id = $1",
        ) {
            Ok(q) => q.bind(id).fetch_optional(pool.as_ref()).await,
            Err(e) => {
                tracing::error!("history lookup refused by guard: {}", e);
                return (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(ErrorResponse::new("Internal error")),
                )
                    .into_response();
            }
        };

        return match entry {
            Ok(Some(entry)) => (StatusCode::OK, Json(entry)).into_response(),
            Ok(None) => (
                StatusCode::NOT_FOUND,
                Json(ErrorResponse::new("History entry not found")),
            )
                .into_response(),
            Err(e) => {
                tracing::error!("Database error fetching history entry: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(ErrorResponse::new("Database error")),
                )
                    .into_response()
            }
        };
    }

    let key = match query.key {
        Some(ref key) if is_allowed_section_key(key) => key.to_lowercase(),
        Some(_) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(ErrorResponse::new("Invalid section key")),
            )
                .into_response();
        }
        None => {
            return (
                StatusCode::BAD_REQUEST,
                Json(ErrorResponse::new("Either 'key' or 'id' is required")),
            )
                .into_response();
        }
    };

    let rows = match guard::query_as::<HistorySummary>(
        "SELECT id, created_at FROM content_history \
         WHERE section_key = $1 ORDER BY created_at DESC LIMIT $2",
    ) {
        Ok(q) => {
            q.bind(&key)
                .bind(HISTORY_PAGE_SIZE)
                .fetch_all(pool.as_ref())
                .await
        }
        Err(e) => {
            tracing::error!("history list refused by guard: {}", e);
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse::new("Internal error")),
            )
                .into_response();
        }
    };

    match rows {
        Ok(summaries) => (StatusCode::OK, Json(summaries)).into_response(),
        Err(e) => {
            tracing::error!("Database error listing history for '{}': {}", key, e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse::new("Database error")),
            )
                .into_response()
        }
    }
}

/// POST /api/history/restore (admin)
/// Re-sanitize the stored snapshot, write it as the live section content,
/// and append the restore itself as a fresh history row.
pub async fn restore_history(
    headers: HeaderMap,
    Json(payload): Json<RestoreRequest>,
) -> impl IntoResponse {
    if let Err(err) = verify_admin(&headers) {
        return err.into_response();
    }

    if payload.history_id <= 0 {
        return (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse::new("history_id must be a positive integer")),
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

    let entry = match guard::query_as::<ContentHistoryEntry>(
        "SELECT id, section_key, content, created_at FROM content_history WHERE id = $1",
    ) {
        Ok(q) => q.bind(payload.history_id).fetch_optional(pool.as_ref()).await,
        Err(e) => {
            tracing::error!("restore lookup refused by guard: {}", e);
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse::new("Internal error")),
            )
                .into_response();
        }
    };

    let entry = match entry {
        Ok(Some(entry)) => entry,
        Ok(None) => {
            return (
                StatusCode::NOT_FOUND,
                Json(ErrorResponse::new("History entry not found")),
            )
                .into_response();
        }
        Err(e) => {
            tracing::error!("Database error fetching restore snapshot: {}", e);
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse::new("Database error")),
            )
                .into_response();
        }
    };

    // Snapshots go back through the current sanitizer; old rows do not get
    // grandfathered validation rules.
    let content = sanitize_section_content(&entry.content);

    let upsert = match guard::query(
        r#"
        INSERT INTO content_sections (section_key, content, updated_at)
        VALUES ($1, $2, now())
        ON CONFLICT (section_key) DO UPDATE SET
            content = EXCLUDED.content,
            updated_at = now()
        "#,
    ) {
        Ok(q) => q,
        Err(e) => {
            tracing::error!("restore upsert refused by guard: {}", e);
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse::new("Internal error")),
            )
                .into_response();
        }
    };

    if let Err(e) = upsert
        .bind(&entry.section_key)
        .bind(&content)
        .execute(pool.as_ref())
        .await
    {
        tracing::error!("Failed to restore section '{}': {}", entry.section_key, e);
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorResponse::new("Failed to restore section")),
        )
            .into_response();
    }

    if let Err(e) = append_section_history(pool.as_ref(), &entry.section_key, &content).await {
        tracing::error!("Failed to append restore history: {}", e);
    }

    (StatusCode::OK, Json(SuccessResponse { success: true })).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use axum::routing::{get, post};
    use axum::Router;
    use tower::ServiceExt;

    fn history_router() -> Router {
        Router::new()
            .route("/api/history", get(get_history))
            .route("/api/history/restore", post(restore_history))
    }

    async fn send(app: Router, req: Request<Body>) -> StatusCode {
        app.oneshot(req).await.unwrap().status()
    }

    #[tokio::test]
    async fn test_history_requires_auth() {
        let req = Request::get("/api/history?key=hero")
            .body(Body::empty())
            .unwrap();
        assert_eq!(send(history_router(), req).await, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_restore_requires_auth() {
        let req = Request::post("/api/history/restore")
            .header("content-type", "application/json")
            .body(Body::from(r#"{"history_id":1}"#))
            .unwrap();
        assert_eq!(send(history_router(), req).await, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_restore_rejects_malformed_body() {
        let req = Request::post("/api/history/restore")
            .header("content-type", "application/json")
            .body(Body::from(r#"{"history_id":"not-a-number"}"#))
            .unwrap();
        let status = send(history_router(), req).await;
        // Body deserialization runs before the handler, so a bad payload
        // never reaches the auth check.
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    }
}
