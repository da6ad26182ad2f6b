/**
 * Project Routes
 * CRUD over portfolio projects. Create and update share one validated
 * payload shape; every accepted write appends a snapshot to project_history,
 * and restore replays a snapshot through the validator before it touches the
 * live row.
 */
use axum::{
    extract::Query,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sqlx::PgPool;

use crate::db::{self, guard, models::{HistorySummary, Project, ProjectHistoryEntry}};
use crate::routes::auth::verify_admin;
use crate::routes::{ErrorResponse, SuccessResponse, HTTP_CLIENT};
use crate::validation::{extract_project_restore, parse_positive_id, validate_project_input};

const PROJECT_COLUMNS: &str = "id, title, tagline, challenge, solution, impact, technologies, \
     category, icon_name, year, link, project_url, thumbnail_url, snapshot_url, has_snapshot, \
     sort_order, is_visible, created_at, updated_at";

/// Hard ceiling on list queries. A personal portfolio never approaches this.
const PROJECT_LIST_LIMIT: i64 = 500;

#[derive(Debug, Deserialize)]
pub struct IdQuery {
    pub id: String,
}

#[derive(Debug, Deserialize)]
pub struct ProjectHistoryQuery {
    #[serde(rename = "projectId")]
    pub project_id: Option<i64>,
    pub id: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct RestoreRequest {
    pub history_id: i64,
}

#[derive(Debug, Deserialize)]
pub struct SnapshotRequest {
    pub id: i64,
}

#[derive(Debug, Serialize)]
pub struct SnapshotResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snapshot_url: Option<String>,
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
// Field merging
// ============================================================================

fn merge_text(map: &Map<String, Value>, field: &str, slot: &mut Option<String>) {
    if let Some(Value::String(s)) = map.get(field) {
        *slot = Some(s.clone());
    }
}

/// URL fields use the empty string as an explicit "clear" marker.
fn merge_url(map: &Map<String, Value>, field: &str, slot: &mut Option<String>) {
    if let Some(Value::String(s)) = map.get(field) {
        *slot = if s.is_empty() { None } else { Some(s.clone()) };
    }
}

/// Apply a validated payload onto a project row. Only fields the validator
/// emitted are touched.
fn apply_fields(map: &Map<String, Value>, row: &mut Project) {
    if let Some(Value::String(s)) = map.get("title") {
        row.title = s.clone();
    }
    merge_text(map, "tagline", &mut row.tagline);
    merge_text(map, "challenge", &mut row.challenge);
    merge_text(map, "solution", &mut row.solution);
    if let Some(v @ Value::Array(_)) = map.get("impact") {
        row.impact = v.clone();
    }
    if let Some(v @ Value::Array(_)) = map.get("technologies") {
        row.technologies = v.clone();
    }
    if let Some(Value::String(s)) = map.get("category") {
        row.category = s.clone();
    }
    merge_text(map, "icon_name", &mut row.icon_name);
    if let Some(year) = map.get("year").and_then(Value::as_i64) {
        row.year = Some(year as i32);
    }
    merge_url(map, "link", &mut row.link);
    merge_url(map, "project_url", &mut row.project_url);
    merge_url(map, "thumbnail_url", &mut row.thumbnail_url);
    if let Some(order) = map.get("sort_order").and_then(Value::as_i64) {
        row.sort_order = order as i32;
    }
    if let Some(Value::Bool(b)) = map.get("is_visible") {
        row.is_visible = *b;
    }
}

async fn fetch_project(pool: &PgPool, id: i64) -> Result<Option<Project>, sqlx::Error> {
    let sql = format!("SELECT {} FROM projects WHERE id = $1", PROJECT_COLUMNS);
    guard::query_as::<Project>(&sql)?
        .bind(id)
        .fetch_optional(pool)
        .await
}

/// Record one accepted project write. The snapshot is the full row as stored.
async fn append_project_history(pool: &PgPool, project: &Project) -> Result<(), sqlx::Error> {
    let snapshot = serde_json::to_value(project)
        .map_err(|e| sqlx::Error::Protocol(format!("snapshot serialization failed: {}", e)))?;
    guard::query("INSERT INTO project_history (project_id, snapshot) VALUES ($1, $2)")?
        .bind(project.id)
        .bind(snapshot)
        .execute(pool)
        .await?;
    Ok(())
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /api/projects
/// Public callers see visible projects only; a valid admin token widens the
/// listing to every row.
pub async fn list_projects(headers: HeaderMap) -> impl IntoResponse {
    let pool = match db::get_pool() {
        Some(p) => p,
        None => return db_unavailable(),
    };

    let is_admin = verify_admin(&headers).is_ok();

    let rows = if is_admin {
        match guard::query_as::<Project>(&format!(
            "SELECT {} FROM projects ORDER BY sort_order, id LIMIT $1",
            PROJECT_COLUMNS
        )) {
            Ok(q) => q.bind(PROJECT_LIST_LIMIT).fetch_all(pool.as_ref()).await,
            Err(e) => {
                tracing::error!("project list refused by guard: {}", e);
                return internal("Internal error");
            }
        }
    } else {
        match guard::query_as::<Project>(&format!(
            "SELECT {} FROM projects WHERE is_visible = $1 ORDER BY sort_order, id LIMIT $2",
            PROJECT_COLUMNS
        )) {
            Ok(q) => {
                q.bind(true)
                    .bind(PROJECT_LIST_LIMIT)
                    .fetch_all(pool.as_ref())
                    .await
            }
            Err(e) => {
                tracing::error!("project list refused by guard: {}", e);
                return internal("Internal error");
            }
        }
    };

    match rows {
        Ok(projects) => (StatusCode::OK, Json(projects)).into_response(),
        Err(e) => {
            tracing::error!("Database error listing projects: {}", e);
            internal("Database error")
        }
    }
}

/// POST /api/projects (admin)
/// Create (no `id` in the body) or update (`id` present). Validation failures
/// come back as one 400 with the aggregated error list.
pub async fn save_project(headers: HeaderMap, Json(payload): Json<Value>) -> impl IntoResponse {
    if let Err(err) = verify_admin(&headers) {
        return err.into_response();
    }

    let validated = validate_project_input(&payload);
    if !validated.is_valid() {
        return (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse::with_details(
                "Validation failed",
                validated.errors,
            )),
        )
            .into_response();
    }
    let fields = validated.sanitized;

    let pool = match db::get_pool() {
        Some(p) => p,
        None => return db_unavailable(),
    };

    let saved = if let Some(id) = fields.get("id").and_then(Value::as_i64) {
        // Update: merge the payload onto the stored row, then write every
        // column back so the statement stays static.
        let mut row = match fetch_project(pool.as_ref(), id).await {
            Ok(Some(row)) => row,
            Ok(None) => {
                return (
                    StatusCode::NOT_FOUND,
                    Json(ErrorResponse::new("Project not found")),
                )
                    .into_response();
            }
            Err(e) => {
                tracing::error!("Database error fetching project {}: {}", id, e);
                return internal("Database error");
            }
        };
        apply_fields(&fields, &mut row);

        let sql = format!(
            r#"
            UPDATE projects SET
                title = $1, tagline = $2, challenge = $3, solution = $4,
                impact = $5, technologies = $6, category = $7, icon_name = $8,
                year = $9, link = $10, project_url = $11, thumbnail_url = $12,
                sort_order = $13, is_visible = $14, updated_at = now()
            WHERE id = $15
            RETURNING {}
            "#,
            PROJECT_COLUMNS
        );
        let update = match guard::query_as::<Project>(&sql) {
            Ok(q) => q,
            Err(e) => {
                tracing::error!("project update refused by guard: {}", e);
                return internal("Internal error");
            }
        };

        update
            .bind(&row.title)
            .bind(&row.tagline)
            .bind(&row.challenge)
            .bind(&row.solution)
            .bind(&row.impact)
            .bind(&row.technologies)
            .bind(&row.category)
            .bind(&row.icon_name)
            .bind(row.year)
            .bind(&row.link)
            .bind(&row.project_url)
            .bind(&row.thumbnail_url)
            .bind(row.sort_order)
            .bind(row.is_visible)
            .bind(row.id)
            .fetch_one(pool.as_ref())
            .await
    } else {
        let title = match fields.get("title").and_then(Value::as_str) {
            Some(t) if !t.trim().is_empty() => t.to_string(),
            _ => {
                return (
                    StatusCode::BAD_REQUEST,
                    Json(ErrorResponse::with_details(
                        "Validation failed",
                        vec!["title is required".to_string()],
                    )),
                )
                    .into_response();
            }
        };

        let sql = format!(
            r#"
            INSERT INTO projects
                (title, tagline, challenge, solution, impact, technologies,
                 category, icon_name, year, link, project_url, thumbnail_url,
                 sort_order, is_visible)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            RETURNING {}
            "#,
            PROJECT_COLUMNS
        );
        let insert = match guard::query_as::<Project>(&sql) {
            Ok(q) => q,
            Err(e) => {
                tracing::error!("project insert refused by guard: {}", e);
                return internal("Internal error");
            }
        };

        insert
            .bind(&title)
            .bind(fields.get("tagline").and_then(Value::as_str))
            .bind(fields.get("challenge").and_then(Value::as_str))
            .bind(fields.get("solution").and_then(Value::as_str))
            .bind(fields.get("impact").cloned().unwrap_or_else(|| Value::Array(vec![])))
            .bind(
                fields
                    .get("technologies")
                    .cloned()
                    .unwrap_or_else(|| Value::Array(vec![])),
            )
            .bind(fields.get("category").and_then(Value::as_str).unwrap_or("other"))
            .bind(fields.get("icon_name").and_then(Value::as_str))
            .bind(fields.get("year").and_then(Value::as_i64).map(|y| y as i32))
            .bind(fields.get("link").and_then(Value::as_str).filter(|s| !s.is_empty()))
            .bind(
                fields
                    .get("project_url")
                    .and_then(Value::as_str)
                    .filter(|s| !s.is_empty()),
            )
            .bind(
                fields
                    .get("thumbnail_url")
                    .and_then(Value::as_str)
                    .filter(|s| !s.is_empty()),
            )
            .bind(
                fields
                    .get("sort_order")
                    .and_then(Value::as_i64)
                    .map(|o| o as i32)
                    .unwrap_or(0),
            )
            .bind(
                fields
                    .get("is_visible")
                    .and_then(Value::as_bool)
                    .unwrap_or(true),
            )
            .fetch_one(pool.as_ref())
            .await
    };

    match saved {
        Ok(project) => {
            if let Err(e) = append_project_history(pool.as_ref(), &project).await {
                tracing::error!("Failed to append project history: {}", e);
            }
            (StatusCode::OK, Json(project)).into_response()
        }
        Err(e) => {
            tracing::error!("Database error saving project: {}", e);
            internal("Failed to save project")
        }
    }
}

/// DELETE /api/projects?id=... (admin)
/// History rows cascade with the project.
pub async fn delete_project(headers: HeaderMap, Query(query): Query<IdQuery>) -> impl IntoResponse {
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

    let result = match guard::query("DELETE FROM projects WHERE id = $1") {
        Ok(q) => q.bind(id).execute(pool.as_ref()).await,
        Err(e) => {
            tracing::error!("project delete refused by guard: {}", e);
            return internal("Internal error");
        }
    };

    match result {
        Ok(done) if done.rows_affected() > 0 => {
            (StatusCode::OK, Json(SuccessResponse { success: true })).into_response()
        }
        Ok(_) => (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse::new("Project not found")),
        )
            .into_response(),
        Err(e) => {
            tracing::error!("Database error deleting project {}: {}", id, e);
            internal("Failed to delete project")
        }
    }
}

/// GET /api/projects/history?projectId=... | ?id=... (admin)
pub async fn get_project_history(
    headers: HeaderMap,
    Query(query): Query<ProjectHistoryQuery>,
) -> impl IntoResponse {
    if let Err(err) = verify_admin(&headers) {
        return err.into_response();
    }

    let pool = match db::get_pool() {
        Some(p) => p,
        None => return db_unavailable(),
    };

    if let Some(id) = query.id {
        if id <= 0 {
            return (
                StatusCode::BAD_REQUEST,
                Json(ErrorResponse::new("id must be a positive integer")),
            )
                .into_response();
        }
        let entry = match guard::query_as::<ProjectHistoryEntry>(
            "SELECT id, project_id, snapshot, created_at FROM project_history WHERE id = $1",
        ) {
            Ok(q) => q.bind(id).fetch_optional(pool.as_ref()).await,
            Err(e) => {
                tracing::error!("project history lookup refused by guard: {}", e);
                return internal("Internal error");
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
                tracing::error!("Database error fetching project history entry: {}", e);
                internal("Database error")
            }
        };
    }

    let project_id = match query.project_id {
        Some(id) if id > 0 => id,
        Some(_) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(ErrorResponse::new("projectId must be a positive integer")),
            )
                .into_response();
        }
        None => {
            return (
                StatusCode::BAD_REQUEST,
                Json(ErrorResponse::new("Either 'projectId' or 'id' is required")),
            )
                .into_response();
        }
    };

    let rows = match guard::query_as::<HistorySummary>(
        "SELECT id, created_at FROM project_history \
         WHERE project_id = $1 ORDER BY created_at DESC LIMIT $2",
    ) {
        Ok(q) => q.bind(project_id).bind(20i64).fetch_all(pool.as_ref()).await,
        Err(e) => {
            tracing::error!("project history list refused by guard: {}", e);
            return internal("Internal error");
        }
    };

    match rows {
        Ok(summaries) => (StatusCode::OK, Json(summaries)).into_response(),
        Err(e) => {
            tracing::error!("Database error listing project history: {}", e);
            internal("Database error")
        }
    }
}

/// POST /api/projects/restore (admin)
/// The snapshot is replayed through the validator and reduced to the restore
/// field allow-list, so layout fields (sort_order, is_visible) and anything
/// unrecognized stay untouched.
pub async fn restore_project(
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
        None => return db_unavailable(),
    };

    let entry = match guard::query_as::<ProjectHistoryEntry>(
        "SELECT id, project_id, snapshot, created_at FROM project_history WHERE id = $1",
    ) {
        Ok(q) => q.bind(payload.history_id).fetch_optional(pool.as_ref()).await,
        Err(e) => {
            tracing::error!("restore lookup refused by guard: {}", e);
            return internal("Internal error");
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
            return internal("Database error");
        }
    };

    let mut row = match fetch_project(pool.as_ref(), entry.project_id).await {
        Ok(Some(row)) => row,
        Ok(None) => {
            return (
                StatusCode::NOT_FOUND,
                Json(ErrorResponse::new("Project not found")),
            )
                .into_response();
        }
        Err(e) => {
            tracing::error!("Database error fetching project for restore: {}", e);
            return internal("Database error");
        }
    };

    let restored = extract_project_restore(&entry.snapshot);
    apply_fields(&restored, &mut row);

    let sql = format!(
        r#"
        UPDATE projects SET
            title = $1, tagline = $2, challenge = $3, solution = $4,
            impact = $5, technologies = $6, category = $7, icon_name = $8,
            year = $9, link = $10, project_url = $11, updated_at = now()
        WHERE id = $12
        RETURNING {}
        "#,
        PROJECT_COLUMNS
    );
    let update = match guard::query_as::<Project>(&sql) {
        Ok(q) => q,
        Err(e) => {
            tracing::error!("project restore refused by guard: {}", e);
            return internal("Internal error");
        }
    };

    let saved = update
        .bind(&row.title)
        .bind(&row.tagline)
        .bind(&row.challenge)
        .bind(&row.solution)
        .bind(&row.impact)
        .bind(&row.technologies)
        .bind(&row.category)
        .bind(&row.icon_name)
        .bind(row.year)
        .bind(&row.link)
        .bind(&row.project_url)
        .bind(row.id)
        .fetch_one(pool.as_ref())
        .await;

    match saved {
        Ok(project) => {
            if let Err(e) = append_project_history(pool.as_ref(), &project).await {
                tracing::error!("Failed to append restore history: {}", e);
            }
            (StatusCode::OK, Json(project)).into_response()
        }
        Err(e) => {
            tracing::error!("Database error restoring project: {}", e);
            internal("Failed to restore project")
        }
    }
}

/// POST /api/projects/snapshot (admin)
/// Best-effort screenshot of the project's live URL via microlink. Upstream
/// failure is reported in the body, never as an error status; the project
/// row is only touched when a screenshot URL actually comes back.
pub async fn snapshot_project(
    headers: HeaderMap,
    Json(payload): Json<SnapshotRequest>,
) -> impl IntoResponse {
    if let Err(err) = verify_admin(&headers) {
        return err.into_response();
    }

    if payload.id <= 0 {
        return (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse::new("id must be a positive integer")),
        )
            .into_response();
    }

    let pool = match db::get_pool() {
        Some(p) => p,
        None => return db_unavailable(),
    };

    let project = match fetch_project(pool.as_ref(), payload.id).await {
        Ok(Some(project)) => project,
        Ok(None) => {
            return (
                StatusCode::NOT_FOUND,
                Json(ErrorResponse::new("Project not found")),
            )
                .into_response();
        }
        Err(e) => {
            tracing::error!("Database error fetching project for snapshot: {}", e);
            return internal("Database error");
        }
    };

    let target = match project.project_url.as_deref().or(project.link.as_deref()) {
        Some(url) => url.to_string(),
        None => {
            return (
                StatusCode::BAD_REQUEST,
                Json(ErrorResponse::new("Project has no URL to snapshot")),
            )
                .into_response();
        }
    };

    let snapshot_url = match fetch_screenshot_url(&target).await {
        Some(url) => url,
        None => {
            tracing::warn!("Screenshot fetch failed for project {}", project.id);
            return (
                StatusCode::OK,
                Json(SnapshotResponse {
                    success: false,
                    snapshot_url: None,
                }),
            )
                .into_response();
        }
    };

    let result = match guard::query(
        "UPDATE projects SET snapshot_url = $1, has_snapshot = $2, updated_at = now() WHERE id = $3",
    ) {
        Ok(q) => {
            q.bind(&snapshot_url)
                .bind(true)
                .bind(project.id)
                .execute(pool.as_ref())
                .await
        }
        Err(e) => {
            tracing::error!("snapshot update refused by guard: {}", e);
            return internal("Internal error");
        }
    };

    match result {
        Ok(_) => (
            StatusCode::OK,
            Json(SnapshotResponse {
                success: true,
                snapshot_url: Some(snapshot_url),
            }),
        )
            .into_response(),
        Err(e) => {
            tracing::error!("Database error saving snapshot URL: {}", e);
            internal("Failed to save snapshot")
        }
    }
}

/// Ask microlink for a screenshot of `target`; None on any failure.
async fn fetch_screenshot_url(target: &str) -> Option<String> {
    let response = HTTP_CLIENT
        .get("https://api.microlink.io/")
        .query(&[("url", target), ("screenshot", "true")])
        .send()
        .await
        .ok()?;

    if !response.status().is_success() {
        return None;
    }

    let body: Value = response.json().await.ok()?;
    body.get("data")?
        .get("screenshot")?
        .get("url")?
        .as_str()
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use axum::routing::{get, post};
    use axum::Router;
    use chrono::Utc;
    use serde_json::json;
    use tower::ServiceExt;

    fn project_router() -> Router {
        Router::new()
            .route(
                "/api/projects",
                get(list_projects).post(save_project).delete(delete_project),
            )
            .route("/api/projects/history", get(get_project_history))
            .route("/api/projects/restore", post(restore_project))
            .route("/api/projects/snapshot", post(snapshot_project))
    }

    async fn send(app: Router, req: Request<Body>) -> StatusCode {
        app.oneshot(req).await.unwrap().status()
    }

    fn sample_project() -> Project {
        Project {
            id: 1,
            title: "Old title".to_string(),
            tagline: Some("Old tagline".to_string()),
            challenge: None,
            solution: None,
            impact: json!([]),
            technologies: json!(["Rust"]),
            category: "web".to_string(),
            icon_name: None,
            year: Some(2020),
            link: Some("https://old.example.com/".to_string()),
            project_url: None,
            thumbnail_url: None,
            snapshot_url: None,
            has_snapshot: false,
            sort_order: 3,
            is_visible: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_apply_fields_merges_only_present_fields() {
        let mut row = sample_project();
        let validated = validate_project_input(&json!({ "title": "New title" }));
        apply_fields(&validated.sanitized, &mut row);
        assert_eq!(row.title, "New title");
        assert_eq!(row.tagline.as_deref(), Some("Old tagline"));
        assert_eq!(row.sort_order, 3);
    }

    #[test]
    fn test_apply_fields_sets_thumbnail_url() {
        let mut row = sample_project();
        let validated = validate_project_input(&json!({
            "thumbnail_url": "https://cdn.example.com/t.png"
        }));
        apply_fields(&validated.sanitized, &mut row);
        assert_eq!(
            row.thumbnail_url.as_deref(),
            Some("https://cdn.example.com/t.png")
        );
    }

    #[test]
    fn test_apply_fields_empty_url_clears_link() {
        let mut row = sample_project();
        let validated = validate_project_input(&json!({ "link": "" }));
        apply_fields(&validated.sanitized, &mut row);
        assert_eq!(row.link, None);
    }

    #[test]
    fn test_apply_fields_restore_skips_layout() {
        let mut row = sample_project();
        let restored = extract_project_restore(&json!({
            "title": "Restored",
            "sort_order": 99,
            "is_visible": false,
        }));
        apply_fields(&restored, &mut row);
        assert_eq!(row.title, "Restored");
        assert_eq!(row.sort_order, 3);
        assert!(row.is_visible);
    }

    #[tokio::test]
    async fn test_save_project_requires_auth() {
        let req = Request::post("/api/projects")
            .header("content-type", "application/json")
            .body(Body::from(r#"{"title":"X"}"#))
            .unwrap();
        assert_eq!(send(project_router(), req).await, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_delete_project_requires_auth() {
        let req = Request::delete("/api/projects?id=1")
            .body(Body::empty())
            .unwrap();
        assert_eq!(send(project_router(), req).await, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_project_history_requires_auth() {
        let req = Request::get("/api/projects/history?projectId=1")
            .body(Body::empty())
            .unwrap();
        assert_eq!(send(project_router(), req).await, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_restore_requires_auth() {
        let req = Request::post("/api/projects/restore")
            .header("content-type", "application/json")
            .body(Body::from(r#"{"history_id":5}"#))
            .unwrap();
        assert_eq!(send(project_router(), req).await, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_snapshot_requires_auth() {
        let req = Request::post("/api/projects/snapshot")
            .header("content-type", "application/json")
            .body(Body::from(r#"{"id":5}"#))
            .unwrap();
        assert_eq!(send(project_router(), req).await, StatusCode::UNAUTHORIZED);
    }
}
