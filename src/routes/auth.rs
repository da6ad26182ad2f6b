/**
 * Authentication Routes
 * JWT-based admin authentication with register, login, verify, refresh, and
 * logout. Rate limiting for this group is applied as middleware in lib.rs.
 */
use axum::{
    extract::ConnectInfo,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use bcrypt::{hash, verify, DEFAULT_COST};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use rand::distr::{Alphanumeric, SampleString};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::net::SocketAddr;

use crate::db;
use crate::routes::ErrorResponse;

lazy_static::lazy_static! {
    /// JWT secret key from environment
    pub static ref JWT_SECRET: String = std::env::var("JWT_SECRET")
        .unwrap_or_else(|_| "default-jwt-secret-change-in-production".to_string());

    /// Site-owner email. When set, every verified token must carry this
    /// email claim or the request is rejected.
    static ref ADMIN_EMAIL: Option<String> = std::env::var("ADMIN_EMAIL")
        .ok()
        .filter(|s| !s.is_empty());

    /// Fallback credentials for running without a database (local dev).
    static ref ADMIN_PASSWORD_HASH: String = {
        if let Ok(hashed) = std::env::var("ADMIN_HASH_PASSWORD") {
            hashed
        } else if let Ok(plain) = std::env::var("ADMIN_PASSWORD") {
            hash(&plain, DEFAULT_COST).unwrap_or_default()
        } else {
            hash("admin123", DEFAULT_COST).unwrap_or_default()
        }
    };
}

/// Access token expiry in minutes
const ACCESS_TOKEN_EXPIRY_MINUTES: i64 = 15;

/// Refresh token expiry in days
const REFRESH_TOKEN_EXPIRY_DAYS: i64 = 7;

/// JWT Claims structure
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    pub sub: String,
    pub email: String,
    pub role: String,
    pub exp: i64,
    pub iat: i64,
}

/// User info returned to the admin frontend
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct UserInfo {
    pub user_id: String,
    pub email: String,
    pub role: String,
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub success: bool,
    pub user: Option<UserInfo>,
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl LoginResponse {
    fn failure(error: &str) -> Self {
        Self {
            success: false,
            user: None,
            access_token: None,
            refresh_token: None,
            error: Some(error.to_string()),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyResponse {
    pub success: bool,
    pub is_valid: bool,
    pub user: Option<UserInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest {
    pub refresh_token: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshResponse {
    pub success: bool,
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogoutRequest {
    #[serde(default)]
    pub refresh_token: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LogoutResponse {
    pub success: bool,
}

// ============================================================================
// Token helpers
// ============================================================================

fn generate_refresh_token() -> String {
    Alphanumeric.sample_string(&mut rand::rng(), 64)
}

/// Refresh tokens are stored hashed; a leaked table must not yield usable
/// tokens.
fn hash_refresh_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    format!("{:x}", hasher.finalize())
}

fn create_access_token(
    user_id: &str,
    email: &str,
    role: &str,
) -> Result<String, jsonwebtoken::errors::Error> {
    let now = Utc::now();
    let exp = now + Duration::minutes(ACCESS_TOKEN_EXPIRY_MINUTES);

    let claims = Claims {
        sub: user_id.to_string(),
        email: email.to_string(),
        role: role.to_string(),
        exp: exp.timestamp(),
        iat: now.timestamp(),
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(JWT_SECRET.as_bytes()),
    )
}

pub fn verify_access_token(token: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(JWT_SECRET.as_bytes()),
        &Validation::default(),
    )?;
    Ok(token_data.claims)
}

fn extract_bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(|s| s.to_string())
}

/// Admin guard used by every mutating route: requires a valid bearer token,
/// and when ADMIN_EMAIL is configured, the token's email claim must match.
pub fn verify_admin(headers: &HeaderMap) -> Result<Claims, (StatusCode, Json<ErrorResponse>)> {
    let token = extract_bearer_token(headers).ok_or((
        StatusCode::UNAUTHORIZED,
        Json(ErrorResponse::new("Authorization required")),
    ))?;

    let claims = verify_access_token(&token).map_err(|_| {
        (
            StatusCode::UNAUTHORIZED,
            Json(ErrorResponse::new("Invalid or expired token")),
        )
    })?;

    if let Some(owner) = ADMIN_EMAIL.as_deref() {
        if !claims.email.eq_ignore_ascii_case(owner) {
            tracing::warn!(email = %claims.email, "token email does not match site owner");
            return Err((
                StatusCode::UNAUTHORIZED,
                Json(ErrorResponse::new("Not authorized for this site")),
            ));
        }
    }

    Ok(claims)
}

async fn hash_password_blocking(password: String) -> Option<String> {
    // bcrypt is intentionally CPU-intensive; keep the async executor free.
    tokio::task::spawn_blocking(move || hash(&password, DEFAULT_COST))
        .await
        .ok()?
        .ok()
}

async fn verify_password_blocking(password: String, hashed: String) -> bool {
    tokio::task::spawn_blocking(move || verify(&password, &hashed).unwrap_or(false))
        .await
        .unwrap_or(false)
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /api/auth/register
/// Register the first admin user (only works while no admin exists).
pub async fn register(Json(payload): Json<RegisterRequest>) -> axum::response::Response {
    if payload.email.is_empty() || payload.password.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse::new("Email and password are required")),
        )
            .into_response();
    }
    if !payload.email.contains('@') {
        return (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse::new("Invalid email format")),
        )
            .into_response();
    }
    if payload.password.len() < 8 {
        return (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse::new(
                "Password must be at least 8 characters long",
            )),
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

    let existing: Result<(i64,), _> =
        sqlx::query_as("SELECT COUNT(*) FROM admin_users WHERE is_active = $1")
            .bind(true)
            .fetch_one(pool.as_ref())
            .await;
    match existing {
        Ok((count,)) if count > 0 => {
            return (
                StatusCode::FORBIDDEN,
                Json(ErrorResponse::new(
                    "Registration is closed. An admin account already exists.",
                )),
            )
                .into_response();
        }
        Ok(_) => {}
        Err(e) => {
            tracing::error!("Failed to check existing admin users: {}", e);
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse::new("Database error")),
            )
                .into_response();
        }
    }

    let password_hash = match hash_password_blocking(payload.password).await {
        Some(h) => h,
        None => {
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse::new("Failed to process password")),
            )
                .into_response();
        }
    };

    let user_id = uuid::Uuid::new_v4().to_string();
    match sqlx::query(
        r#"
        INSERT INTO admin_users (id, email, password_hash, role, is_active, created_at, updated_at)
        VALUES ($1, $2, $3, 'ADMIN', true, now(), now())
        "#,
    )
    .bind(&user_id)
    .bind(&payload.email)
    .bind(&password_hash)
    .execute(pool.as_ref())
    .await
    {
        Ok(_) => {
            tracing::info!("Admin user registered: {}", payload.email);
            (
                StatusCode::CREATED,
                Json(UserInfo {
                    user_id,
                    email: payload.email,
                    role: "ADMIN".to_string(),
                }),
            )
                .into_response()
        }
        Err(e) => {
            tracing::error!("Failed to create admin user: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse::new("Failed to create account")),
            )
                .into_response()
        }
    }
}

/// POST /api/auth/login
pub async fn login(
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Json(payload): Json<LoginRequest>,
) -> impl IntoResponse {
    let ip = addr.ip().to_string();

    if payload.email.is_empty() || payload.password.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(LoginResponse::failure("Email and password are required")),
        );
    }
    if !payload.email.contains('@') {
        return (
            StatusCode::BAD_REQUEST,
            Json(LoginResponse::failure("Invalid email format")),
        );
    }

    // Authenticate against admin_users when a DB is available; fall back to
    // env-var credentials for local dev without Postgres.
    let (user_id, email, role): (String, String, String) = match db::get_pool() {
        Some(pool) => {
            let row = sqlx::query_as::<_, (String, String, String, String, bool)>(
                r#"SELECT id, email, password_hash, role, is_active
                   FROM admin_users
                   WHERE LOWER(email) = LOWER($1)"#,
            )
            .bind(&payload.email)
            .fetch_optional(pool.as_ref())
            .await;

            match row {
                Ok(Some((id, email, password_hash, role, is_active))) => {
                    if !is_active {
                        return (
                            StatusCode::FORBIDDEN,
                            Json(LoginResponse::failure("Account is disabled.")),
                        );
                    }

                    if !verify_password_blocking(payload.password.clone(), password_hash).await {
                        let _ = sqlx::query(
                            "UPDATE admin_users \
                             SET login_attempts = login_attempts + 1, updated_at = now() \
                             WHERE id = $1",
                        )
                        .bind(&id)
                        .execute(pool.as_ref())
                        .await;
                        tracing::warn!("Failed login attempt for: {}", email);
                        return (
                            StatusCode::UNAUTHORIZED,
                            Json(LoginResponse::failure("Invalid credentials")),
                        );
                    }

                    let _ = sqlx::query(
                        "UPDATE admin_users \
                         SET last_login_at = now(), last_login_ip = $1, \
                             login_attempts = 0, updated_at = now() \
                         WHERE id = $2",
                    )
                    .bind(&ip)
                    .bind(&id)
                    .execute(pool.as_ref())
                    .await;

                    (id, email, role)
                }
                Ok(None) => {
                    tracing::warn!("Login attempt for unknown user: {}", payload.email);
                    return (
                        StatusCode::UNAUTHORIZED,
                        Json(LoginResponse::failure("Invalid credentials")),
                    );
                }
                Err(e) => {
                    tracing::error!("Database error during login: {}", e);
                    return (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        Json(LoginResponse::failure(
                            "Authentication service temporarily unavailable.",
                        )),
                    );
                }
            }
        }
        None => {
            let expected = ADMIN_EMAIL.as_deref().unwrap_or("admin@example.com");
            let email_ok = payload.email.eq_ignore_ascii_case(expected);
            let password_ok =
                verify_password_blocking(payload.password.clone(), ADMIN_PASSWORD_HASH.clone())
                    .await;
            if !email_ok || !password_ok {
                return (
                    StatusCode::UNAUTHORIZED,
                    Json(LoginResponse::failure("Invalid credentials")),
                );
            }
            ("admin-user-id".to_string(), payload.email.clone(), "ADMIN".to_string())
        }
    };

    let access_token = match create_access_token(&user_id, &email, &role) {
        Ok(token) => token,
        Err(e) => {
            tracing::error!("Failed to create access token: {}", e);
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(LoginResponse::failure("Failed to create token")),
            );
        }
    };

    let refresh_token = generate_refresh_token();
    let expires_at = Utc::now() + Duration::days(REFRESH_TOKEN_EXPIRY_DAYS);

    if let Some(pool) = db::get_pool() {
        if let Err(e) = sqlx::query(
            r#"INSERT INTO admin_refresh_tokens (admin_user_id, token_hash, expires_at)
               VALUES ($1, $2, $3)"#,
        )
        .bind(&user_id)
        .bind(hash_refresh_token(&refresh_token))
        .bind(expires_at)
        .execute(pool.as_ref())
        .await
        {
            tracing::error!("Failed to persist refresh token: {}", e);
        }
    }

    tracing::info!("Successful login for user: {}", email);

    (
        StatusCode::OK,
        Json(LoginResponse {
            success: true,
            user: Some(UserInfo {
                user_id,
                email,
                role,
            }),
            access_token: Some(access_token),
            refresh_token: Some(refresh_token),
            error: None,
        }),
    )
}

/// POST /api/auth/verify
pub async fn verify_token(headers: HeaderMap) -> impl IntoResponse {
    match verify_admin(&headers) {
        Ok(claims) => (
            StatusCode::OK,
            Json(VerifyResponse {
                success: true,
                is_valid: true,
                user: Some(UserInfo {
                    user_id: claims.sub,
                    email: claims.email,
                    role: claims.role,
                }),
                error: None,
            }),
        ),
        Err((_, err)) => (
            StatusCode::OK,
            Json(VerifyResponse {
                success: false,
                is_valid: false,
                user: None,
                error: Some(err.0.error),
            }),
        ),
    }
}

/// POST /api/auth/refresh
/// Exchange a refresh token for a new access token, rotating the refresh
/// token in the process.
pub async fn refresh(Json(payload): Json<RefreshRequest>) -> impl IntoResponse {
    if payload.refresh_token.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(RefreshResponse {
                success: false,
                access_token: None,
                refresh_token: None,
                error: Some("Refresh token is required".to_string()),
            }),
        );
    }

    let pool = match db::get_pool() {
        Some(p) => p,
        None => {
            return (
                StatusCode::UNAUTHORIZED,
                Json(RefreshResponse {
                    success: false,
                    access_token: None,
                    refresh_token: None,
                    error: Some("Invalid or expired refresh token".to_string()),
                }),
            );
        }
    };

    let token_hash = hash_refresh_token(&payload.refresh_token);
    let now = Utc::now();

    let row = sqlx::query_as::<_, (String, String, String, chrono::DateTime<Utc>, bool)>(
        r#"SELECT au.id, au.email, au.role, art.expires_at, art.revoked
           FROM admin_refresh_tokens art
           JOIN admin_users au ON au.id = art.admin_user_id
           WHERE art.token_hash = $1"#,
    )
    .bind(&token_hash)
    .fetch_optional(pool.as_ref())
    .await;

    match row {
        Ok(Some((user_id, email, role, expires_at, revoked)))
            if !revoked && expires_at > now =>
        {
            let access_token = match create_access_token(&user_id, &email, &role) {
                Ok(token) => token,
                Err(e) => {
                    tracing::error!("Failed to create access token: {}", e);
                    return (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        Json(RefreshResponse {
                            success: false,
                            access_token: None,
                            refresh_token: None,
                            error: Some("Failed to create token".to_string()),
                        }),
                    );
                }
            };

            let new_refresh_token = generate_refresh_token();
            let new_expires_at = now + Duration::days(REFRESH_TOKEN_EXPIRY_DAYS);

            let _ = sqlx::query(
                "UPDATE admin_refresh_tokens SET revoked = true WHERE token_hash = $1",
            )
            .bind(&token_hash)
            .execute(pool.as_ref())
            .await;
            let _ = sqlx::query(
                r#"INSERT INTO admin_refresh_tokens (admin_user_id, token_hash, expires_at)
                   VALUES ($1, $2, $3)"#,
            )
            .bind(&user_id)
            .bind(hash_refresh_token(&new_refresh_token))
            .bind(new_expires_at)
            .execute(pool.as_ref())
            .await;

            (
                StatusCode::OK,
                Json(RefreshResponse {
                    success: true,
                    access_token: Some(access_token),
                    refresh_token: Some(new_refresh_token),
                    error: None,
                }),
            )
        }
        Ok(_) => (
            StatusCode::UNAUTHORIZED,
            Json(RefreshResponse {
                success: false,
                access_token: None,
                refresh_token: None,
                error: Some("Invalid or expired refresh token".to_string()),
            }),
        ),
        Err(e) => {
            tracing::error!("DB error during token refresh: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(RefreshResponse {
                    success: false,
                    access_token: None,
                    refresh_token: None,
                    error: Some("Authentication service temporarily unavailable.".to_string()),
                }),
            )
        }
    }
}

/// POST /api/auth/logout
/// Revoke refresh tokens. Idempotent; always returns success.
pub async fn logout(headers: HeaderMap, Json(payload): Json<LogoutRequest>) -> impl IntoResponse {
    let pool = db::get_pool();

    if let (Some(refresh_token), Some(p)) = (payload.refresh_token, pool.as_ref()) {
        let _ = sqlx::query("UPDATE admin_refresh_tokens SET revoked = true WHERE token_hash = $1")
            .bind(hash_refresh_token(&refresh_token))
            .execute(p.as_ref())
            .await;
    }

    // A valid access token revokes every refresh token for that user.
    if let Some(token) = extract_bearer_token(&headers) {
        if let (Ok(claims), Some(p)) = (verify_access_token(&token), pool.as_ref()) {
            let _ = sqlx::query(
                "UPDATE admin_refresh_tokens SET revoked = true WHERE admin_user_id = $1",
            )
            .bind(&claims.sub)
            .execute(p.as_ref())
            .await;
        }
    }

    (StatusCode::OK, Json(LogoutResponse { success: true }))
}
