//! Portfolio CMS Backend - library for app logic and testing

pub mod db;
pub mod logging;
pub mod ratelimit;
pub mod routes;
pub mod validation;

use axum::{
    http::{HeaderValue, Method},
    middleware,
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use tower_http::{
    compression::CompressionLayer, cors::CorsLayer, limit::RequestBodyLimitLayer, trace::TraceLayer,
};

/// Configure CORS from environment variables.
/// Uses ALLOWED_ORIGINS (comma-separated) or FRONTEND_ORIGIN.
/// Falls back to localhost dev origins.
pub fn configure_cors() -> CorsLayer {
    let allowed_origins = std::env::var("ALLOWED_ORIGINS")
        .ok()
        .and_then(|s| {
            let origins: Vec<HeaderValue> = s
                .split(',')
                .filter_map(|origin| origin.trim().parse().ok())
                .collect();
            if origins.is_empty() {
                None
            } else {
                Some(origins)
            }
        })
        .or_else(|| {
            std::env::var("FRONTEND_ORIGIN")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(|origin| vec![origin])
        })
        .unwrap_or_else(|| {
            vec![
                "http://localhost:3000".parse().unwrap(),
                "http://127.0.0.1:3000".parse().unwrap(),
            ]
        });

    CorsLayer::new()
        .allow_origin(allowed_origins)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
        ])
        .allow_headers([
            axum::http::header::CONTENT_TYPE,
            axum::http::header::AUTHORIZATION,
        ])
        .allow_credentials(true)
}

/// Create and configure the application router.
///
/// Three rate-limit tiers: auth endpoints get the strictest window, uploads
/// their own, and everything else under /api the general one. Health probes
/// are never limited.
pub fn create_app() -> Router {
    let cors = configure_cors();
    tracing::info!("CORS configured");

    let auth_routes = Router::new()
        .route("/api/auth/register", post(routes::auth::register))
        .route("/api/auth/login", post(routes::auth::login))
        .route("/api/auth/verify", post(routes::auth::verify_token))
        .route("/api/auth/refresh", post(routes::auth::refresh))
        .route("/api/auth/logout", post(routes::auth::logout))
        .layer(middleware::from_fn(ratelimit::auth_rate_limit));

    let upload_routes = Router::new()
        .route(
            "/api/upload",
            get(routes::upload::list_files).post(routes::upload::upload_file),
        )
        .route(
            "/api/upload/{filename}",
            axum::routing::delete(routes::upload::delete_file),
        )
        // Raise axum's default 2 MB body cap so the handler's own 15 MB
        // check is the one that fires.
        .layer(axum::extract::DefaultBodyLimit::max(16 * 1024 * 1024))
        .layer(middleware::from_fn(ratelimit::upload_rate_limit));

    let api_routes = Router::new()
        .route(
            "/api/sections",
            get(routes::sections::get_section).post(routes::sections::save_section),
        )
        .route(
            "/api/sections/reorder",
            get(routes::sections::list_order).post(routes::sections::reorder_sections),
        )
        .route("/api/history", get(routes::history::get_history))
        .route(
            "/api/history/restore",
            post(routes::history::restore_history),
        )
        .route(
            "/api/projects",
            get(routes::projects::list_projects)
                .post(routes::projects::save_project)
                .put(routes::projects::save_project)
                .delete(routes::projects::delete_project),
        )
        .route(
            "/api/projects/history",
            get(routes::projects::get_project_history),
        )
        .route(
            "/api/projects/restore",
            post(routes::projects::restore_project),
        )
        .route(
            "/api/projects/snapshot",
            post(routes::projects::snapshot_project),
        )
        .route(
            "/api/badges",
            get(routes::badges::list_badges)
                .post(routes::badges::add_badge)
                .put(routes::badges::add_badge)
                .delete(routes::badges::delete_badge)
                .patch(routes::badges::refresh_badges),
        )
        .route(
            "/api/settings",
            get(routes::settings::get_settings).post(routes::settings::save_settings),
        )
        .route("/api/resume/download", post(routes::resume::log_download))
        .route("/api/resume/downloads", get(routes::resume::list_downloads))
        .layer(middleware::from_fn(ratelimit::api_rate_limit));

    let health_routes = Router::new()
        .route("/health", get(routes::health::health_ping))
        .route("/health/detailed", get(routes::health::health_detailed))
        .route("/health/database", get(routes::health::health_database))
        .route("/health/ready", get(routes::health::health_ready));

    Router::new()
        .merge(auth_routes)
        .merge(upload_routes)
        .merge(api_routes)
        .merge(health_routes)
        .layer(logging::middleware::propagate_request_id_layer())
        .layer(middleware::from_fn(logging::middleware::log_request))
        .layer(logging::middleware::request_id_layer())
        .layer(TraceLayer::new_for_http())
        // Compress responses with gzip/br automatically
        .layer(CompressionLayer::new())
        // Body cap sized for the 15 MB upload limit plus multipart overhead
        .layer(RequestBodyLimitLayer::new(16 * 1024 * 1024))
        .layer(cors)
}

/// Run the server (used by main).
pub async fn run() {
    dotenvy::dotenv().ok();

    // Guards MUST be held for the programme's lifetime; dropping them early
    // shuts down background log-writer threads and loses buffered log lines.
    let _log_guards = logging::init();

    routes::health::init_start_time();
    ratelimit::spawn_sweeper();

    // Refuse to start in production with the insecure default JWT secret.
    let environment = std::env::var("ENVIRONMENT").unwrap_or_default();
    if environment == "production" {
        let secret = std::env::var("JWT_SECRET").unwrap_or_default();
        if secret.is_empty() || secret == "default-jwt-secret-change-in-production" {
            panic!(
                "FATAL: JWT_SECRET must be set to a secure, unique value in production. \
                 Refusing to start with the default secret."
            );
        }

        // Warn (don't panic) about default admin credentials in production.
        let admin_email = std::env::var("ADMIN_EMAIL").unwrap_or_default();
        let admin_password_set =
            std::env::var("ADMIN_HASH_PASSWORD").is_ok() || std::env::var("ADMIN_PASSWORD").is_ok();

        if admin_email.is_empty() || admin_email == "admin@example.com" {
            tracing::warn!(
                "SECURITY: ADMIN_EMAIL is using an insecure default. \
                 Set ADMIN_EMAIL env var to a real address before registering."
            );
        }
        if !admin_password_set {
            tracing::warn!(
                "SECURITY: Neither ADMIN_HASH_PASSWORD nor ADMIN_PASSWORD is set. \
                 The fallback default password 'admin123' is insecure. \
                 Set ADMIN_HASH_PASSWORD to a bcrypt hash of a strong password."
            );
        }
    }

    if std::env::var("DATABASE_URL").is_ok() {
        match db::init_pool(None).await {
            Ok(pool) => {
                if let Err(e) = db::run_migrations(&pool).await {
                    tracing::error!("Failed to run database migrations: {}", e);
                }
            }
            Err(e) => {
                tracing::warn!(
                    "Failed to initialize database pool: {}. Continuing without database.",
                    e
                );
            }
        }
    } else {
        tracing::info!("DATABASE_URL not set. Running without database connection.");
    }

    let app = create_app();

    // Bind address is configurable via HOST / PORT env vars, defaulting to
    // 127.0.0.1:3001 so existing dev setups keep working unchanged.
    let host = std::env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(3001);
    let addr: SocketAddr = format!("{}:{}", host, port)
        .parse()
        .expect("Invalid HOST/PORT configuration");
    tracing::info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .expect("Server error");
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::extract::connect_info::MockConnectInfo;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    fn test_app() -> Router {
        create_app().layer(MockConnectInfo(SocketAddr::from(([127, 0, 0, 1], 9000))))
    }

    #[tokio::test]
    async fn test_health_route_is_wired() {
        let req = Request::get("/health").body(Body::empty()).unwrap();
        let res = test_app().oneshot(req).await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_unknown_route_is_404() {
        let req = Request::get("/api/nope").body(Body::empty()).unwrap();
        let res = test_app().oneshot(req).await.unwrap();
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_sections_route_is_wired() {
        let req = Request::get("/api/sections?key=blog")
            .body(Body::empty())
            .unwrap();
        let res = test_app().oneshot(req).await.unwrap();
        // Bad key is rejected by the handler, proving the route is reachable
        // through the middleware stack.
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    }
}
