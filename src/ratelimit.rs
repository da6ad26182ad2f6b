/**
 * Rate Limiting
 * Fixed-window counters keyed by a best-effort client fingerprint
 * (forwarded IP + base64(user-agent) prefix). Trivially spoofable by forging
 * headers; an accepted limitation for a low-traffic personal site, not a
 * security boundary.
 */
use axum::{
    extract::{ConnectInfo, Request},
    http::{header, HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use chrono::Utc;
use lazy_static::lazy_static;
use std::{collections::HashMap, net::SocketAddr, time::Duration};
use tokio::sync::RwLock;

use crate::routes::ErrorResponse;

#[derive(Debug, Clone, Copy)]
struct WindowEntry {
    count: u32,
    reset_at: i64,
}

/// Result of one limiter check.
#[derive(Debug, Clone, Copy)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub remaining: u32,
    /// Unix timestamp at which the current window ends.
    pub reset_at: i64,
}

/// Fixed-window counter: identifier -> {count, window reset timestamp}.
pub struct FixedWindowLimiter {
    max_requests: u32,
    window_secs: i64,
    entries: RwLock<HashMap<String, WindowEntry>>,
}

impl FixedWindowLimiter {
    pub fn new(max_requests: u32, window_secs: i64) -> Self {
        Self {
            max_requests,
            window_secs,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Count a request against `identifier` and decide whether it may pass.
    /// Once the window has elapsed the counter restarts at 1.
    pub async fn check(&self, identifier: &str) -> RateLimitDecision {
        let now = Utc::now().timestamp();
        let mut entries = self.entries.write().await;

        let entry = entries
            .entry(identifier.to_string())
            .or_insert(WindowEntry {
                count: 0,
                reset_at: now + self.window_secs,
            });

        if now >= entry.reset_at {
            entry.count = 1;
            entry.reset_at = now + self.window_secs;
        } else {
            entry.count += 1;
        }

        RateLimitDecision {
            allowed: entry.count <= self.max_requests,
            remaining: self.max_requests.saturating_sub(entry.count),
            reset_at: entry.reset_at,
        }
    }

    /// Drop entries whose window has already expired, bounding memory to the
    /// set of currently active identifiers.
    pub async fn sweep(&self) {
        let now = Utc::now().timestamp();
        let mut entries = self.entries.write().await;
        entries.retain(|_, entry| entry.reset_at > now);
    }

    #[cfg(test)]
    async fn len(&self) -> usize {
        self.entries.read().await.len()
    }
}

lazy_static! {
    /// Auth endpoints: 10 requests / 15 minutes.
    pub static ref AUTH_LIMITER: FixedWindowLimiter = FixedWindowLimiter::new(10, 15 * 60);
    /// General API: 100 requests / minute.
    pub static ref API_LIMITER: FixedWindowLimiter = FixedWindowLimiter::new(100, 60);
    /// Uploads: 20 requests / minute.
    pub static ref UPLOAD_LIMITER: FixedWindowLimiter = FixedWindowLimiter::new(20, 60);
}

/// Purge expired entries from all limiters every 5 minutes.
pub fn spawn_sweeper() {
    tokio::spawn(async {
        let mut interval = tokio::time::interval(Duration::from_secs(300));
        loop {
            interval.tick().await;
            AUTH_LIMITER.sweep().await;
            API_LIMITER.sweep().await;
            UPLOAD_LIMITER.sweep().await;
        }
    });
}

/// Fingerprint a client from the forwarded IP (first hop) and the first 16
/// base64 characters of its user-agent.
pub fn client_identifier(headers: &HeaderMap, addr: SocketAddr) -> String {
    let ip = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| addr.ip().to_string());

    let user_agent = headers
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    let ua_prefix: String = BASE64.encode(user_agent).chars().take(16).collect();

    format!("{}:{}", ip, ua_prefix)
}

async fn enforce(
    limiter: &FixedWindowLimiter,
    addr: SocketAddr,
    request: Request,
    next: Next,
) -> Response {
    let identifier = client_identifier(request.headers(), addr);
    let decision = limiter.check(&identifier).await;

    if !decision.allowed {
        let retry_after = (decision.reset_at - Utc::now().timestamp()).max(1);
        return (
            StatusCode::TOO_MANY_REQUESTS,
            [(header::RETRY_AFTER, retry_after.to_string())],
            Json(ErrorResponse {
                error: "Too many requests. Please try again later.".to_string(),
                details: None,
            }),
        )
            .into_response();
    }

    next.run(request).await
}

pub async fn auth_rate_limit(
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    request: Request,
    next: Next,
) -> Response {
    enforce(&AUTH_LIMITER, addr, request, next).await
}

pub async fn api_rate_limit(
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    request: Request,
    next: Next,
) -> Response {
    enforce(&API_LIMITER, addr, request, next).await
}

pub async fn upload_rate_limit(
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    request: Request,
    next: Next,
) -> Response {
    enforce(&UPLOAD_LIMITER, addr, request, next).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::extract::connect_info::MockConnectInfo;
    use axum::http::{HeaderValue, Request as HttpRequest};
    use axum::routing::get;
    use axum::Router;
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_middleware_returns_429_after_window_max() {
        // Drives the shared AUTH_LIMITER (max 10 / 15 min) through a real
        // router; a unique IP + user-agent keeps the fingerprint isolated
        // from other tests.
        let app = Router::new()
            .route("/limited", get(|| async { StatusCode::OK }))
            .layer(axum::middleware::from_fn(auth_rate_limit))
            .layer(MockConnectInfo(SocketAddr::from(([203, 0, 113, 99], 7070))));

        let mut last = None;
        for _ in 0..11 {
            let req = HttpRequest::get("/limited")
                .header(header::USER_AGENT, "window-max-check/1.0")
                .body(Body::empty())
                .unwrap();
            last = Some(app.clone().oneshot(req).await.unwrap());
        }

        let res = last.unwrap();
        assert_eq!(res.status(), StatusCode::TOO_MANY_REQUESTS);
        let retry_after = res
            .headers()
            .get(header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<i64>().ok())
            .unwrap();
        assert!(retry_after >= 1);
    }

    #[tokio::test]
    async fn test_nth_plus_one_call_is_blocked() {
        let limiter = FixedWindowLimiter::new(3, 3600);
        for i in 0..3 {
            let decision = limiter.check("client").await;
            assert!(decision.allowed, "call {} should be allowed", i + 1);
        }
        let decision = limiter.check("client").await;
        assert!(!decision.allowed);
        assert_eq!(decision.remaining, 0);
    }

    #[tokio::test]
    async fn test_remaining_counts_down() {
        let limiter = FixedWindowLimiter::new(3, 3600);
        assert_eq!(limiter.check("c").await.remaining, 2);
        assert_eq!(limiter.check("c").await.remaining, 1);
        assert_eq!(limiter.check("c").await.remaining, 0);
    }

    #[tokio::test]
    async fn test_identifiers_are_independent() {
        let limiter = FixedWindowLimiter::new(1, 3600);
        assert!(limiter.check("a").await.allowed);
        assert!(limiter.check("b").await.allowed);
        assert!(!limiter.check("a").await.allowed);
    }

    #[tokio::test]
    async fn test_elapsed_window_resets_counter() {
        // A zero-length window is already elapsed on the next call.
        let limiter = FixedWindowLimiter::new(1, 0);
        assert!(limiter.check("c").await.allowed);
        assert!(limiter.check("c").await.allowed);
        assert!(limiter.check("c").await.allowed);
    }

    #[tokio::test]
    async fn test_sweep_drops_expired_entries() {
        let limiter = FixedWindowLimiter::new(5, 0);
        limiter.check("stale").await;
        assert_eq!(limiter.len().await, 1);
        limiter.sweep().await;
        assert_eq!(limiter.len().await, 0);
    }

    #[tokio::test]
    async fn test_sweep_keeps_active_entries() {
        let limiter = FixedWindowLimiter::new(5, 3600);
        limiter.check("active").await;
        limiter.sweep().await;
        assert_eq!(limiter.len().await, 1);
    }

    #[test]
    fn test_client_identifier_prefers_forwarded_ip() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static("203.0.113.7, 10.0.0.1"),
        );
        headers.insert(header::USER_AGENT, HeaderValue::from_static("curl/8.0"));
        let addr: SocketAddr = "127.0.0.1:9999".parse().unwrap();
        let id = client_identifier(&headers, addr);
        assert!(id.starts_with("203.0.113.7:"));
    }

    #[test]
    fn test_client_identifier_falls_back_to_socket_ip() {
        let headers = HeaderMap::new();
        let addr: SocketAddr = "192.168.1.5:1234".parse().unwrap();
        let id = client_identifier(&headers, addr);
        assert!(id.starts_with("192.168.1.5:"));
    }

    #[test]
    fn test_client_identifier_ua_prefix_is_capped() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::USER_AGENT,
            HeaderValue::from_static("Mozilla/5.0 (X11; Linux x86_64) extremely long agent"),
        );
        let addr: SocketAddr = "127.0.0.1:1".parse().unwrap();
        let id = client_identifier(&headers, addr);
        let suffix = id.split(':').nth(1).unwrap();
        assert_eq!(suffix.len(), 16);
    }
}
