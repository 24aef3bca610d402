//! Request middleware: API key checks and per-client rate limiting.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{ConnectInfo, Request, State},
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::ratelimit::RateLimiter;

/// Configured API keys. An empty set disables the corresponding check.
#[derive(Debug, Clone, Default)]
pub struct ApiKeys {
    pub public: Vec<String>,
    pub admin: Vec<String>,
}

impl ApiKeys {
    pub fn new(public: Vec<String>, admin: Vec<String>) -> Self {
        Self { public, admin }
    }

    fn any_configured(&self) -> bool {
        !self.public.is_empty() || !self.admin.is_empty()
    }

    fn is_public(&self, key: &str) -> bool {
        self.public.iter().any(|k| k == key)
    }

    fn is_admin(&self, key: &str) -> bool {
        self.admin.iter().any(|k| k == key)
    }
}

/// Extract the presented key from `Authorization: Bearer` or `X-API-Key`.
fn presented_key(headers: &HeaderMap) -> Option<&str> {
    if let Some(auth) = headers.get("authorization").and_then(|v| v.to_str().ok()) {
        if auth.len() > 7 && auth[..7].eq_ignore_ascii_case("bearer ") {
            return Some(auth[7..].trim());
        }
    }
    headers
        .get("x-api-key")
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|k| !k.is_empty())
}

fn json_error(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "error": message }))).into_response()
}

/// Read routes: any public or admin key.
pub async fn require_any(State(keys): State<Arc<ApiKeys>>, req: Request, next: Next) -> Response {
    if !keys.any_configured() {
        return next.run(req).await;
    }
    match presented_key(req.headers()) {
        Some(key) if keys.is_public(key) || keys.is_admin(key) => next.run(req).await,
        _ => json_error(StatusCode::UNAUTHORIZED, "unauthorized"),
    }
}

/// Write routes: admin keys only.
pub async fn require_admin(
    State(keys): State<Arc<ApiKeys>>,
    req: Request,
    next: Next,
) -> Response {
    if keys.admin.is_empty() {
        return next.run(req).await;
    }
    match presented_key(req.headers()) {
        Some(key) if keys.is_admin(key) => next.run(req).await,
        _ => json_error(StatusCode::FORBIDDEN, "forbidden"),
    }
}

/// Client address: first `X-Forwarded-For` entry, else the peer IP.
pub fn client_ip(req: &Request) -> String {
    if let Some(first) = req
        .headers()
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty())
    {
        return first.to_string();
    }
    req.extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

pub async fn rate_limit(
    State(limiter): State<Arc<RateLimiter>>,
    req: Request,
    next: Next,
) -> Response {
    if !limiter.is_enabled() {
        return next.run(req).await;
    }
    let key = client_ip(&req);
    if limiter.allow(&key) {
        next.run(req).await
    } else {
        tracing::debug!(client = %key, "rate limited");
        json_error(StatusCode::TOO_MANY_REQUESTS, "rate limit exceeded")
    }
}
