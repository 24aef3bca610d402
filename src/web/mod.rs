//! Web server module.

mod handlers;
mod middleware;

pub use handlers::*;
pub use middleware::*;

use crate::config::ServerConfig;
use crate::context::wait_for_shutdown;
use crate::db::{ResultStore, TargetStore};
use crate::probe::CompositeProbe;
use crate::ratelimit::RateLimiter;

use axum::{
    extract::DefaultBodyLimit,
    http::{header, HeaderName, HeaderValue, Method},
    middleware::from_fn_with_state,
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub targets: Arc<dyn TargetStore>,
    pub results: Arc<dyn ResultStore>,
    pub checker: Arc<CompositeProbe>,
}

/// HTTP API server.
pub struct Server {
    state: AppState,
    http_addr: String,
    keys: Arc<ApiKeys>,
    limiter: Arc<RateLimiter>,
    allowed_origins: Vec<String>,
}

impl Server {
    pub fn new(config: &ServerConfig, state: AppState) -> Self {
        Self {
            state,
            http_addr: config.http_addr.clone(),
            keys: Arc::new(ApiKeys::new(
                config.public_api_keys.clone(),
                config.admin_api_keys.clone(),
            )),
            limiter: Arc::new(RateLimiter::new(
                config.rate_limit_rpm,
                config.rate_limit_burst,
            )),
            allowed_origins: config.allowed_origins.clone(),
        }
    }

    /// CORS from the allowlist, or permissive when none is configured.
    fn cors(&self) -> CorsLayer {
        if self.allowed_origins.is_empty() {
            return CorsLayer::permissive();
        }

        let origins: Vec<HeaderValue> = self
            .allowed_origins
            .iter()
            .filter_map(|origin| match HeaderValue::from_str(origin) {
                Ok(v) => Some(v),
                Err(_) => {
                    tracing::warn!(origin = %origin, "ignoring invalid CORS origin");
                    None
                }
            })
            .collect();

        CorsLayer::new()
            .allow_origin(AllowOrigin::list(origins))
            .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
            .allow_headers([
                header::ACCEPT,
                header::AUTHORIZATION,
                header::CONTENT_TYPE,
                HeaderName::from_static("x-api-key"),
            ])
            .max_age(Duration::from_secs(300))
    }

    /// Build the router with all routes.
    pub fn routes(&self) -> Router {
        let public = Router::new()
            .route("/healthz", get(handlers::handle_healthz))
            .route("/api/targets", get(handlers::handle_list_targets))
            .route("/api/results/latest", get(handlers::handle_latest))
            .route_layer(from_fn_with_state(self.keys.clone(), require_any));

        let admin = Router::new()
            .route("/api/targets", post(handlers::handle_add_target))
            .route_layer(from_fn_with_state(self.keys.clone(), require_admin));

        public
            .merge(admin)
            .layer(from_fn_with_state(self.limiter.clone(), rate_limit))
            .layer(self.cors())
            .layer(TraceLayer::new_for_http())
            .layer(DefaultBodyLimit::max(64 * 1024))
            .with_state(self.state.clone())
    }

    /// Serve on an already-bound listener until `shutdown` is raised.
    pub async fn serve(
        &self,
        listener: TcpListener,
        mut shutdown: watch::Receiver<bool>,
    ) -> std::io::Result<()> {
        tracing::info!("Web server listening on {}", listener.local_addr()?);

        let app = self
            .routes()
            .into_make_service_with_connect_info::<SocketAddr>();
        axum::serve(listener, app)
            .with_graceful_shutdown(async move { wait_for_shutdown(&mut shutdown).await })
            .await?;

        tracing::info!("Web server stopped");
        Ok(())
    }

    /// Bind the configured address and serve.
    pub async fn start(&self, shutdown: watch::Receiver<bool>) -> std::io::Result<()> {
        let listener = TcpListener::bind(&self.http_addr).await?;
        self.serve(listener, shutdown).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryStore;
    use crate::probe::testing::{ok, ScriptedProbe};
    use crate::probe::Probe;
    use serde_json::Value;
    use tokio::task::JoinHandle;

    struct TestServer {
        base: String,
        store: Arc<MemoryStore>,
        shutdown: watch::Sender<bool>,
        handle: JoinHandle<std::io::Result<()>>,
    }

    async fn spawn(config: ServerConfig, probe: Arc<dyn Probe>) -> TestServer {
        let store = Arc::new(MemoryStore::new());
        let state = AppState {
            targets: store.clone(),
            results: store.clone(),
            checker: Arc::new(CompositeProbe::new(vec![probe])),
        };
        let server = Server::new(&config, state);
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(async move { server.serve(listener, rx).await });

        TestServer {
            base,
            store,
            shutdown: tx,
            handle,
        }
    }

    fn up_probe() -> Arc<dyn Probe> {
        Arc::new(ScriptedProbe::new(vec![ok("200 OK"), ok("200 OK")]))
    }

    fn keyed_config() -> ServerConfig {
        ServerConfig {
            public_api_keys: vec!["pub_test".into()],
            admin_api_keys: vec!["adm_test".into()],
            ..ServerConfig::default()
        }
    }

    #[tokio::test]
    async fn test_healthz_open_without_keys() {
        let srv = spawn(ServerConfig::default(), up_probe()).await;
        let resp = reqwest::get(format!("{}/healthz", srv.base)).await.unwrap();
        assert_eq!(resp.status(), 200);
        assert_eq!(resp.text().await.unwrap(), "ok");
    }

    #[tokio::test]
    async fn test_add_target_probes_and_records() {
        let srv = spawn(ServerConfig::default(), up_probe()).await;
        let client = reqwest::Client::new();

        let resp = client
            .post(format!("{}/api/targets", srv.base))
            .json(&serde_json::json!({ "url": "  https://example.com " }))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);
        let body: Value = resp.json().await.unwrap();
        assert_eq!(body["target"]["url"], "https://example.com");
        assert_eq!(body["summary"]["up"], true);
        assert_eq!(body["summary"]["http_status"], 200);
        assert_eq!(body["checks"].as_array().unwrap().len(), 1);
        assert_eq!(body["checks"][0]["probe"], "scripted");
        let id = body["target"]["id"].as_str().unwrap().to_string();
        assert_eq!(body["summary"]["target_id"], id.as_str());

        let latest: Value = client
            .get(format!("{}/api/results/latest", srv.base))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(latest[0]["url"], "https://example.com");
        assert_eq!(latest[0]["up"], true);

        // Same URL again resolves to the existing target.
        let again: Value = client
            .post(format!("{}/api/targets", srv.base))
            .json(&serde_json::json!({ "url": "https://example.com" }))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(again["target"]["id"], id.as_str());
        assert_eq!(srv.store.list().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_add_target_rejects_bad_input() {
        let srv = spawn(ServerConfig::default(), up_probe()).await;
        let client = reqwest::Client::new();

        let resp = client
            .post(format!("{}/api/targets", srv.base))
            .json(&serde_json::json!({ "url": "ftp://example.com" }))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 400);
        let body: Value = resp.json().await.unwrap();
        assert_eq!(body["error"], "invalid url");

        let resp = client
            .post(format!("{}/api/targets", srv.base))
            .header("content-type", "application/json")
            .body("{not json")
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 400);
        let body: Value = resp.json().await.unwrap();
        assert_eq!(body["error"], "invalid json");

        assert!(srv.store.list().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_api_keys() {
        let srv = spawn(keyed_config(), up_probe()).await;
        let client = reqwest::Client::new();
        let targets = format!("{}/api/targets", srv.base);

        let resp = client.get(&targets).send().await.unwrap();
        assert_eq!(resp.status(), 401);

        let resp = client
            .get(&targets)
            .header("Authorization", "Bearer pub_test")
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);

        let resp = client
            .get(&targets)
            .header("X-API-Key", "adm_test")
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);

        let resp = client
            .post(&targets)
            .header("X-API-Key", "pub_test")
            .json(&serde_json::json!({ "url": "https://example.com" }))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 403);
        let body: Value = resp.json().await.unwrap();
        assert_eq!(body["error"], "forbidden");

        let resp = client
            .post(&targets)
            .header("X-API-Key", "adm_test")
            .json(&serde_json::json!({ "url": "https://example.com" }))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);
    }

    #[tokio::test]
    async fn test_rate_limit_per_client() {
        let config = ServerConfig {
            rate_limit_rpm: 1.0,
            rate_limit_burst: 2,
            ..ServerConfig::default()
        };
        let srv = spawn(config, up_probe()).await;
        let client = reqwest::Client::new();
        let url = format!("{}/healthz", srv.base);

        for _ in 0..2 {
            let resp = client.get(&url).send().await.unwrap();
            assert_eq!(resp.status(), 200);
        }
        let resp = client.get(&url).send().await.unwrap();
        assert_eq!(resp.status(), 429);
        let body: Value = resp.json().await.unwrap();
        assert_eq!(body["error"], "rate limit exceeded");

        let resp = client
            .get(&url)
            .header("X-Forwarded-For", "198.51.100.9")
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);
    }

    #[tokio::test]
    async fn test_cors_allowlist() {
        let config = ServerConfig {
            allowed_origins: vec!["https://app.example".into()],
            ..ServerConfig::default()
        };
        let srv = spawn(config, up_probe()).await;
        let client = reqwest::Client::new();
        let url = format!("{}/healthz", srv.base);

        let resp = client
            .get(&url)
            .header("Origin", "https://app.example")
            .send()
            .await
            .unwrap();
        assert_eq!(
            resp.headers()["access-control-allow-origin"],
            "https://app.example"
        );

        let resp = client
            .get(&url)
            .header("Origin", "https://evil.example")
            .send()
            .await
            .unwrap();
        assert!(resp.headers().get("access-control-allow-origin").is_none());
    }

    #[tokio::test]
    async fn test_graceful_shutdown() {
        let srv = spawn(ServerConfig::default(), up_probe()).await;
        srv.shutdown.send(true).unwrap();
        let result = tokio::time::timeout(Duration::from_secs(5), srv.handle)
            .await
            .unwrap()
            .unwrap();
        assert!(result.is_ok());
    }
}
