//! HTTP request handlers.

use super::AppState;
use crate::context::CheckContext;
use crate::db::{CheckResult, Target};
use crate::probe::ProbeReport;

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;

/// Deadline for the check run when a target is added.
const ADD_CHECK_TIMEOUT: Duration = Duration::from_secs(10);

/// Name of the probe whose outcome decides up/down in a summary.
const REACHABILITY_PROBE: &str = "HTTP";

fn error_response(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "error": message }))).into_response()
}

pub async fn handle_healthz() -> &'static str {
    "ok"
}

// ============================================================================
// API: Targets
// ============================================================================

pub async fn handle_list_targets(State(state): State<AppState>) -> Response {
    match state.targets.list() {
        Ok(targets) => Json(targets).into_response(),
        Err(e) => {
            tracing::error!("Failed to list targets: {}", e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "list error")
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct AddTargetRequest {
    #[serde(default)]
    pub url: String,
}

#[derive(Debug, Serialize)]
pub struct AddTargetResponse {
    pub target: Target,
    pub summary: CheckResult,
    pub checks: Vec<ProbeReport>,
}

pub async fn handle_add_target(
    State(state): State<AppState>,
    payload: Result<Json<AddTargetRequest>, JsonRejection>,
) -> Response {
    let Ok(Json(req)) = payload else {
        return error_response(StatusCode::BAD_REQUEST, "invalid json");
    };

    let url = req.url.trim();
    if !is_valid_http_url(url) {
        return error_response(StatusCode::BAD_REQUEST, "invalid url");
    }

    let mut target = Target::new(url);
    if let Err(e) = state.targets.add(&mut target) {
        tracing::error!(url = %url, "Failed to add target: {}", e);
        return error_response(StatusCode::INTERNAL_SERVER_ERROR, "could not add target");
    }

    let ctx = CheckContext::background().with_timeout(ADD_CHECK_TIMEOUT);
    let checks = state.checker.run(&ctx, &target.url).await;
    let summary = summarize(&target.id, &checks);

    if let Err(e) = state.results.append(&summary) {
        tracing::warn!(target_id = %target.id, "Failed to store initial result: {}", e);
    }

    tracing::info!(
        url = %target.url,
        up = summary.up,
        latency_ms = summary.latency_ms,
        reason = %summary.reason,
        "added target"
    );

    Json(AddTargetResponse {
        target,
        summary,
        checks,
    })
    .into_response()
}

// ============================================================================
// API: Results
// ============================================================================

pub async fn handle_latest(State(state): State<AppState>) -> Response {
    match state.results.latest() {
        Ok(rows) => Json(rows).into_response(),
        Err(e) => {
            tracing::error!("Failed to load latest results: {}", e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "latest error")
        }
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Accept only absolute http(s) URLs with a host.
pub fn is_valid_http_url(raw: &str) -> bool {
    match reqwest::Url::parse(raw) {
        Ok(url) => {
            matches!(url.scheme(), "http" | "https")
                && url.host_str().is_some_and(|h| !h.is_empty())
        }
        Err(_) => false,
    }
}

/// Build a stored result from the reachability report, falling back to the
/// first report when no HTTP probe ran.
pub fn summarize(target_id: &str, checks: &[ProbeReport]) -> CheckResult {
    let report = checks
        .iter()
        .find(|r| r.probe == REACHABILITY_PROBE)
        .or_else(|| checks.first());

    match report {
        Some(report) => {
            let outcome = &report.outcome;
            CheckResult {
                target_id: target_id.to_string(),
                up: outcome.success,
                http_status: (outcome.status_code != 0).then_some(outcome.status_code),
                latency_ms: outcome.latency_ms,
                reason: outcome.message.clone(),
                checked_at: Utc::now(),
            }
        }
        None => CheckResult {
            target_id: target_id.to_string(),
            up: false,
            http_status: None,
            latency_ms: 0.0,
            reason: "no probes configured".to_string(),
            checked_at: Utc::now(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::testing::{fail, ok};

    fn report(probe: &str, outcome: crate::probe::CheckOutcome) -> ProbeReport {
        ProbeReport {
            probe: probe.to_string(),
            outcome,
        }
    }

    #[test]
    fn test_is_valid_http_url() {
        assert!(is_valid_http_url("https://example.com"));
        assert!(is_valid_http_url("http://127.0.0.1:8080/health"));
        assert!(!is_valid_http_url("ftp://example.com"));
        assert!(!is_valid_http_url("example.com"));
        assert!(!is_valid_http_url("http://"));
        assert!(!is_valid_http_url(""));
    }

    #[test]
    fn test_summarize_prefers_reachability() {
        let checks = vec![
            report("DNS", ok("RESOLVES")),
            report("HTTP", fail("503 Service Unavailable", 503)),
        ];
        let summary = summarize("t1", &checks);
        assert_eq!(summary.target_id, "t1");
        assert!(!summary.up);
        assert_eq!(summary.http_status, Some(503));
        assert_eq!(summary.reason, "503 Service Unavailable");
    }

    #[test]
    fn test_summarize_fallbacks() {
        let summary = summarize("t1", &[report("DNS", fail("NO_ADDRESS", 0))]);
        assert!(!summary.up);
        assert_eq!(summary.http_status, None);
        assert_eq!(summary.reason, "NO_ADDRESS");

        let summary = summarize("t1", &[]);
        assert!(!summary.up);
        assert_eq!(summary.reason, "no probes configured");
    }
}
