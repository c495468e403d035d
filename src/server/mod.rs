//! Control-plane HTTP server: Prometheus scrape endpoint, health probe, and
//! the `/api/*` inspection surface.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::client::UpstreamClient;
use crate::collector::CollectionScheduler;
use crate::config::defaults::HEALTH_CACHE_TTL_SECONDS;
use crate::discovery::DiscoveryEngine;
use crate::monitors::{LicenseTier, MonitorEvaluator};
use crate::notify::NotificationDispatcher;

pub struct AppState {
    pub client: Arc<UpstreamClient>,
    pub discovery: Arc<DiscoveryEngine>,
    pub collector: Arc<CollectionScheduler>,
    pub evaluator: Arc<MonitorEvaluator>,
    pub dispatcher: Arc<NotificationDispatcher>,
    pub tier: LicenseTier,
}

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/actuator/prometheus", get(prometheus_metrics))
        .route("/actuator/health", get(health))
        .route("/api/status", get(status))
        .route("/api/discover", post(discover))
        .route("/api/monitors", get(list_monitors))
        .route("/api/monitors/{name}", get(get_monitor))
        .route("/api/monitors/{name}/test", post(test_monitor))
        .route("/api/health-scores", get(list_health_scores))
        .route("/api/health-scores/{queue_name}", get(get_health_score))
        .route("/api/license", get(license))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn prometheus_metrics() -> Response {
    match crate::metrics::encode_text() {
        Ok(body) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4")],
            body,
        )
            .into_response(),
        Err(e) => {
            tracing::warn!(error = %e, "failed to encode prometheus metrics");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    details: HealthDetails,
}

#[derive(Serialize)]
struct HealthDetails {
    authenticated: bool,
    seconds_since_last_auth_success: Option<i64>,
    base_url_fingerprint: String,
    organization_id_fingerprint: String,
}

async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let config = crate::config::get();
    let seconds_since = state.client.seconds_since_last_auth_success();
    let authenticated = match seconds_since {
        None => false,
        Some(secs) => secs < HEALTH_CACHE_TTL_SECONDS,
    };

    Json(HealthResponse {
        status: if authenticated { "UP" } else { "DOWN" },
        details: HealthDetails {
            authenticated,
            seconds_since_last_auth_success: seconds_since,
            base_url_fingerprint: crate::config::mask_sensitive(&config.base_url),
            organization_id_fingerprint: crate::config::mask_sensitive(&config.organization_id),
        },
    })
}

#[derive(Serialize)]
struct StatusResponse {
    auto_discovery: bool,
    root_tenant_id: String,
    environment_count: usize,
    regions: Vec<String>,
    scrape_interval_seconds: u64,
    scrape_period_seconds: u64,
    discovery_complete: bool,
}

async fn status(State(state): State<Arc<AppState>>) -> Json<StatusResponse> {
    let config = crate::config::get();
    let snapshot = state.discovery.snapshot();
    Json(StatusResponse {
        auto_discovery: config.discovery.auto_discovery,
        root_tenant_id: snapshot.root_tenant_id.clone(),
        environment_count: snapshot.environments.len(),
        regions: config.scrape.regions.clone(),
        scrape_interval_seconds: config.scrape.interval_seconds,
        scrape_period_seconds: config.scrape.period_seconds,
        discovery_complete: snapshot.complete,
    })
}

async fn discover(State(state): State<Arc<AppState>>) -> Json<StatusResponse> {
    state.discovery.run_once().await;
    status(State(state)).await
}

#[derive(Serialize)]
struct MonitorSummary {
    name: String,
    #[serde(rename = "type")]
    monitor_type: crate::domain::MonitorType,
    target: String,
    enabled: bool,
    severity: crate::domain::Severity,
}

async fn list_monitors(State(state): State<Arc<AppState>>) -> Response {
    if !state.tier.monitors_enabled() {
        return license_required();
    }
    let summaries: Vec<MonitorSummary> = state
        .evaluator
        .definitions()
        .iter()
        .map(|d| MonitorSummary {
            name: d.name.clone(),
            monitor_type: d.monitor_type,
            target: d.target.clone(),
            enabled: d.enabled,
            severity: d.severity,
        })
        .collect();
    Json(summaries).into_response()
}

async fn get_monitor(State(state): State<Arc<AppState>>, Path(name): Path<String>) -> Response {
    if !state.tier.monitors_enabled() {
        return license_required();
    }
    match state.evaluator.definitions().iter().find(|d| d.name == name) {
        Some(def) => Json(def.clone()).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

#[derive(Serialize)]
struct TestDispatchResponse {
    monitor: String,
    channels_attempted: usize,
}

async fn test_monitor(State(state): State<Arc<AppState>>, Path(name): Path<String>) -> Response {
    if !state.tier.monitors_enabled() {
        return license_required();
    }
    let Some(def) = state.evaluator.definitions().iter().find(|d| d.name == name).cloned() else {
        return StatusCode::NOT_FOUND.into_response();
    };

    let result = crate::domain::MonitorResult {
        monitor_name: def.name.clone(),
        destination: crate::domain::DestinationIdentity {
            destination_name: "synthetic-test".to_string(),
            environment_name: "synthetic".to_string(),
            region: "synthetic".to_string(),
        },
        triggered: true,
        current_value: def.threshold,
        threshold: def.threshold,
        message: format!("synthetic test dispatch for monitor '{}'", def.name),
        severity: def.severity,
        evaluated_at: chrono::Utc::now(),
        metadata: std::collections::HashMap::new(),
    };

    state.dispatcher.dispatch(&result, &def.channels).await;
    Json(TestDispatchResponse {
        monitor: def.name,
        channels_attempted: def.channels.len(),
    })
    .into_response()
}

#[derive(Serialize)]
struct HealthScoreEntry {
    queue_name: String,
    environment: String,
    region: String,
    score: f64,
}

async fn list_health_scores(State(state): State<Arc<AppState>>) -> Json<Vec<HealthScoreEntry>> {
    let entries: Vec<HealthScoreEntry> = state
        .collector
        .current_queue_stats
        .iter()
        .map(|entry| {
            let key = entry.key();
            let value = entry.value();
            let state = crate::monitors::MonitorState::default();
            let score = crate::monitors::health::composite_score(&value.stats, value.is_dlq, &state);
            HealthScoreEntry {
                queue_name: key.queue_name.clone(),
                environment: key.environment.clone(),
                region: key.region.clone(),
                score,
            }
        })
        .collect();
    Json(entries)
}

async fn get_health_score(State(state): State<Arc<AppState>>, Path(queue_name): Path<String>) -> Response {
    let found = state
        .collector
        .current_queue_stats
        .iter()
        .find(|entry| entry.key().queue_name == queue_name)
        .map(|entry| {
            let value = entry.value();
            let baseline_state = crate::monitors::MonitorState::default();
            HealthScoreEntry {
                queue_name: queue_name.clone(),
                environment: entry.key().environment.clone(),
                region: entry.key().region.clone(),
                score: crate::monitors::health::composite_score(&value.stats, value.is_dlq, &baseline_state),
            }
        });
    match found {
        Some(entry) => Json(entry).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

#[derive(Serialize)]
struct LicenseResponse {
    tier: &'static str,
    monitors_enabled: bool,
}

async fn license(State(state): State<Arc<AppState>>) -> Json<LicenseResponse> {
    Json(LicenseResponse {
        tier: match state.tier {
            LicenseTier::Free => "free",
            LicenseTier::Pro => "pro",
        },
        monitors_enabled: state.tier.monitors_enabled(),
    })
}

fn license_required() -> Response {
    (
        StatusCode::FORBIDDEN,
        Json(serde_json::json!({"error": "this feature requires a pro license"})),
    )
        .into_response()
}
