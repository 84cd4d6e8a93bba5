use crate::metrics;
use crate::state::AppState;
use axum::extract::{Path, Request, State};
use axum::http::{HeaderValue, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use rand::Rng;
use sentinela_common::name::normalize_monitor_name;
use sentinela_queue::MessageKind;
use sentinela_registry::validate_definition;
use serde::Deserialize;
use serde_json::json;
use std::fmt::Write as _;
use std::time::Instant;

/// Thin admin surface: every route translates one-to-one to a store
/// operation or enqueues a `request` message.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/status", get(status))
        .route("/metrics", get(metrics_endpoint))
        .route("/monitor/list", get(monitor_list))
        .route("/monitor/validate", post(monitor_validate))
        .route("/monitor/register/{name}", post(monitor_register))
        .route("/monitor/{name}", get(monitor_get))
        .route("/monitor/{name}/enable", post(monitor_enable))
        .route("/monitor/{name}/disable", post(monitor_disable))
        .route("/alert/{id}/acknowledge", post(alert_acknowledge))
        .route("/alert/{id}/lock", post(alert_lock))
        .route("/alert/{id}/solve", post(alert_solve))
        .route("/issue/{id}/drop", post(issue_drop))
        .layer(axum::middleware::from_fn(request_logging))
        .with_state(state)
}

/// 16-character hex trace id (8 random bytes).
fn generate_trace_id() -> String {
    let bytes: [u8; 8] = rand::thread_rng().gen();
    let mut id = String::with_capacity(16);
    for byte in bytes {
        let _ = write!(id, "{byte:02x}");
    }
    id
}

/// Request/response logging middleware; tags each response with an
/// `X-Trace-Id` header.
async fn request_logging(request: Request, next: Next) -> Response {
    let trace_id = generate_trace_id();
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let start = Instant::now();

    let mut response = next.run(request).await;

    tracing::info!(
        %method,
        path,
        status = response.status().as_u16(),
        elapsed_ms = start.elapsed().as_millis() as u64,
        trace_id,
        "HTTP request"
    );
    if let Ok(value) = HeaderValue::from_str(&trace_id) {
        response.headers_mut().insert("X-Trace-Id", value);
    }
    response
}

fn error_response(error: impl std::fmt::Display) -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::BAD_REQUEST,
        Json(json!({ "status": "error", "error": error.to_string() })),
    )
}

async fn status(State(state): State<AppState>) -> Json<serde_json::Value> {
    let (components, issues) = state
        .diagnostics
        .report(state.started_at, state.config.executor_concurrency);

    Json(json!({
        "status": if issues.is_empty() { "ok" } else { "degraded" },
        "started_at": state.started_at,
        "controller_enabled": state.controller_enabled,
        "executor_enabled": state.executor_enabled,
        "monitors_loaded": state.registry.len(),
        "components": components,
        "issues": issues,
    }))
}

async fn metrics_endpoint() -> impl IntoResponse {
    (
        [(axum::http::header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        metrics::render(),
    )
}

async fn monitor_list(State(state): State<AppState>) -> impl IntoResponse {
    match state.store.list_monitors().await {
        Ok(monitors) => {
            let monitors: Vec<serde_json::Value> = monitors
                .into_iter()
                .map(|monitor| {
                    json!({
                        "id": monitor.id,
                        "name": monitor.name,
                        "enabled": monitor.enabled,
                        "queued": monitor.queued,
                        "running": monitor.running,
                        "registered": state.registry.is_registered(monitor.id),
                        "last_successful_execution": monitor.last_successful_execution,
                    })
                })
                .collect();
            Json(json!({ "status": "ok", "monitors": monitors })).into_response()
        }
        Err(e) => error_response(e).into_response(),
    }
}

async fn monitor_get(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> impl IntoResponse {
    let name = normalize_monitor_name(&name);
    match state.store.get_monitor_by_name(&name).await {
        Ok(Some(monitor)) => {
            let executions = state
                .store
                .list_monitor_executions(monitor.id, 10)
                .await
                .unwrap_or_default();
            Json(json!({
                "status": "ok",
                "monitor": monitor,
                "registered": state.registry.is_registered(monitor.id),
                "recent_executions": executions,
            }))
            .into_response()
        }
        Ok(None) => (
            StatusCode::NOT_FOUND,
            Json(json!({ "status": "error", "error": format!("monitor '{name}' not found") })),
        )
            .into_response(),
        Err(e) => error_response(e).into_response(),
    }
}

#[derive(Debug, Deserialize)]
struct ValidateRequest {
    monitor_name: String,
}

/// Validate a catalog definition, returning the structured error list.
async fn monitor_validate(
    State(state): State<AppState>,
    Json(request): Json<ValidateRequest>,
) -> impl IntoResponse {
    let name = normalize_monitor_name(&request.monitor_name);
    let Some(definition) = state.catalog.get(&name) else {
        return error_response(format!("monitor '{name}' is not in the catalog")).into_response();
    };

    let errors = validate_definition(&name, &definition);
    if errors.is_empty() {
        Json(json!({ "status": "ok", "monitor_name": name })).into_response()
    } else {
        (
            StatusCode::BAD_REQUEST,
            Json(json!({
                "status": "error",
                "message": "monitor definition didn't pass the checks",
                "error": errors,
            })),
        )
            .into_response()
    }
}

/// Register a catalog definition into the store.
async fn monitor_register(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> impl IntoResponse {
    let name = normalize_monitor_name(&name);
    let Some(definition) = state.catalog.get(&name) else {
        return error_response(format!("monitor '{name}' is not in the catalog")).into_response();
    };

    let errors = validate_definition(&name, &definition);
    if !errors.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({
                "status": "error",
                "message": "monitor definition didn't pass the checks",
                "error": errors,
            })),
        )
            .into_response();
    }

    match state
        .store
        .register_monitor(&name, &definition.source, &definition.version_hash())
        .await
    {
        Ok(monitor) => {
            state.registry.request_reload();
            Json(json!({ "status": "monitor_registered", "monitor_id": monitor.id }))
                .into_response()
        }
        Err(e) => error_response(e).into_response(),
    }
}

async fn set_enabled(state: AppState, name: String, enabled: bool) -> impl IntoResponse {
    let name = normalize_monitor_name(&name);
    let monitor = match state.store.get_monitor_by_name(&name).await {
        Ok(Some(monitor)) => monitor,
        Ok(None) => {
            return error_response(format!("monitor '{name}' not found")).into_response();
        }
        Err(e) => return error_response(e).into_response(),
    };

    match state.store.set_monitor_enabled(monitor.id, enabled).await {
        Ok(_) => {
            state.registry.request_reload();
            let status = if enabled {
                "monitor_enabled"
            } else {
                "monitor_disabled"
            };
            Json(json!({ "status": status, "monitor_name": name })).into_response()
        }
        Err(e) => error_response(e).into_response(),
    }
}

async fn monitor_enable(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> impl IntoResponse {
    set_enabled(state, name, true).await
}

async fn monitor_disable(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> impl IntoResponse {
    set_enabled(state, name, false).await
}

/// Queue a request message for the executors.
async fn queue_request(
    state: &AppState,
    action: &str,
    params: serde_json::Value,
) -> Result<(), sentinela_queue::QueueError> {
    state
        .queue
        .send(
            MessageKind::Request,
            json!({ "action": action, "params": params }),
        )
        .await
}

async fn alert_acknowledge(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> impl IntoResponse {
    match queue_request(&state, "alert_acknowledge", json!({ "alert_id": id })).await {
        Ok(()) => Json(json!({ "status": "alert_acknowledge_queued", "alert_id": id }))
            .into_response(),
        Err(e) => error_response(e).into_response(),
    }
}

async fn alert_lock(State(state): State<AppState>, Path(id): Path<i64>) -> impl IntoResponse {
    match queue_request(&state, "alert_lock", json!({ "alert_id": id })).await {
        Ok(()) => Json(json!({ "status": "alert_lock_queued", "alert_id": id })).into_response(),
        Err(e) => error_response(e).into_response(),
    }
}

async fn alert_solve(State(state): State<AppState>, Path(id): Path<i64>) -> impl IntoResponse {
    match queue_request(&state, "alert_solve", json!({ "alert_id": id })).await {
        Ok(()) => Json(json!({ "status": "alert_solve_queued", "alert_id": id })).into_response(),
        Err(e) => error_response(e).into_response(),
    }
}

async fn issue_drop(State(state): State<AppState>, Path(id): Path<i64>) -> impl IntoResponse {
    match queue_request(&state, "issue_drop", json!({ "issue_id": id })).await {
        Ok(()) => Json(json!({ "status": "issue_drop_queued", "issue_id": id })).into_response(),
        Err(e) => error_response(e).into_response(),
    }
}
