//! Router assembly and HTTP handlers (§4.5, §6).

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use axum::extract::{Path, Request, State};
use axum::http::{HeaderValue, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use supervisor_auth::{parse_bearer_header, StaticTokenValidator, TokenValidator};
use supervisor_concurrency::{ReadOnlyPool, ReadWritePolicy};
use supervisor_execution::{ExecutionEngine, ExecutionStats};
use supervisor_registry::AgentRegistry;
use supervisor_scheduler::Scheduler;
use supervisor_types::{AgentId, ScheduledTask, SupervisorError, TaskId};
use tower::ServiceBuilder;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use crate::error::{ok, ApiError};
use crate::process::ProcessSupervisor;

/// Shared handles every handler reaches through `State`.
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<AgentRegistry>,
    pub execution_engine: Arc<ExecutionEngine>,
    pub rw_policy: Arc<ReadWritePolicy>,
    pub ro_pool: Arc<ReadOnlyPool>,
    pub scheduler: Arc<Scheduler>,
    pub process_supervisor: Arc<ProcessSupervisor>,
    pub auth: Arc<StaticTokenValidator>,
    pub started_at: Instant,
}

/// Build the full router: public health/metrics routes, bearer-protected
/// API routes, wrapped in CORS, request-size, and trace layers (§4.5).
pub fn build_router(state: AppState, cors_origins: &[String], max_message_size: usize) -> Router {
    let protected = Router::new()
        .route("/api/v1/agents/status", get(list_agent_status))
        .route("/api/v1/agents/:name/status", get(get_agent_status))
        .route("/api/v1/agents/:name/start", post(start_agent))
        .route("/api/v1/agents/:name/stop", post(stop_agent))
        .route("/api/v1/agents/:name/restart", post(restart_agent))
        .route("/tasks", get(list_tasks).post(create_task))
        .route(
            "/tasks/:id",
            get(get_task).put(update_task).delete(delete_task),
        )
        .route("/tasks/:id/execute", post(execute_task))
        .route("/tasks/:id/pause", post(pause_task))
        .route("/tasks/:id/resume", post(resume_task))
        .layer(middleware::from_fn_with_state(state.clone(), require_bearer_token));

    let public = Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics));

    Router::new()
        .merge(public)
        .merge(protected)
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(build_cors_layer(cors_origins))
                .layer(RequestBodyLimitLayer::new(max_message_size)),
        )
}

fn build_cors_layer(origins: &[String]) -> CorsLayer {
    if origins.iter().any(|o| o == "*") {
        return CorsLayer::permissive();
    }
    let parsed: Vec<HeaderValue> = origins.iter().filter_map(|o| o.parse().ok()).collect();
    CorsLayer::new().allow_origin(AllowOrigin::list(parsed))
}

/// Bearer-token middleware (§4.5, §6). A no-op if the configured validator
/// holds no tokens (auth disabled).
async fn require_bearer_token(State(state): State<AppState>, request: Request, next: Next) -> Response {
    if state.auth.is_empty() {
        return next.run(request).await;
    }

    let token = request
        .headers()
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(parse_bearer_header);

    match token {
        Some(raw) => match state.auth.validate(raw).await {
            Ok(()) => next.run(request).await,
            Err(_) => crate::error::auth_error_response("invalid bearer token"),
        },
        None => crate::error::auth_error_response("authentication required"),
    }
}

//─────────────────────────────
//  Health and metrics
//─────────────────────────────

#[derive(Serialize)]
struct HealthBody {
    status: &'static str,
    uptime_seconds: u64,
    agent_count: usize,
}

async fn health(State(state): State<AppState>) -> Response {
    let agent_count = state.registry.len();
    ok(HealthBody {
        status: "healthy",
        uptime_seconds: state.started_at.elapsed().as_secs(),
        agent_count,
    })
}

#[derive(Serialize)]
struct MetricsBody {
    registered_agents: usize,
    scheduled_tasks: usize,
    scheduler_ticks: u64,
    executions: ExecutionStats,
}

async fn metrics(State(state): State<AppState>) -> Response {
    ok(MetricsBody {
        registered_agents: state.registry.len(),
        scheduled_tasks: state.scheduler.list().len(),
        scheduler_ticks: state.scheduler.tick_count(),
        executions: state.execution_engine.stats(),
    })
}

//─────────────────────────────
//  Agent lifecycle
//─────────────────────────────

async fn list_agent_status(State(state): State<AppState>) -> Result<Response, ApiError> {
    Ok(ok(state.process_supervisor.list()?))
}

async fn get_agent_status(State(state): State<AppState>, Path(name): Path<String>) -> Result<Response, ApiError> {
    Ok(ok(state.process_supervisor.status(&AgentId::from(name))?))
}

async fn start_agent(State(state): State<AppState>, Path(name): Path<String>) -> Result<Response, ApiError> {
    Ok(ok(state.process_supervisor.start(&AgentId::from(name)).await?))
}

async fn stop_agent(State(state): State<AppState>, Path(name): Path<String>) -> Result<Response, ApiError> {
    Ok(ok(state.process_supervisor.stop(&AgentId::from(name)).await?))
}

async fn restart_agent(State(state): State<AppState>, Path(name): Path<String>) -> Result<Response, ApiError> {
    Ok(ok(state.process_supervisor.restart(&AgentId::from(name)).await?))
}

//─────────────────────────────
//  Task CRUD (§4.5, backed by C4)
//─────────────────────────────

#[derive(Deserialize)]
struct TaskRequest {
    name: String,
    agent_id: String,
    cron_expression: String,
    #[serde(default)]
    input_parameters: HashMap<String, String>,
    #[serde(default = "default_max_retries")]
    max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    timeout_secs: u64,
}

fn default_max_retries() -> u32 {
    3
}

fn default_timeout_secs() -> u64 {
    30
}

fn parse_task_id(raw: &str) -> Result<TaskId, ApiError> {
    Uuid::parse_str(raw)
        .map(TaskId)
        .map_err(|e| ApiError(SupervisorError::Validation(format!("invalid task id '{raw}': {e}"))))
}

async fn list_tasks(State(state): State<AppState>) -> Response {
    ok(state.scheduler.list())
}

async fn create_task(State(state): State<AppState>, Json(req): Json<TaskRequest>) -> Result<Response, ApiError> {
    let task = ScheduledTask {
        id: TaskId::new(),
        name: req.name,
        agent_id: AgentId::from(req.agent_id),
        cron_expression: req.cron_expression,
        enabled: true,
        active: false,
        input_parameters: req.input_parameters,
        max_retries: req.max_retries,
        timeout_secs: req.timeout_secs,
        last_execution: None,
        next_execution: None,
        last_result: None,
    };
    let task_id = task.id;
    state.scheduler.schedule(task).await?;
    Ok(ok(state.scheduler.get(task_id)?))
}

async fn get_task(State(state): State<AppState>, Path(id): Path<String>) -> Result<Response, ApiError> {
    let task_id = parse_task_id(&id)?;
    Ok(ok(state.scheduler.get(task_id)?))
}

async fn update_task(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<TaskRequest>,
) -> Result<Response, ApiError> {
    let task_id = parse_task_id(&id)?;
    let mut existing = state.scheduler.get(task_id)?;
    existing.name = req.name;
    existing.agent_id = AgentId::from(req.agent_id);
    existing.cron_expression = req.cron_expression;
    existing.input_parameters = req.input_parameters;
    existing.max_retries = req.max_retries;
    existing.timeout_secs = req.timeout_secs;
    state.scheduler.update(existing)?;
    Ok(ok(state.scheduler.get(task_id)?))
}

async fn delete_task(State(state): State<AppState>, Path(id): Path<String>) -> Result<Response, ApiError> {
    let task_id = parse_task_id(&id)?;
    state.scheduler.unschedule(task_id)?;
    Ok(StatusCode::NO_CONTENT.into_response())
}

async fn execute_task(State(state): State<AppState>, Path(id): Path<String>) -> Result<Response, ApiError> {
    let task_id = parse_task_id(&id)?;
    Ok(ok(state.scheduler.execute(task_id).await?))
}

async fn pause_task(State(state): State<AppState>, Path(id): Path<String>) -> Result<Response, ApiError> {
    let task_id = parse_task_id(&id)?;
    state.scheduler.pause(task_id)?;
    Ok(ok(state.scheduler.get(task_id)?))
}

async fn resume_task(State(state): State<AppState>, Path(id): Path<String>) -> Result<Response, ApiError> {
    let task_id = parse_task_id(&id)?;
    state.scheduler.resume(task_id)?;
    Ok(ok(state.scheduler.get(task_id)?))
}
