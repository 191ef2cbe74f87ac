// http.rs — REST surface over the orchestrator.
//
// Thin translation layer: parse the request, call the orchestrator,
// map errors onto status codes. Run execution never happens on a
// request thread — a trigger returns 202 and the pipeline drives on a
// blocking task, so a slow provider cannot stall the listener.

use std::path::PathBuf;
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_http::cors::CorsLayer;
use uuid::Uuid;

use ca_approval::{ApprovalError, ApprovalRequest};
use ca_audit::{AuditFilter, AuditLog, ToolCallRecord};
use ca_pipeline::{Orchestrator, PipelineError};
use ca_run::{Baseline, CloudProvider, Framework, RunContext, RunError, RunScope};

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub orch: Arc<Orchestrator>,
    pub audit_path: PathBuf,
}

/// Route table for the daemon.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/api/runs", post(trigger_run).get(list_runs))
        .route("/api/runs/{run_id}", get(get_run))
        .route("/api/runs/{run_id}/cancel", post(cancel_run))
        .route("/api/approvals", get(list_approvals))
        .route("/api/approvals/{request_id}/review", post(review_approval))
        .route("/api/audit", get(query_audit))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Handler error carrying an HTTP status. Internal failures are logged
/// server-side; the client sees only the message.
#[derive(Debug)]
enum ApiError {
    BadRequest(String),
    NotFound(String),
    Conflict(String),
    Internal(String),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn message(&self) -> &str {
        match self {
            ApiError::BadRequest(msg)
            | ApiError::NotFound(msg)
            | ApiError::Conflict(msg)
            | ApiError::Internal(msg) => msg,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if matches!(self, ApiError::Internal(_)) {
            tracing::error!(error = self.message(), "request failed");
        }
        (self.status(), Json(json!({ "error": self.message() }))).into_response()
    }
}

impl From<PipelineError> for ApiError {
    fn from(err: PipelineError) -> Self {
        match err {
            PipelineError::Run(RunError::NotFound(run_id)) => {
                ApiError::NotFound(format!("run {run_id} not found"))
            }
            PipelineError::Run(RunError::InvalidScope { run_id, detail }) => {
                ApiError::BadRequest(format!("invalid scope for run {run_id}: {detail}"))
            }
            PipelineError::NotSuspended(run_id) => {
                ApiError::Conflict(format!("run {run_id} is not suspended for approval"))
            }
            PipelineError::UnknownApproval { run_id, request_id } => ApiError::NotFound(format!(
                "approval request {request_id} is not linked to run {run_id}"
            )),
            PipelineError::Approval(err) => err.into(),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl From<ApprovalError> for ApiError {
    fn from(err: ApprovalError) -> Self {
        match err {
            ApprovalError::NotFound(request_id) => {
                ApiError::NotFound(format!("approval request {request_id} not found"))
            }
            ApprovalError::AlreadyDecided { request_id, status } => {
                ApiError::Conflict(format!("approval request {request_id} is already {status}"))
            }
            other => ApiError::Internal(other.to_string()),
        }
    }
}

async fn healthz() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok", "version": env!("CARGO_PKG_VERSION") }))
}

#[derive(Debug, Deserialize)]
struct TriggerRequest {
    system_id: String,
    #[serde(default)]
    system_name: Option<String>,
    #[serde(default)]
    question: Option<String>,
    #[serde(default)]
    providers: Option<Vec<String>>,
    #[serde(default)]
    environment: Option<String>,
    #[serde(default)]
    baseline: Option<String>,
    #[serde(default)]
    frameworks: Option<Vec<String>>,
}

fn scope_from(req: &TriggerRequest) -> Result<RunScope, ApiError> {
    if req.system_id.trim().is_empty() {
        return Err(ApiError::BadRequest(
            "system_id must not be empty".to_string(),
        ));
    }
    let system_name = req
        .system_name
        .clone()
        .unwrap_or_else(|| req.system_id.clone());
    let mut scope = RunScope::new(&req.system_id, system_name);

    if let Some(providers) = &req.providers {
        let providers: Vec<CloudProvider> = providers
            .iter()
            .map(|p| p.parse())
            .collect::<Result<_, String>>()
            .map_err(ApiError::BadRequest)?;
        scope = scope.with_providers(providers);
    }
    if let Some(baseline) = &req.baseline {
        let baseline: Baseline = baseline.parse().map_err(ApiError::BadRequest)?;
        scope = scope.with_baseline(baseline);
    }
    if let Some(frameworks) = &req.frameworks {
        let frameworks: Vec<Framework> = frameworks
            .iter()
            .map(|f| f.parse())
            .collect::<Result<_, String>>()
            .map_err(ApiError::BadRequest)?;
        scope = scope.with_frameworks(frameworks);
    }
    if let Some(environment) = &req.environment {
        scope.environment = environment.clone();
    }
    Ok(scope)
}

/// POST /api/runs — trigger an assessment run.
///
/// Acknowledges with 202 as soon as the run is persisted; the pipeline
/// itself runs on a detached blocking task. Poll GET /api/runs/{id}
/// for progress.
async fn trigger_run(
    State(state): State<AppState>,
    Json(body): Json<TriggerRequest>,
) -> Result<(StatusCode, Json<serde_json::Value>), ApiError> {
    let scope = scope_from(&body)?;
    let question = body
        .question
        .unwrap_or_else(|| "Are we compliant with our baseline today?".to_string());

    let run_id = state.orch.start(scope, question)?;

    let orch = state.orch.clone();
    tokio::task::spawn_blocking(move || {
        if let Err(err) = orch.execute(&run_id) {
            tracing::error!(%run_id, error = %err, "run execution failed");
        }
    });

    Ok((
        StatusCode::ACCEPTED,
        Json(json!({ "run_id": run_id, "status": "running" })),
    ))
}

/// Compact run listing entry. The full context is large; the list
/// endpoint returns just enough to render a dashboard row.
#[derive(Debug, Serialize)]
struct RunView {
    run_id: Uuid,
    system_id: String,
    status: String,
    stage: String,
    started_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    score: Option<f64>,
}

impl From<&RunContext> for RunView {
    fn from(ctx: &RunContext) -> Self {
        Self {
            run_id: ctx.run_id,
            system_id: ctx.scope.system_id.clone(),
            status: ctx.status.to_string(),
            stage: ctx.stage.to_string(),
            started_at: ctx.started_at,
            updated_at: ctx.updated_at,
            score: ctx.summary.as_ref().map(|s| s.score),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct ListRunsQuery {
    #[serde(default)]
    status: Option<String>,
}

/// GET /api/runs — all runs, newest first. `?status=` filters on the
/// status label (running, suspended_for_approval, completed, failed).
async fn list_runs(
    State(state): State<AppState>,
    Query(query): Query<ListRunsQuery>,
) -> Result<Json<Vec<RunView>>, ApiError> {
    let mut runs = state.orch.list()?;
    if let Some(status) = &query.status {
        runs.retain(|run| run.status.to_string() == *status);
    }
    Ok(Json(runs.iter().map(RunView::from).collect()))
}

/// GET /api/runs/{run_id} — the full run context.
async fn get_run(
    State(state): State<AppState>,
    Path(run_id): Path<Uuid>,
) -> Result<Json<RunContext>, ApiError> {
    Ok(Json(state.orch.status(&run_id)?))
}

#[derive(Debug, Default, Deserialize)]
struct CancelBody {
    #[serde(default)]
    reason: Option<String>,
}

/// POST /api/runs/{run_id}/cancel — request cancellation. A running
/// run stops at its next stage boundary; a suspended run fails
/// immediately.
async fn cancel_run(
    State(state): State<AppState>,
    Path(run_id): Path<Uuid>,
    body: Option<Json<CancelBody>>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let reason = body
        .and_then(|Json(b)| b.reason)
        .unwrap_or_else(|| "cancelled via api".to_string());
    let ctx = state.orch.cancel(&run_id, reason)?;
    Ok(Json(json!({
        "run_id": ctx.run_id,
        "status": ctx.status.to_string(),
        "stage": ctx.stage.to_string(),
    })))
}

#[derive(Debug, Default, Deserialize)]
struct ApprovalsQuery {
    #[serde(default)]
    pending: Option<bool>,
    #[serde(default)]
    run_id: Option<Uuid>,
}

/// GET /api/approvals — approval requests, oldest first so reviewers
/// see the longest-waiting item on top.
async fn list_approvals(
    State(state): State<AppState>,
    Query(query): Query<ApprovalsQuery>,
) -> Result<Json<Vec<ApprovalRequest>>, ApiError> {
    let approvals = state.orch.approvals();
    let mut requests = match query.run_id {
        Some(run_id) => approvals.list_for_run(&run_id)?,
        None => approvals.list()?,
    };
    if query.pending.unwrap_or(false) {
        requests.retain(|r| r.is_pending());
    }
    requests.sort_by(|a, b| a.requested_at.cmp(&b.requested_at));
    Ok(Json(requests))
}

#[derive(Debug, Deserialize)]
struct ReviewRequest {
    decision: String,
    reviewer: String,
    #[serde(default)]
    notes: Option<String>,
}

/// POST /api/approvals/{request_id}/review — record a reviewer
/// decision.
///
/// A request its run is suspended on goes through resume, which drives
/// the pipeline forward once every pending decision is in; the
/// response then carries the post-resume run status. Router-raised
/// requests (per-call modify gating) are just decided.
async fn review_approval(
    State(state): State<AppState>,
    Path(request_id): Path<Uuid>,
    Json(body): Json<ReviewRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let approved = match body.decision.as_str() {
        "approve" | "approved" => true,
        "reject" | "rejected" => false,
        other => {
            return Err(ApiError::BadRequest(format!(
                "decision must be approve or reject, got {other:?}"
            )))
        }
    };
    if body.reviewer.trim().is_empty() {
        return Err(ApiError::BadRequest(
            "reviewer must not be empty".to_string(),
        ));
    }

    let request = state.orch.approvals().get(&request_id)?;
    let decision = if approved { "approved" } else { "rejected" };

    let suspended_on_request = state
        .orch
        .status(&request.run_id)
        .map(|ctx| ctx.pending_approvals.contains(&request_id))
        .unwrap_or(false);

    if suspended_on_request {
        let orch = state.orch.clone();
        let run_id = request.run_id;
        let reviewer = body.reviewer.clone();
        let notes = body.notes.clone();
        let ctx = tokio::task::spawn_blocking(move || {
            orch.resume(&run_id, &request_id, approved, &reviewer, notes)
        })
        .await
        .map_err(|err| ApiError::Internal(err.to_string()))??;

        return Ok(Json(json!({
            "run_id": ctx.run_id,
            "request_id": request_id,
            "decision": decision,
            "run_status": ctx.status.to_string(),
            "stage": ctx.stage.to_string(),
        })));
    }

    let updated =
        state
            .orch
            .approvals()
            .decide(&request_id, approved, &body.reviewer, body.notes)?;
    Ok(Json(json!({
        "run_id": updated.run_id,
        "request_id": request_id,
        "decision": decision,
        "status": updated.status,
    })))
}

#[derive(Debug, Default, Deserialize)]
struct AuditQuery {
    #[serde(default)]
    run_id: Option<Uuid>,
    #[serde(default)]
    since: Option<DateTime<Utc>>,
    #[serde(default)]
    until: Option<DateTime<Utc>>,
    #[serde(default)]
    offset: Option<usize>,
    #[serde(default)]
    limit: Option<usize>,
}

/// GET /api/audit — query the hash-chained tool-call log.
async fn query_audit(
    State(state): State<AppState>,
    Query(query): Query<AuditQuery>,
) -> Result<Json<Vec<ToolCallRecord>>, ApiError> {
    // No calls recorded yet: the log file does not exist until the
    // first run routes a tool call.
    if !state.audit_path.exists() {
        return Ok(Json(Vec::new()));
    }
    let filter = AuditFilter {
        run_id: query.run_id,
        since: query.since,
        until: query.until,
        offset: query.offset.unwrap_or(0),
        limit: query.limit,
    };
    let records = AuditLog::query(&state.audit_path, &filter)
        .map_err(|err| ApiError::Internal(err.to_string()))?;
    Ok(Json(records))
}
