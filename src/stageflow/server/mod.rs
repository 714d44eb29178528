// SPDX-License-Identifier: MIT

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::net::SocketAddr;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::adk::error::{Result, StageflowError};
use crate::stageflow::pipelines::{research, security};
use crate::stageflow::workflow::runner::{RunOutcome, RunnerSet};

pub async fn serve(port: u16, runners: RunnerSet) -> Result<()> {
    let app = router(runners);

    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    log::info!("Listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

pub fn router(runners: RunnerSet) -> Router {
    Router::new()
        .route("/api/health", get(health_check))
        .route("/api/research", post(start_research))
        .route("/api/url-checks", post(start_url_check))
        .route(
            "/api/instances/{id}",
            get(get_instance).delete(discard_instance),
        )
        .route("/api/instances/{id}/resume", post(resume_instance))
        .with_state(runners)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// Error body with a status derived from the error kind
struct ApiError(StageflowError);

impl From<StageflowError> for ApiError {
    fn from(e: StageflowError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match &self.0 {
            StageflowError::CheckpointNotFound { .. } => {
                (StatusCode::NOT_FOUND, json!({ "error": self.0.to_string() }))
            }
            StageflowError::PendingCheckpoint { stage, .. } => (
                StatusCode::CONFLICT,
                json!({ "error": self.0.to_string(), "stage": stage }),
            ),
            StageflowError::Guardrail(rejection) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                json!({ "error": "Input rejected", "reasons": rejection.reasons }),
            ),
            // Request data that does not fit the stage reading it
            StageflowError::MissingField { field }
            | StageflowError::InvalidField { field, .. } => (
                StatusCode::BAD_REQUEST,
                json!({ "error": self.0.to_string(), "field": field }),
            ),
            other => {
                log::error!("Request failed: {}", other);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({ "error": other.to_string() }),
                )
            }
        };
        (status, Json(body)).into_response()
    }
}

type ApiResult = std::result::Result<Json<Value>, ApiError>;

fn outcome_body(instance_id: &str, outcome: &RunOutcome) -> Value {
    let mut body = outcome.to_json();
    if let Some(obj) = body.as_object_mut() {
        obj.insert("instance_id".to_string(), json!(instance_id));
    }
    body
}

fn new_instance_id(requested: Option<String>) -> String {
    requested.unwrap_or_else(|| uuid::Uuid::new_v4().to_string())
}

async fn health_check() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

#[derive(Deserialize)]
struct ResearchRequest {
    topic: String,
    #[serde(default)]
    instance_id: Option<String>,
    #[serde(default)]
    num_queries: Option<usize>,
    #[serde(default)]
    top_k: Option<usize>,
}

async fn start_research(
    State(runners): State<RunnerSet>,
    Json(payload): Json<ResearchRequest>,
) -> ApiResult {
    let instance_id = new_instance_id(payload.instance_id);
    let mut seed = research::seed(&payload.topic);
    if let Some(n) = payload.num_queries {
        seed.insert(research::fields::NUM_QUERIES.to_string(), json!(n));
    }
    if let Some(k) = payload.top_k {
        seed.insert(research::fields::TOP_K.to_string(), json!(k));
    }

    let outcome = runners
        .get(research::WORKFLOW)?
        .start(&instance_id, seed)
        .await?;
    Ok(Json(outcome_body(&instance_id, &outcome)))
}

#[derive(Deserialize)]
struct UrlCheckRequest {
    url: String,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    instance_id: Option<String>,
}

async fn start_url_check(
    State(runners): State<RunnerSet>,
    Json(payload): Json<UrlCheckRequest>,
) -> ApiResult {
    let instance_id = new_instance_id(payload.instance_id);
    let seed = security::seed(&payload.url, payload.email.as_deref());

    let outcome = runners
        .get(security::WORKFLOW)?
        .start(&instance_id, seed)
        .await?;
    Ok(Json(outcome_body(&instance_id, &outcome)))
}

async fn get_instance(State(runners): State<RunnerSet>, Path(id): Path<String>) -> ApiResult {
    let checkpoint = runners
        .pending(&id)
        .await?
        .ok_or(StageflowError::CheckpointNotFound {
            instance_id: id.clone(),
        })?;

    Ok(Json(json!({
        "instance_id": checkpoint.instance_id,
        "status": "suspended",
        "workflow": checkpoint.workflow,
        "stage": checkpoint.stage,
        "prompt": checkpoint.interrupt.prompt,
        "data": checkpoint.interrupt.data,
        "created_at": checkpoint.created_at,
    })))
}

#[derive(Deserialize)]
struct ResumeRequest {
    /// Injected into the suspended stage, e.g. `true` to approve
    decision: Value,
}

async fn resume_instance(
    State(runners): State<RunnerSet>,
    Path(id): Path<String>,
    Json(payload): Json<ResumeRequest>,
) -> ApiResult {
    let outcome = runners.resume(&id, payload.decision).await?;
    Ok(Json(outcome_body(&id, &outcome)))
}

async fn discard_instance(State(runners): State<RunnerSet>, Path(id): Path<String>) -> ApiResult {
    let checkpoint = runners.discard(&id).await?;
    Ok(Json(json!({
        "instance_id": id,
        "status": "discarded",
        "stage": checkpoint.stage,
    })))
}
