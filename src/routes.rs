//! Defines the API routes and handlers for the web server.

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::HeaderMap,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::{
    error::AppError,
    models::{
        PrimeWorkflowParams, RequestConstraints, RouterResponse, SimpleRequest, TaskHints,
        WorkflowDefinition,
    },
    orchestrator::Orchestrator,
    registry::Registry,
    router::SimpleRouter,
    workflow::WorkflowEngine,
};

/// Shared application state passed into route handlers.
#[derive(Clone, Debug)]
pub struct AppState {
    orchestrator: Arc<Orchestrator>,
    simple_router: Arc<SimpleRouter>,
    engine: Arc<WorkflowEngine>,
    registry: Registry,
    passphrase: Option<String>,
}

impl AppState {
    /// Creates a new `AppState` instance.
    pub fn new(
        orchestrator: Arc<Orchestrator>,
        simple_router: Arc<SimpleRouter>,
        engine: Arc<WorkflowEngine>,
        registry: Registry,
        passphrase: Option<String>,
    ) -> Self {
        Self {
            orchestrator,
            simple_router,
            engine,
            registry,
            passphrase,
        }
    }

    fn check_passphrase(&self, headers: &HeaderMap) -> Result<(), AppError> {
        let Some(expected) = self.passphrase.as_deref() else {
            return Ok(());
        };
        let presented = headers
            .get("X-Passphrase")
            .and_then(|value| value.to_str().ok());
        if presented == Some(expected) {
            Ok(())
        } else {
            Err(AppError::Unauthorized)
        }
    }
}

/// Creates the main API router for the application.
pub fn api_router(state: AppState) -> Router {
    Router::new()
        .route("/execute", post(execute_handler))
        .route("/status/:id", get(status_handler))
        .route("/workflows/:kind", post(legacy_workflow_handler))
        .route("/workflows/:kind/:id", get(legacy_status_handler))
        .route("/health", get(health_handler))
        .route("/api/v1/generate", post(generate_handler))
        .route("/api/v1/workflow", post(run_workflow_handler))
        .route(
            "/api/v1/workflows",
            get(list_definitions_handler).post(save_definition_handler),
        )
        .with_state(state)
}

#[derive(Debug, Deserialize)]
struct ExecuteBody {
    #[serde(default)]
    id: Option<String>,
    params: PrimeWorkflowParams,
}

/// Handler for `POST /execute`, the single public entry point.
async fn execute_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<ExecuteBody>,
) -> Result<Json<Value>, AppError> {
    state.check_passphrase(&headers)?;

    tracing::info!(task_id = ?body.params.task_id, "Received execution request");
    let execution_id = state.orchestrator.execute(body.id, body.params).await?;

    Ok(Json(json!({
        "success": true,
        "execution_id": execution_id,
        "status": "accepted",
    })))
}

/// Handler for `GET /status/:id`.
async fn status_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, AppError> {
    let record = state
        .orchestrator
        .store()
        .get(&id)
        .await
        .ok_or_else(|| AppError::NotFound(format!("execution {id}")))?;

    Ok(Json(json!({
        "status": record.status.as_str(),
        "output": record.output,
        "error": record.error,
    })))
}

const LEGACY_KINDS: &[&str] = &[
    "code-execution",
    "text-generation",
    "image-generation",
    "audio-generation",
];

#[derive(Debug, Deserialize)]
struct LegacyWorkflowBody {
    #[serde(default)]
    task_id: Option<String>,
    #[serde(default)]
    request_id: Option<String>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    prompt: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    callback_url: Option<String>,
    #[serde(flatten)]
    rest: HashMap<String, Value>,
}

/// Handler for the legacy `POST /workflows/:kind` surface: re-routes into
/// the entry orchestrator by synthesizing PrimeWorkflow parameters.
async fn legacy_workflow_handler(
    State(state): State<AppState>,
    Path(kind): Path<String>,
    headers: HeaderMap,
    Json(body): Json<LegacyWorkflowBody>,
) -> Result<Json<Value>, AppError> {
    state.check_passphrase(&headers)?;

    if kind == "product-shipping-research" {
        return Err(AppError::Forbidden(
            "product-shipping-research must be submitted through POST /execute".into(),
        ));
    }
    if !LEGACY_KINDS.contains(&kind.as_str()) {
        return Err(AppError::NotFound(format!("workflow kind {kind}")));
    }

    let task_id = body.task_id.or(body.request_id);
    let title = body.title.or_else(|| body.prompt.clone());
    let params = PrimeWorkflowParams {
        task_id,
        title,
        description: body.description,
        hints: TaskHints {
            workflow: Some(kind.clone()),
        },
        callback_url: body.callback_url,
        ..PrimeWorkflowParams::default()
    };
    let _unrecognized = body.rest;

    let execution_id = state.orchestrator.execute(None, params).await?;

    Ok(Json(json!({
        "success": true,
        "execution_id": execution_id,
        "status": "accepted",
        "redirected": true,
        "notice": format!(
            "POST /workflows/{kind} is deprecated; submit through POST /execute"
        ),
    })))
}

/// Handler for the legacy `GET /workflows/:kind/:id` status passthrough.
async fn legacy_status_handler(
    State(state): State<AppState>,
    Path((kind, id)): Path<(String, String)>,
) -> Result<Json<Value>, AppError> {
    if !LEGACY_KINDS.contains(&kind.as_str()) {
        return Err(AppError::NotFound(format!("workflow kind {kind}")));
    }
    status_handler(State(state), Path(id)).await
}

/// Handler for `GET /health`: service liveness plus provider summaries.
async fn health_handler(State(state): State<AppState>) -> Result<Json<Value>, AppError> {
    let mut providers = Vec::new();
    for worker in crate::models::Worker::all() {
        for provider in state.registry.get_providers_for_worker(worker).await? {
            if providers.iter().any(|entry: &Value| entry["id"] == provider.id.as_str()) {
                continue;
            }
            let status = state.registry.get_status(&provider.id).await?;
            providers.push(json!({
                "id": provider.id,
                "healthy": status.healthy,
                "consecutive_failures": status.consecutive_failures,
                "exhausted_until": status.marked_exhausted_until,
            }));
        }
    }

    Ok(Json(json!({
        "status": "ok",
        "providers": providers,
    })))
}

/// Handler for `POST /api/v1/generate`: one routed generation.
async fn generate_handler(
    State(state): State<AppState>,
    Json(payload): Json<SimpleRequest>,
) -> Result<Json<RouterResponse>, AppError> {
    tracing::info!(worker = %payload.worker, "Received generation request");

    let response = state.simple_router.route(&payload).await?;

    Ok(Json(response))
}

#[derive(Debug, Deserialize)]
struct RunWorkflowBody {
    #[serde(default)]
    workflow_id: Option<String>,
    #[serde(default)]
    definition: Option<WorkflowDefinition>,
    #[serde(default)]
    variables: HashMap<String, Value>,
    #[serde(default)]
    constraints: RequestConstraints,
}

/// Handler for `POST /api/v1/workflow`: runs a stored or inline definition.
async fn run_workflow_handler(
    State(state): State<AppState>,
    Json(body): Json<RunWorkflowBody>,
) -> Result<Json<RouterResponse>, AppError> {
    let definition = match (body.definition, body.workflow_id) {
        (Some(definition), _) => definition,
        (None, Some(id)) => state
            .registry
            .get_workflow(&id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("workflow {id}")))?,
        (None, None) => {
            return Err(AppError::Validation(
                "Either workflow_id or definition is required".into(),
            ))
        }
    };

    let response = state
        .engine
        .execute(&definition, &body.variables, &body.constraints)
        .await?;

    Ok(Json(response))
}

/// Handler for `GET /api/v1/workflows`: lists definitions (persisted plus
/// built-ins).
async fn list_definitions_handler(
    State(state): State<AppState>,
) -> Result<Json<Vec<WorkflowDefinition>>, AppError> {
    Ok(Json(state.registry.list_workflows().await?))
}

/// Handler for `POST /api/v1/workflows`: persists a definition by id.
async fn save_definition_handler(
    State(state): State<AppState>,
    Json(definition): Json<WorkflowDefinition>,
) -> Result<Json<Value>, AppError> {
    if definition.id.trim().is_empty() || definition.steps.is_empty() {
        return Err(AppError::Validation(
            "Workflow definitions need an id and at least one step".into(),
        ));
    }
    state.registry.save_workflow(&definition).await?;
    Ok(Json(json!({ "saved": definition.id })))
}
