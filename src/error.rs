//! Custom error types exposed across the application.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// The primary error type for the application.
#[derive(Debug, Error)]
pub enum AppError {
    /// Error related to configuration loading or parsing.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Error related to database operations.
    #[error("Database error: {0}")]
    DatabaseError(#[from] crate::database::DbError),

    /// Error from an external provider's API. The message carries the HTTP
    /// status and response body; the error taxonomy matches against it.
    #[error("API provider error: {0}")]
    ApiError(String),

    /// Network error while communicating with an external service.
    #[error("Network error: {0}")]
    NetworkError(String),

    /// The request itself is malformed (empty prompt, missing fields).
    #[error("Invalid request: {0}")]
    Validation(String),

    /// A referenced execution, workflow, or worker does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// A referenced model does not exist in the catalog.
    #[error("Model not found: {0}")]
    ModelNotFound(String),

    /// A model resolves but does not serve the requested worker.
    #[error("Model {model} does not serve worker {worker}")]
    InvalidModelCapability {
        /// The model id in question.
        model: String,
        /// The requested worker.
        worker: String,
    },

    /// A provider is eligible by configuration but its credential is absent.
    #[error("Missing API key for provider {0}")]
    MissingApiKey(String),

    /// The selector produced an empty chain for the request.
    #[error("No available provider for the requested worker")]
    NoAvailableProvider,

    /// Every provider in the chain was attempted and failed.
    #[error("All providers failed: {0}")]
    AllProvidersFailed(String),

    /// A workflow step failed, aborting the workflow.
    #[error("Step {step} failed: {message}")]
    WorkflowStepFailed {
        /// The failing step id.
        step: String,
        /// The underlying error.
        message: String,
    },

    /// The entry orchestrator exceeded its polling budget.
    #[error("Workflow did not reach a terminal state within the poll budget")]
    WorkflowTimeout,

    /// The defense-in-depth validator downgraded a reported success.
    #[error("Response indicates task was not completed")]
    PolicyFailureMatch,

    /// An execution with this id already exists.
    #[error("Execution {0} already exists")]
    DuplicateExecution(String),

    /// The caller presented a wrong or missing passphrase.
    #[error("Invalid or missing passphrase")]
    Unauthorized,

    /// The endpoint is deliberately refused.
    #[error("{0}")]
    Forbidden(String),
}

impl AppError {
    /// Stable machine-readable code for the error envelope.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::ConfigError(_) => "CONFIG_ERROR",
            AppError::DatabaseError(_) => "DATABASE_ERROR",
            AppError::ApiError(_) => "PROVIDER_ERROR",
            AppError::NetworkError(_) => "NETWORK_ERROR",
            AppError::Validation(_) => "INVALID_REQUEST",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::ModelNotFound(_) => "MODEL_NOT_FOUND",
            AppError::InvalidModelCapability { .. } => "INVALID_MODEL_CAPABILITY",
            AppError::MissingApiKey(_) => "MISSING_API_KEY",
            AppError::NoAvailableProvider => "NO_AVAILABLE_PROVIDER",
            AppError::AllProvidersFailed(_) => "ALL_PROVIDERS_FAILED",
            AppError::WorkflowStepFailed { .. } => "WORKFLOW_STEP_FAILED",
            AppError::WorkflowTimeout => "WORKFLOW_TIMEOUT",
            AppError::PolicyFailureMatch => "POLICY_FAILURE_MATCH",
            AppError::DuplicateExecution(_) => "DUPLICATE_EXECUTION",
            AppError::Unauthorized => "UNAUTHORIZED",
            AppError::Forbidden(_) => "FORBIDDEN",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            AppError::Validation(_) | AppError::InvalidModelCapability { .. } => {
                StatusCode::BAD_REQUEST
            }
            AppError::NotFound(_) | AppError::ModelNotFound(_) => StatusCode::NOT_FOUND,
            AppError::NoAvailableProvider | AppError::AllProvidersFailed(_) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            AppError::DuplicateExecution(_) => StatusCode::CONFLICT,
            AppError::Unauthorized => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = Json(json!({
            "error": self.to_string(),
            "code": self.code(),
        }));
        (status, body).into_response()
    }
}
