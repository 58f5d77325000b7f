//! The entry orchestrator: the single public execution entry point.
//!
//! Validates the request, classifies the task type, launches the matching
//! sub-workflow, polls it to a terminal state, applies the defense-in-depth
//! output validator, and posts the optional completion callback.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use rand::Rng;
use regex::Regex;
use reqwest::Client;
use serde_json::json;
use tokio::sync::RwLock;
use tokio::time::sleep;
use tracing::{error, info, warn};

use crate::{
    config::{CallbackConfig, RoutingConfig},
    error::AppError,
    models::{ExecutionStatus, PrimeWorkflowParams, TaskType, Worker},
    registry::Registry,
    router::SimpleRouter,
    subflows::{self, SubflowOutcome, SubflowStatus},
    validator::validate_success_output,
    waterfall,
};

/// One orchestrated execution, as reported by `GET /status/:id`.
#[derive(Debug, Clone)]
pub struct ExecutionRecord {
    /// Execution id (defaults to the task id).
    pub id: String,
    /// Current status.
    pub status: ExecutionStatus,
    /// Classified task type.
    pub task_type: Option<TaskType>,
    /// Output on completion.
    pub output: Option<String>,
    /// Error on failure.
    pub error: Option<String>,
    /// Executor that produced the output.
    pub runner_used: Option<String>,
    /// When the execution was accepted.
    pub started_at: DateTime<Utc>,
    /// When the execution reached a terminal state.
    pub finished_at: Option<DateTime<Utc>>,
}

/// In-process execution ledger. Creation is atomic on the id, which is what
/// makes duplicate submissions observable as conflicts.
#[derive(Clone, Debug, Default)]
pub struct ExecutionStore {
    inner: Arc<RwLock<HashMap<String, ExecutionRecord>>>,
}

impl ExecutionStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new execution; an already-used id is a conflict.
    pub async fn create(&self, id: &str, task_type: TaskType) -> Result<(), AppError> {
        let mut inner = self.inner.write().await;
        if inner.contains_key(id) {
            return Err(AppError::DuplicateExecution(id.to_string()));
        }
        drop(inner.insert(
            id.to_string(),
            ExecutionRecord {
                id: id.to_string(),
                status: ExecutionStatus::Queued,
                task_type: Some(task_type),
                output: None,
                error: None,
                runner_used: None,
                started_at: Utc::now(),
                finished_at: None,
            },
        ));
        Ok(())
    }

    /// Fetches an execution.
    pub async fn get(&self, id: &str) -> Option<ExecutionRecord> {
        self.inner.read().await.get(id).cloned()
    }

    /// Moves an execution to a non-terminal status.
    pub async fn set_status(&self, id: &str, status: ExecutionStatus) {
        if let Some(record) = self.inner.write().await.get_mut(id) {
            record.status = status;
        }
    }

    /// Finishes an execution.
    pub async fn finish(
        &self,
        id: &str,
        status: ExecutionStatus,
        output: Option<String>,
        error: Option<String>,
        runner_used: Option<String>,
    ) {
        if let Some(record) = self.inner.write().await.get_mut(id) {
            record.status = status;
            record.output = output;
            record.error = error;
            record.runner_used = runner_used;
            record.finished_at = Some(Utc::now());
        }
    }
}

/// Shared slot a launched sub-workflow writes its outcome into; the
/// orchestrator polls it instead of holding the sub-workflow's future.
type SubflowSlot = Arc<RwLock<Option<SubflowOutcome>>>;

/// The public entry point over the routing engine.
#[derive(Clone, Debug)]
pub struct Orchestrator {
    router: SimpleRouter,
    registry: Registry,
    store: ExecutionStore,
    routing: RoutingConfig,
    callback: CallbackConfig,
    http_client: Client,
}

impl Orchestrator {
    /// Assembles the orchestrator from its collaborators.
    pub fn new(
        router: SimpleRouter,
        registry: Registry,
        store: ExecutionStore,
        routing: RoutingConfig,
        callback: CallbackConfig,
    ) -> Result<Self, AppError> {
        let http_client = Client::builder()
            .user_agent(format!("genrelay/{}", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|err| AppError::ConfigError(format!("Failed to build HTTP client: {err}")))?;
        Ok(Self {
            router,
            registry,
            store,
            routing,
            callback,
            http_client,
        })
    }

    /// The execution ledger (shared with the HTTP layer).
    pub fn store(&self) -> &ExecutionStore {
        &self.store
    }

    /// Accepts an execution: validates, classifies, registers, and launches
    /// the run in the background. Returns the execution id.
    pub async fn execute(
        &self,
        id: Option<String>,
        params: PrimeWorkflowParams,
    ) -> Result<String, AppError> {
        let task_id = params
            .task_id
            .as_deref()
            .filter(|value| !value.trim().is_empty())
            .ok_or_else(|| AppError::Validation("task_id is required".into()))?;
        if params
            .title
            .as_deref()
            .map_or(true, |title| title.trim().is_empty())
        {
            return Err(AppError::Validation("title is required".into()));
        }

        let execution_id = id.unwrap_or_else(|| task_id.to_string());
        let task_type = classify_task_type(&params);
        self.store.create(&execution_id, task_type).await?;

        info!(execution = %execution_id, task_type = %task_type, "Execution accepted");

        let orchestrator = self.clone();
        let run_id = execution_id.clone();
        drop(tokio::spawn(async move {
            orchestrator.run_to_completion(&run_id, task_type, params).await;
        }));

        Ok(execution_id)
    }

    /// Drives one execution: launch, poll, validate, finish, callback.
    async fn run_to_completion(
        &self,
        execution_id: &str,
        task_type: TaskType,
        params: PrimeWorkflowParams,
    ) {
        let started = Utc::now();
        self.store
            .set_status(execution_id, ExecutionStatus::Running)
            .await;

        let slot: SubflowSlot = Arc::new(RwLock::new(None));
        self.launch_subflow(task_type, params.clone(), Arc::clone(&slot));

        let outcome = match self.poll_for_outcome(&slot).await {
            Some(outcome) => outcome,
            None => {
                warn!(execution = %execution_id, "Execution exceeded its poll budget");
                SubflowOutcome {
                    status: SubflowStatus::Failed,
                    output: None,
                    runner_used: None,
                    waterfall_position: None,
                    attempted_models: Vec::new(),
                    error: Some(AppError::WorkflowTimeout.to_string()),
                }
            }
        };

        let outcome = apply_output_validation(outcome);

        let status = match outcome.status {
            SubflowStatus::Completed => ExecutionStatus::Complete,
            SubflowStatus::Failed | SubflowStatus::Quarantined => ExecutionStatus::Errored,
        };
        self.store
            .finish(
                execution_id,
                status,
                outcome.output.clone(),
                outcome.error.clone(),
                outcome.runner_used.clone(),
            )
            .await;

        info!(
            execution = %execution_id,
            status = status.as_str(),
            "Execution finished"
        );

        if let Some(url) = params.callback_url.as_deref() {
            let duration_ms = (Utc::now() - started).num_milliseconds();
            self.post_callback(url, execution_id, task_type, &outcome, duration_ms)
                .await;
        }
    }

    /// Spawns the sub-workflow matching the task type; it reports through
    /// the shared slot.
    fn launch_subflow(&self, task_type: TaskType, params: PrimeWorkflowParams, slot: SubflowSlot) {
        let router = self.router.clone();
        let registry = self.registry.clone();
        let routing = self.routing.clone();

        drop(tokio::spawn(async move {
            let outcome = match task_type {
                TaskType::Code => {
                    let chain = waterfall::resolve(
                        &registry,
                        &params,
                        routing.default_waterfall.as_deref(),
                        Utc::now(),
                    )
                    .await
                    .unwrap_or_else(|_| {
                        waterfall::DEFAULT_CODE_WATERFALL
                            .iter()
                            .map(|&m| m.to_string())
                            .collect()
                    });
                    subflows::run_code_execution(&router, &params, &chain).await
                }
                TaskType::Text => subflows::run_text_generation(&router, &params).await,
                TaskType::Video => subflows::run_video_render(&router, &params).await,
                TaskType::Image => {
                    subflows::run_media_generation(&router, &params, Worker::ImageGen).await
                }
                TaskType::Audio => {
                    subflows::run_media_generation(&router, &params, Worker::AudioGen).await
                }
                TaskType::ShippingResearch => {
                    subflows::run_shipping_research(&router, &params, &routing.shipping_model)
                        .await
                }
            };
            *slot.write().await = Some(outcome);
        }));
    }

    /// Polls the sub-workflow slot at the configured interval until it is
    /// terminal or the attempt budget runs out.
    async fn poll_for_outcome(&self, slot: &SubflowSlot) -> Option<SubflowOutcome> {
        let interval = Duration::from_secs(self.routing.poll_interval_secs);
        for _attempt in 0..self.routing.poll_max_attempts {
            if let Some(outcome) = slot.read().await.clone() {
                return Some(outcome);
            }
            sleep(interval).await;
        }
        slot.read().await.clone()
    }

    /// Best-effort completion callback: three attempts with exponential
    /// backoff and jitter. Failures never change the recorded outcome.
    async fn post_callback(
        &self,
        url: &str,
        task_id: &str,
        task_type: TaskType,
        outcome: &SubflowOutcome,
        duration_ms: i64,
    ) {
        let envelope = json!({
            "task_id": task_id,
            "status": outcome.status.as_str(),
            "task_type": task_type.as_str(),
            "runner_used": outcome.runner_used,
            "output": outcome.output,
            "error": outcome.error,
            "duration_ms": duration_ms,
            "timestamp": Utc::now().to_rfc3339(),
        });

        for attempt in 1..=3u32 {
            let mut builder = self.http_client.post(url).json(&envelope);
            if let Some(passphrase) = self.callback.passphrase.as_deref() {
                builder = builder.header("X-Passphrase", passphrase);
            }

            match builder.send().await {
                Ok(response) if response.status().is_success() => {
                    info!(url, attempt, "Callback delivered");
                    return;
                }
                Ok(response) => {
                    warn!(url, attempt, status = %response.status(), "Callback rejected");
                }
                Err(err) => {
                    warn!(url, attempt, error = %err, "Callback failed");
                }
            }

            if attempt < 3 {
                let base = Duration::from_secs(1u64 << attempt);
                let jitter = Duration::from_millis(rand::thread_rng().gen_range(0..500));
                sleep(base + jitter).await;
            }
        }
        error!(url, "Callback abandoned after 3 attempts");
    }
}

/// Downgrades a reported success whose output trips the failure-indicator
/// scan or the minimum-length gate.
fn apply_output_validation(outcome: SubflowOutcome) -> SubflowOutcome {
    if outcome.status != SubflowStatus::Completed {
        return outcome;
    }
    let output = outcome.output.clone().unwrap_or_default();
    match validate_success_output(&output) {
        None => outcome,
        Some(reason) => {
            warn!(reason = %reason, "Downgrading reported success");
            SubflowOutcome {
                status: SubflowStatus::Failed,
                error: Some(reason),
                ..outcome
            }
        }
    }
}

/// Classifies a task. The order is authoritative: strong context signals,
/// then bracketed title tags, then content keywords, then caller hints,
/// then the text default.
pub fn classify_task_type(params: &PrimeWorkflowParams) -> TaskType {
    if params.context.repo.is_some() {
        return TaskType::Code;
    }
    if params.context.timeline.is_some() {
        return TaskType::Video;
    }
    if params.context.product.is_some() {
        return TaskType::ShippingResearch;
    }

    let title = params.title.clone().unwrap_or_default().to_lowercase();
    if let Some(task_type) = classify_title_tags(&title) {
        return task_type;
    }

    let description = params.description.clone().unwrap_or_default().to_lowercase();
    let content = format!("{title} {description}");
    if CODE_KEYWORDS.iter().any(|kw| content.contains(kw)) {
        return TaskType::Code;
    }

    if let Some(task_type) = classify_hint(params.hints.workflow.as_deref()) {
        return task_type;
    }

    TaskType::Text
}

const CODE_TAGS: &[&str] = &["implement", "bugfix", "cc", "code", "fix", "refactor", "debug"];
const TEXT_TAGS: &[&str] = &["research", "analyze", "write", "summarize", "explain"];
const VIDEO_TAGS: &[&str] = &["video", "render", "animate"];
const IMAGE_TAGS: &[&str] = &["image", "picture", "illustration", "generate-image"];
const AUDIO_TAGS: &[&str] = &["audio", "speech", "tts", "voice", "synthesize"];

const CODE_KEYWORDS: &[&str] = &[
    "implement",
    "refactor",
    "debug",
    "bugfix",
    "fix the bug",
    "write code",
    "unit test",
    "pull request",
    "compile",
];

fn classify_title_tags(title: &str) -> Option<TaskType> {
    static TAG: OnceLock<Regex> = OnceLock::new();
    let pattern = TAG.get_or_init(|| Regex::new(r"\[([a-z-]+)\]").expect("static regex"));

    for captures in pattern.captures_iter(title) {
        let tag = &captures[1];
        if CODE_TAGS.contains(&tag) {
            return Some(TaskType::Code);
        }
        if TEXT_TAGS.contains(&tag) {
            return Some(TaskType::Text);
        }
        if VIDEO_TAGS.contains(&tag) {
            return Some(TaskType::Video);
        }
        if IMAGE_TAGS.contains(&tag) {
            return Some(TaskType::Image);
        }
        if AUDIO_TAGS.contains(&tag) {
            return Some(TaskType::Audio);
        }
    }
    None
}

fn classify_hint(hint: Option<&str>) -> Option<TaskType> {
    match hint? {
        "code" | "code-execution" => Some(TaskType::Code),
        "text" | "text-generation" => Some(TaskType::Text),
        "video" | "video-render" => Some(TaskType::Video),
        "image" | "image-generation" => Some(TaskType::Image),
        "audio" | "audio-generation" => Some(TaskType::Audio),
        "shipping-research" | "product-shipping-research" => Some(TaskType::ShippingResearch),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{TaskContext, TaskHints};
    use serde_json::json;

    fn params(title: &str) -> PrimeWorkflowParams {
        PrimeWorkflowParams {
            task_id: Some("t1".into()),
            title: Some(title.into()),
            ..PrimeWorkflowParams::default()
        }
    }

    #[test]
    fn repo_context_forces_code() {
        let mut request = params("[video] render the intro");
        request.context = TaskContext {
            repo: Some("org/repo".into()),
            ..TaskContext::default()
        };
        assert_eq!(classify_task_type(&request), TaskType::Code);
    }

    #[test]
    fn timeline_context_forces_video() {
        let mut request = params("[code] fix it");
        request.context.repo = None;
        request.context.timeline = Some(json!({"scenes": []}));
        assert_eq!(classify_task_type(&request), TaskType::Video);
    }

    #[test]
    fn product_context_forces_shipping_research() {
        let mut request = params("anything");
        request.context.product = Some(json!({"name": "desk lamp"}));
        assert_eq!(classify_task_type(&request), TaskType::ShippingResearch);
    }

    #[test]
    fn title_tags_classify() {
        assert_eq!(classify_task_type(&params("[bugfix] crash on save")), TaskType::Code);
        assert_eq!(classify_task_type(&params("[research] llm pricing")), TaskType::Text);
        assert_eq!(classify_task_type(&params("[render] intro clip")), TaskType::Video);
        assert_eq!(classify_task_type(&params("[illustration] a fox")), TaskType::Image);
        assert_eq!(classify_task_type(&params("[tts] welcome message")), TaskType::Audio);
    }

    #[test]
    fn content_keywords_classify_as_code() {
        let mut request = params("please help");
        request.description = Some("refactor the session module and add a unit test".into());
        assert_eq!(classify_task_type(&request), TaskType::Code);
    }

    #[test]
    fn hints_are_a_last_resort() {
        let mut request = params("do the thing");
        request.hints = TaskHints {
            workflow: Some("audio-generation".into()),
        };
        assert_eq!(classify_task_type(&request), TaskType::Audio);
    }

    #[test]
    fn default_is_text() {
        assert_eq!(classify_task_type(&params("hello world")), TaskType::Text);
    }

    #[test]
    fn validation_downgrades_indicator_output() {
        let outcome = SubflowOutcome {
            status: SubflowStatus::Completed,
            output: Some(format!(
                "I couldn't find any file named test.txt in the repo.{}",
                " filler".repeat(20)
            )),
            runner_used: Some("anthropic-sonnet".into()),
            waterfall_position: Some(0),
            attempted_models: vec!["anthropic-sonnet".into()],
            error: None,
        };
        let validated = apply_output_validation(outcome);
        assert_eq!(validated.status, SubflowStatus::Failed);
        assert_eq!(
            validated.error.as_deref(),
            Some("Response indicates task was not completed")
        );
    }

    #[test]
    fn validation_passes_clean_output() {
        let outcome = SubflowOutcome {
            status: SubflowStatus::Completed,
            output: Some("All tests pass and the feature is wired end to end.".repeat(4)),
            runner_used: None,
            waterfall_position: None,
            attempted_models: vec![],
            error: None,
        };
        assert_eq!(apply_output_validation(outcome).status, SubflowStatus::Completed);
    }

    #[tokio::test]
    async fn duplicate_execution_ids_conflict() {
        let store = ExecutionStore::new();
        store.create("T42", TaskType::Text).await.expect("first");
        let err = store.create("T42", TaskType::Text).await.expect_err("dup");
        assert!(matches!(err, AppError::DuplicateExecution(_)));
    }
}
