//! Core data structures shared across web handlers, the routing engine, and
//! provider adapters.

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A logical capability domain a request can target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Worker {
    /// Text generation (chat, classification, code).
    TextGen,
    /// Image generation.
    ImageGen,
    /// Audio / speech synthesis.
    AudioGen,
    /// Video generation.
    VideoGen,
    /// Embedding generation.
    EmbeddingGen,
}

impl Worker {
    /// Returns the canonical string identifier for the worker.
    pub fn as_str(&self) -> &'static str {
        match self {
            Worker::TextGen => "text-gen",
            Worker::ImageGen => "image-gen",
            Worker::AudioGen => "audio-gen",
            Worker::VideoGen => "video-gen",
            Worker::EmbeddingGen => "embedding-gen",
        }
    }

    /// Resolves a worker from its stable identifier.
    pub fn from_id(value: &str) -> Option<Self> {
        match value {
            "text-gen" => Some(Worker::TextGen),
            "image-gen" => Some(Worker::ImageGen),
            "audio-gen" => Some(Worker::AudioGen),
            "video-gen" => Some(Worker::VideoGen),
            "embedding-gen" => Some(Worker::EmbeddingGen),
            _ => None,
        }
    }

    /// All workers seeded into the catalog.
    pub fn all() -> [Worker; 5] {
        [
            Worker::TextGen,
            Worker::ImageGen,
            Worker::AudioGen,
            Worker::VideoGen,
            Worker::EmbeddingGen,
        ]
    }
}

impl fmt::Display for Worker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a provider is deployed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// Remote vendor API.
    Api,
    /// On-prem / self-hosted endpoint reachable via a base URL.
    Local,
    /// A gateway that multiplexes other providers.
    Gateway,
}

impl ProviderKind {
    /// Canonical string form used in the catalog.
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Api => "api",
            ProviderKind::Local => "local",
            ProviderKind::Gateway => "gateway",
        }
    }

    /// Parses the catalog string form; unknown values default to `api`.
    pub fn from_key(value: &str) -> Self {
        match value {
            "local" => ProviderKind::Local,
            "gateway" => ProviderKind::Gateway,
            _ => ProviderKind::Api,
        }
    }
}

/// Where the provider expects its credential.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthShape {
    /// `Authorization: Bearer <token>`.
    Bearer,
    /// A provider-specific API-key header.
    ApiKey,
    /// No credential (local endpoints).
    None,
}

impl AuthShape {
    /// Canonical string form used in the catalog.
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthShape::Bearer => "bearer",
            AuthShape::ApiKey => "api_key",
            AuthShape::None => "none",
        }
    }

    /// Parses the catalog string form; unknown values default to `bearer`.
    pub fn from_key(value: &str) -> Self {
        match value {
            "api_key" => AuthShape::ApiKey,
            "none" => AuthShape::None,
            _ => AuthShape::Bearer,
        }
    }
}

/// Output quality tier of a model. Ordering is `Draft < Standard < Premium`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QualityTier {
    /// Cheapest, lowest fidelity.
    Draft,
    /// Default tier.
    Standard,
    /// Highest fidelity.
    Premium,
}

impl QualityTier {
    /// Canonical string form used in the catalog.
    pub fn as_str(&self) -> &'static str {
        match self {
            QualityTier::Draft => "draft",
            QualityTier::Standard => "standard",
            QualityTier::Premium => "premium",
        }
    }

    /// Parses the catalog string form; unknown values default to `standard`.
    pub fn from_key(value: &str) -> Self {
        match value {
            "draft" => QualityTier::Draft,
            "premium" => QualityTier::Premium,
            _ => QualityTier::Standard,
        }
    }
}

/// Latency tier of a model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpeedTier {
    /// Sub-second to a few seconds.
    Fast,
    /// Seconds to tens of seconds.
    Medium,
    /// Long-running (video, large batch).
    Slow,
}

impl SpeedTier {
    /// Canonical string form used in the catalog.
    pub fn as_str(&self) -> &'static str {
        match self {
            SpeedTier::Fast => "fast",
            SpeedTier::Medium => "medium",
            SpeedTier::Slow => "slow",
        }
    }

    /// Parses the catalog string form; unknown values default to `medium`.
    pub fn from_key(value: &str) -> Self {
        match value {
            "fast" => SpeedTier::Fast,
            "slow" => SpeedTier::Slow,
            _ => SpeedTier::Medium,
        }
    }
}

/// A catalog row describing a capability domain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerRecord {
    /// Stable worker identifier.
    pub id: Worker,
    /// Display name.
    pub name: String,
    /// Media types the worker produces (informational).
    pub media_types: Vec<String>,
    /// Whether the worker accepts requests.
    pub enabled: bool,
}

/// A catalog row describing a generation service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderRecord {
    /// Stable provider identifier (e.g. `anthropic`).
    pub id: String,
    /// Display name.
    pub name: String,
    /// Deployment kind.
    pub kind: ProviderKind,
    /// Base endpoint; required for `local` providers.
    pub base_endpoint: Option<String>,
    /// Where the credential goes.
    pub auth_type: AuthShape,
    /// Credential identifier resolved against the environment.
    pub auth_secret_name: Option<String>,
    /// Global priority (lower = tried earlier).
    pub priority: i64,
    /// Whether the provider may be selected at all.
    pub enabled: bool,
    /// Optional requests-per-minute limit (advisory).
    pub rate_limit_rpm: Option<i64>,
    /// Optional daily request quota (advisory).
    pub daily_quota: Option<i64>,
}

/// A catalog row describing a model a provider exposes for a worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelRecord {
    /// Stable model identifier within this catalog.
    pub id: String,
    /// Owning provider id.
    pub provider_id: String,
    /// Provider-native model name sent on the wire.
    pub model_id: String,
    /// Worker the model serves.
    pub worker: Worker,
    /// Capability tags (e.g. `text`, `reasoning`, `code`).
    pub capabilities: Vec<String>,
    /// Context window in tokens, when known.
    pub context_window: Option<i64>,
    /// Input cost per 1k tokens, in cents.
    pub cost_input_per_1k: f64,
    /// Output cost per 1k tokens, in cents.
    pub cost_output_per_1k: f64,
    /// Quality tier.
    pub quality_tier: QualityTier,
    /// Speed tier.
    pub speed_tier: SpeedTier,
    /// Priority within the provider (lower = tried earlier).
    pub priority: i64,
    /// Whether the model may be selected.
    pub enabled: bool,
}

impl ModelRecord {
    /// True if every required tag appears in this model's capability list.
    pub fn has_capabilities(&self, required: &[String]) -> bool {
        required
            .iter()
            .all(|tag| self.capabilities.iter().any(|c| c == tag))
    }
}

/// Mutable per-provider health state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderStatus {
    /// Provider this row belongs to.
    pub provider_id: String,
    /// False once consecutive failures cross the threshold.
    pub healthy: bool,
    /// Last successful call.
    pub last_success_at: Option<DateTime<Utc>>,
    /// Last failed call.
    pub last_failure_at: Option<DateTime<Utc>>,
    /// Failures since the last success.
    pub consecutive_failures: i64,
    /// Requests counted against the daily quota.
    pub quota_used_today: i64,
    /// When the daily quota resets.
    pub quota_resets_at: Option<DateTime<Utc>>,
    /// While in the future, the provider is not eligible for selection.
    pub marked_exhausted_until: Option<DateTime<Utc>>,
}

impl ProviderStatus {
    /// A fresh status row for a provider that has never been used.
    pub fn fresh(provider_id: &str) -> Self {
        Self {
            provider_id: provider_id.to_string(),
            healthy: true,
            last_success_at: None,
            last_failure_at: None,
            consecutive_failures: 0,
            quota_used_today: 0,
            quota_resets_at: None,
            marked_exhausted_until: None,
        }
    }

    /// True while the exhaustion deadline lies in the future.
    pub fn is_exhausted(&self, now: DateTime<Utc>) -> bool {
        self.marked_exhausted_until.map_or(false, |until| until > now)
    }
}

/// Recognized request constraints narrowing the selector chain.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RequestConstraints {
    /// Rough upper bound on estimated cost, in cents (advisory).
    #[serde(default)]
    pub max_cost_cents: Option<f64>,
    /// Rough upper bound on latency (advisory).
    #[serde(default)]
    pub max_latency_ms: Option<i64>,
    /// Minimum acceptable quality tier.
    #[serde(default)]
    pub min_quality: Option<QualityTier>,
    /// Restrict the chain to `local` providers.
    #[serde(default)]
    pub require_local: bool,
    /// Every tag listed must be present on a candidate model.
    #[serde(default)]
    pub require_capabilities: Vec<String>,
    /// Provider ids never considered.
    #[serde(default)]
    pub exclude_providers: Vec<String>,
}

impl RequestConstraints {
    /// Merges `step` constraints over `self`; the step wins on conflict.
    pub fn merged_with(&self, step: &RequestConstraints) -> RequestConstraints {
        RequestConstraints {
            max_cost_cents: step.max_cost_cents.or(self.max_cost_cents),
            max_latency_ms: step.max_latency_ms.or(self.max_latency_ms),
            min_quality: step.min_quality.or(self.min_quality),
            require_local: step.require_local || self.require_local,
            require_capabilities: if step.require_capabilities.is_empty() {
                self.require_capabilities.clone()
            } else {
                step.require_capabilities.clone()
            },
            exclude_providers: if step.exclude_providers.is_empty() {
                self.exclude_providers.clone()
            } else {
                step.exclude_providers.clone()
            },
        }
    }
}

/// Which routing tier a text request should take.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RoutingTier {
    /// Let the classifier decide.
    #[default]
    Auto,
    /// Fast, cheap path bypassing the full chain.
    TextOnly,
    /// Full chain with code-capable models.
    Code,
}

/// Worker-tagged option bag. Adapters read the fields relevant to their
/// worker and ignore the rest.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MediaOptions {
    // text
    /// System prompt; injected by the transformer only when absent.
    #[serde(default)]
    pub system_prompt: Option<String>,
    /// Generation token cap.
    #[serde(default)]
    pub max_tokens: Option<u32>,
    /// Sampling temperature.
    #[serde(default)]
    pub temperature: Option<f64>,
    /// Nucleus sampling parameter.
    #[serde(default)]
    pub top_p: Option<f64>,
    /// Stop sequences.
    #[serde(default)]
    pub stop_sequences: Vec<String>,
    /// Caller task hint consumed by the tier classifier and transformers.
    #[serde(default)]
    pub task_type: Option<String>,
    /// Explicit routing tier; `auto` defers to the classifier.
    #[serde(default)]
    pub routing_tier: RoutingTier,

    // image
    /// Output width in pixels.
    #[serde(default)]
    pub width: Option<u32>,
    /// Output height in pixels.
    #[serde(default)]
    pub height: Option<u32>,
    /// Aspect ratio (e.g. `16:9`); shared with video.
    #[serde(default)]
    pub aspect_ratio: Option<String>,
    /// Style hint.
    #[serde(default)]
    pub style: Option<String>,
    /// Negative prompt.
    #[serde(default)]
    pub negative_prompt: Option<String>,
    /// Number of images.
    #[serde(default)]
    pub num_images: Option<u32>,

    // audio
    /// Voice identifier.
    #[serde(default)]
    pub voice_id: Option<String>,
    /// Speech speed multiplier.
    #[serde(default)]
    pub speed: Option<f64>,
    /// Voice stability.
    #[serde(default)]
    pub stability: Option<f64>,
    /// Similarity boost.
    #[serde(default)]
    pub similarity_boost: Option<f64>,
    /// Output container/codec.
    #[serde(default)]
    pub output_format: Option<String>,

    // video
    /// Clip duration in seconds.
    #[serde(default)]
    pub duration: Option<u32>,
    /// Frames per second.
    #[serde(default)]
    pub fps: Option<u32>,
    /// Output resolution (e.g. `1080p`).
    #[serde(default)]
    pub resolution: Option<String>,
}

/// Caller preferences reordering (but never widening) the selector chain.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RoutePreferences {
    /// Move this provider's pairs to the front when eligible.
    #[serde(default)]
    pub provider: Option<String>,
    /// Move this model's pairs to the front when eligible.
    #[serde(default)]
    pub model: Option<String>,
}

/// A single routed generation request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimpleRequest {
    /// Target worker.
    pub worker: Worker,
    /// The prompt, before transformer rewriting.
    pub prompt: String,
    /// Worker-tagged options.
    #[serde(default)]
    pub options: MediaOptions,
    /// Chain-narrowing constraints.
    #[serde(default)]
    pub constraints: RequestConstraints,
    /// Chain-reordering preferences.
    #[serde(default)]
    pub preferences: RoutePreferences,
    /// Correlation id; generated when absent.
    #[serde(default)]
    pub request_id: Option<String>,
}

/// The produced media, tagged by worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MediaPayload {
    /// Text output.
    Text {
        /// The generated text.
        text: String,
        /// Total tokens consumed, when the provider reports them.
        tokens_used: Option<i64>,
    },
    /// Image output.
    Image {
        /// Hosted URL, when the provider returns one.
        url: Option<String>,
        /// Base64 payload, when returned inline.
        base64: Option<String>,
        /// Pixel width, when known.
        width: Option<u32>,
        /// Pixel height, when known.
        height: Option<u32>,
    },
    /// Audio output.
    Audio {
        /// Hosted URL, when the provider returns one.
        url: Option<String>,
        /// Base64 payload, when returned inline.
        base64: Option<String>,
    },
    /// Video output.
    Video {
        /// Hosted URL of the rendered clip.
        url: String,
        /// Duration in milliseconds, when known.
        duration_ms: Option<i64>,
    },
}

impl MediaPayload {
    /// Text content of the payload, when it has one.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            MediaPayload::Text { text, .. } => Some(text),
            _ => None,
        }
    }

    /// Total tokens consumed, when reported.
    pub fn tokens_used(&self) -> Option<i64> {
        match self {
            MediaPayload::Text { tokens_used, .. } => *tokens_used,
            _ => None,
        }
    }
}

/// A successful generation result plus its provenance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaResult {
    /// Provider that produced the result.
    pub provider: String,
    /// Catalog model id that produced the result.
    pub model: String,
    /// The produced media.
    #[serde(flatten)]
    pub payload: MediaPayload,
}

/// Per-attempt execution metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepMeta {
    /// Step output key, for workflow steps; the request id otherwise.
    pub step: String,
    /// Provider attempted.
    pub provider: String,
    /// Catalog model id attempted.
    pub model: String,
    /// Wall-clock latency of the attempt.
    pub latency_ms: i64,
    /// Tokens consumed, when reported.
    pub tokens_used: Option<i64>,
    /// Rough advisory cost estimate, in cents.
    pub cost_cents: Option<f64>,
    /// Whether the attempt succeeded.
    pub success: bool,
}

/// Envelope returned by the router and the workflow engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouterResponse {
    /// Overall outcome.
    pub success: bool,
    /// Step outputs keyed by `output_key`; partial on failure.
    pub results: HashMap<String, serde_json::Value>,
    /// Error message on failure.
    #[serde(default)]
    pub error: Option<String>,
    /// Providers attempted, in order.
    #[serde(default)]
    pub attempted_providers: Vec<String>,
    /// Per-attempt metadata.
    #[serde(default)]
    pub meta: Vec<StepMeta>,
}

impl RouterResponse {
    /// A failure envelope carrying the attempted-provider trail.
    pub fn failure(error: impl Into<String>, attempted: Vec<String>) -> Self {
        Self {
            success: false,
            results: HashMap::new(),
            error: Some(error.into()),
            attempted_providers: attempted,
            meta: Vec::new(),
        }
    }
}

/// One delta of a streamed text response, in the uniform schema all text
/// adapters translate their native framing into.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamDelta {
    /// Appended text; empty on the terminal sentinel.
    pub text: String,
    /// True exactly once, on the terminal sentinel.
    pub done: bool,
    /// Correlation id of the originating request.
    pub request_id: String,
}

/// A single step of a workflow definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowStep {
    /// Step id, unique within the definition.
    pub id: String,
    /// Target worker.
    pub worker: Worker,
    /// Prompt with `{{name}}` placeholders.
    pub prompt_template: String,
    /// Key the step's result is stored under.
    pub output_key: String,
    /// `request` or `step:<id>`; absent steps depend on the request only.
    #[serde(default)]
    pub input_from: Option<String>,
    /// Per-step constraints merged over the workflow-level ones.
    #[serde(default)]
    pub constraints: Option<RequestConstraints>,
    /// Per-step options.
    #[serde(default)]
    pub options: Option<MediaOptions>,
}

impl WorkflowStep {
    /// The step id this step depends on, if `input_from` names one.
    pub fn depends_on(&self) -> Option<&str> {
        self.input_from
            .as_deref()
            .and_then(|source| source.strip_prefix("step:"))
    }
}

/// A DAG of steps executed by the workflow engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    /// Stable workflow id.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Description.
    #[serde(default)]
    pub description: Option<String>,
    /// The steps, in declaration order.
    pub steps: Vec<WorkflowStep>,
    /// Explicit execution layers; derived by topological batching when absent.
    #[serde(default)]
    pub parallel_groups: Option<Vec<Vec<String>>>,
}

/// Task classification produced by the entry orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TaskType {
    /// Multi-step code execution.
    Code,
    /// Plain text generation.
    Text,
    /// Video rendering.
    Video,
    /// Image generation.
    Image,
    /// Speech synthesis.
    Audio,
    /// Product shipping-dimension research.
    ShippingResearch,
}

impl TaskType {
    /// Canonical string form used in envelopes and logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskType::Code => "code",
            TaskType::Text => "text",
            TaskType::Video => "video",
            TaskType::Image => "image",
            TaskType::Audio => "audio",
            TaskType::ShippingResearch => "shipping-research",
        }
    }
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Context signals attached to an orchestrated task.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskContext {
    /// Repository reference; implies a code task.
    #[serde(default)]
    pub repo: Option<String>,
    /// Timeline reference; implies a video task.
    #[serde(default)]
    pub timeline: Option<serde_json::Value>,
    /// Product reference; implies shipping research.
    #[serde(default)]
    pub product: Option<serde_json::Value>,
}

/// Last-resort caller hints for classification.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskHints {
    /// Requested workflow kind.
    #[serde(default)]
    pub workflow: Option<String>,
}

/// Parameters accepted by the public entry point.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PrimeWorkflowParams {
    /// Caller task id; required.
    #[serde(default)]
    pub task_id: Option<String>,
    /// Task title; required.
    #[serde(default)]
    pub title: Option<String>,
    /// Task description.
    #[serde(default)]
    pub description: Option<String>,
    /// Strong classification signals.
    #[serde(default)]
    pub context: TaskContext,
    /// Weak classification hints.
    #[serde(default)]
    pub hints: TaskHints,
    /// Worker-tagged options forwarded to the sub-workflow.
    #[serde(default)]
    pub options: MediaOptions,
    /// Chain constraints forwarded to the sub-workflow.
    #[serde(default)]
    pub constraints: RequestConstraints,
    /// Explicit ordered model waterfall for code tasks.
    #[serde(default)]
    pub model_waterfall: Option<Vec<String>>,
    /// Single preferred model for code tasks.
    #[serde(default)]
    pub primary_model: Option<String>,
    /// Legacy executor family (`claude` or `gemini`).
    #[serde(default)]
    pub preferred_executor: Option<String>,
    /// Time-bounded waterfall override.
    #[serde(default)]
    pub override_waterfall: Option<Vec<String>>,
    /// Deadline for `override_waterfall`; ignored once past.
    #[serde(default)]
    pub override_until: Option<DateTime<Utc>>,
    /// URL to POST the completion envelope to (best-effort).
    #[serde(default)]
    pub callback_url: Option<String>,
}

/// Terminal and intermediate states of an orchestrated execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    /// Accepted, not yet running.
    Queued,
    /// Sub-workflow in flight.
    Running,
    /// Suspended by an operator.
    Paused,
    /// Finished successfully (post-validation).
    Complete,
    /// Finished with an error.
    Errored,
    /// Killed by an operator.
    Terminated,
    /// Blocked on an external signal.
    Waiting,
}

impl ExecutionStatus {
    /// Canonical string form used in status responses.
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionStatus::Queued => "queued",
            ExecutionStatus::Running => "running",
            ExecutionStatus::Paused => "paused",
            ExecutionStatus::Complete => "complete",
            ExecutionStatus::Errored => "errored",
            ExecutionStatus::Terminated => "terminated",
            ExecutionStatus::Waiting => "waiting",
        }
    }

    /// True for states the poller stops on.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ExecutionStatus::Complete | ExecutionStatus::Errored | ExecutionStatus::Terminated
        )
    }
}
