//! Catalog registry: workers, providers, models, provider status, and
//! workflow definitions.
//!
//! All catalog SQL lives here. Provider-status mutations are single-row
//! atomic updates; a failed write never corrupts what callers already hold
//! in memory.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use sqlx::Row;
use tracing::debug;

use crate::{
    config::{Credentials, GatewayConfig},
    database::{DbError, DbPool},
    error::AppError,
    models::{
        AuthShape, ModelRecord, ProviderKind, ProviderRecord, ProviderStatus, QualityTier,
        SpeedTier, Worker, WorkerRecord, WorkflowDefinition, WorkflowStep,
    },
};

/// Store for the provider/model catalog and per-provider health state.
#[derive(Clone)]
pub struct Registry {
    pool: Arc<DbPool>,
    credentials: Credentials,
    gateway: GatewayConfig,
    failure_threshold: i64,
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("failure_threshold", &self.failure_threshold)
            .finish()
    }
}

impl Registry {
    /// Creates a registry over the given pool and credential set.
    pub fn new(
        pool: Arc<DbPool>,
        credentials: Credentials,
        gateway: GatewayConfig,
        failure_threshold: i64,
    ) -> Self {
        Self {
            pool,
            credentials,
            gateway,
            failure_threshold,
        }
    }

    /// The credential set providers are resolved against.
    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    /// The gateway configuration.
    pub fn gateway(&self) -> &GatewayConfig {
        &self.gateway
    }

    // --- Read operations -------------------------------------------------

    /// Fetches a worker row by id.
    pub async fn get_worker(&self, id: Worker) -> Result<Option<WorkerRecord>, AppError> {
        let row = sqlx::query(
            "SELECT id, name, media_types, enabled FROM workers WHERE id = ?",
        )
        .bind(id.as_str())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|err| AppError::DatabaseError(DbError::QueryFailed(err)))?;

        Ok(row.map(|row| WorkerRecord {
            id,
            name: row.get("name"),
            media_types: parse_json_list(row.get::<String, _>("media_types").as_str()),
            enabled: row.get::<i64, _>("enabled") != 0,
        }))
    }

    /// Fetches a provider row by id.
    pub async fn get_provider(&self, id: &str) -> Result<Option<ProviderRecord>, AppError> {
        let row = sqlx::query(
            "SELECT id, name, type, base_endpoint, auth_type, auth_secret_name, priority, \
             enabled, rate_limit_rpm, daily_quota FROM providers WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&*self.pool)
        .await
        .map_err(|err| AppError::DatabaseError(DbError::QueryFailed(err)))?;

        Ok(row.map(|row| provider_from_row(&row)))
    }

    /// Providers mapped to a worker, ordered by per-worker priority where
    /// set, otherwise global priority.
    pub async fn get_providers_for_worker(
        &self,
        worker: Worker,
    ) -> Result<Vec<ProviderRecord>, AppError> {
        let rows = sqlx::query(
            "SELECT p.id, p.name, p.type, p.base_endpoint, p.auth_type, p.auth_secret_name, \
             COALESCE(wp.priority, p.priority) AS priority, p.enabled, p.rate_limit_rpm, \
             p.daily_quota \
             FROM providers p \
             JOIN worker_providers wp ON wp.provider_id = p.id \
             WHERE wp.worker_id = ? \
             ORDER BY COALESCE(wp.priority, p.priority) ASC, p.id ASC",
        )
        .bind(worker.as_str())
        .fetch_all(&*self.pool)
        .await
        .map_err(|err| AppError::DatabaseError(DbError::QueryFailed(err)))?;

        Ok(rows.iter().map(provider_from_row).collect())
    }

    /// Enabled models a provider exposes for a worker, in priority order.
    pub async fn get_models_for_provider(
        &self,
        provider_id: &str,
        worker: Worker,
    ) -> Result<Vec<ModelRecord>, AppError> {
        let rows = sqlx::query(
            "SELECT id, provider_id, model_id, worker_id, capabilities, context_window, \
             cost_input_per_1k, cost_output_per_1k, quality_tier, speed_tier, priority, enabled \
             FROM models \
             WHERE provider_id = ? AND worker_id = ? AND enabled = 1 \
             ORDER BY priority ASC, id ASC",
        )
        .bind(provider_id)
        .bind(worker.as_str())
        .fetch_all(&*self.pool)
        .await
        .map_err(|err| AppError::DatabaseError(DbError::QueryFailed(err)))?;

        Ok(rows.iter().filter_map(model_from_row).collect())
    }

    /// Fetches a model by its catalog id.
    pub async fn get_model(&self, id: &str) -> Result<Option<ModelRecord>, AppError> {
        let row = sqlx::query(
            "SELECT id, provider_id, model_id, worker_id, capabilities, context_window, \
             cost_input_per_1k, cost_output_per_1k, quality_tier, speed_tier, priority, enabled \
             FROM models WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&*self.pool)
        .await
        .map_err(|err| AppError::DatabaseError(DbError::QueryFailed(err)))?;

        Ok(row.as_ref().and_then(model_from_row))
    }

    /// Models for a worker carrying every required capability tag.
    pub async fn find_models_by_capability(
        &self,
        worker: Worker,
        required: &[String],
    ) -> Result<Vec<ModelRecord>, AppError> {
        let rows = sqlx::query(
            "SELECT id, provider_id, model_id, worker_id, capabilities, context_window, \
             cost_input_per_1k, cost_output_per_1k, quality_tier, speed_tier, priority, enabled \
             FROM models WHERE worker_id = ? AND enabled = 1 ORDER BY priority ASC, id ASC",
        )
        .bind(worker.as_str())
        .fetch_all(&*self.pool)
        .await
        .map_err(|err| AppError::DatabaseError(DbError::QueryFailed(err)))?;

        Ok(rows
            .iter()
            .filter_map(model_from_row)
            .filter(|model| model.has_capabilities(required))
            .collect())
    }

    /// Providers eligible for a worker right now: enabled, not exhausted,
    /// and with a resolvable credential (or base URL, for local providers).
    pub async fn get_available_providers(
        &self,
        worker: Worker,
    ) -> Result<Vec<ProviderRecord>, AppError> {
        let now = Utc::now();
        let mut available = Vec::new();

        for provider in self.get_providers_for_worker(worker).await? {
            if !provider.enabled {
                continue;
            }
            let status = self.get_status(&provider.id).await?;
            if status.is_exhausted(now) {
                debug!(provider = %provider.id, "Skipping exhausted provider");
                continue;
            }
            if !self.credential_resolvable(&provider) {
                debug!(provider = %provider.id, "Skipping provider without credentials");
                continue;
            }
            available.push(provider);
        }

        Ok(available)
    }

    /// True when the provider's credential (or base URL) can be resolved.
    pub fn credential_resolvable(&self, provider: &ProviderRecord) -> bool {
        if provider.kind == ProviderKind::Local {
            return self.resolve_base_endpoint(provider).is_some();
        }
        if provider.auth_type == AuthShape::None {
            return true;
        }
        let own_key = provider
            .auth_secret_name
            .as_deref()
            .map_or(false, |name| self.credentials.has(name));
        own_key || self.gateway_covers(&provider.id)
    }

    /// True when gateway BYOK can stand in for this provider's key.
    pub fn gateway_covers(&self, provider_id: &str) -> bool {
        self.gateway.token.is_some()
            && !self
                .gateway
                .excluded_providers
                .iter()
                .any(|excluded| excluded == provider_id)
    }

    /// Base endpoint for a provider: the literal column, or for local
    /// providers a URL injected via the credential named by
    /// `auth_secret_name`.
    pub fn resolve_base_endpoint(&self, provider: &ProviderRecord) -> Option<String> {
        if let Some(endpoint) = provider.base_endpoint.as_deref() {
            let trimmed = endpoint.trim();
            if !trimmed.is_empty() {
                return Some(trimmed.trim_end_matches('/').to_string());
            }
        }
        provider
            .auth_secret_name
            .as_deref()
            .and_then(|name| self.credentials.get(name))
            .map(|url| url.trim_end_matches('/').to_string())
    }

    /// Resolves the API key for a provider, if any.
    pub fn resolve_api_key(&self, provider: &ProviderRecord) -> Option<String> {
        provider
            .auth_secret_name
            .as_deref()
            .and_then(|name| self.credentials.get(name))
            .map(str::to_string)
    }

    // --- Provider status -------------------------------------------------

    /// Fetches the status row for a provider; a missing row reads as fresh.
    pub async fn get_status(&self, provider_id: &str) -> Result<ProviderStatus, AppError> {
        let row = sqlx::query(
            "SELECT provider_id, healthy, last_success_at, last_failure_at, \
             consecutive_failures, quota_used_today, quota_resets_at, marked_exhausted_until \
             FROM provider_status WHERE provider_id = ?",
        )
        .bind(provider_id)
        .fetch_optional(&*self.pool)
        .await
        .map_err(|err| AppError::DatabaseError(DbError::QueryFailed(err)))?;

        let Some(row) = row else {
            return Ok(ProviderStatus::fresh(provider_id));
        };

        Ok(ProviderStatus {
            provider_id: row.get("provider_id"),
            healthy: row.get::<i64, _>("healthy") != 0,
            last_success_at: parse_timestamp(row.get("last_success_at")),
            last_failure_at: parse_timestamp(row.get("last_failure_at")),
            consecutive_failures: row.get("consecutive_failures"),
            quota_used_today: row.get("quota_used_today"),
            quota_resets_at: parse_timestamp(row.get("quota_resets_at")),
            marked_exhausted_until: parse_timestamp(row.get("marked_exhausted_until")),
        })
    }

    /// Marks a provider exhausted until the given deadline. Idempotent.
    pub async fn mark_provider_exhausted(
        &self,
        provider_id: &str,
        until: DateTime<Utc>,
    ) -> Result<(), AppError> {
        let now = Utc::now().to_rfc3339();
        let result = sqlx::query(
            r#"INSERT INTO provider_status
               (provider_id, healthy, last_failure_at, consecutive_failures, marked_exhausted_until)
               VALUES (?, 0, ?, 1, ?)
               ON CONFLICT(provider_id) DO UPDATE SET
                   last_failure_at = excluded.last_failure_at,
                   marked_exhausted_until = excluded.marked_exhausted_until"#,
        )
        .bind(provider_id)
        .bind(&now)
        .bind(until.to_rfc3339())
        .execute(&*self.pool)
        .await
        .map_err(|err| AppError::DatabaseError(DbError::QueryFailed(err)))?;

        let _ = result.rows_affected();
        Ok(())
    }

    /// Records a success: clears failures and the exhaustion deadline.
    pub async fn mark_provider_healthy(&self, provider_id: &str) -> Result<(), AppError> {
        let now = Utc::now().to_rfc3339();
        let result = sqlx::query(
            r#"INSERT INTO provider_status
               (provider_id, healthy, last_success_at, consecutive_failures, marked_exhausted_until)
               VALUES (?, 1, ?, 0, NULL)
               ON CONFLICT(provider_id) DO UPDATE SET
                   healthy = 1,
                   last_success_at = excluded.last_success_at,
                   consecutive_failures = 0,
                   marked_exhausted_until = NULL"#,
        )
        .bind(provider_id)
        .bind(&now)
        .execute(&*self.pool)
        .await
        .map_err(|err| AppError::DatabaseError(DbError::QueryFailed(err)))?;

        let _ = result.rows_affected();
        Ok(())
    }

    /// Increments the consecutive-failure counter; past the threshold the
    /// provider reads as unhealthy.
    pub async fn increment_provider_failures(&self, provider_id: &str) -> Result<(), AppError> {
        let now = Utc::now().to_rfc3339();
        let result = sqlx::query(
            r#"INSERT INTO provider_status
               (provider_id, healthy, last_failure_at, consecutive_failures)
               VALUES (?, 1, ?, 1)
               ON CONFLICT(provider_id) DO UPDATE SET
                   last_failure_at = excluded.last_failure_at,
                   consecutive_failures = provider_status.consecutive_failures + 1,
                   healthy = CASE
                       WHEN provider_status.consecutive_failures + 1 >= ? THEN 0
                       ELSE provider_status.healthy
                   END"#,
        )
        .bind(provider_id)
        .bind(&now)
        .bind(self.failure_threshold)
        .execute(&*self.pool)
        .await
        .map_err(|err| AppError::DatabaseError(DbError::QueryFailed(err)))?;

        let _ = result.rows_affected();
        Ok(())
    }

    // --- Workflow definitions --------------------------------------------

    /// Persists a workflow definition by id (upsert).
    pub async fn save_workflow(&self, definition: &WorkflowDefinition) -> Result<(), AppError> {
        let now = Utc::now().to_rfc3339();
        let serialized = serde_json::to_string(definition)
            .map_err(|err| AppError::ConfigError(format!("Unserializable workflow: {err}")))?;

        let result = sqlx::query(
            r#"INSERT INTO workflows (id, name, description, definition, created_at, updated_at)
               VALUES (?, ?, ?, ?, ?, ?)
               ON CONFLICT(id) DO UPDATE SET
                   name = excluded.name,
                   description = excluded.description,
                   definition = excluded.definition,
                   updated_at = excluded.updated_at"#,
        )
        .bind(&definition.id)
        .bind(&definition.name)
        .bind(definition.description.as_deref())
        .bind(serialized)
        .bind(&now)
        .bind(&now)
        .execute(&*self.pool)
        .await
        .map_err(|err| AppError::DatabaseError(DbError::QueryFailed(err)))?;

        let _ = result.rows_affected();
        Ok(())
    }

    /// Loads a workflow definition: persisted first, then built-ins.
    pub async fn get_workflow(&self, id: &str) -> Result<Option<WorkflowDefinition>, AppError> {
        let row = sqlx::query("SELECT definition FROM workflows WHERE id = ?")
            .bind(id)
            .fetch_optional(&*self.pool)
            .await
            .map_err(|err| AppError::DatabaseError(DbError::QueryFailed(err)))?;

        if let Some(row) = row {
            let raw: String = row.get("definition");
            let definition = serde_json::from_str(&raw).map_err(|err| {
                AppError::ConfigError(format!("Corrupt workflow definition {id}: {err}"))
            })?;
            return Ok(Some(definition));
        }

        Ok(builtin_workflows().into_iter().find(|wf| wf.id == id))
    }

    /// Lists all workflow ids: persisted plus built-ins.
    pub async fn list_workflows(&self) -> Result<Vec<WorkflowDefinition>, AppError> {
        let rows = sqlx::query("SELECT definition FROM workflows ORDER BY id ASC")
            .fetch_all(&*self.pool)
            .await
            .map_err(|err| AppError::DatabaseError(DbError::QueryFailed(err)))?;

        let mut definitions: Vec<WorkflowDefinition> = Vec::new();
        for row in rows {
            let raw: String = row.get("definition");
            if let Ok(definition) = serde_json::from_str::<WorkflowDefinition>(&raw) {
                definitions.push(definition);
            }
        }

        for builtin in builtin_workflows() {
            if !definitions.iter().any(|def| def.id == builtin.id) {
                definitions.push(builtin);
            }
        }

        Ok(definitions)
    }

    // --- Seeding ---------------------------------------------------------

    /// Seeds workers, providers, mappings, and models when the catalog is
    /// empty, so a fresh install is routable.
    pub async fn seed_defaults(&self) -> Result<(), AppError> {
        let now = Utc::now().to_rfc3339();

        for worker in Worker::all() {
            let media = serde_json::to_string(&default_media_types(worker))
                .unwrap_or_else(|_| "[]".to_string());
            let result = sqlx::query(
                r#"INSERT OR IGNORE INTO workers (id, name, media_types, enabled, created_at)
                   VALUES (?, ?, ?, 1, ?)"#,
            )
            .bind(worker.as_str())
            .bind(default_worker_name(worker))
            .bind(media)
            .bind(&now)
            .execute(&*self.pool)
            .await
            .map_err(|err| AppError::DatabaseError(DbError::QueryFailed(err)))?;
            let _ = result.rows_affected();
        }

        for seed in default_providers() {
            let result = sqlx::query(
                r#"INSERT OR IGNORE INTO providers
                   (id, name, type, base_endpoint, auth_type, auth_secret_name, priority, enabled, created_at)
                   VALUES (?, ?, ?, ?, ?, ?, ?, 1, ?)"#,
            )
            .bind(seed.id)
            .bind(seed.name)
            .bind(seed.kind.as_str())
            .bind(seed.base_endpoint)
            .bind(seed.auth_type.as_str())
            .bind(seed.auth_secret_name)
            .bind(seed.priority)
            .bind(&now)
            .execute(&*self.pool)
            .await
            .map_err(|err| AppError::DatabaseError(DbError::QueryFailed(err)))?;
            let _ = result.rows_affected();
        }

        for (worker, provider, priority) in default_worker_providers() {
            let result = sqlx::query(
                r#"INSERT OR IGNORE INTO worker_providers (worker_id, provider_id, priority)
                   VALUES (?, ?, ?)"#,
            )
            .bind(worker.as_str())
            .bind(provider)
            .bind(priority)
            .execute(&*self.pool)
            .await
            .map_err(|err| AppError::DatabaseError(DbError::QueryFailed(err)))?;
            let _ = result.rows_affected();
        }

        for seed in default_models() {
            let capabilities = serde_json::to_string(&seed.capabilities)
                .unwrap_or_else(|_| "[]".to_string());
            let result = sqlx::query(
                r#"INSERT OR IGNORE INTO models
                   (id, provider_id, model_id, worker_id, capabilities, context_window,
                    cost_input_per_1k, cost_output_per_1k, quality_tier, speed_tier, priority, enabled)
                   VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 1)"#,
            )
            .bind(seed.id)
            .bind(seed.provider_id)
            .bind(seed.model_id)
            .bind(seed.worker.as_str())
            .bind(capabilities)
            .bind(seed.context_window)
            .bind(seed.cost_input_per_1k)
            .bind(seed.cost_output_per_1k)
            .bind(seed.quality_tier.as_str())
            .bind(seed.speed_tier.as_str())
            .bind(seed.priority)
            .execute(&*self.pool)
            .await
            .map_err(|err| AppError::DatabaseError(DbError::QueryFailed(err)))?;
            let _ = result.rows_affected();
        }

        Ok(())
    }
}

// --- Row mapping ---------------------------------------------------------

fn provider_from_row(row: &sqlx::sqlite::SqliteRow) -> ProviderRecord {
    ProviderRecord {
        id: row.get("id"),
        name: row.get("name"),
        kind: ProviderKind::from_key(row.get::<String, _>("type").as_str()),
        base_endpoint: row.get("base_endpoint"),
        auth_type: AuthShape::from_key(row.get::<String, _>("auth_type").as_str()),
        auth_secret_name: row.get("auth_secret_name"),
        priority: row.get("priority"),
        enabled: row.get::<i64, _>("enabled") != 0,
        rate_limit_rpm: row.try_get("rate_limit_rpm").ok().flatten(),
        daily_quota: row.try_get("daily_quota").ok().flatten(),
    }
}

fn model_from_row(row: &sqlx::sqlite::SqliteRow) -> Option<ModelRecord> {
    let worker = Worker::from_id(row.get::<String, _>("worker_id").as_str())?;
    Some(ModelRecord {
        id: row.get("id"),
        provider_id: row.get("provider_id"),
        model_id: row.get("model_id"),
        worker,
        capabilities: parse_json_list(row.get::<String, _>("capabilities").as_str()),
        context_window: row.try_get("context_window").ok().flatten(),
        cost_input_per_1k: row.get("cost_input_per_1k"),
        cost_output_per_1k: row.get("cost_output_per_1k"),
        quality_tier: QualityTier::from_key(row.get::<String, _>("quality_tier").as_str()),
        speed_tier: SpeedTier::from_key(row.get::<String, _>("speed_tier").as_str()),
        priority: row.get("priority"),
        enabled: row.get::<i64, _>("enabled") != 0,
    })
}

fn parse_json_list(raw: &str) -> Vec<String> {
    serde_json::from_str(raw).unwrap_or_default()
}

fn parse_timestamp(raw: Option<String>) -> Option<DateTime<Utc>> {
    raw.and_then(|value| DateTime::parse_from_rfc3339(&value).ok())
        .map(|value| value.with_timezone(&Utc))
}

// --- Built-in workflow templates -----------------------------------------

/// Workflow templates available without persistence.
pub fn builtin_workflows() -> Vec<WorkflowDefinition> {
    vec![
        WorkflowDefinition {
            id: "social-post".to_string(),
            name: "Social post".to_string(),
            description: Some("Copy plus matching artwork for a social post".to_string()),
            steps: vec![
                WorkflowStep {
                    id: "generate-copy".to_string(),
                    worker: Worker::TextGen,
                    prompt_template:
                        "Write a short, punchy {{platform}} post about {{topic}}. No hashtags."
                            .to_string(),
                    output_key: "post_text".to_string(),
                    input_from: Some("request".to_string()),
                    constraints: None,
                    options: None,
                },
                WorkflowStep {
                    id: "generate-image".to_string(),
                    worker: Worker::ImageGen,
                    prompt_template: "Eye-catching illustration for a social post about {{topic}}"
                        .to_string(),
                    output_key: "post_image".to_string(),
                    input_from: Some("request".to_string()),
                    constraints: None,
                    options: None,
                },
            ],
            parallel_groups: Some(vec![vec![
                "generate-copy".to_string(),
                "generate-image".to_string(),
            ]]),
        },
        WorkflowDefinition {
            id: "blog-with-image".to_string(),
            name: "Blog post with featured image".to_string(),
            description: Some("Article, image prompt, then featured image".to_string()),
            steps: vec![
                WorkflowStep {
                    id: "write-article".to_string(),
                    worker: Worker::TextGen,
                    prompt_template: "Write a blog article about {{topic}}. Aim for {{length}} words."
                        .to_string(),
                    output_key: "article".to_string(),
                    input_from: Some("request".to_string()),
                    constraints: None,
                    options: None,
                },
                WorkflowStep {
                    id: "create-image-prompt".to_string(),
                    worker: Worker::TextGen,
                    prompt_template:
                        "Write a one-sentence image-generation prompt for the featured image of this article:\n\n{{article}}"
                            .to_string(),
                    output_key: "image_prompt".to_string(),
                    input_from: Some("step:write-article".to_string()),
                    constraints: None,
                    options: None,
                },
                WorkflowStep {
                    id: "generate-featured-image".to_string(),
                    worker: Worker::ImageGen,
                    prompt_template: "{{image_prompt}}".to_string(),
                    output_key: "featured_image".to_string(),
                    input_from: Some("step:create-image-prompt".to_string()),
                    constraints: None,
                    options: None,
                },
            ],
            parallel_groups: None,
        },
    ]
}

// --- Seed data ------------------------------------------------------------

struct ProviderSeed {
    id: &'static str,
    name: &'static str,
    kind: ProviderKind,
    base_endpoint: Option<&'static str>,
    auth_type: AuthShape,
    auth_secret_name: Option<&'static str>,
    priority: i64,
}

struct ModelSeed {
    id: &'static str,
    provider_id: &'static str,
    model_id: &'static str,
    worker: Worker,
    capabilities: Vec<&'static str>,
    context_window: Option<i64>,
    cost_input_per_1k: f64,
    cost_output_per_1k: f64,
    quality_tier: QualityTier,
    speed_tier: SpeedTier,
    priority: i64,
}

fn default_worker_name(worker: Worker) -> &'static str {
    match worker {
        Worker::TextGen => "Text generation",
        Worker::ImageGen => "Image generation",
        Worker::AudioGen => "Audio synthesis",
        Worker::VideoGen => "Video generation",
        Worker::EmbeddingGen => "Embedding generation",
    }
}

fn default_media_types(worker: Worker) -> Vec<&'static str> {
    match worker {
        Worker::TextGen => vec!["text/plain", "text/markdown"],
        Worker::ImageGen => vec!["image/png", "image/jpeg"],
        Worker::AudioGen => vec!["audio/mpeg"],
        Worker::VideoGen => vec!["video/mp4"],
        Worker::EmbeddingGen => vec!["application/json"],
    }
}

fn default_providers() -> Vec<ProviderSeed> {
    vec![
        ProviderSeed {
            id: "anthropic",
            name: "Anthropic",
            kind: ProviderKind::Api,
            base_endpoint: Some("https://api.anthropic.com"),
            auth_type: AuthShape::ApiKey,
            auth_secret_name: Some("ANTHROPIC_API_KEY"),
            priority: 10,
        },
        ProviderSeed {
            id: "openai",
            name: "OpenAI",
            kind: ProviderKind::Api,
            base_endpoint: Some("https://api.openai.com/v1"),
            auth_type: AuthShape::Bearer,
            auth_secret_name: Some("OPENAI_API_KEY"),
            priority: 20,
        },
        ProviderSeed {
            id: "google",
            name: "Google",
            kind: ProviderKind::Api,
            base_endpoint: Some("https://generativelanguage.googleapis.com/v1beta"),
            auth_type: AuthShape::ApiKey,
            auth_secret_name: Some("GOOGLE_API_KEY"),
            priority: 30,
        },
        ProviderSeed {
            id: "zai",
            name: "z.ai",
            kind: ProviderKind::Api,
            base_endpoint: Some("https://api.z.ai/api/paas/v4"),
            auth_type: AuthShape::Bearer,
            auth_secret_name: Some("ZAI_API_KEY"),
            priority: 40,
        },
        ProviderSeed {
            id: "local-vllm",
            name: "Local vLLM",
            kind: ProviderKind::Local,
            base_endpoint: None,
            auth_type: AuthShape::None,
            auth_secret_name: Some("LOCAL_INFERENCE_URL"),
            priority: 50,
        },
        ProviderSeed {
            id: "ideogram",
            name: "Ideogram",
            kind: ProviderKind::Api,
            base_endpoint: Some("https://api.ideogram.ai"),
            auth_type: AuthShape::ApiKey,
            auth_secret_name: Some("IDEOGRAM_API_KEY"),
            priority: 10,
        },
        ProviderSeed {
            id: "replicate",
            name: "Replicate",
            kind: ProviderKind::Api,
            base_endpoint: Some("https://api.replicate.com/v1"),
            auth_type: AuthShape::Bearer,
            auth_secret_name: Some("REPLICATE_API_TOKEN"),
            priority: 20,
        },
        ProviderSeed {
            id: "elevenlabs",
            name: "ElevenLabs",
            kind: ProviderKind::Api,
            base_endpoint: Some("https://api.elevenlabs.io/v1"),
            auth_type: AuthShape::ApiKey,
            auth_secret_name: Some("ELEVENLABS_API_KEY"),
            priority: 10,
        },
    ]
}

fn default_worker_providers() -> Vec<(Worker, &'static str, i64)> {
    vec![
        (Worker::TextGen, "anthropic", 10),
        (Worker::TextGen, "openai", 20),
        (Worker::TextGen, "google", 30),
        (Worker::TextGen, "zai", 40),
        (Worker::TextGen, "local-vllm", 50),
        (Worker::ImageGen, "ideogram", 10),
        (Worker::ImageGen, "replicate", 20),
        (Worker::AudioGen, "elevenlabs", 10),
        (Worker::VideoGen, "replicate", 10),
    ]
}

fn default_models() -> Vec<ModelSeed> {
    vec![
        ModelSeed {
            id: "anthropic-sonnet",
            provider_id: "anthropic",
            model_id: "claude-sonnet-4-20250514",
            worker: Worker::TextGen,
            capabilities: vec!["text", "reasoning", "code", "analysis"],
            context_window: Some(200_000),
            cost_input_per_1k: 0.3,
            cost_output_per_1k: 1.5,
            quality_tier: QualityTier::Premium,
            speed_tier: SpeedTier::Fast,
            priority: 10,
        },
        ModelSeed {
            id: "anthropic-opus",
            provider_id: "anthropic",
            model_id: "claude-opus-4-20250514",
            worker: Worker::TextGen,
            capabilities: vec!["text", "reasoning", "code", "analysis"],
            context_window: Some(200_000),
            cost_input_per_1k: 1.5,
            cost_output_per_1k: 7.5,
            quality_tier: QualityTier::Premium,
            speed_tier: SpeedTier::Medium,
            priority: 20,
        },
        ModelSeed {
            id: "openai-gpt4o",
            provider_id: "openai",
            model_id: "gpt-4o",
            worker: Worker::TextGen,
            capabilities: vec!["text", "code", "json"],
            context_window: Some(128_000),
            cost_input_per_1k: 0.25,
            cost_output_per_1k: 1.0,
            quality_tier: QualityTier::Standard,
            speed_tier: SpeedTier::Fast,
            priority: 10,
        },
        ModelSeed {
            id: "openai-gpt4o-mini",
            provider_id: "openai",
            model_id: "gpt-4o-mini",
            worker: Worker::TextGen,
            capabilities: vec!["text", "json"],
            context_window: Some(128_000),
            cost_input_per_1k: 0.015,
            cost_output_per_1k: 0.06,
            quality_tier: QualityTier::Draft,
            speed_tier: SpeedTier::Fast,
            priority: 20,
        },
        ModelSeed {
            id: "google-gemini-flash",
            provider_id: "google",
            model_id: "gemini-2.0-flash",
            worker: Worker::TextGen,
            capabilities: vec!["text", "code"],
            context_window: Some(1_000_000),
            cost_input_per_1k: 0.01,
            cost_output_per_1k: 0.04,
            quality_tier: QualityTier::Standard,
            speed_tier: SpeedTier::Fast,
            priority: 10,
        },
        ModelSeed {
            id: "zai-glm",
            provider_id: "zai",
            model_id: "glm-4.5",
            worker: Worker::TextGen,
            capabilities: vec!["text", "code"],
            context_window: Some(128_000),
            cost_input_per_1k: 0.06,
            cost_output_per_1k: 0.22,
            quality_tier: QualityTier::Standard,
            speed_tier: SpeedTier::Medium,
            priority: 10,
        },
        ModelSeed {
            id: "local-qwen-coder",
            provider_id: "local-vllm",
            model_id: "qwen2.5-coder-32b-instruct",
            worker: Worker::TextGen,
            capabilities: vec!["text", "code"],
            context_window: Some(32_000),
            cost_input_per_1k: 0.0,
            cost_output_per_1k: 0.0,
            quality_tier: QualityTier::Draft,
            speed_tier: SpeedTier::Fast,
            priority: 10,
        },
        ModelSeed {
            id: "ideogram-v2",
            provider_id: "ideogram",
            model_id: "V_2",
            worker: Worker::ImageGen,
            capabilities: vec!["image"],
            context_window: None,
            cost_input_per_1k: 0.0,
            cost_output_per_1k: 0.0,
            quality_tier: QualityTier::Standard,
            speed_tier: SpeedTier::Medium,
            priority: 10,
        },
        ModelSeed {
            id: "replicate-flux",
            provider_id: "replicate",
            model_id: "black-forest-labs/flux-schnell",
            worker: Worker::ImageGen,
            capabilities: vec!["image"],
            context_window: None,
            cost_input_per_1k: 0.0,
            cost_output_per_1k: 0.0,
            quality_tier: QualityTier::Standard,
            speed_tier: SpeedTier::Fast,
            priority: 10,
        },
        ModelSeed {
            id: "elevenlabs-multilingual",
            provider_id: "elevenlabs",
            model_id: "eleven_multilingual_v2",
            worker: Worker::AudioGen,
            capabilities: vec!["audio", "tts"],
            context_window: None,
            cost_input_per_1k: 0.0,
            cost_output_per_1k: 0.0,
            quality_tier: QualityTier::Standard,
            speed_tier: SpeedTier::Fast,
            priority: 10,
        },
        ModelSeed {
            id: "replicate-video",
            provider_id: "replicate",
            model_id: "minimax/video-01",
            worker: Worker::VideoGen,
            capabilities: vec!["video"],
            context_window: None,
            cost_input_per_1k: 0.0,
            cost_output_per_1k: 0.0,
            quality_tier: QualityTier::Standard,
            speed_tier: SpeedTier::Slow,
            priority: 10,
        },
    ]
}
