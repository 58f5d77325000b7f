#![allow(missing_docs, dead_code)]

//! Shared fixtures for the integration tests: an in-memory catalog,
//! scripted adapters, and a fully wired router.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use sqlx::sqlite::SqlitePoolOptions;

use genrelay::{
    adapters::{AdapterSet, DispatchRequest, MediaAdapter},
    config::{Credentials, GatewayConfig},
    database::{self, DbPool},
    error::AppError,
    health::HealthTracker,
    models::{MediaPayload, MediaResult, Worker},
    registry::Registry,
    router::SimpleRouter,
    tier::TierClassifier,
};

/// A single-connection in-memory database with the schema applied.
pub(crate) async fn memory_pool() -> anyhow::Result<Arc<DbPool>> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await?;
    database::ensure_schema(&pool).await?;
    Ok(Arc::new(pool))
}

/// Registers a worker row.
pub(crate) async fn seed_worker(pool: &DbPool, worker: Worker) -> anyhow::Result<()> {
    let _ = sqlx::query(
        "INSERT OR IGNORE INTO workers (id, name, media_types, enabled, created_at) \
         VALUES (?, ?, '[]', 1, datetime('now'))",
    )
    .bind(worker.as_str())
    .bind(worker.as_str())
    .execute(pool)
    .await?;
    Ok(())
}

/// Registers an enabled provider with a bearer credential reference.
pub(crate) async fn seed_provider(
    pool: &DbPool,
    id: &str,
    kind: &str,
    base_endpoint: Option<&str>,
    secret_name: Option<&str>,
    priority: i64,
) -> anyhow::Result<()> {
    let _ = sqlx::query(
        "INSERT INTO providers \
         (id, name, type, base_endpoint, auth_type, auth_secret_name, priority, enabled, created_at) \
         VALUES (?, ?, ?, ?, 'bearer', ?, ?, 1, datetime('now'))",
    )
    .bind(id)
    .bind(id)
    .bind(kind)
    .bind(base_endpoint)
    .bind(secret_name)
    .bind(priority)
    .execute(pool)
    .await?;
    Ok(())
}

/// Maps a provider to a worker.
pub(crate) async fn seed_worker_provider(
    pool: &DbPool,
    worker: Worker,
    provider_id: &str,
    priority: i64,
) -> anyhow::Result<()> {
    let _ = sqlx::query(
        "INSERT INTO worker_providers (worker_id, provider_id, priority) VALUES (?, ?, ?)",
    )
    .bind(worker.as_str())
    .bind(provider_id)
    .bind(priority)
    .execute(pool)
    .await?;
    Ok(())
}

/// Registers an enabled model for a provider and worker.
pub(crate) async fn seed_model(
    pool: &DbPool,
    id: &str,
    provider_id: &str,
    worker: Worker,
    capabilities: &[&str],
    priority: i64,
) -> anyhow::Result<()> {
    let tags = serde_json::to_string(capabilities)?;
    let _ = sqlx::query(
        "INSERT INTO models \
         (id, provider_id, model_id, worker_id, capabilities, cost_input_per_1k, \
          cost_output_per_1k, quality_tier, speed_tier, priority, enabled) \
         VALUES (?, ?, ?, ?, ?, 0.3, 1.5, 'standard', 'fast', ?, 1)",
    )
    .bind(id)
    .bind(provider_id)
    .bind(format!("{id}-native"))
    .bind(worker.as_str())
    .bind(tags)
    .bind(priority)
    .execute(pool)
    .await?;
    Ok(())
}

/// Seeds the canonical two-provider text catalog used by the routing
/// scenarios: A at priority 1, B at priority 2.
pub(crate) async fn seed_text_catalog(pool: &DbPool) -> anyhow::Result<()> {
    seed_worker(pool, Worker::TextGen).await?;
    seed_provider(pool, "provider-a", "api", Some("https://a.example"), Some("TEST_KEY_A"), 1)
        .await?;
    seed_provider(pool, "provider-b", "api", Some("https://b.example"), Some("TEST_KEY_B"), 2)
        .await?;
    seed_worker_provider(pool, Worker::TextGen, "provider-a", 1).await?;
    seed_worker_provider(pool, Worker::TextGen, "provider-b", 2).await?;
    seed_model(pool, "model-a", "provider-a", Worker::TextGen, &["text"], 1).await?;
    seed_model(pool, "model-b", "provider-b", Worker::TextGen, &["text"], 1).await?;
    Ok(())
}

/// Credentials resolving both test providers.
pub(crate) fn test_credentials() -> Credentials {
    let mut values = HashMap::new();
    drop(values.insert("TEST_KEY_A".to_string(), "key-a".to_string()));
    drop(values.insert("TEST_KEY_B".to_string(), "key-b".to_string()));
    Credentials::from_map(values)
}

/// A registry over the pool with test credentials and no gateway.
pub(crate) fn test_registry(pool: Arc<DbPool>) -> Registry {
    Registry::new(pool, test_credentials(), GatewayConfig::default(), 5)
}

/// One scripted reply for a [`ScriptedAdapter`].
pub(crate) enum Scripted {
    Text(&'static str),
    Error(&'static str),
}

/// Adapter that replays a fixed script of replies and records the prompts
/// it saw.
pub(crate) struct ScriptedAdapter {
    provider_id: String,
    workers: Vec<Worker>,
    script: Mutex<VecDeque<Scripted>>,
    pub(crate) prompts: Mutex<Vec<String>>,
}

impl ScriptedAdapter {
    pub(crate) fn new(provider_id: &str, workers: Vec<Worker>, script: Vec<Scripted>) -> Arc<Self> {
        Arc::new(Self {
            provider_id: provider_id.to_string(),
            workers,
            script: Mutex::new(script.into()),
            prompts: Mutex::new(Vec::new()),
        })
    }

    pub(crate) fn calls(&self) -> usize {
        self.prompts.lock().expect("prompt lock").len()
    }
}

#[async_trait]
impl MediaAdapter for ScriptedAdapter {
    fn provider_id(&self) -> &str {
        &self.provider_id
    }

    fn supported_workers(&self) -> &[Worker] {
        &self.workers
    }

    async fn execute(&self, request: &DispatchRequest) -> Result<MediaResult, AppError> {
        self.prompts
            .lock()
            .expect("prompt lock")
            .push(request.prompt.clone());

        let next = self.script.lock().expect("script lock").pop_front();
        match next {
            Some(Scripted::Text(text)) => Ok(MediaResult {
                provider: request.provider_id.clone(),
                model: request.model.clone(),
                payload: MediaPayload::Text {
                    text: text.to_string(),
                    tokens_used: Some(2000),
                },
            }),
            Some(Scripted::Error(message)) => Err(AppError::ApiError(message.to_string())),
            None => Err(AppError::ApiError(format!(
                "{} script exhausted",
                self.provider_id
            ))),
        }
    }

    async fn check_health(&self, _request: &DispatchRequest) -> Result<(), AppError> {
        Ok(())
    }
}

/// Adapter that always answers with the same text after echoing the prompt
/// into its payload, useful for template-expansion assertions.
pub(crate) struct EchoAdapter {
    provider_id: String,
    workers: Vec<Worker>,
    prefix: &'static str,
}

impl EchoAdapter {
    pub(crate) fn new(provider_id: &str, workers: Vec<Worker>, prefix: &'static str) -> Arc<Self> {
        Arc::new(Self {
            provider_id: provider_id.to_string(),
            workers,
            prefix,
        })
    }
}

#[async_trait]
impl MediaAdapter for EchoAdapter {
    fn provider_id(&self) -> &str {
        &self.provider_id
    }

    fn supported_workers(&self) -> &[Worker] {
        &self.workers
    }

    async fn execute(&self, request: &DispatchRequest) -> Result<MediaResult, AppError> {
        Ok(MediaResult {
            provider: request.provider_id.clone(),
            model: request.model.clone(),
            payload: MediaPayload::Text {
                text: format!("{}{}", self.prefix, request.prompt),
                tokens_used: Some(100),
            },
        })
    }

    async fn check_health(&self, _request: &DispatchRequest) -> Result<(), AppError> {
        Ok(())
    }
}

/// Adapter that always returns a hosted image URL.
pub(crate) struct ImageUrlAdapter {
    provider_id: String,
    url: &'static str,
}

impl ImageUrlAdapter {
    pub(crate) fn new(provider_id: &str, url: &'static str) -> Arc<Self> {
        Arc::new(Self {
            provider_id: provider_id.to_string(),
            url,
        })
    }
}

#[async_trait]
impl MediaAdapter for ImageUrlAdapter {
    fn provider_id(&self) -> &str {
        &self.provider_id
    }

    fn supported_workers(&self) -> &[Worker] {
        &[Worker::ImageGen]
    }

    async fn execute(&self, request: &DispatchRequest) -> Result<MediaResult, AppError> {
        Ok(MediaResult {
            provider: request.provider_id.clone(),
            model: request.model.clone(),
            payload: MediaPayload::Image {
                url: Some(self.url.to_string()),
                base64: None,
                width: Some(1024),
                height: Some(1024),
            },
        })
    }

    async fn check_health(&self, _request: &DispatchRequest) -> Result<(), AppError> {
        Ok(())
    }
}

/// A fully wired router over the registry and the given adapters.
pub(crate) fn test_router(registry: Registry, adapters: Vec<Arc<dyn MediaAdapter>>) -> SimpleRouter {
    let mut set = AdapterSet::empty();
    for adapter in adapters {
        set.register(adapter);
    }
    let health = HealthTracker::new(registry.clone(), 60);
    let classifier = TierClassifier::new(None, 10).expect("classifier");
    SimpleRouter::new(registry, set, health, None, classifier)
}
