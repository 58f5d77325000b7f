//! The simple router: drives the selector chain, dispatches adapters, and
//! feeds failures through the error taxonomy.
//!
//! Attempts are strictly serialized; a success returns immediately so that
//! downstream providers in the chain are never charged for a request the
//! first eligible provider could satisfy.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    adapters::{gateway_base_url, AdapterSet, DispatchAuth, DispatchRequest},
    error::AppError,
    health::{FailureAction, HealthTracker},
    models::{
        MediaResult, ModelRecord, RouterResponse, RoutingTier, SimpleRequest, StepMeta,
        StreamDelta, Worker,
    },
    registry::Registry,
    selector::{ChainEntry, Selector},
    tier::{TierClassifier, TEXT_ONLY_WATERFALL},
    transform::transform_prompt,
    usage::UsageLogger,
};

/// Coordinates selection, dispatch, health updates, and usage logging for
/// single routed requests.
#[derive(Clone, Debug)]
pub struct SimpleRouter {
    registry: Registry,
    selector: Selector,
    adapters: AdapterSet,
    health: HealthTracker,
    usage: Option<UsageLogger>,
    classifier: TierClassifier,
}

impl SimpleRouter {
    /// Assembles a router from its collaborators.
    pub fn new(
        registry: Registry,
        adapters: AdapterSet,
        health: HealthTracker,
        usage: Option<UsageLogger>,
        classifier: TierClassifier,
    ) -> Self {
        Self {
            selector: Selector::new(registry.clone()),
            registry,
            adapters,
            health,
            usage,
            classifier,
        }
    }

    /// Routes one request through the provider-model chain.
    pub async fn route(&self, request: &SimpleRequest) -> Result<RouterResponse, AppError> {
        if request.prompt.trim().is_empty() {
            return Err(AppError::Validation("Prompt must not be empty".into()));
        }
        self.check_model_preference(request).await?;

        let request_id = request
            .request_id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        let mut attempted: Vec<String> = Vec::new();
        let mut meta: Vec<StepMeta> = Vec::new();

        // Text-only fast path: a short hardcoded waterfall tried before the
        // standard chain; its failures fall through.
        if request.worker == Worker::TextGen {
            let tier = self
                .classifier
                .classify(&request.options, &request.prompt)
                .await;
            if tier == RoutingTier::TextOnly {
                if let Some(response) = self
                    .try_text_only(request, &request_id, &mut attempted, &mut meta)
                    .await?
                {
                    return Ok(response);
                }
            }
        }

        let chain = self
            .selector
            .build_chain(request.worker, &request.constraints, &request.preferences)
            .await?;

        let mut last_error = String::new();
        for entry in &chain {
            // The fast path may already have burned this exact pair.
            if meta
                .iter()
                .any(|m| m.provider == entry.provider.id && m.model == entry.model.id)
            {
                continue;
            }

            match self.attempt(entry, request, &request_id, &mut meta).await {
                Ok(result) => {
                    attempted.push(entry.provider.id.clone());
                    self.record_success(&entry.provider.id).await;
                    return Ok(success_envelope(result, request_id, attempted, meta));
                }
                Err(err) => {
                    attempted.push(entry.provider.id.clone());
                    last_error = err.to_string();
                    let class = self
                        .health
                        .record_failure(&entry.provider.id, &last_error)
                        .await?;
                    warn!(
                        provider = %entry.provider.id,
                        model = %entry.model.id,
                        class = ?class,
                        error = %last_error,
                        "Provider call failed"
                    );
                    if class.action() == FailureAction::AbortChain {
                        let mut response =
                            RouterResponse::failure(last_error.clone(), attempted);
                        response.meta = meta;
                        return Ok(response);
                    }
                }
            }
        }

        let mut response = RouterResponse::failure(
            format!("All providers failed; last error: {last_error}"),
            attempted,
        );
        response.meta = meta;
        Ok(response)
    }

    /// Routes one text request, streaming deltas into `tx`. Chain semantics
    /// match [`route`]; a provider that fails after emitting deltas is still
    /// advanced past, so consumers must key on `request_id`.
    pub async fn route_stream(
        &self,
        request: &SimpleRequest,
        tx: mpsc::Sender<StreamDelta>,
    ) -> Result<RouterResponse, AppError> {
        if request.prompt.trim().is_empty() {
            return Err(AppError::Validation("Prompt must not be empty".into()));
        }
        self.check_model_preference(request).await?;

        let request_id = request
            .request_id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        let chain = self
            .selector
            .build_chain(request.worker, &request.constraints, &request.preferences)
            .await?;

        let mut attempted = Vec::new();
        let mut meta = Vec::new();
        let mut last_error = String::new();

        for entry in &chain {
            let dispatch = self.dispatch_request(entry, request, &request_id)?;
            let adapter = self.adapters.get(&entry.provider.id).ok_or_else(|| {
                AppError::ConfigError(format!(
                    "No adapter registered for provider {}",
                    entry.provider.id
                ))
            })?;

            let start = Instant::now();
            attempted.push(entry.provider.id.clone());
            match adapter.execute_stream(&dispatch, tx.clone()).await {
                Ok(result) => {
                    meta.push(attempt_meta(entry, &request_id, &result, start, true));
                    self.record_success(&entry.provider.id).await;
                    self.log_usage(entry, request.worker, true, start, &result, None)
                        .await;
                    return Ok(success_envelope(result, request_id, attempted, meta));
                }
                Err(err) => {
                    last_error = err.to_string();
                    let class = self
                        .health
                        .record_failure(&entry.provider.id, &last_error)
                        .await?;
                    if class.action() == FailureAction::AbortChain {
                        break;
                    }
                }
            }
        }

        let mut response = RouterResponse::failure(
            format!("All providers failed; last error: {last_error}"),
            attempted,
        );
        response.meta = meta;
        Ok(response)
    }

    /// An explicit model preference must at least name a catalog model that
    /// serves the requested worker. Constraint filtering can still drop it
    /// later, which is a reorder no-op rather than an error.
    async fn check_model_preference(&self, request: &SimpleRequest) -> Result<(), AppError> {
        let Some(model_id) = &request.preferences.model else {
            return Ok(());
        };
        match self.registry.get_model(model_id).await? {
            None => Err(AppError::ModelNotFound(model_id.clone())),
            Some(model) if model.worker != request.worker => {
                Err(AppError::InvalidModelCapability {
                    model: model_id.clone(),
                    worker: request.worker.as_str().to_string(),
                })
            }
            Some(_) => Ok(()),
        }
    }

    async fn try_text_only(
        &self,
        request: &SimpleRequest,
        request_id: &str,
        attempted: &mut Vec<String>,
        meta: &mut Vec<StepMeta>,
    ) -> Result<Option<RouterResponse>, AppError> {
        for (provider_id, model_id) in TEXT_ONLY_WATERFALL {
            let Some(provider) = self.registry.get_provider(provider_id).await? else {
                continue;
            };
            if !provider.enabled || !self.registry.credential_resolvable(&provider) {
                continue;
            }
            let Some(model) = self.registry.get_model(model_id).await? else {
                continue;
            };
            if !model.enabled {
                continue;
            }

            let entry = ChainEntry {
                provider,
                model,
            };
            match self.attempt(&entry, request, request_id, meta).await {
                Ok(result) => {
                    attempted.push(entry.provider.id.clone());
                    self.record_success(&entry.provider.id).await;
                    info!(provider = %entry.provider.id, "Text-only fast path succeeded");
                    return Ok(Some(success_envelope(
                        result,
                        request_id.to_string(),
                        attempted.clone(),
                        meta.clone(),
                    )));
                }
                Err(err) => {
                    attempted.push(entry.provider.id.clone());
                    let message = err.to_string();
                    let _class = self
                        .health
                        .record_failure(&entry.provider.id, &message)
                        .await?;
                    debug!(
                        provider = %entry.provider.id,
                        error = %message,
                        "Text-only fast path attempt failed; falling through"
                    );
                }
            }
        }
        Ok(None)
    }

    /// One adapter attempt. Records meta for both outcomes; the caller owns
    /// health bookkeeping.
    async fn attempt(
        &self,
        entry: &ChainEntry,
        request: &SimpleRequest,
        request_id: &str,
        meta: &mut Vec<StepMeta>,
    ) -> Result<MediaResult, AppError> {
        let dispatch = self.dispatch_request(entry, request, request_id)?;
        let adapter = self.adapters.get(&entry.provider.id).ok_or_else(|| {
            AppError::ConfigError(format!(
                "No adapter registered for provider {}",
                entry.provider.id
            ))
        })?;

        let start = Instant::now();
        match adapter.execute(&dispatch).await {
            Ok(result) => {
                meta.push(attempt_meta(entry, request_id, &result, start, true));
                self.log_usage(entry, request.worker, true, start, &result, None)
                    .await;
                Ok(result)
            }
            Err(err) => {
                let message = err.to_string();
                meta.push(StepMeta {
                    step: request_id.to_string(),
                    provider: entry.provider.id.clone(),
                    model: entry.model.id.clone(),
                    latency_ms: latency_ms(start),
                    tokens_used: None,
                    cost_cents: None,
                    success: false,
                });
                self.log_failure_usage(entry, request.worker, start, message.clone())
                    .await;
                Err(err)
            }
        }
    }

    /// Resolves endpoint, credential, and transformed prompt for one pair.
    fn dispatch_request(
        &self,
        entry: &ChainEntry,
        request: &SimpleRequest,
        request_id: &str,
    ) -> Result<DispatchRequest, AppError> {
        let provider = &entry.provider;
        let gateway = self.registry.gateway();

        // Gateway BYOK wins whenever it covers the provider; excluded
        // providers always take the direct path with their own key.
        let use_gateway = provider.kind != crate::models::ProviderKind::Local
            && self.registry.gateway_covers(&provider.id);

        let (base_url, auth) = if use_gateway {
            let token = gateway
                .token
                .clone()
                .ok_or_else(|| AppError::MissingApiKey(provider.id.clone()))?;
            let account = gateway.account.as_deref().unwrap_or("default");
            (
                gateway_base_url(account, &provider.id),
                DispatchAuth::Gateway(token),
            )
        } else {
            let base_url = self.registry.resolve_base_endpoint(provider).ok_or_else(|| {
                AppError::ConfigError(format!("Provider {} has no base endpoint", provider.id))
            })?;
            let auth = match provider.auth_type {
                crate::models::AuthShape::None => DispatchAuth::None,
                _ => {
                    let key = self
                        .registry
                        .resolve_api_key(provider)
                        .ok_or_else(|| AppError::MissingApiKey(provider.id.clone()))?;
                    DispatchAuth::Key(key)
                }
            };
            (base_url, auth)
        };

        let transformed = transform_prompt(
            &provider.id,
            request.worker,
            request.options.task_type.as_deref(),
            &request.constraints.require_capabilities,
            &request.prompt,
        );
        let system_prompt = request
            .options
            .system_prompt
            .clone()
            .or(transformed.system_prompt);

        Ok(DispatchRequest {
            provider_id: provider.id.clone(),
            model: entry.model.id.clone(),
            native_model: entry.model.model_id.clone(),
            worker: request.worker,
            prompt: transformed.prompt,
            system_prompt,
            options: request.options.clone(),
            base_url,
            auth,
            timeout: worker_timeout(request.worker),
            request_id: request_id.to_string(),
        })
    }

    async fn record_success(&self, provider_id: &str) {
        if let Err(err) = self.health.record_success(provider_id).await {
            warn!(provider = %provider_id, error = %err, "Failed to record provider success");
        }
    }

    async fn log_usage(
        &self,
        entry: &ChainEntry,
        worker: Worker,
        success: bool,
        start: Instant,
        result: &MediaResult,
        error: Option<String>,
    ) {
        if let Some(logger) = &self.usage {
            let tokens = result.payload.tokens_used();
            let cost = estimate_cost_cents(tokens, &entry.model);
            if let Err(err) = logger
                .log(
                    &entry.provider.id,
                    Some(entry.model.id.as_str()),
                    worker,
                    success,
                    latency_ms(start),
                    tokens,
                    cost,
                    error,
                )
                .await
            {
                warn!(provider = %entry.provider.id, error = %err, "Failed to log provider usage");
            }
        }
    }

    async fn log_failure_usage(
        &self,
        entry: &ChainEntry,
        worker: Worker,
        start: Instant,
        error: String,
    ) {
        if let Some(logger) = &self.usage {
            if let Err(err) = logger
                .log(
                    &entry.provider.id,
                    Some(entry.model.id.as_str()),
                    worker,
                    false,
                    latency_ms(start),
                    None,
                    None,
                    Some(error),
                )
                .await
            {
                warn!(provider = %entry.provider.id, error = %err, "Failed to log provider usage");
            }
        }
    }
}

/// Rough advisory cost: assumes a 50/50 input-output split when only the
/// total token count is known, rounded to whole hundredths of a cent.
pub fn estimate_cost_cents(tokens_used: Option<i64>, model: &ModelRecord) -> Option<f64> {
    let tokens = tokens_used? as f64;
    let per_1k = model.cost_input_per_1k + model.cost_output_per_1k;
    Some(((tokens / 2.0 / 1000.0) * per_1k * 100.0).round() / 100.0)
}

fn worker_timeout(worker: Worker) -> Duration {
    match worker {
        Worker::VideoGen => Duration::from_secs(300),
        Worker::ImageGen => Duration::from_secs(60),
        _ => Duration::from_secs(120),
    }
}

fn latency_ms(start: Instant) -> i64 {
    i64::try_from(start.elapsed().as_millis()).unwrap_or(i64::MAX)
}

fn attempt_meta(
    entry: &ChainEntry,
    request_id: &str,
    result: &MediaResult,
    start: Instant,
    success: bool,
) -> StepMeta {
    let tokens = result.payload.tokens_used();
    StepMeta {
        step: request_id.to_string(),
        provider: entry.provider.id.clone(),
        model: entry.model.id.clone(),
        latency_ms: latency_ms(start),
        tokens_used: tokens,
        cost_cents: estimate_cost_cents(tokens, &entry.model),
        success,
    }
}

fn success_envelope(
    result: MediaResult,
    _request_id: String,
    attempted: Vec<String>,
    meta: Vec<StepMeta>,
) -> RouterResponse {
    let mut results = HashMap::new();
    drop(results.insert(
        "result".to_string(),
        serde_json::to_value(&result).unwrap_or(serde_json::Value::Null),
    ));
    RouterResponse {
        success: true,
        results,
        error: None,
        attempted_providers: attempted,
        meta,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{QualityTier, SpeedTier};

    fn model(input: f64, output: f64) -> ModelRecord {
        ModelRecord {
            id: "m".into(),
            provider_id: "p".into(),
            model_id: "m-native".into(),
            worker: Worker::TextGen,
            capabilities: vec![],
            context_window: None,
            cost_input_per_1k: input,
            cost_output_per_1k: output,
            quality_tier: QualityTier::Standard,
            speed_tier: SpeedTier::Fast,
            priority: 10,
            enabled: true,
        }
    }

    #[test]
    fn cost_estimate_splits_tokens_evenly() {
        // 2000 tokens at (0.3 + 1.5) cents per 1k: 1000/1000 * 1.8 = 1.8.
        assert_eq!(
            estimate_cost_cents(Some(2000), &model(0.3, 1.5)),
            Some(1.8)
        );
    }

    #[test]
    fn cost_estimate_rounds_to_hundredths() {
        assert_eq!(estimate_cost_cents(Some(333), &model(0.3, 1.5)), Some(0.3));
    }

    #[test]
    fn cost_estimate_requires_token_count() {
        assert_eq!(estimate_cost_cents(None, &model(0.3, 1.5)), None);
    }

    #[test]
    fn video_calls_get_the_long_deadline() {
        assert_eq!(worker_timeout(Worker::VideoGen), Duration::from_secs(300));
        assert_eq!(worker_timeout(Worker::ImageGen), Duration::from_secs(60));
    }
}
