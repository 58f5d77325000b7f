//! z.ai chat adapter.
//!
//! Speaks the OpenAI chat dialect against the z.ai endpoint. The provider is
//! on the gateway exclusion list, so calls always take the direct path with
//! the native bearer credential.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;

use crate::{
    adapters::{
        http_client, surface_http_error, with_auth, DispatchRequest, MediaAdapter, NativeAuth,
    },
    error::AppError,
    models::{MediaPayload, MediaResult, Worker},
};

/// Adapter for the z.ai chat API.
#[derive(Debug, Clone)]
pub struct ZaiAdapter {
    http_client: Client,
}

impl ZaiAdapter {
    /// Creates the adapter with its own HTTP client.
    pub fn new() -> Result<Self, AppError> {
        Ok(Self {
            http_client: http_client()?,
        })
    }

    fn build_body(&self, request: &DispatchRequest) -> serde_json::Value {
        let options = &request.options;
        let mut messages = Vec::new();
        if let Some(system) = &request.system_prompt {
            messages.push(json!({"role": "system", "content": system}));
        }
        messages.push(json!({"role": "user", "content": request.prompt}));

        let mut body = json!({
            "model": request.native_model,
            "messages": messages,
        });
        if let Some(max_tokens) = options.max_tokens {
            body["max_tokens"] = json!(max_tokens);
        }
        if let Some(temperature) = options.temperature {
            body["temperature"] = json!(temperature);
        }
        body
    }
}

#[async_trait]
impl MediaAdapter for ZaiAdapter {
    fn provider_id(&self) -> &str {
        "zai"
    }

    fn supported_workers(&self) -> &[Worker] {
        &[Worker::TextGen]
    }

    async fn execute(&self, request: &DispatchRequest) -> Result<MediaResult, AppError> {
        let url = format!("{}/chat/completions", request.base_url);
        let body = self.build_body(request);

        let builder = self
            .http_client
            .post(url)
            .timeout(request.timeout)
            .json(&body);
        let response = with_auth(builder, &request.auth, NativeAuth::Bearer)
            .send()
            .await
            .map_err(|err| AppError::NetworkError(err.to_string()))?;

        if !response.status().is_success() {
            return Err(surface_http_error("z.ai", response).await);
        }

        let parsed: ZaiResponse = response
            .json()
            .await
            .map_err(|err| AppError::ApiError(err.to_string()))?;

        let text = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .unwrap_or_default();
        let tokens_used = parsed.usage.map(|usage| usage.total_tokens);

        Ok(request.result(MediaPayload::Text { text, tokens_used }))
    }

    async fn check_health(&self, request: &DispatchRequest) -> Result<(), AppError> {
        // z.ai has no cheap listing endpoint; a one-token completion is the
        // probe.
        let url = format!("{}/chat/completions", request.base_url);
        let body = json!({
            "model": request.native_model,
            "messages": [{"role": "user", "content": "ping"}],
            "max_tokens": 1,
        });
        let builder = self
            .http_client
            .post(url)
            .timeout(request.timeout)
            .json(&body);
        let response = with_auth(builder, &request.auth, NativeAuth::Bearer)
            .send()
            .await
            .map_err(|err| AppError::NetworkError(err.to_string()))?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(surface_http_error("z.ai", response).await)
        }
    }
}

#[derive(Debug, Deserialize)]
struct ZaiResponse {
    choices: Vec<ZaiChoice>,
    usage: Option<ZaiUsage>,
}

#[derive(Debug, Deserialize)]
struct ZaiChoice {
    message: ZaiMessage,
}

#[derive(Debug, Deserialize)]
struct ZaiMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ZaiUsage {
    total_tokens: i64,
}
