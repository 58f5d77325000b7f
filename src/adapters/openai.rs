//! OpenAI-compatible chat-completions adapter.
//!
//! Serves both the hosted OpenAI API and the on-prem vLLM endpoint, which
//! speaks the same dialect. Streaming uses the `data: {...}` / `[DONE]`
//! framing.

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use reqwest_eventsource::{Event, EventSource};
use serde::Deserialize;
use serde_json::json;
use tokio::sync::mpsc;

use crate::{
    adapters::{
        http_client, surface_http_error, with_auth, DispatchRequest, MediaAdapter, NativeAuth,
    },
    error::AppError,
    models::{MediaPayload, MediaResult, StreamDelta, Worker},
};

/// Adapter for any endpoint speaking the OpenAI chat-completions dialect.
#[derive(Debug, Clone)]
pub struct OpenAiCompatAdapter {
    provider_id: &'static str,
    display_name: &'static str,
    http_client: Client,
}

impl OpenAiCompatAdapter {
    /// The hosted OpenAI API.
    pub fn openai() -> Result<Self, AppError> {
        Ok(Self {
            provider_id: "openai",
            display_name: "OpenAI",
            http_client: http_client()?,
        })
    }

    /// The on-prem vLLM server (same dialect, no credential).
    pub fn local_vllm() -> Result<Self, AppError> {
        Ok(Self {
            provider_id: "local-vllm",
            display_name: "Local vLLM",
            http_client: http_client()?,
        })
    }

    fn build_body(&self, request: &DispatchRequest, stream: bool) -> serde_json::Value {
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
        if let Some(top_p) = options.top_p {
            body["top_p"] = json!(top_p);
        }
        if !options.stop_sequences.is_empty() {
            body["stop"] = json!(options.stop_sequences);
        }
        if stream {
            body["stream"] = json!(true);
        }
        body
    }

    fn request_builder(
        &self,
        request: &DispatchRequest,
        body: &serde_json::Value,
    ) -> reqwest::RequestBuilder {
        let url = format!("{}/chat/completions", request.base_url);
        let builder = self
            .http_client
            .post(url)
            .timeout(request.timeout)
            .json(body);
        with_auth(builder, &request.auth, NativeAuth::Bearer)
    }
}

#[async_trait]
impl MediaAdapter for OpenAiCompatAdapter {
    fn provider_id(&self) -> &str {
        self.provider_id
    }

    fn supported_workers(&self) -> &[Worker] {
        &[Worker::TextGen]
    }

    async fn execute(&self, request: &DispatchRequest) -> Result<MediaResult, AppError> {
        let body = self.build_body(request, false);
        let response = self
            .request_builder(request, &body)
            .send()
            .await
            .map_err(|err| AppError::NetworkError(err.to_string()))?;

        if !response.status().is_success() {
            return Err(surface_http_error(self.display_name, response).await);
        }

        let parsed: ChatResponse = response
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
        let url = format!("{}/models", request.base_url);
        let builder = self
            .http_client
            .get(url)
            .timeout(request.timeout);
        let response = with_auth(builder, &request.auth, NativeAuth::Bearer)
            .send()
            .await
            .map_err(|err| AppError::NetworkError(err.to_string()))?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(surface_http_error(self.display_name, response).await)
        }
    }

    async fn execute_stream(
        &self,
        request: &DispatchRequest,
        tx: mpsc::Sender<StreamDelta>,
    ) -> Result<MediaResult, AppError> {
        let body = self.build_body(request, true);
        let builder = self.request_builder(request, &body);

        let mut source = EventSource::new(builder).map_err(|err| {
            AppError::ApiError(format!("{} stream setup failed: {err}", self.display_name))
        })?;

        let mut full_text = String::new();

        while let Some(event) = source.next().await {
            match event {
                Ok(Event::Open) => {}
                Ok(Event::Message(message)) => {
                    if message.data.trim() == "[DONE]" {
                        break;
                    }
                    let data: serde_json::Value = serde_json::from_str(&message.data)
                        .map_err(|err| AppError::ApiError(err.to_string()))?;
                    if let Some(text) = data["choices"][0]["delta"]["content"].as_str() {
                        full_text.push_str(text);
                        let _unused = tx
                            .send(StreamDelta {
                                text: text.to_string(),
                                done: false,
                                request_id: request.request_id.clone(),
                            })
                            .await;
                    }
                }
                Err(err) => {
                    source.close();
                    return Err(AppError::ApiError(format!(
                        "{} stream failed: {err}",
                        self.display_name
                    )));
                }
            }
        }
        source.close();

        let _unused = tx
            .send(StreamDelta {
                text: String::new(),
                done: true,
                request_id: request.request_id.clone(),
            })
            .await;

        Ok(request.result(MediaPayload::Text {
            text: full_text,
            tokens_used: None,
        }))
    }
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
    usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatUsage {
    total_tokens: i64,
}
