//! Anthropic Messages API adapter.
//!
//! Blocking calls go through `/v1/messages`; streaming translates the typed
//! SSE events (`content_block_delta`, `message_stop`) into the uniform
//! delta schema.

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

const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_MAX_TOKENS: u32 = 4096;

/// Adapter for Anthropic's Messages API.
#[derive(Debug, Clone)]
pub struct AnthropicAdapter {
    http_client: Client,
}

impl AnthropicAdapter {
    /// Creates the adapter with its own HTTP client.
    pub fn new() -> Result<Self, AppError> {
        Ok(Self {
            http_client: http_client()?,
        })
    }

    fn build_body(&self, request: &DispatchRequest, stream: bool) -> serde_json::Value {
        let options = &request.options;
        let mut body = json!({
            "model": request.native_model,
            "max_tokens": options.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            "messages": [{"role": "user", "content": request.prompt}],
        });
        if let Some(system) = &request.system_prompt {
            body["system"] = json!(system);
        }
        if let Some(temperature) = options.temperature {
            body["temperature"] = json!(temperature);
        }
        if let Some(top_p) = options.top_p {
            body["top_p"] = json!(top_p);
        }
        if !options.stop_sequences.is_empty() {
            body["stop_sequences"] = json!(options.stop_sequences);
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
        let url = format!("{}/v1/messages", request.base_url);
        let builder = self
            .http_client
            .post(url)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .timeout(request.timeout)
            .json(body);
        with_auth(builder, &request.auth, NativeAuth::Header("x-api-key"))
    }
}

#[async_trait]
impl MediaAdapter for AnthropicAdapter {
    fn provider_id(&self) -> &str {
        "anthropic"
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
            return Err(surface_http_error("Anthropic", response).await);
        }

        let parsed: MessagesResponse = response
            .json()
            .await
            .map_err(|err| AppError::ApiError(err.to_string()))?;

        let text = parsed
            .content
            .iter()
            .filter_map(|block| block.text.as_deref())
            .collect::<Vec<_>>()
            .join("");
        let tokens_used = parsed
            .usage
            .map(|usage| usage.input_tokens + usage.output_tokens);

        Ok(request.result(MediaPayload::Text { text, tokens_used }))
    }

    async fn check_health(&self, request: &DispatchRequest) -> Result<(), AppError> {
        // A minimal one-token message doubles as an auth and quota probe.
        let body = json!({
            "model": request.native_model,
            "max_tokens": 1,
            "messages": [{"role": "user", "content": "ping"}],
        });
        let response = self
            .request_builder(request, &body)
            .send()
            .await
            .map_err(|err| AppError::NetworkError(err.to_string()))?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(surface_http_error("Anthropic", response).await)
        }
    }

    async fn execute_stream(
        &self,
        request: &DispatchRequest,
        tx: mpsc::Sender<StreamDelta>,
    ) -> Result<MediaResult, AppError> {
        let body = self.build_body(request, true);
        let builder = self.request_builder(request, &body);

        let mut source = EventSource::new(builder)
            .map_err(|err| AppError::ApiError(format!("Anthropic stream setup failed: {err}")))?;

        let mut full_text = String::new();
        let mut input_tokens: i64 = 0;
        let mut output_tokens: i64 = 0;

        while let Some(event) = source.next().await {
            match event {
                Ok(Event::Open) => {}
                Ok(Event::Message(message)) => {
                    let data: serde_json::Value = serde_json::from_str(&message.data)
                        .map_err(|err| AppError::ApiError(err.to_string()))?;
                    match data["type"].as_str() {
                        Some("message_start") => {
                            if let Some(tokens) =
                                data["message"]["usage"]["input_tokens"].as_i64()
                            {
                                input_tokens = tokens;
                            }
                        }
                        Some("content_block_delta") => {
                            if let Some(text) = data["delta"]["text"].as_str() {
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
                        Some("message_delta") => {
                            if let Some(tokens) = data["usage"]["output_tokens"].as_i64() {
                                output_tokens = tokens;
                            }
                        }
                        Some("message_stop") => break,
                        _ => {}
                    }
                }
                Err(err) => {
                    source.close();
                    return Err(AppError::ApiError(format!(
                        "Anthropic stream failed: {err}"
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

        let tokens_used = (input_tokens + output_tokens > 0)
            .then_some(input_tokens + output_tokens);
        Ok(request.result(MediaPayload::Text {
            text: full_text,
            tokens_used,
        }))
    }
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
    usage: Option<UsageBlock>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UsageBlock {
    input_tokens: i64,
    output_tokens: i64,
}
