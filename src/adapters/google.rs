//! Google Gemini `generateContent` adapter.
//!
//! The native API carries the key as a URL query parameter; under gateway
//! routing the key is omitted and the gateway header takes over.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::{
    adapters::{
        http_client, surface_http_error, DispatchAuth, DispatchRequest, MediaAdapter,
        GATEWAY_AUTH_HEADER,
    },
    error::AppError,
    models::{MediaPayload, MediaResult, Worker},
};

/// Adapter for the Google Gemini API.
#[derive(Debug, Clone)]
pub struct GoogleAdapter {
    http_client: Client,
}

impl GoogleAdapter {
    /// Creates the adapter with its own HTTP client.
    pub fn new() -> Result<Self, AppError> {
        Ok(Self {
            http_client: http_client()?,
        })
    }

    fn endpoint(&self, request: &DispatchRequest) -> String {
        match &request.auth {
            DispatchAuth::Key(key) => format!(
                "{}/models/{}:generateContent?key={key}",
                request.base_url, request.native_model
            ),
            _ => format!(
                "{}/models/{}:generateContent",
                request.base_url, request.native_model
            ),
        }
    }

    fn build_body(&self, request: &DispatchRequest) -> GenerateBody {
        let generation_config = GenerationConfig {
            max_output_tokens: request.options.max_tokens,
            temperature: request.options.temperature,
            top_p: request.options.top_p,
        };

        GenerateBody {
            contents: vec![Content {
                parts: vec![Part {
                    text: request.prompt.clone(),
                }],
            }],
            system_instruction: request.system_prompt.as_ref().map(|system| Content {
                parts: vec![Part {
                    text: system.clone(),
                }],
            }),
            generation_config: Some(generation_config),
        }
    }
}

#[async_trait]
impl MediaAdapter for GoogleAdapter {
    fn provider_id(&self) -> &str {
        "google"
    }

    fn supported_workers(&self) -> &[Worker] {
        &[Worker::TextGen]
    }

    async fn execute(&self, request: &DispatchRequest) -> Result<MediaResult, AppError> {
        let url = self.endpoint(request);
        let body = self.build_body(request);

        let mut builder = self
            .http_client
            .post(&url)
            .timeout(request.timeout)
            .json(&body);
        if let DispatchAuth::Gateway(token) = &request.auth {
            builder = builder.header(GATEWAY_AUTH_HEADER, format!("Bearer {token}"));
        }

        let response = builder
            .send()
            .await
            .map_err(|err| AppError::NetworkError(err.to_string()))?;

        if !response.status().is_success() {
            return Err(surface_http_error("Google Gemini", response).await);
        }

        let parsed: GenerateResponse = response
            .json()
            .await
            .map_err(|err| AppError::ApiError(err.to_string()))?;

        let text = parsed
            .candidates
            .first()
            .and_then(|candidate| candidate.content.parts.first())
            .map(|part| part.text.clone())
            .unwrap_or_default();
        let tokens_used = parsed
            .usage_metadata
            .and_then(|usage| usage.total_token_count);

        Ok(request.result(MediaPayload::Text { text, tokens_used }))
    }

    async fn check_health(&self, request: &DispatchRequest) -> Result<(), AppError> {
        let url = match &request.auth {
            DispatchAuth::Key(key) => format!("{}/models?key={key}", request.base_url),
            _ => format!("{}/models", request.base_url),
        };
        let response = self
            .http_client
            .get(url)
            .timeout(request.timeout)
            .send()
            .await
            .map_err(|err| AppError::NetworkError(err.to_string()))?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(surface_http_error("Google Gemini", response).await)
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateBody {
    contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<GenerationConfig>,
}

#[derive(Serialize)]
struct Content {
    parts: Vec<Part>,
}

#[derive(Serialize)]
struct Part {
    text: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f64>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    usage_metadata: Option<UsageMetadata>,
}

#[derive(Deserialize, Debug)]
struct Candidate {
    content: CandidateContent,
}

#[derive(Deserialize, Debug)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Deserialize, Debug)]
struct CandidatePart {
    text: String,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    #[serde(default)]
    total_token_count: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn request(auth: DispatchAuth) -> DispatchRequest {
        DispatchRequest {
            provider_id: "google".into(),
            model: "google-gemini-flash".into(),
            native_model: "gemini-2.0-flash".into(),
            worker: Worker::TextGen,
            prompt: "Hello".into(),
            system_prompt: None,
            options: crate::models::MediaOptions::default(),
            base_url: "https://generativelanguage.googleapis.com/v1beta".into(),
            auth,
            timeout: Duration::from_secs(30),
            request_id: "req-1".into(),
        }
    }

    #[test]
    fn native_endpoint_carries_key_in_query() {
        let adapter = GoogleAdapter::new().expect("adapter");
        let url = adapter.endpoint(&request(DispatchAuth::Key("k123".into())));
        assert!(url.ends_with(":generateContent?key=k123"));
    }

    #[test]
    fn gateway_endpoint_omits_key() {
        let adapter = GoogleAdapter::new().expect("adapter");
        let url = adapter.endpoint(&request(DispatchAuth::Gateway("t".into())));
        assert!(url.ends_with(":generateContent"));
        assert!(!url.contains("key="));
    }

    #[test]
    fn parses_generate_response() {
        let raw = r#"{"candidates":[{"content":{"parts":[{"text":"hi"}]}}],"usageMetadata":{"totalTokenCount":9}}"#;
        let parsed: GenerateResponse = serde_json::from_str(raw).expect("parse");
        assert_eq!(parsed.candidates[0].content.parts[0].text, "hi");
        assert_eq!(
            parsed.usage_metadata.and_then(|u| u.total_token_count),
            Some(9)
        );
    }
}
