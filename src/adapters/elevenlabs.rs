//! ElevenLabs text-to-speech adapter.
//!
//! Auth travels in the `xi-api-key` header. The API answers with raw audio
//! bytes, returned here base64-encoded.

use async_trait::async_trait;
use base64::Engine;
use reqwest::Client;
use serde_json::json;

use crate::{
    adapters::{
        http_client, surface_http_error, with_auth, DispatchRequest, MediaAdapter, NativeAuth,
    },
    error::AppError,
    models::{MediaPayload, MediaResult, Worker},
};

const DEFAULT_VOICE_ID: &str = "21m00Tcm4TlvDq8ikWAM";
const DEFAULT_OUTPUT_FORMAT: &str = "mp3_44100_128";

/// Adapter for the ElevenLabs TTS API.
#[derive(Debug, Clone)]
pub struct ElevenLabsAdapter {
    http_client: Client,
}

impl ElevenLabsAdapter {
    /// Creates the adapter with its own HTTP client.
    pub fn new() -> Result<Self, AppError> {
        Ok(Self {
            http_client: http_client()?,
        })
    }

    fn build_body(&self, request: &DispatchRequest) -> serde_json::Value {
        let options = &request.options;
        let mut voice_settings = serde_json::Map::new();
        if let Some(stability) = options.stability {
            drop(voice_settings.insert("stability".into(), json!(stability)));
        }
        if let Some(boost) = options.similarity_boost {
            drop(voice_settings.insert("similarity_boost".into(), json!(boost)));
        }
        if let Some(speed) = options.speed {
            drop(voice_settings.insert("speed".into(), json!(speed)));
        }

        let mut body = json!({
            "text": request.prompt,
            "model_id": request.native_model,
        });
        if !voice_settings.is_empty() {
            body["voice_settings"] = serde_json::Value::Object(voice_settings);
        }
        body
    }
}

#[async_trait]
impl MediaAdapter for ElevenLabsAdapter {
    fn provider_id(&self) -> &str {
        "elevenlabs"
    }

    fn supported_workers(&self) -> &[Worker] {
        &[Worker::AudioGen]
    }

    async fn execute(&self, request: &DispatchRequest) -> Result<MediaResult, AppError> {
        let voice_id = request
            .options
            .voice_id
            .as_deref()
            .unwrap_or(DEFAULT_VOICE_ID);
        let output_format = request
            .options
            .output_format
            .as_deref()
            .unwrap_or(DEFAULT_OUTPUT_FORMAT);
        let url = format!(
            "{}/text-to-speech/{voice_id}?output_format={output_format}",
            request.base_url
        );
        let body = self.build_body(request);

        let builder = self
            .http_client
            .post(url)
            .timeout(request.timeout)
            .json(&body);
        let response = with_auth(builder, &request.auth, NativeAuth::Header("xi-api-key"))
            .send()
            .await
            .map_err(|err| AppError::NetworkError(err.to_string()))?;

        if !response.status().is_success() {
            return Err(surface_http_error("ElevenLabs", response).await);
        }

        let audio_bytes = response
            .bytes()
            .await
            .map_err(|err| AppError::ApiError(err.to_string()))?;
        let encoded = base64::engine::general_purpose::STANDARD.encode(&audio_bytes);

        Ok(request.result(MediaPayload::Audio {
            url: None,
            base64: Some(encoded),
        }))
    }

    async fn check_health(&self, request: &DispatchRequest) -> Result<(), AppError> {
        let url = format!("{}/voices", request.base_url);
        let builder = self.http_client.get(url).timeout(request.timeout);
        let response = with_auth(builder, &request.auth, NativeAuth::Header("xi-api-key"))
            .send()
            .await
            .map_err(|err| AppError::NetworkError(err.to_string()))?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(surface_http_error("ElevenLabs", response).await)
        }
    }
}
