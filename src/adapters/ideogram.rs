//! Ideogram image-generation adapter.
//!
//! Auth travels in the `Api-Key` header; the response carries hosted image
//! URLs with their resolutions.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::{
    adapters::{
        http_client, surface_http_error, with_auth, DispatchRequest, MediaAdapter, NativeAuth,
    },
    error::AppError,
    models::{MediaPayload, MediaResult, Worker},
};

/// Adapter for the Ideogram image API.
#[derive(Debug, Clone)]
pub struct IdeogramAdapter {
    http_client: Client,
}

impl IdeogramAdapter {
    /// Creates the adapter with its own HTTP client.
    pub fn new() -> Result<Self, AppError> {
        Ok(Self {
            http_client: http_client()?,
        })
    }

    fn build_body(&self, request: &DispatchRequest) -> GenerateBody {
        let options = &request.options;
        GenerateBody {
            image_request: ImageRequest {
                prompt: request.prompt.clone(),
                model: request.native_model.clone(),
                aspect_ratio: options.aspect_ratio.as_ref().map(|ratio| {
                    // Wire format uses e.g. ASPECT_16_9.
                    format!("ASPECT_{}", ratio.replace(':', "_"))
                }),
                negative_prompt: options.negative_prompt.clone(),
                num_images: options.num_images,
                style_type: options.style.clone(),
            },
        }
    }
}

#[async_trait]
impl MediaAdapter for IdeogramAdapter {
    fn provider_id(&self) -> &str {
        "ideogram"
    }

    fn supported_workers(&self) -> &[Worker] {
        &[Worker::ImageGen]
    }

    async fn execute(&self, request: &DispatchRequest) -> Result<MediaResult, AppError> {
        let url = format!("{}/generate", request.base_url);
        let body = self.build_body(request);

        let builder = self
            .http_client
            .post(url)
            .timeout(request.timeout)
            .json(&body);
        let response = with_auth(builder, &request.auth, NativeAuth::Header("Api-Key"))
            .send()
            .await
            .map_err(|err| AppError::NetworkError(err.to_string()))?;

        if !response.status().is_success() {
            return Err(surface_http_error("Ideogram", response).await);
        }

        let parsed: GenerateResponse = response
            .json()
            .await
            .map_err(|err| AppError::ApiError(err.to_string()))?;

        let image = parsed.data.into_iter().next().ok_or_else(|| {
            AppError::ApiError("Ideogram response contained no images".into())
        })?;
        let (width, height) = image
            .resolution
            .as_deref()
            .and_then(parse_resolution)
            .map_or((None, None), |(w, h)| (Some(w), Some(h)));

        Ok(request.result(MediaPayload::Image {
            url: Some(image.url),
            base64: None,
            width,
            height,
        }))
    }

    async fn check_health(&self, request: &DispatchRequest) -> Result<(), AppError> {
        let url = format!("{}/manage/api/subscription", request.base_url);
        let builder = self.http_client.get(url).timeout(request.timeout);
        let response = with_auth(builder, &request.auth, NativeAuth::Header("Api-Key"))
            .send()
            .await
            .map_err(|err| AppError::NetworkError(err.to_string()))?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(surface_http_error("Ideogram", response).await)
        }
    }
}

fn parse_resolution(value: &str) -> Option<(u32, u32)> {
    let (width, height) = value.split_once('x')?;
    Some((width.parse().ok()?, height.parse().ok()?))
}

#[derive(Serialize)]
struct GenerateBody {
    image_request: ImageRequest,
}

#[derive(Serialize)]
struct ImageRequest {
    prompt: String,
    model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    aspect_ratio: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    negative_prompt: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    num_images: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    style_type: Option<String>,
}

#[derive(Deserialize, Debug)]
struct GenerateResponse {
    #[serde(default)]
    data: Vec<GeneratedImage>,
}

#[derive(Deserialize, Debug)]
struct GeneratedImage {
    url: String,
    #[serde(default)]
    resolution: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::DispatchAuth;
    use std::time::Duration;

    #[test]
    fn aspect_ratio_maps_to_wire_format() {
        let adapter = IdeogramAdapter::new().expect("adapter");
        let request = DispatchRequest {
            provider_id: "ideogram".into(),
            model: "ideogram-v2".into(),
            native_model: "V_2".into(),
            worker: Worker::ImageGen,
            prompt: "a lighthouse".into(),
            system_prompt: None,
            options: crate::models::MediaOptions {
                aspect_ratio: Some("16:9".into()),
                ..crate::models::MediaOptions::default()
            },
            base_url: "https://api.ideogram.ai".into(),
            auth: DispatchAuth::Key("k".into()),
            timeout: Duration::from_secs(60),
            request_id: "req-1".into(),
        };
        let body = adapter.build_body(&request);
        assert_eq!(body.image_request.aspect_ratio.as_deref(), Some("ASPECT_16_9"));
    }

    #[test]
    fn resolution_parses_dimensions() {
        assert_eq!(parse_resolution("1024x768"), Some((1024, 768)));
        assert_eq!(parse_resolution("square"), None);
    }
}
