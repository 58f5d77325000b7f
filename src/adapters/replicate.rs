//! Replicate predictions adapter for image and video generation.
//!
//! Replicate is an asynchronous job API: `execute` creates a prediction and
//! then polls its status URL once per second until it reaches `succeeded`,
//! `failed`, or `canceled`, bounded by the per-call timeout.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use tokio::time::{sleep, Instant};
use tracing::debug;

use crate::{
    adapters::{
        http_client, surface_http_error, with_auth, DispatchAuth, DispatchRequest, MediaAdapter,
        NativeAuth,
    },
    error::AppError,
    models::{MediaPayload, MediaResult, Worker},
};

const POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Adapter for Replicate's predictions API.
#[derive(Debug, Clone)]
pub struct ReplicateAdapter {
    http_client: Client,
}

impl ReplicateAdapter {
    /// Creates the adapter with its own HTTP client.
    pub fn new() -> Result<Self, AppError> {
        Ok(Self {
            http_client: http_client()?,
        })
    }

    fn build_input(&self, request: &DispatchRequest) -> serde_json::Value {
        let options = &request.options;
        let mut input = json!({ "prompt": request.prompt });
        match request.worker {
            Worker::ImageGen => {
                if let Some(ratio) = &options.aspect_ratio {
                    input["aspect_ratio"] = json!(ratio);
                }
                if let Some(count) = options.num_images {
                    input["num_outputs"] = json!(count);
                }
                if let Some(negative) = &options.negative_prompt {
                    input["negative_prompt"] = json!(negative);
                }
            }
            Worker::VideoGen => {
                if let Some(duration) = options.duration {
                    input["duration"] = json!(duration);
                }
                if let Some(fps) = options.fps {
                    input["fps"] = json!(fps);
                }
                if let Some(resolution) = &options.resolution {
                    input["resolution"] = json!(resolution);
                }
            }
            _ => {}
        }
        input
    }

    async fn create_prediction(
        &self,
        request: &DispatchRequest,
    ) -> Result<Prediction, AppError> {
        // Model-scoped creation: POST /models/{owner}/{name}/predictions.
        let url = format!(
            "{}/models/{}/predictions",
            request.base_url, request.native_model
        );
        let body = json!({ "input": self.build_input(request) });

        let builder = self
            .http_client
            .post(url)
            .timeout(Duration::from_secs(30))
            .json(&body);
        let response = with_auth(builder, &request.auth, NativeAuth::Bearer)
            .send()
            .await
            .map_err(|err| AppError::NetworkError(err.to_string()))?;

        if !response.status().is_success() {
            return Err(surface_http_error("Replicate", response).await);
        }

        response
            .json()
            .await
            .map_err(|err| AppError::ApiError(err.to_string()))
    }

    async fn fetch_prediction(
        &self,
        url: &str,
        auth: &DispatchAuth,
    ) -> Result<Prediction, AppError> {
        let builder = self
            .http_client
            .get(url)
            .timeout(Duration::from_secs(30));
        let response = with_auth(builder, auth, NativeAuth::Bearer)
            .send()
            .await
            .map_err(|err| AppError::NetworkError(err.to_string()))?;

        if !response.status().is_success() {
            return Err(surface_http_error("Replicate", response).await);
        }

        response
            .json()
            .await
            .map_err(|err| AppError::ApiError(err.to_string()))
    }

    async fn await_prediction(
        &self,
        request: &DispatchRequest,
        mut prediction: Prediction,
    ) -> Result<Prediction, AppError> {
        let deadline = Instant::now() + request.timeout;

        loop {
            match prediction.status.as_str() {
                "succeeded" => return Ok(prediction),
                "failed" | "canceled" => {
                    let reason = prediction
                        .error
                        .unwrap_or_else(|| format!("prediction {}", prediction.status));
                    return Err(AppError::ApiError(format!(
                        "Replicate prediction did not complete: {reason}"
                    )));
                }
                status => {
                    debug!(prediction = %prediction.id, status, "Prediction still running");
                }
            }

            if Instant::now() >= deadline {
                return Err(AppError::ApiError(format!(
                    "Replicate prediction {} timed out after {:?}",
                    prediction.id, request.timeout
                )));
            }

            sleep(POLL_INTERVAL).await;

            let poll_url = prediction
                .urls
                .as_ref()
                .and_then(|urls| urls.get.clone())
                .unwrap_or_else(|| {
                    format!("{}/predictions/{}", request.base_url, prediction.id)
                });
            prediction = self.fetch_prediction(&poll_url, &request.auth).await?;
        }
    }
}

#[async_trait]
impl MediaAdapter for ReplicateAdapter {
    fn provider_id(&self) -> &str {
        "replicate"
    }

    fn supported_workers(&self) -> &[Worker] {
        &[Worker::ImageGen, Worker::VideoGen]
    }

    async fn execute(&self, request: &DispatchRequest) -> Result<MediaResult, AppError> {
        let prediction = self.create_prediction(request).await?;
        let finished = self.await_prediction(request, prediction).await?;

        let url = finished.first_output_url().ok_or_else(|| {
            AppError::ApiError("Replicate prediction succeeded without output".into())
        })?;

        let payload = match request.worker {
            Worker::VideoGen => MediaPayload::Video {
                url,
                duration_ms: request
                    .options
                    .duration
                    .map(|seconds| i64::from(seconds) * 1000),
            },
            _ => MediaPayload::Image {
                url: Some(url),
                base64: None,
                width: None,
                height: None,
            },
        };

        Ok(request.result(payload))
    }

    async fn check_health(&self, request: &DispatchRequest) -> Result<(), AppError> {
        let url = format!("{}/account", request.base_url);
        let builder = self
            .http_client
            .get(url)
            .timeout(Duration::from_secs(10));
        let response = with_auth(builder, &request.auth, NativeAuth::Bearer)
            .send()
            .await
            .map_err(|err| AppError::NetworkError(err.to_string()))?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(surface_http_error("Replicate", response).await)
        }
    }
}

#[derive(Debug, Deserialize)]
struct Prediction {
    id: String,
    status: String,
    #[serde(default)]
    output: Option<serde_json::Value>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    urls: Option<PredictionUrls>,
}

#[derive(Debug, Deserialize)]
struct PredictionUrls {
    #[serde(default)]
    get: Option<String>,
}

impl Prediction {
    /// Output URL: either a bare string or the first element of an array.
    fn first_output_url(&self) -> Option<String> {
        match &self.output {
            Some(serde_json::Value::String(url)) => Some(url.clone()),
            Some(serde_json::Value::Array(items)) => items
                .iter()
                .find_map(|item| item.as_str().map(str::to_string)),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_url_from_string_and_array() {
        let single: Prediction = serde_json::from_str(
            r#"{"id":"p1","status":"succeeded","output":"https://example.com/a.png"}"#,
        )
        .expect("parse");
        assert_eq!(
            single.first_output_url().as_deref(),
            Some("https://example.com/a.png")
        );

        let many: Prediction = serde_json::from_str(
            r#"{"id":"p2","status":"succeeded","output":["https://example.com/b.png"]}"#,
        )
        .expect("parse");
        assert_eq!(
            many.first_output_url().as_deref(),
            Some("https://example.com/b.png")
        );
    }

    #[test]
    fn missing_output_yields_none() {
        let pending: Prediction =
            serde_json::from_str(r#"{"id":"p3","status":"processing"}"#).expect("parse");
        assert_eq!(pending.first_output_url(), None);
    }
}
