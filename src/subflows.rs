//! Sub-workflow step sequences launched by the entry orchestrator.
//!
//! Each sub-workflow is a linear sequence with bounded per-step retries.
//! They all produce a [`SubflowOutcome`]; interpretation (validation,
//! callbacks, status bookkeeping) stays with the orchestrator.

use std::future::Future;
use std::sync::OnceLock;
use std::time::Duration;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tokio::time::sleep;
use tracing::{info, warn};

use crate::{
    error::AppError,
    models::{
        MediaOptions, PrimeWorkflowParams, RoutePreferences, RouterResponse, RoutingTier,
        SimpleRequest, Worker,
    },
    router::SimpleRouter,
};

/// Terminal state of a sub-workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubflowStatus {
    /// Produced a usable output.
    Completed,
    /// Failed with an error.
    Failed,
    /// Code execution only: the whole waterfall failed.
    Quarantined,
}

impl SubflowStatus {
    /// Canonical string form used in callback envelopes.
    pub fn as_str(&self) -> &'static str {
        match self {
            SubflowStatus::Completed => "completed",
            SubflowStatus::Failed => "failed",
            SubflowStatus::Quarantined => "quarantined",
        }
    }
}

/// What a sub-workflow run produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubflowOutcome {
    /// Terminal state.
    pub status: SubflowStatus,
    /// Primary output (text, or a media URL / payload).
    pub output: Option<String>,
    /// Executor that produced the output (code tasks: the winning model).
    pub runner_used: Option<String>,
    /// Zero-based position of the winning model in the waterfall.
    pub waterfall_position: Option<usize>,
    /// Every model attempted, in order.
    pub attempted_models: Vec<String>,
    /// Error on failure.
    pub error: Option<String>,
}

impl SubflowOutcome {
    fn failed(error: impl Into<String>) -> Self {
        Self {
            status: SubflowStatus::Failed,
            output: None,
            runner_used: None,
            waterfall_position: None,
            attempted_models: Vec::new(),
            error: Some(error.into()),
        }
    }
}

const STEP_RETRIES: u32 = 3;
const STEP_BACKOFF: Duration = Duration::from_secs(2);

/// Runs one step with bounded retries and linear backoff. The closure gets
/// the 1-based attempt number.
async fn retry_step<T, F, Fut>(step: &str, attempts: u32, op: F) -> Result<T, AppError>
where
    F: Fn(u32) -> Fut,
    Fut: Future<Output = Result<T, AppError>>,
{
    let mut last_error = None;
    for attempt in 1..=attempts {
        match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(err) => {
                warn!(step, attempt, error = %err, "Sub-workflow step attempt failed");
                last_error = Some(err);
                if attempt < attempts {
                    sleep(STEP_BACKOFF * attempt).await;
                }
            }
        }
    }
    Err(last_error.unwrap_or_else(|| {
        AppError::ApiError(format!("Step {step} failed without an error"))
    }))
}

fn text_output(envelope: &RouterResponse) -> Option<String> {
    envelope
        .results
        .get("result")
        .and_then(|result| result.get("text"))
        .and_then(serde_json::Value::as_str)
        .map(str::to_string)
}

fn media_output(envelope: &RouterResponse) -> Option<String> {
    let result = envelope.results.get("result")?;
    result
        .get("url")
        .and_then(serde_json::Value::as_str)
        .map(str::to_string)
        .or_else(|| {
            result
                .get("base64")
                .and_then(serde_json::Value::as_str)
                .map(str::to_string)
        })
}

fn envelope_error(envelope: &RouterResponse) -> String {
    envelope
        .error
        .clone()
        .unwrap_or_else(|| "unknown error".to_string())
}

fn task_prompt(params: &PrimeWorkflowParams) -> String {
    let title = params.title.clone().unwrap_or_default();
    match params.description.as_deref() {
        Some(description) if !description.trim().is_empty() => {
            format!("{title}\n\n{description}")
        }
        _ => title,
    }
}

/// Code execution: walk the model waterfall in order; the first model that
/// answers wins. When every position fails the task is quarantined.
pub async fn run_code_execution(
    router: &SimpleRouter,
    params: &PrimeWorkflowParams,
    waterfall: &[String],
) -> SubflowOutcome {
    let task_id = params.task_id.clone().unwrap_or_default();
    info!(task = %task_id, waterfall = ?waterfall, "Starting code execution");

    let mut attempted = Vec::new();
    let mut last_error = String::from("empty waterfall");

    for (position, model) in waterfall.iter().enumerate() {
        attempted.push(model.clone());
        let request = SimpleRequest {
            worker: Worker::TextGen,
            prompt: task_prompt(params),
            options: MediaOptions {
                // Pinned to the code tier so queue congestion cannot demote
                // an explicit waterfall position.
                routing_tier: RoutingTier::Code,
                ..params.options.clone()
            },
            constraints: params.constraints.clone(),
            preferences: RoutePreferences {
                provider: None,
                model: Some(model.clone()),
            },
            request_id: Some(format!("{task_id}:code:{position}")),
        };

        match router.route(&request).await {
            Ok(envelope) if envelope.success => {
                let output = text_output(&envelope);
                // The router may have satisfied this position with a
                // fallback pair, so the winner comes from the attempt meta.
                let winner = envelope
                    .meta
                    .iter()
                    .find(|m| m.success)
                    .map_or_else(|| model.clone(), |m| m.model.clone());
                info!(task = %task_id, model = %winner, position, "Waterfall position succeeded");
                return SubflowOutcome {
                    status: SubflowStatus::Completed,
                    output,
                    runner_used: Some(winner),
                    waterfall_position: Some(position),
                    attempted_models: attempted,
                    error: None,
                };
            }
            Ok(envelope) => {
                last_error = envelope_error(&envelope);
                warn!(task = %task_id, model = %model, position, error = %last_error, "Waterfall position failed");
            }
            Err(err) => {
                last_error = err.to_string();
                warn!(task = %task_id, model = %model, position, error = %last_error, "Waterfall position errored");
            }
        }
    }

    SubflowOutcome {
        status: SubflowStatus::Quarantined,
        output: None,
        runner_used: None,
        waterfall_position: None,
        attempted_models: attempted,
        error: Some(format!("All waterfall models failed; last error: {last_error}")),
    }
}

/// Plain text generation through the standard chain.
pub async fn run_text_generation(
    router: &SimpleRouter,
    params: &PrimeWorkflowParams,
) -> SubflowOutcome {
    let request = SimpleRequest {
        worker: Worker::TextGen,
        prompt: task_prompt(params),
        options: params.options.clone(),
        constraints: params.constraints.clone(),
        preferences: RoutePreferences::default(),
        request_id: params.task_id.clone(),
    };

    let outcome = retry_step("generate-text", STEP_RETRIES, |_| async {
        let envelope = router.route(&request).await?;
        if envelope.success {
            Ok(envelope)
        } else {
            Err(AppError::AllProvidersFailed(envelope_error(&envelope)))
        }
    })
    .await;

    match outcome {
        Ok(envelope) => SubflowOutcome {
            status: SubflowStatus::Completed,
            runner_used: envelope.meta.iter().find(|m| m.success).map(|m| m.model.clone()),
            output: text_output(&envelope),
            waterfall_position: None,
            attempted_models: Vec::new(),
            error: None,
        },
        Err(err) => SubflowOutcome::failed(err.to_string()),
    }
}

/// Video render: submit, then ride the adapter's completion polling. A
/// not-yet-done render surfaces as a step error, which the retry mechanism
/// turns into linear backoff.
pub async fn run_video_render(
    router: &SimpleRouter,
    params: &PrimeWorkflowParams,
) -> SubflowOutcome {
    let request = SimpleRequest {
        worker: Worker::VideoGen,
        prompt: task_prompt(params),
        options: params.options.clone(),
        constraints: params.constraints.clone(),
        preferences: RoutePreferences::default(),
        request_id: params.task_id.clone(),
    };

    let outcome = retry_step("render-video", STEP_RETRIES, |_| async {
        let envelope = router.route(&request).await?;
        if envelope.success {
            Ok(envelope)
        } else {
            Err(AppError::AllProvidersFailed(envelope_error(&envelope)))
        }
    })
    .await;

    match outcome {
        Ok(envelope) => SubflowOutcome {
            status: SubflowStatus::Completed,
            runner_used: envelope.meta.iter().find(|m| m.success).map(|m| m.model.clone()),
            output: media_output(&envelope),
            waterfall_position: None,
            attempted_models: Vec::new(),
            error: None,
        },
        Err(err) => SubflowOutcome::failed(err.to_string()),
    }
}

/// Image or audio generation: validate, then generate with retries.
pub async fn run_media_generation(
    router: &SimpleRouter,
    params: &PrimeWorkflowParams,
    worker: Worker,
) -> SubflowOutcome {
    let prompt = task_prompt(params);
    if prompt.trim().is_empty() {
        return SubflowOutcome::failed("Empty prompt");
    }

    let request = SimpleRequest {
        worker,
        prompt,
        options: params.options.clone(),
        constraints: params.constraints.clone(),
        preferences: RoutePreferences::default(),
        request_id: params.task_id.clone(),
    };

    let outcome = retry_step("generate-media", STEP_RETRIES, |_| async {
        let envelope = router.route(&request).await?;
        if envelope.success {
            Ok(envelope)
        } else {
            Err(AppError::AllProvidersFailed(envelope_error(&envelope)))
        }
    })
    .await;

    match outcome {
        Ok(envelope) => SubflowOutcome {
            status: SubflowStatus::Completed,
            runner_used: envelope.meta.iter().find(|m| m.success).map(|m| m.model.clone()),
            output: media_output(&envelope),
            waterfall_position: None,
            attempted_models: Vec::new(),
            error: None,
        },
        Err(err) => SubflowOutcome::failed(err.to_string()),
    }
}

/// Estimated shipping dimensions extracted from model output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShippingDimensions {
    /// Package length in centimeters.
    pub length_cm: f64,
    /// Package width in centimeters.
    pub width_cm: f64,
    /// Package height in centimeters.
    pub height_cm: f64,
    /// Package weight in kilograms.
    pub weight_kg: f64,
    /// Model confidence: `high`, `medium`, or `low`.
    pub confidence: String,
}

impl ShippingDimensions {
    fn validate(&self) -> Result<(), String> {
        for (field, value) in [
            ("length_cm", self.length_cm),
            ("width_cm", self.width_cm),
            ("height_cm", self.height_cm),
            ("weight_kg", self.weight_kg),
        ] {
            if !value.is_finite() || value <= 0.0 {
                return Err(format!("Field {field} must be a positive number"));
            }
        }
        match self.confidence.as_str() {
            "high" | "medium" | "low" => Ok(()),
            other => Err(format!("Unrecognized confidence level: {other}")),
        }
    }
}

/// Shipping research: one call to the pinned model with a deterministic
/// prompt, then strict JSON extraction. Any parse or validation failure
/// fails the sub-workflow.
pub async fn run_shipping_research(
    router: &SimpleRouter,
    params: &PrimeWorkflowParams,
    pinned_model: &str,
) -> SubflowOutcome {
    let Some(product) = params.context.product.as_ref() else {
        return SubflowOutcome::failed("Shipping research requires context.product");
    };

    let product_text = match product {
        serde_json::Value::String(name) => name.clone(),
        other => other.to_string(),
    };

    let prompt = format!(
        "Estimate the boxed shipping dimensions for this product: {product_text}\n\n\
         Respond with exactly one JSON object with numeric fields length_cm, width_cm, \
         height_cm, weight_kg, and a confidence field of \"high\", \"medium\", or \"low\". \
         No other text."
    );

    let request = SimpleRequest {
        worker: Worker::TextGen,
        prompt,
        options: MediaOptions {
            task_type: Some("json".to_string()),
            temperature: Some(0.0),
            ..MediaOptions::default()
        },
        constraints: params.constraints.clone(),
        preferences: RoutePreferences {
            provider: None,
            model: Some(pinned_model.to_string()),
        },
        request_id: params.task_id.clone(),
    };

    let envelope = match router.route(&request).await {
        Ok(envelope) if envelope.success => envelope,
        Ok(envelope) => return SubflowOutcome::failed(envelope_error(&envelope)),
        Err(err) => return SubflowOutcome::failed(err.to_string()),
    };

    let Some(raw) = text_output(&envelope) else {
        return SubflowOutcome::failed("Model returned no text");
    };

    match extract_dimensions(&raw) {
        Ok(dimensions) => SubflowOutcome {
            status: SubflowStatus::Completed,
            output: serde_json::to_string(&dimensions).ok(),
            runner_used: Some(pinned_model.to_string()),
            waterfall_position: None,
            attempted_models: vec![pinned_model.to_string()],
            error: None,
        },
        Err(reason) => SubflowOutcome::failed(format!("Dimension extraction failed: {reason}")),
    }
}

/// Pulls a dimensions object out of model text: strip markdown fences,
/// regex-extract the outermost `{...}`, parse, validate.
pub fn extract_dimensions(raw: &str) -> Result<ShippingDimensions, String> {
    static FENCE: OnceLock<Regex> = OnceLock::new();
    static OBJECT: OnceLock<Regex> = OnceLock::new();
    let fence = FENCE.get_or_init(|| Regex::new(r"```[a-zA-Z]*\n?|```").expect("static regex"));
    let object = OBJECT.get_or_init(|| Regex::new(r"(?s)\{.*\}").expect("static regex"));

    let stripped = fence.replace_all(raw, "");
    let matched = object
        .find(&stripped)
        .ok_or_else(|| "No JSON object in output".to_string())?;

    let dimensions: ShippingDimensions = serde_json::from_str(matched.as_str())
        .map_err(|err| format!("Invalid JSON: {err}"))?;
    dimensions.validate()?;
    Ok(dimensions)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dimensions_extract_from_fenced_output() {
        let raw = "Here you go:\n```json\n{\"length_cm\": 30.0, \"width_cm\": 20.0, \"height_cm\": 10.0, \"weight_kg\": 1.2, \"confidence\": \"medium\"}\n```";
        let dims = extract_dimensions(raw).expect("extract");
        assert_eq!(dims.length_cm, 30.0);
        assert_eq!(dims.confidence, "medium");
    }

    #[test]
    fn missing_object_is_rejected() {
        assert!(extract_dimensions("no json here").is_err());
    }

    #[test]
    fn non_numeric_fields_are_rejected() {
        let raw = r#"{"length_cm": -3, "width_cm": 20, "height_cm": 10, "weight_kg": 1, "confidence": "high"}"#;
        let err = extract_dimensions(raw).expect_err("reject");
        assert!(err.contains("length_cm"));
    }

    #[test]
    fn unknown_confidence_is_rejected() {
        let raw = r#"{"length_cm": 3, "width_cm": 20, "height_cm": 10, "weight_kg": 1, "confidence": "certain"}"#;
        let err = extract_dimensions(raw).expect_err("reject");
        assert!(err.contains("confidence"));
    }

    #[tokio::test(start_paused = true)]
    async fn retry_step_stops_after_first_success() {
        use std::sync::atomic::{AtomicU32, Ordering};
        let calls = AtomicU32::new(0);
        let result = retry_step("test", 3, |attempt| {
            let _ = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if attempt >= 2 {
                    Ok(attempt)
                } else {
                    Err(AppError::ApiError("not yet".into()))
                }
            }
        })
        .await
        .expect("retry");
        assert_eq!(result, 2);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn retry_step_surfaces_the_last_error() {
        let err = retry_step::<(), _, _>("test", 2, |_| async {
            Err(AppError::ApiError("still broken".into()))
        })
        .await
        .expect_err("should fail");
        assert!(err.to_string().contains("still broken"));
    }
}
