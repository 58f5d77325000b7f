//! Effective model-waterfall resolution for code-execution requests.
//!
//! Precedence, highest first: an unexpired override, an explicit waterfall,
//! a primary model, the legacy executor family, and finally the configured
//! default (validated against the catalog, with a compiled-in fallback).

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::{
    error::AppError,
    models::{PrimeWorkflowParams, Worker},
    registry::Registry,
};

/// Compiled-in fallback when nothing else resolves.
pub const DEFAULT_CODE_WATERFALL: &[&str] =
    &["anthropic-sonnet", "openai-gpt4o", "google-gemini-flash"];

const CLAUDE_FAMILY_WATERFALL: &[&str] =
    &["anthropic-sonnet", "openai-gpt4o", "google-gemini-flash"];
const GEMINI_FAMILY_WATERFALL: &[&str] =
    &["google-gemini-flash", "anthropic-sonnet", "openai-gpt4o"];

/// The waterfall dictated by the request itself, if any.
///
/// Handles the first four precedence levels; `None` means "fall back to the
/// configured default".
pub fn resolve_explicit(params: &PrimeWorkflowParams, now: DateTime<Utc>) -> Option<Vec<String>> {
    if let (Some(override_waterfall), Some(until)) =
        (&params.override_waterfall, params.override_until)
    {
        if until > now && !override_waterfall.is_empty() {
            debug!(until = %until, "Using time-bounded override waterfall");
            return Some(override_waterfall.clone());
        }
    }

    if let Some(waterfall) = &params.model_waterfall {
        if !waterfall.is_empty() {
            return Some(waterfall.clone());
        }
    }

    if let Some(primary) = &params.primary_model {
        if !primary.trim().is_empty() {
            return Some(vec![primary.clone()]);
        }
    }

    match params.preferred_executor.as_deref() {
        Some("claude") => Some(
            CLAUDE_FAMILY_WATERFALL
                .iter()
                .map(|&model| model.to_string())
                .collect(),
        ),
        Some("gemini") => Some(
            GEMINI_FAMILY_WATERFALL
                .iter()
                .map(|&model| model.to_string())
                .collect(),
        ),
        _ => None,
    }
}

/// The effective ordered list of model names for one code request.
pub async fn resolve(
    registry: &Registry,
    params: &PrimeWorkflowParams,
    configured_default: Option<&str>,
    now: DateTime<Utc>,
) -> Result<Vec<String>, AppError> {
    if let Some(explicit) = resolve_explicit(params, now) {
        return Ok(explicit);
    }

    if let Some(configured) = configured_default {
        let mut valid = Vec::new();
        for name in configured.split(',') {
            let name = name.trim();
            if name.is_empty() {
                continue;
            }
            match registry.get_model(name).await? {
                Some(model) if model.worker == Worker::TextGen && model.enabled => {
                    valid.push(name.to_string());
                }
                _ => {
                    warn!(model = name, "Dropping unknown model from configured waterfall");
                }
            }
        }
        if !valid.is_empty() {
            return Ok(valid);
        }
    }

    Ok(DEFAULT_CODE_WATERFALL
        .iter()
        .map(|&model| model.to_string())
        .collect())
}
