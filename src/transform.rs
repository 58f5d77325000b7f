//! Per-provider prompt rewriting and system-prompt injection.
//!
//! Rewrites are idempotent: running a transformer over its own output is a
//! no-op, and a transformer with nothing to add returns the input unchanged.
//! System prompts produced here are only applied when the caller did not
//! supply one.

use std::sync::OnceLock;

use regex::Regex;

use crate::models::Worker;

/// A rewritten prompt plus the system prompt the transformer proposes.
#[derive(Debug, Clone)]
pub struct TransformedPrompt {
    /// The rewritten prompt.
    pub prompt: String,
    /// System prompt to inject when the caller supplied none.
    pub system_prompt: Option<String>,
}

const REASONING_INSTRUCTION: &str =
    "Think through the problem step by step before giving your final answer.";

const IMAGE_BOOSTERS: [&str; 2] = ["high quality, detailed", "professional lighting"];

/// Rewrites a prompt for a specific provider and worker.
pub fn transform_prompt(
    provider_id: &str,
    worker: Worker,
    task_type: Option<&str>,
    capabilities_needed: &[String],
    prompt: &str,
) -> TransformedPrompt {
    match (worker, provider_id) {
        (Worker::TextGen, "anthropic") => transform_reasoning(capabilities_needed, prompt),
        (Worker::TextGen, _) => TransformedPrompt {
            prompt: prompt.to_string(),
            system_prompt: default_text_system_prompt(task_type),
        },
        (Worker::ImageGen, _) => transform_image(prompt),
        (Worker::AudioGen, _) => transform_speech(prompt),
        _ => TransformedPrompt {
            prompt: prompt.to_string(),
            system_prompt: None,
        },
    }
}

/// Reasoning-style providers get a `<task>` scaffold plus an explicit
/// chain-of-thought instruction when reasoning is requested.
fn transform_reasoning(capabilities_needed: &[String], prompt: &str) -> TransformedPrompt {
    let wants_reasoning = capabilities_needed
        .iter()
        .any(|tag| tag == "reasoning" || tag == "analysis");

    if !wants_reasoning || prompt.trim_start().starts_with("<task>") {
        return TransformedPrompt {
            prompt: prompt.to_string(),
            system_prompt: None,
        };
    }

    TransformedPrompt {
        prompt: format!("<task>\n{prompt}\n</task>\n\n{REASONING_INSTRUCTION}"),
        system_prompt: Some(
            "You are a careful analyst. Work through tasks methodically.".to_string(),
        ),
    }
}

fn default_text_system_prompt(task_type: Option<&str>) -> Option<String> {
    match task_type {
        Some("json") | Some("extract") => Some(
            "Respond with valid JSON only, no surrounding prose.".to_string(),
        ),
        _ => None,
    }
}

/// Image prompts get quality boosters appended, each only if not already
/// present.
fn transform_image(prompt: &str) -> TransformedPrompt {
    let lowered = prompt.to_lowercase();
    let mut rewritten = prompt.trim_end().trim_end_matches(',').to_string();
    for booster in IMAGE_BOOSTERS {
        if !lowered.contains(booster) {
            rewritten.push_str(", ");
            rewritten.push_str(booster);
        }
    }
    TransformedPrompt {
        prompt: rewritten,
        system_prompt: None,
    }
}

/// Speech prompts are read aloud verbatim, so markdown structure has to go:
/// fenced code blocks, inline code, link syntax, emphasis markers, heading
/// markers, and runs of 3+ newlines.
fn transform_speech(prompt: &str) -> TransformedPrompt {
    static FENCED_CODE: OnceLock<Regex> = OnceLock::new();
    static INLINE_CODE: OnceLock<Regex> = OnceLock::new();
    static LINKS: OnceLock<Regex> = OnceLock::new();
    static EMPHASIS: OnceLock<Regex> = OnceLock::new();
    static HEADINGS: OnceLock<Regex> = OnceLock::new();
    static NEWLINE_RUNS: OnceLock<Regex> = OnceLock::new();

    let fenced = FENCED_CODE.get_or_init(|| Regex::new(r"(?s)```.*?```").expect("static regex"));
    let inline = INLINE_CODE.get_or_init(|| Regex::new(r"`([^`]*)`").expect("static regex"));
    let links = LINKS.get_or_init(|| Regex::new(r"\[([^\]]+)\]\([^)]*\)").expect("static regex"));
    let emphasis =
        EMPHASIS.get_or_init(|| Regex::new(r"(\*\*|__|\*|_)([^*_]+)(\*\*|__|\*|_)").expect("static regex"));
    let headings = HEADINGS.get_or_init(|| Regex::new(r"(?m)^#{1,6}\s+").expect("static regex"));
    let newline_runs =
        NEWLINE_RUNS.get_or_init(|| Regex::new(r"\n{3,}").expect("static regex"));

    let stripped = fenced.replace_all(prompt, "");
    let stripped = inline.replace_all(&stripped, "$1");
    let stripped = links.replace_all(&stripped, "$1");
    let stripped = emphasis.replace_all(&stripped, "$2");
    let stripped = headings.replace_all(&stripped, "");
    let stripped = newline_runs.replace_all(&stripped, "\n\n");

    TransformedPrompt {
        prompt: stripped.trim().to_string(),
        system_prompt: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reasoning_wrap_applies_once() {
        let needed = vec!["reasoning".to_string()];
        let first = transform_prompt("anthropic", Worker::TextGen, None, &needed, "Why is the sky blue?");
        assert!(first.prompt.starts_with("<task>"));
        assert!(first.prompt.contains(REASONING_INSTRUCTION));
        assert!(first.system_prompt.is_some());

        let second =
            transform_prompt("anthropic", Worker::TextGen, None, &needed, &first.prompt);
        assert_eq!(second.prompt, first.prompt);
    }

    #[test]
    fn no_reasoning_request_leaves_prompt_alone() {
        let result = transform_prompt("anthropic", Worker::TextGen, None, &[], "Hello");
        assert_eq!(result.prompt, "Hello");
        assert!(result.system_prompt.is_none());
    }

    #[test]
    fn image_boosters_append_only_when_missing() {
        let first = transform_prompt("ideogram", Worker::ImageGen, None, &[], "a red fox");
        assert!(first.prompt.contains("high quality, detailed"));
        assert!(first.prompt.contains("professional lighting"));

        let second = transform_prompt("ideogram", Worker::ImageGen, None, &[], &first.prompt);
        assert_eq!(second.prompt, first.prompt);
    }

    #[test]
    fn speech_strips_markdown() {
        let prompt = "# Greeting\n\nSay **hello** to [the user](https://example.com).\n\n\n\n```rust\nfn main() {}\n```\nUse `ls -la` first.";
        let result = transform_prompt("elevenlabs", Worker::AudioGen, None, &[], prompt);
        assert!(!result.prompt.contains("```"));
        assert!(!result.prompt.contains("**"));
        assert!(!result.prompt.contains('#'));
        assert!(!result.prompt.contains("https://example.com"));
        assert!(result.prompt.contains("hello"));
        assert!(result.prompt.contains("the user"));
        assert!(!result.prompt.contains("\n\n\n"));
    }

    #[test]
    fn json_task_type_proposes_system_prompt() {
        let result = transform_prompt("openai", Worker::TextGen, Some("json"), &[], "Extract fields");
        assert!(result.system_prompt.is_some());
        assert_eq!(result.prompt, "Extract fields");
    }
}
