//! Queue-aware text-only tier classification for text-gen requests.
//!
//! Decides whether a text request can take the cheap text-only fast path or
//! needs the full code-capable chain. An explicit `routing_tier` always
//! wins; otherwise task-type tags, then prompt heuristics, then the default
//! of `code`. A congested code-execution queue demotes heuristic `code`
//! decisions to `text-only` (never explicit ones).

use std::sync::OnceLock;
use std::time::Duration;

use regex::Regex;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::{
    error::AppError,
    models::{MediaOptions, RoutingTier},
};

/// Task-type tags routed to the text-only tier.
const TEXT_ONLY_TASK_TAGS: &[&str] = &[
    "classify",
    "summarize",
    "summarise",
    "extract",
    "translate",
    "json",
    "sentiment",
    "label",
    "rewrite",
    "title",
];

/// Task-type tags routed to the code tier.
const CODE_TASK_TAGS: &[&str] = &[
    "code",
    "implement",
    "debug",
    "refactor",
    "bugfix",
    "script",
    "program",
];

/// The hardcoded fast-path waterfall of `(provider, model)` catalog ids the
/// text-only tier tries before falling through to the standard chain.
pub const TEXT_ONLY_WATERFALL: &[(&str, &str)] = &[
    ("openai", "openai-gpt4o-mini"),
    ("google", "google-gemini-flash"),
];

/// Queue-aware classifier for the text-gen worker.
#[derive(Clone, Debug)]
pub struct TierClassifier {
    http_client: Client,
    stats_url: Option<String>,
    depth_threshold: u64,
}

impl TierClassifier {
    /// Creates a classifier; without a stats URL the queue always reads as
    /// uncongested.
    pub fn new(stats_url: Option<String>, depth_threshold: u64) -> Result<Self, AppError> {
        let http_client = Client::builder()
            .user_agent(format!("genrelay/{}", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(5))
            .build()
            .map_err(|err| AppError::ConfigError(format!("Failed to build HTTP client: {err}")))?;
        Ok(Self {
            http_client,
            stats_url,
            depth_threshold,
        })
    }

    /// Classifies a request into its routing tier. Never returns `Auto`.
    pub async fn classify(&self, options: &MediaOptions, prompt: &str) -> RoutingTier {
        if options.routing_tier != RoutingTier::Auto {
            return options.routing_tier;
        }

        let decided = classify_static(options.task_type.as_deref(), prompt);

        if decided == RoutingTier::Code {
            if let Some(depth) = self.queue_depth().await {
                if depth >= self.depth_threshold {
                    info!(
                        depth,
                        threshold = self.depth_threshold,
                        "Code-execution queue congested; demoting request to text-only tier"
                    );
                    return RoutingTier::TextOnly;
                }
            }
        }

        decided
    }

    /// Total pending depth of the external code-execution queue. Fetch
    /// failures read as "not congested".
    pub async fn queue_depth(&self) -> Option<u64> {
        let base = self.stats_url.as_deref()?;
        let url = format!("{}/api/queue/stats", base.trim_end_matches('/'));

        let response = match self.http_client.get(&url).send().await {
            Ok(response) => response,
            Err(err) => {
                warn!(error = %err, "Queue stats unreachable; assuming not congested");
                return None;
            }
        };
        if !response.status().is_success() {
            warn!(status = %response.status(), "Queue stats returned an error; assuming not congested");
            return None;
        }

        let stats: QueueStats = match response.json().await {
            Ok(stats) => stats,
            Err(err) => {
                warn!(error = %err, "Queue stats unparsable; assuming not congested");
                return None;
            }
        };

        let depth = stats.pending_depth();
        debug!(depth, "Code-execution queue depth");
        Some(depth)
    }
}

/// Tier decision from task-type tags and prompt heuristics alone.
fn classify_static(task_type: Option<&str>, prompt: &str) -> RoutingTier {
    if let Some(task) = task_type {
        let task = task.to_lowercase();
        if TEXT_ONLY_TASK_TAGS.iter().any(|tag| task.contains(tag)) {
            return RoutingTier::TextOnly;
        }
        if CODE_TASK_TAGS.iter().any(|tag| task.contains(tag)) {
            return RoutingTier::Code;
        }
    }

    if code_pattern().is_match(prompt) {
        return RoutingTier::Code;
    }
    if text_only_pattern().is_match(prompt) {
        return RoutingTier::TextOnly;
    }

    RoutingTier::Code
}

fn code_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(
            r"(?is)(```|\bfn\s+\w+\s*\(|\bdef\s+\w+\s*\(|\bclass\s+\w+|\bfunction\s+\w+\s*\(|write (a |some |the )?(code|function|script|program)|fix (the |this )?(bug|test|build))",
        )
        .expect("static regex")
    })
}

fn text_only_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(
            r"(?is)\b(summarize|summarise|classify|categorize|extract|translate|rewrite|what is|explain briefly|list the)\b",
        )
        .expect("static regex")
    })
}

#[derive(Debug, Deserialize)]
struct QueueStats {
    #[serde(default)]
    by_executor: std::collections::HashMap<String, ExecutorStats>,
}

#[derive(Debug, Default, Deserialize)]
struct ExecutorStats {
    #[serde(default)]
    queued: u64,
    #[serde(default)]
    claimed: u64,
    #[serde(default)]
    dispatched: u64,
}

impl QueueStats {
    fn pending_depth(&self) -> u64 {
        self.by_executor
            .get("claude-code")
            .map_or(0, |stats| stats.queued + stats.claimed + stats.dispatched)
    }
}
