//! Configuration management for the application.
//!
//! Exposes strongly typed structures backed by the `config` crate so the
//! service can load settings from user configuration directories or project
//! overrides alongside environment variables. Provider credentials are not
//! part of the layered configuration: they are injected as plain environment
//! variables and resolved through [`Credentials`] by secret name.

use config::{Config, ConfigError, Environment, File};
use dirs::{config_dir, data_dir, home_dir};
use serde::Deserialize;
use std::{
    collections::HashMap,
    env, fs,
    path::{Path, PathBuf},
};

/// The main application configuration structure.
#[derive(Debug, Deserialize)]
pub struct AppConfig {
    /// Server configuration (host, port).
    pub server: ServerConfig,
    /// Database configuration.
    pub database: DatabaseConfig,
    /// Routing engine tunables.
    #[serde(default)]
    pub routing: RoutingConfig,
    /// AI-gateway (BYOK) configuration.
    #[serde(default)]
    pub gateway: GatewayConfig,
    /// Code-execution queue signal configuration.
    #[serde(default)]
    pub queue: QueueConfig,
    /// Callback / entry-surface shared secrets.
    #[serde(default)]
    pub callback: CallbackConfig,
}

/// Server-specific configuration.
#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    /// The host address to bind the server to.
    pub host: String,
    /// The port to listen on.
    pub port: u16,
}

/// Database-specific configuration.
#[derive(Debug, Deserialize)]
pub struct DatabaseConfig {
    /// The database connection URL.
    pub url: String,
}

/// Tunables for the selection chain, health cooldowns, and polling.
#[derive(Debug, Clone, Deserialize)]
pub struct RoutingConfig {
    /// How long a quota-exhausted provider is skipped.
    #[serde(default = "default_quota_cooldown_minutes")]
    pub quota_cooldown_minutes: i64,
    /// Consecutive failures before a provider is flagged unhealthy.
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: i64,
    /// Seconds between sub-workflow status polls.
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    /// Poll attempts before the orchestrator gives up.
    #[serde(default = "default_poll_max_attempts")]
    pub poll_max_attempts: u32,
    /// Queue depth at which code requests are demoted to the text-only tier.
    #[serde(default = "default_queue_depth_threshold")]
    pub queue_depth_threshold: u64,
    /// Comma-separated default model waterfall for code execution.
    #[serde(default)]
    pub default_waterfall: Option<String>,
    /// Catalog model pinned for shipping research.
    #[serde(default = "default_shipping_model")]
    pub shipping_model: String,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            quota_cooldown_minutes: default_quota_cooldown_minutes(),
            failure_threshold: default_failure_threshold(),
            poll_interval_secs: default_poll_interval_secs(),
            poll_max_attempts: default_poll_max_attempts(),
            queue_depth_threshold: default_queue_depth_threshold(),
            default_waterfall: None,
            shipping_model: default_shipping_model(),
        }
    }
}

/// AI-gateway BYOK settings. When a token is present, applicable providers
/// route through the gateway instead of their native endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct GatewayConfig {
    /// Gateway bearer token; absence disables gateway routing.
    #[serde(default)]
    pub token: Option<String>,
    /// Gateway account/slug used to build the rewritten base URL.
    #[serde(default)]
    pub account: Option<String>,
    /// Providers that always take the direct path. Closed, configured list.
    #[serde(default = "default_gateway_excluded")]
    pub excluded_providers: Vec<String>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            token: None,
            account: None,
            excluded_providers: default_gateway_excluded(),
        }
    }
}

/// External code-execution queue signal.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct QueueConfig {
    /// Base URL of the queue service; absence means "never congested".
    #[serde(default)]
    pub stats_url: Option<String>,
}

/// Shared secrets for the entry surface and outbound callbacks.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CallbackConfig {
    /// Value expected in / sent as the `X-Passphrase` header.
    #[serde(default)]
    pub passphrase: Option<String>,
}

fn default_quota_cooldown_minutes() -> i64 {
    60
}

fn default_failure_threshold() -> i64 {
    5
}

fn default_poll_interval_secs() -> u64 {
    5
}

fn default_poll_max_attempts() -> u32 {
    60
}

fn default_queue_depth_threshold() -> u64 {
    10
}

fn default_shipping_model() -> String {
    "anthropic-sonnet".to_string()
}

fn default_gateway_excluded() -> Vec<String> {
    vec!["zai".to_string()]
}

impl AppConfig {
    /// Loads the application configuration.
    ///
    /// Searches the user's configuration directories first, then project-local
    /// overrides, and finally allows environment variables prefixed with
    /// `APP__` to override nested values.
    pub fn load() -> Result<Self, ConfigError> {
        let _dotenv_path = dotenvy::dotenv();

        let mut builder = Config::builder()
            .set_default("server.host", "127.0.0.1")?
            .set_default("server.port", 8080)?
            .set_default("database.url", default_database_url())?;

        for path in candidate_config_files() {
            builder = builder.add_source(File::from(path));
        }

        let settings = builder
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let mut config: AppConfig = settings.try_deserialize()?;
        if config.database.url.trim().is_empty() {
            config.database.url = default_database_url();
        }

        config.database.url = normalize_database_url(&config.database.url)?;

        // Gateway token and queue threshold also arrive as bare env vars.
        if config.gateway.token.is_none() {
            config.gateway.token = non_empty_env("AI_GATEWAY_TOKEN");
        }
        if let Some(threshold) = non_empty_env("QUEUE_DEPTH_THRESHOLD") {
            if let Ok(value) = threshold.parse() {
                config.routing.queue_depth_threshold = value;
            }
        }

        Ok(config)
    }
}

/// Credential identifiers recognized by the catalog's `auth_secret_name`.
pub const KNOWN_CREDENTIALS: &[&str] = &[
    "ANTHROPIC_API_KEY",
    "OPENAI_API_KEY",
    "GOOGLE_API_KEY",
    "IDEOGRAM_API_KEY",
    "ELEVENLABS_API_KEY",
    "REPLICATE_API_TOKEN",
    "ZAI_API_KEY",
    "LOCAL_INFERENCE_URL",
    "RUNNER_BASE_URL",
    "AI_GATEWAY_TOKEN",
    "CF_ACCESS_CLIENT_ID",
    "CF_ACCESS_CLIENT_SECRET",
];

/// Credentials injected at start, looked up by secret name.
#[derive(Clone, Default)]
pub struct Credentials {
    values: HashMap<String, String>,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never print values.
        let mut names: Vec<_> = self.values.keys().collect();
        names.sort();
        f.debug_struct("Credentials").field("names", &names).finish()
    }
}

impl Credentials {
    /// Captures all recognized credential variables from the environment.
    pub fn from_env() -> Self {
        let mut values = HashMap::new();
        for name in KNOWN_CREDENTIALS {
            if let Some(value) = non_empty_env(name) {
                drop(values.insert((*name).to_string(), value));
            }
        }
        Self { values }
    }

    /// Builds a credential set from explicit values (tests, embedding).
    pub fn from_map(values: HashMap<String, String>) -> Self {
        Self { values }
    }

    /// Resolves a secret by name.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }

    /// True if the secret is present and non-empty.
    pub fn has(&self, name: &str) -> bool {
        self.get(name).is_some()
    }
}

fn non_empty_env(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn candidate_config_files() -> Vec<PathBuf> {
    let mut paths = Vec::new();

    if let Some(dir) = config_dir() {
        let path = dir.join("genrelay").join("config.toml");
        if path.exists() {
            paths.push(path);
        }
    }

    if let Some(home) = home_dir() {
        let legacy = home.join(".genrelay").join("config.toml");
        if legacy.exists() {
            paths.push(legacy);
        }
    }

    let project_override = Path::new("genrelay.toml");
    if project_override.exists() {
        paths.push(project_override.to_path_buf());
    }

    let secrets_path = Path::new(".secrets/app.toml");
    if secrets_path.exists() {
        paths.push(secrets_path.to_path_buf());
    }

    paths
}

fn default_database_url() -> String {
    format!("sqlite://{}", default_database_path().display())
}

fn normalize_database_url(url: &str) -> Result<String, ConfigError> {
    if !url.starts_with("sqlite:") {
        return Ok(url.to_string());
    }

    let remainder = &url["sqlite:".len()..];
    if remainder == ":memory:" || remainder.starts_with("memory") {
        return Ok(url.to_string());
    }

    let default_dir = default_data_dir();
    let mut path = if remainder.is_empty() {
        default_database_path()
    } else if remainder.starts_with("///") {
        PathBuf::from(&remainder[3..])
    } else if remainder.starts_with("//") {
        PathBuf::from(&remainder[2..])
    } else {
        PathBuf::from(remainder)
    };

    if !path.is_absolute() {
        path = default_dir.join(path);
    }

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|err| {
            ConfigError::Message(format!(
                "Failed to create database directory {}: {err}",
                parent.display()
            ))
        })?;
    }

    Ok(format!("sqlite://{}", path.display()))
}

fn default_database_path() -> PathBuf {
    default_data_dir().join("app.db")
}

fn default_data_dir() -> PathBuf {
    data_dir()
        .or_else(home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
        .join("genrelay")
}
