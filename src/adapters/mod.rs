//! Provider adapter abstraction.
//!
//! Each adapter translates the internal dispatch request into its provider's
//! native API: request construction, auth header placement, response
//! extraction, and a health probe. Adapters are stateless singletons keyed
//! by provider id; per-call state (endpoint, credential, model) arrives in
//! the [`DispatchRequest`].

use std::{collections::HashMap, fmt, sync::Arc, time::Duration};

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use tokio::sync::mpsc;

use crate::{
    error::AppError,
    models::{MediaOptions, MediaPayload, MediaResult, StreamDelta, Worker},
};

/// Credential resolved for one dispatch.
#[derive(Debug, Clone)]
pub enum DispatchAuth {
    /// Provider-native credential placed in the adapter's native header.
    Key(String),
    /// Gateway BYOK token; replaces the native auth header.
    Gateway(String),
    /// No credential (local endpoints).
    None,
}

/// Where the provider expects its native credential.
#[derive(Debug, Clone, Copy)]
pub enum NativeAuth {
    /// `Authorization: Bearer <key>`.
    Bearer,
    /// A named header, e.g. `x-api-key`.
    Header(&'static str),
}

/// Header carrying the gateway BYOK token.
pub const GATEWAY_AUTH_HEADER: &str = "cf-aig-authorization";

/// Places the resolved credential on an outbound request. Gateway tokens
/// always replace the native header; the provider's path and body are
/// untouched.
pub fn with_auth(
    builder: RequestBuilder,
    auth: &DispatchAuth,
    native: NativeAuth,
) -> RequestBuilder {
    match auth {
        DispatchAuth::Key(key) => match native {
            NativeAuth::Bearer => builder.bearer_auth(key),
            NativeAuth::Header(name) => builder.header(name, key),
        },
        DispatchAuth::Gateway(token) => {
            builder.header(GATEWAY_AUTH_HEADER, format!("Bearer {token}"))
        }
        DispatchAuth::None => builder,
    }
}

/// The gateway-rewritten base URL for a provider slug.
pub fn gateway_base_url(account: &str, provider_slug: &str) -> String {
    format!("https://gateway.ai.cloudflare.com/v1/{account}/genrelay/{provider_slug}")
}

/// One fully resolved adapter invocation.
#[derive(Debug, Clone)]
pub struct DispatchRequest {
    /// Provider being dispatched to.
    pub provider_id: String,
    /// Catalog model id, for result provenance.
    pub model: String,
    /// Provider-native model name sent on the wire.
    pub native_model: String,
    /// Target worker.
    pub worker: Worker,
    /// Prompt after transformer rewriting.
    pub prompt: String,
    /// System prompt, when one applies.
    pub system_prompt: Option<String>,
    /// Worker-tagged options.
    pub options: MediaOptions,
    /// Resolved base URL (native or gateway-rewritten).
    pub base_url: String,
    /// Resolved credential.
    pub auth: DispatchAuth,
    /// Per-call deadline.
    pub timeout: Duration,
    /// Correlation id.
    pub request_id: String,
}

impl DispatchRequest {
    /// Result provenance shorthand.
    pub fn result(&self, payload: MediaPayload) -> MediaResult {
        MediaResult {
            provider: self.provider_id.clone(),
            model: self.model.clone(),
            payload,
        }
    }
}

/// A provider-specific translator between internal calls and the provider's
/// wire format.
#[async_trait]
pub trait MediaAdapter: Send + Sync {
    /// Provider this adapter serves.
    fn provider_id(&self) -> &str;

    /// Workers this adapter can dispatch.
    fn supported_workers(&self) -> &[Worker];

    /// Executes one generation call.
    async fn execute(&self, request: &DispatchRequest) -> Result<MediaResult, AppError>;

    /// Cheap liveness probe against the provider.
    async fn check_health(&self, request: &DispatchRequest) -> Result<(), AppError>;

    /// Streams deltas in the uniform schema, ending with a `done` sentinel.
    ///
    /// The default implementation degrades to a blocking call followed by a
    /// single delta; text adapters override it with native event framing.
    async fn execute_stream(
        &self,
        request: &DispatchRequest,
        tx: mpsc::Sender<StreamDelta>,
    ) -> Result<MediaResult, AppError> {
        let result = self.execute(request).await?;
        if let Some(text) = result.payload.as_text() {
            let _unused = tx
                .send(StreamDelta {
                    text: text.to_string(),
                    done: false,
                    request_id: request.request_id.clone(),
                })
                .await;
        }
        let _unused = tx
            .send(StreamDelta {
                text: String::new(),
                done: true,
                request_id: request.request_id.clone(),
            })
            .await;
        Ok(result)
    }
}

/// Registry of adapters keyed by provider id.
#[derive(Clone)]
pub struct AdapterSet {
    adapters: HashMap<String, Arc<dyn MediaAdapter>>,
}

impl fmt::Debug for AdapterSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut ids: Vec<_> = self.adapters.keys().collect();
        ids.sort();
        f.debug_struct("AdapterSet").field("providers", &ids).finish()
    }
}

impl AdapterSet {
    /// An empty set (tests build their own).
    pub fn empty() -> Self {
        Self {
            adapters: HashMap::new(),
        }
    }

    /// The full built-in adapter roster.
    pub fn defaults() -> Result<Self, AppError> {
        let mut set = Self::empty();
        set.register(Arc::new(anthropic::AnthropicAdapter::new()?));
        set.register(Arc::new(openai::OpenAiCompatAdapter::openai()?));
        set.register(Arc::new(openai::OpenAiCompatAdapter::local_vllm()?));
        set.register(Arc::new(google::GoogleAdapter::new()?));
        set.register(Arc::new(zai::ZaiAdapter::new()?));
        set.register(Arc::new(ideogram::IdeogramAdapter::new()?));
        set.register(Arc::new(elevenlabs::ElevenLabsAdapter::new()?));
        set.register(Arc::new(replicate::ReplicateAdapter::new()?));
        Ok(set)
    }

    /// Registers (or replaces) an adapter under its provider id.
    pub fn register(&mut self, adapter: Arc<dyn MediaAdapter>) {
        drop(
            self.adapters
                .insert(adapter.provider_id().to_string(), adapter),
        );
    }

    /// Looks up the adapter for a provider.
    pub fn get(&self, provider_id: &str) -> Option<Arc<dyn MediaAdapter>> {
        self.adapters.get(provider_id).cloned()
    }
}

/// Builds the shared reqwest client adapters use.
pub(crate) fn http_client() -> Result<Client, AppError> {
    Client::builder()
        .user_agent(format!("genrelay/{}", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|err| AppError::ConfigError(format!("Failed to build HTTP client: {err}")))
}

/// Formats a non-2xx provider response into the error string the taxonomy
/// matches against.
pub(crate) async fn surface_http_error(
    provider: &str,
    response: reqwest::Response,
) -> AppError {
    let status = response.status();
    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "<failed to read error body>".into());
    AppError::ApiError(format!(
        "{provider} request failed with status {status}: {body}"
    ))
}

pub mod anthropic;
pub mod elevenlabs;
pub mod google;
pub mod ideogram;
pub mod openai;
pub mod replicate;
pub mod zai;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gateway_url_embeds_account_and_slug() {
        assert_eq!(
            gateway_base_url("acme", "anthropic"),
            "https://gateway.ai.cloudflare.com/v1/acme/genrelay/anthropic"
        );
    }

    #[test]
    fn default_set_covers_all_seeded_providers() {
        let set = AdapterSet::defaults().expect("adapter set");
        for provider in [
            "anthropic",
            "openai",
            "local-vllm",
            "google",
            "zai",
            "ideogram",
            "elevenlabs",
            "replicate",
        ] {
            assert!(set.get(provider).is_some(), "missing adapter: {provider}");
        }
    }
}
