//! Provider-model chain construction.
//!
//! Given a worker, constraints, and optional preferences, the selector
//! produces the ordered list of `(provider, model)` pairs the router will
//! attempt. Constraints narrow the chain; preferences only reorder it.

use tracing::debug;

use crate::{
    error::AppError,
    models::{
        ModelRecord, ProviderKind, ProviderRecord, RequestConstraints, RoutePreferences, Worker,
    },
    registry::Registry,
};

/// One attemptable pair in the chain.
#[derive(Debug, Clone)]
pub struct ChainEntry {
    /// The provider to dispatch to.
    pub provider: ProviderRecord,
    /// The model to request.
    pub model: ModelRecord,
}

/// Builds provider-model chains from the registry.
#[derive(Clone, Debug)]
pub struct Selector {
    registry: Registry,
}

impl Selector {
    /// Creates a selector over the given registry.
    pub fn new(registry: Registry) -> Self {
        Self { registry }
    }

    /// Produces the ordered chain for one request.
    ///
    /// Providers arrive in worker-priority order and models in model-priority
    /// order within each provider; constraint filters preserve that order,
    /// and preference reordering is stable.
    pub async fn build_chain(
        &self,
        worker: Worker,
        constraints: &RequestConstraints,
        preferences: &RoutePreferences,
    ) -> Result<Vec<ChainEntry>, AppError> {
        let providers = self.registry.get_available_providers(worker).await?;
        if providers.is_empty() {
            return Err(AppError::NoAvailableProvider);
        }

        let mut chain = Vec::new();
        for provider in providers {
            if constraints
                .exclude_providers
                .iter()
                .any(|excluded| excluded == &provider.id)
            {
                debug!(provider = %provider.id, "Excluded by request constraints");
                continue;
            }
            if constraints.require_local && provider.kind != ProviderKind::Local {
                continue;
            }

            for model in self
                .registry
                .get_models_for_provider(&provider.id, worker)
                .await?
            {
                if !model.has_capabilities(&constraints.require_capabilities) {
                    continue;
                }
                if let Some(min_quality) = constraints.min_quality {
                    if model.quality_tier < min_quality {
                        continue;
                    }
                }
                chain.push(ChainEntry {
                    provider: provider.clone(),
                    model,
                });
            }
        }

        if chain.is_empty() {
            return Err(AppError::NoAvailableProvider);
        }

        Ok(apply_preferences(chain, preferences))
    }
}

/// Moves pairs matching the preferred provider, then the preferred model, to
/// the front. Both moves are stable, so relative order inside each partition
/// is preserved; an ineligible preference is a no-op.
fn apply_preferences(
    mut chain: Vec<ChainEntry>,
    preferences: &RoutePreferences,
) -> Vec<ChainEntry> {
    if let Some(provider_id) = &preferences.provider {
        if chain.iter().any(|entry| &entry.provider.id == provider_id) {
            chain.sort_by_key(|entry| &entry.provider.id != provider_id);
        }
    }
    if let Some(model_id) = &preferences.model {
        if chain.iter().any(|entry| &entry.model.id == model_id) {
            chain.sort_by_key(|entry| &entry.model.id != model_id);
        }
    }
    chain
}
