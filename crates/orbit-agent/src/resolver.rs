//! Model discovery: pick a usable generation endpoint for a credential.
//!
//! Resolution degrades through increasingly permissive rules and never fails:
//!
//! 1. the stable lightweight tier (e.g. `gemini-1.5-flash-002`), excluding
//!    `-latest` and experimental variants
//! 2. any lightweight-family endpoint outside the excluded major version
//! 3. the first generation-capable endpoint in discovery order
//! 4. the configured default id, when discovery fails or finds nothing

use tracing::{info, warn};

use orbit_core::config::DEFAULT_MODEL;

use crate::provider::{GenerationBackend, ModelDescriptor};

/// Name matching rules for [`ModelResolver`].
#[derive(Debug, Clone)]
pub struct ResolverPolicy {
    /// Substring identifying the preferred stable tier.
    pub preferred_tier: String,
    /// Substring identifying the lightweight family used by the second rule.
    pub family: String,
    /// Newer major-version family skipped by the second rule.
    pub excluded_family: String,
    /// Marker of rolling aliases, skipped by the first rule.
    pub latest_marker: String,
    /// Marker of experimental variants, skipped by the first two rules.
    pub experimental_marker: String,
    pub default_model: String,
}

impl Default for ResolverPolicy {
    fn default() -> Self {
        Self {
            preferred_tier: "gemini-1.5-flash".to_string(),
            family: "flash".to_string(),
            excluded_family: "gemini-2".to_string(),
            latest_marker: "latest".to_string(),
            experimental_marker: "exp".to_string(),
            default_model: DEFAULT_MODEL.to_string(),
        }
    }
}

impl ResolverPolicy {
    pub fn with_default_model(mut self, model: impl Into<String>) -> Self {
        self.default_model = model.into();
        self
    }
}

/// An endpoint id together with the pool slot it was resolved for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedModel {
    pub id: String,
    pub credential_index: usize,
}

#[derive(Debug, Clone, Default)]
pub struct ModelResolver {
    policy: ResolverPolicy,
}

impl ModelResolver {
    pub fn new(policy: ResolverPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &ResolverPolicy {
        &self.policy
    }

    /// Discover models for `credential` and pick one. Falls back to the default id.
    pub async fn resolve(&self, backend: &dyn GenerationBackend, credential: &str) -> String {
        match backend.list_models(credential).await {
            Ok(models) => match self.pick(&models) {
                Some(id) => {
                    info!(model = %id, backend = backend.name(), "model resolved");
                    id
                }
                None => {
                    warn!(
                        default = %self.policy.default_model,
                        "no generation-capable model discovered, using default"
                    );
                    self.policy.default_model.clone()
                }
            },
            Err(e) => {
                warn!(
                    error = %e,
                    default = %self.policy.default_model,
                    "model discovery failed, using default"
                );
                self.policy.default_model.clone()
            }
        }
    }

    /// Apply the priority rules to a discovered model list.
    pub fn pick(&self, models: &[ModelDescriptor]) -> Option<String> {
        let p = &self.policy;
        let candidates: Vec<&str> = models
            .iter()
            .filter(|m| m.supports_generation)
            .map(|m| m.name.as_str())
            .collect();

        let stable_tier = candidates.iter().find(|name| {
            name.contains(&p.preferred_tier)
                && !name.contains(&p.latest_marker)
                && !name.contains(&p.experimental_marker)
        });
        let family = || {
            candidates.iter().find(|name| {
                name.contains(&p.family)
                    && !name.contains(&p.excluded_family)
                    && !name.contains(&p.experimental_marker)
            })
        };

        stable_tier
            .or_else(family)
            .or_else(|| candidates.first())
            .map(|name| strip_models_prefix(name).to_string())
    }
}

fn strip_models_prefix(name: &str) -> &str {
    name.strip_prefix("models/").unwrap_or(name)
}
