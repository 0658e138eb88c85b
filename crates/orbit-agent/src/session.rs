//! Retrying generation over a rotating credential pool.

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use orbit_core::config::GeminiConfig;

use crate::credentials::CredentialPool;
use crate::provider::{classify, FailureClass, GenerationBackend, ProviderError};
use crate::resolver::{ModelResolver, ResolvedModel};

const MAX_RETRY_AFTER: Duration = Duration::from_secs(60);

/// Attempt budget and pauses for [`GeneratorSession::generate`].
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Attempts available to not-found, transient and unrotatable failures.
    pub max_attempts: u32,
    /// After re-resolving the model for the same credential.
    pub reresolve_pause: Duration,
    /// After rotating to the next credential.
    pub rotate_pause: Duration,
    /// After a quota/auth failure that could not rotate.
    pub exhausted_pause: Duration,
    /// After a transient failure.
    pub transient_pause: Duration,
    /// Ceiling on a server `retry-after` hint that replaces `exhausted_pause`.
    pub max_retry_after: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&GeminiConfig::default())
    }
}

impl RetryPolicy {
    pub fn from_config(cfg: &GeminiConfig) -> Self {
        Self {
            max_attempts: cfg.max_attempts.max(1),
            reresolve_pause: Duration::from_millis(cfg.reresolve_pause_ms),
            rotate_pause: Duration::from_millis(cfg.rotate_pause_ms),
            exhausted_pause: Duration::from_millis(cfg.exhausted_pause_ms),
            transient_pause: Duration::from_millis(cfg.transient_pause_ms),
            max_retry_after: MAX_RETRY_AFTER,
        }
    }

    /// Same budget, no pauses.
    pub fn without_pauses(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            reresolve_pause: Duration::ZERO,
            rotate_pause: Duration::ZERO,
            exhausted_pause: Duration::ZERO,
            transient_pause: Duration::ZERO,
            max_retry_after: Duration::ZERO,
        }
    }

    /// Pause before retrying a key that could not rotate. A rate limit's
    /// `retry-after` hint wins over `exhausted_pause`, capped at `max_retry_after`.
    pub fn exhausted_pause_for(&self, err: &ProviderError) -> Duration {
        match err {
            ProviderError::RateLimited { retry_after_ms } => {
                Duration::from_millis(*retry_after_ms).min(self.max_retry_after)
            }
            _ => self.exhausted_pause,
        }
    }
}

/// Per-run generation state: credential cursor plus the resolved model.
///
/// Owned by the run and borrowed mutably for each call, so generation is
/// strictly sequential and rotation never races.
pub struct GeneratorSession {
    backend: Arc<dyn GenerationBackend>,
    pool: CredentialPool,
    resolver: ModelResolver,
    retry: RetryPolicy,
    model: Option<ResolvedModel>,
}

impl GeneratorSession {
    pub fn new(
        backend: Arc<dyn GenerationBackend>,
        pool: CredentialPool,
        resolver: ModelResolver,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            backend,
            pool,
            resolver,
            retry,
            model: None,
        }
    }

    pub fn pool(&self) -> &CredentialPool {
        &self.pool
    }

    /// The model cached for the current credential, if one was resolved.
    pub fn resolved_model(&self) -> Option<&ResolvedModel> {
        self.model.as_ref()
    }

    /// Generate text for `prompt`, absorbing every failure.
    ///
    /// Not-found, transient and unrotatable quota/auth failures share
    /// `max_attempts`. Successful rotations draw from a separate budget of one
    /// per pooled credential, so the call makes at most
    /// `max_attempts + pool.len()` requests. `None` means "skip this content".
    pub async fn generate(&mut self, prompt: &str) -> Option<String> {
        let mut attempts_left = self.retry.max_attempts;
        let mut rotations_left = self.pool.len();

        loop {
            let model = self.ensure_model().await;
            let slot = self.pool.active_slot();

            let err = match self
                .backend
                .generate(self.pool.active_credential(), &model, prompt)
                .await
            {
                Ok(text) => return Some(text),
                Err(e) => e,
            };

            let class = classify(&err);
            warn!(
                backend = self.backend.name(),
                %model,
                slot,
                ?class,
                error = %err,
                "generation failed"
            );

            let pause = match class {
                FailureClass::QuotaOrAuth if rotations_left > 0 && self.pool.rotate() => {
                    rotations_left -= 1;
                    self.model = None;
                    self.ensure_model().await;
                    self.retry.rotate_pause
                }
                FailureClass::QuotaOrAuth => {
                    if !consume(&mut attempts_left) {
                        break;
                    }
                    info!(slot, "no backup credential left, retrying the same key");
                    self.retry.exhausted_pause_for(&err)
                }
                FailureClass::NotFound => {
                    if !consume(&mut attempts_left) {
                        break;
                    }
                    self.model = None;
                    self.ensure_model().await;
                    self.retry.reresolve_pause
                }
                FailureClass::Other => {
                    if !consume(&mut attempts_left) {
                        break;
                    }
                    self.retry.transient_pause
                }
            };

            if !pause.is_zero() {
                tokio::time::sleep(pause).await;
            }
        }

        warn!(backend = self.backend.name(), "generation attempts exhausted, skipping");
        None
    }

    /// Return the cached model for the active credential, resolving it if needed.
    async fn ensure_model(&mut self) -> String {
        let index = self.pool.active_index();
        if let Some(model) = self.model.as_ref().filter(|m| m.credential_index == index) {
            return model.id.clone();
        }
        let id = self
            .resolver
            .resolve(self.backend.as_ref(), self.pool.active_credential())
            .await;
        self.model = Some(ResolvedModel {
            id: id.clone(),
            credential_index: index,
        });
        id
    }
}

/// Spend one attempt; `false` when the failed call was the last one allowed.
fn consume(attempts_left: &mut u32) -> bool {
    *attempts_left = attempts_left.saturating_sub(1);
    *attempts_left > 0
}
