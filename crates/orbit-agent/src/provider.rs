use async_trait::async_trait;
use serde::Serialize;

/// A generation endpoint as reported by model discovery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModelDescriptor {
    /// Endpoint name, possibly carrying a `models/` prefix.
    pub name: String,
    /// Whether the endpoint accepts content-generation requests.
    pub supports_generation: bool,
}

impl ModelDescriptor {
    pub fn new(name: impl Into<String>, supports_generation: bool) -> Self {
        Self {
            name: name.into(),
            supports_generation,
        }
    }
}

/// Common interface for text-generation backends.
///
/// Backends are stateless with respect to credentials: the caller passes the
/// credential on every call so rotation stays in one place.
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    /// Backend name for logging.
    fn name(&self) -> &str;

    /// Discover the endpoints visible to `credential`, in backend order.
    async fn list_models(&self, credential: &str) -> Result<Vec<ModelDescriptor>, ProviderError>;

    /// Run a single prompt against `model` and return the generated text.
    async fn generate(
        &self,
        credential: &str,
        model: &str,
        prompt: &str,
    ) -> Result<String, ProviderError>;
}

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Rate limited, retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },

    #[error("Empty response: {0}")]
    Empty(String),

    #[error("no usable credentials configured")]
    NoCredentials,
}

/// How the retry loop reacts to a failed generation call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// The resolved model is gone; re-resolve against the same credential.
    NotFound,
    /// Rate-limited or credential rejected; rotate to the next credential.
    QuotaOrAuth,
    /// Anything else; treated as transient.
    Other,
}

/// Map a backend error to its retry class.
///
/// | Error                                          | Class        |
/// |------------------------------------------------|--------------|
/// | `Api { status: 404 }`                          | NotFound     |
/// | `RateLimited`                                  | QuotaOrAuth  |
/// | `Api { status: 401 \| 403 \| 429 }`            | QuotaOrAuth  |
/// | `Api` body naming an invalid key or quota      | QuotaOrAuth  |
/// | `NoCredentials`                                | QuotaOrAuth  |
/// | `Http`, `Parse`, `Empty`, other `Api` statuses | Other        |
///
/// Gemini reports a revoked key as a 400 `API_KEY_INVALID`, which is why the
/// body is inspected at all.
pub fn classify(err: &ProviderError) -> FailureClass {
    match err {
        ProviderError::Api { status: 404, .. } => FailureClass::NotFound,
        ProviderError::Api {
            status: 401 | 403 | 429,
            ..
        } => FailureClass::QuotaOrAuth,
        ProviderError::Api { message, .. } if mentions_quota_or_key(message) => {
            FailureClass::QuotaOrAuth
        }
        ProviderError::RateLimited { .. } | ProviderError::NoCredentials => {
            FailureClass::QuotaOrAuth
        }
        ProviderError::Api { .. }
        | ProviderError::Http(_)
        | ProviderError::Parse(_)
        | ProviderError::Empty(_) => FailureClass::Other,
    }
}

fn mentions_quota_or_key(message: &str) -> bool {
    let lower = message.to_ascii_lowercase();
    lower.contains("api key")
        || lower.contains("api_key_invalid")
        || lower.contains("resource_exhausted")
        || lower.contains("quota")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn api(status: u16, message: &str) -> ProviderError {
        ProviderError::Api {
            status,
            message: message.to_string(),
        }
    }

    #[test]
    fn not_found_is_reresolvable() {
        assert_eq!(classify(&api(404, "models/x is not found")), FailureClass::NotFound);
    }

    #[test]
    fn auth_and_quota_statuses_rotate() {
        for status in [401, 403, 429] {
            assert_eq!(classify(&api(status, "")), FailureClass::QuotaOrAuth, "{status}");
        }
        assert_eq!(
            classify(&ProviderError::RateLimited { retry_after_ms: 5000 }),
            FailureClass::QuotaOrAuth
        );
    }

    #[test]
    fn invalid_key_body_rotates() {
        let err = api(400, r#"{"error":{"status":"INVALID_ARGUMENT","reason":"API_KEY_INVALID"}}"#);
        assert_eq!(classify(&err), FailureClass::QuotaOrAuth);
        let err = api(400, "API key expired. Please renew the API key.");
        assert_eq!(classify(&err), FailureClass::QuotaOrAuth);
    }

    #[test]
    fn quota_body_rotates() {
        let err = api(500, "RESOURCE_EXHAUSTED: Quota exceeded for metric");
        assert_eq!(classify(&err), FailureClass::QuotaOrAuth);
    }

    #[test]
    fn server_errors_are_transient() {
        assert_eq!(classify(&api(500, "internal")), FailureClass::Other);
        assert_eq!(classify(&api(503, "overloaded")), FailureClass::Other);
        assert_eq!(classify(&ProviderError::Parse("bad".into())), FailureClass::Other);
        assert_eq!(classify(&ProviderError::Empty("SAFETY".into())), FailureClass::Other);
    }
}
