//! Google Generative Language API (Gemini) backend.
//!
//! Uses the public REST surface with API-key auth:
//!   - `GET  {base}/v1beta/models` for discovery (paginated)
//!   - `POST {base}/v1beta/models/{model}:generateContent` for generation
//!
//! The key travels in the `x-goog-api-key` header, never in the URL, so it
//! cannot leak into error messages or logs.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::provider::{GenerationBackend, ModelDescriptor, ProviderError};

const GENERATE_METHOD: &str = "generateContent";
const PAGE_SIZE: &str = "1000";
/// Discovery gives up after this many pages and keeps what it has.
const MAX_PAGES: usize = 20;

pub struct GeminiBackend {
    client: reqwest::Client,
    base_url: String,
}

impl GeminiBackend {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn models_url(&self) -> String {
        format!("{}/v1beta/models", self.base_url)
    }

    fn generate_url(&self, model: &str) -> String {
        let model = model.strip_prefix("models/").unwrap_or(model);
        format!("{}/v1beta/models/{}:{}", self.base_url, model, GENERATE_METHOD)
    }
}

/// Turn a non-success response into a typed error.
async fn check_status(resp: reqwest::Response) -> Result<reqwest::Response, ProviderError> {
    let status = resp.status().as_u16();
    if status == 429 {
        let retry = resp
            .headers()
            .get("retry-after")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok())
            .map(|s| s * 1000)
            .unwrap_or(5000);
        return Err(ProviderError::RateLimited {
            retry_after_ms: retry,
        });
    }
    if !resp.status().is_success() {
        let text = resp.text().await.unwrap_or_default();
        warn!(status, body = %text, "Gemini API error");
        return Err(ProviderError::Api {
            status,
            message: text,
        });
    }
    Ok(resp)
}

#[async_trait]
impl GenerationBackend for GeminiBackend {
    fn name(&self) -> &str {
        "gemini"
    }

    async fn list_models(&self, credential: &str) -> Result<Vec<ModelDescriptor>, ProviderError> {
        let mut models = Vec::new();
        let mut page_token: Option<String> = None;

        for pages in 1usize.. {
            let mut query = vec![("pageSize", PAGE_SIZE.to_string())];
            if let Some(token) = &page_token {
                query.push(("pageToken", token.clone()));
            }

            let resp = self
                .client
                .get(self.models_url())
                .header("x-goog-api-key", credential)
                .query(&query)
                .send()
                .await?;
            let page: ListModelsResponse = check_status(resp)
                .await?
                .json()
                .await
                .map_err(|e| ProviderError::Parse(e.to_string()))?;

            models.extend(page.models.into_iter().map(ModelDescriptor::from));
            match next_page_token(page.next_page_token, page_token.as_deref(), pages) {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        debug!(count = models.len(), "Gemini models discovered");
        Ok(models)
    }

    async fn generate(
        &self,
        credential: &str,
        model: &str,
        prompt: &str,
    ) -> Result<String, ProviderError> {
        let body = serde_json::json!({
            "contents": [{
                "role": "user",
                "parts": [{ "text": prompt }]
            }]
        });

        debug!(%model, prompt_chars = prompt.len(), "sending request to Gemini");

        let resp = self
            .client
            .post(self.generate_url(model))
            .header("x-goog-api-key", credential)
            .json(&body)
            .send()
            .await?;

        let api_resp: GenerateResponse = check_status(resp)
            .await?
            .json()
            .await
            .map_err(|e| ProviderError::Parse(e.to_string()))?;

        extract_text(api_resp)
    }
}

/// The token for the next page, or `None` when discovery should stop: no
/// token, a token the server already handed out, or the page cap.
fn next_page_token(next: Option<String>, current: Option<&str>, pages: usize) -> Option<String> {
    let next = next.filter(|t| !t.is_empty())?;
    if current == Some(next.as_str()) {
        warn!(pages, "model listing repeated its page token, stopping");
        return None;
    }
    if pages >= MAX_PAGES {
        warn!(pages, "model listing exceeded page cap, stopping");
        return None;
    }
    Some(next)
}

/// Join the text parts of the first candidate.
///
/// A blocked prompt or a candidate with no text is reported as `Empty` so the
/// retry loop treats it like any other transient failure.
fn extract_text(resp: GenerateResponse) -> Result<String, ProviderError> {
    let candidate = resp.candidates.into_iter().next();
    let text = candidate
        .as_ref()
        .and_then(|c| c.content.as_ref())
        .map(|content| {
            content
                .parts
                .iter()
                .filter_map(|p| p.text.as_deref())
                .collect::<Vec<_>>()
                .join("")
        })
        .unwrap_or_default();

    if !text.trim().is_empty() {
        return Ok(text);
    }

    let reason = candidate
        .and_then(|c| c.finish_reason)
        .or_else(|| resp.prompt_feedback.and_then(|f| f.block_reason))
        .unwrap_or_else(|| "no candidates".to_string());
    Err(ProviderError::Empty(reason))
}

// ── Response types ───────────────────────────────────────────────────────────

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListModelsResponse {
    #[serde(default)]
    models: Vec<GeminiModel>,
    next_page_token: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiModel {
    name: String,
    #[serde(default)]
    supported_generation_methods: Vec<String>,
}

impl From<GeminiModel> for ModelDescriptor {
    fn from(m: GeminiModel) -> Self {
        let supports_generation = m
            .supported_generation_methods
            .iter()
            .any(|method| method == GENERATE_METHOD);
        ModelDescriptor::new(m.name, supports_generation)
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<Content>,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Deserialize)]
struct Part {
    text: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn list_response_maps_generation_support() {
        let page: ListModelsResponse = serde_json::from_str(
            r#"{
                "models": [
                    {"name": "models/embedding-001", "supportedGenerationMethods": ["embedContent"]},
                    {"name": "models/gemini-1.5-flash", "supportedGenerationMethods": ["generateContent", "countTokens"]}
                ],
                "nextPageToken": "abc"
            }"#,
        )
        .unwrap();
        assert_eq!(page.next_page_token.as_deref(), Some("abc"));
        let models: Vec<ModelDescriptor> = page.models.into_iter().map(Into::into).collect();
        assert_eq!(
            models,
            vec![
                ModelDescriptor::new("models/embedding-001", false),
                ModelDescriptor::new("models/gemini-1.5-flash", true),
            ]
        );
    }

    #[test]
    fn pagination_stops_on_repeat_and_cap() {
        assert_eq!(next_page_token(None, None, 1), None);
        assert_eq!(next_page_token(Some(String::new()), None, 1), None);
        assert_eq!(next_page_token(Some("p2".into()), None, 1).as_deref(), Some("p2"));
        assert_eq!(next_page_token(Some("p2".into()), Some("p2"), 2), None);
        assert_eq!(next_page_token(Some("p3".into()), Some("p2"), 2).as_deref(), Some("p3"));
        assert_eq!(next_page_token(Some("pN".into()), Some("pM"), MAX_PAGES), None);
    }

    #[test]
    fn extract_text_joins_parts() {
        let resp: GenerateResponse = serde_json::from_str(
            r#"{"candidates":[{"content":{"parts":[{"text":"Hello "},{"text":"world"}]},"finishReason":"STOP"}]}"#,
        )
        .unwrap();
        assert_eq!(extract_text(resp).unwrap(), "Hello world");
    }

    #[test]
    fn blocked_prompt_is_empty_error() {
        let resp: GenerateResponse =
            serde_json::from_str(r#"{"promptFeedback":{"blockReason":"SAFETY"}}"#).unwrap();
        match extract_text(resp) {
            Err(ProviderError::Empty(reason)) => assert_eq!(reason, "SAFETY"),
            other => panic!("expected Empty, got {other:?}"),
        }
    }

    #[test]
    fn candidate_without_content_reports_finish_reason() {
        let resp: GenerateResponse =
            serde_json::from_str(r#"{"candidates":[{"finishReason":"RECITATION"}]}"#).unwrap();
        assert!(matches!(extract_text(resp), Err(ProviderError::Empty(r)) if r == "RECITATION"));
    }

    #[test]
    fn urls_strip_models_prefix_and_trailing_slash() {
        let backend = GeminiBackend::new("https://example.test/", Duration::from_secs(5)).unwrap();
        assert_eq!(backend.models_url(), "https://example.test/v1beta/models");
        assert_eq!(
            backend.generate_url("models/gemini-1.5-flash"),
            "https://example.test/v1beta/models/gemini-1.5-flash:generateContent"
        );
    }
}
