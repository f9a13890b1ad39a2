//! Darija translation through the Hugging Face Inference API.
//!
//! The boundary is infallible: every failure mode maps to a displayable
//! string because callers render the return value directly.

use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, warn};

const API_BASE: &str = "https://api-inference.huggingface.co/models";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const MAX_LENGTH: u32 = 128;
const UNAVAILABLE: &str = "Service Indisponible";

static BRACKET_TAGS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[[^\]]*\]").expect("bracket tag pattern"));
static WHITESPACE_RUNS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("whitespace pattern"));

#[derive(Debug, thiserror::Error)]
enum TranslateError {
    #[error("the translation model is still loading, retry shortly")]
    ModelLoading,

    #[error("API error ({code}): {message}")]
    Api { code: u16, message: String },

    #[error("malformed API response: {0}")]
    Malformed(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),
}

#[derive(Clone)]
struct ApiToken(String);

impl std::fmt::Debug for ApiToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("[REDACTED]")
    }
}

#[derive(Clone)]
pub struct TranslationService {
    http: Client,
    token: Option<ApiToken>,
    model: String,
    base_url: String,
}

impl TranslationService {
    /// A missing token does not fail construction; the service answers
    /// with a fixed unavailable string instead.
    pub fn new(http: Client, token: Option<String>, model: String) -> Self {
        let token = token
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .map(ApiToken);
        if token.is_none() {
            warn!("HF_TOKEN not set, translation service degraded");
        }
        Self {
            http,
            token,
            model,
            base_url: API_BASE.to_string(),
        }
    }

    #[cfg(test)]
    pub(crate) fn with_base_url(http: Client, base_url: &str) -> Self {
        Self {
            http,
            token: Some(ApiToken("test-token".to_string())),
            model: "atlasia/Terjman-Nano-v2.0".to_string(),
            base_url: base_url.to_string(),
        }
    }

    pub async fn translate(&self, text: &str) -> String {
        let Some(token) = &self.token else {
            return UNAVAILABLE.to_string();
        };
        match self.call_model(token, text).await {
            Ok(raw) => clean_output(&raw),
            Err(e) => {
                warn!(error = %e, "translation failed");
                format!("Error: {e}")
            }
        }
    }

    async fn call_model(&self, token: &ApiToken, text: &str) -> Result<String, TranslateError> {
        let url = format!("{}/{}", self.base_url, self.model);
        let response = self
            .http
            .post(&url)
            .bearer_auth(&token.0)
            .header("User-Agent", crate::USER_AGENT)
            .json(&serde_json::json!({
                "inputs": text,
                "parameters": { "max_length": MAX_LENGTH }
            }))
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await?;

        let status = response.status();
        if status == reqwest::StatusCode::SERVICE_UNAVAILABLE {
            return Err(TranslateError::ModelLoading);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<HfErrorBody>(&body)
                .ok()
                .and_then(|b| b.error)
                .unwrap_or_else(|| {
                    // Truncate by chars, not bytes: the body may be multi-byte text.
                    let snippet: String = body.chars().take(200).collect();
                    format!("HTTP {status}: {snippet}")
                });
            return Err(TranslateError::Api {
                code: status.as_u16(),
                message,
            });
        }

        let outputs: Vec<HfOutput> = response.json().await?;
        debug!(model = %self.model, "translation complete");
        outputs
            .into_iter()
            .next()
            .and_then(|o| o.translation_text.or(o.generated_text))
            .ok_or_else(|| TranslateError::Malformed("no translation in response".into()))
    }
}

#[derive(Debug, Deserialize)]
struct HfOutput {
    translation_text: Option<String>,
    generated_text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct HfErrorBody {
    error: Option<String>,
}

/// Strips bracketed annotation tokens (language tags, source markers) the
/// model leaks into its output, then collapses the leftover whitespace.
fn clean_output(raw: &str) -> String {
    let stripped = BRACKET_TAGS.replace_all(raw, "");
    WHITESPACE_RUNS.replace_all(&stripped, " ").trim().to_string()
}
