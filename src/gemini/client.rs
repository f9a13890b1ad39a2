use std::future::Future;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use reqwest::Client;
use serde::Serialize;
use tracing::{debug, warn};

use super::grounding::{extract_search_hits, extract_text};
use super::types::{
    ApiError, BatchEmbedContentsRequest, BatchEmbedContentsResponse, Content, EmbedContentRequest,
    GenerateContentRequest, GenerateContentResponse, GenerationConfig, GoogleSearch, Part,
    SearchHit, Tool,
};

const API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/models";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(20);
/// Guide answers should stay close to the retrieved context.
const GENERATION_TEMPERATURE: f32 = 0.3;
const EMBED_BATCH_SIZE: usize = 16;
const EMBED_CONCURRENCY: usize = 4;

#[derive(Debug, thiserror::Error)]
pub enum GeminiError {
    #[error("GEMINI_API_KEY not set. Get one at https://aistudio.google.com/apikey")]
    ApiKeyNotSet,

    #[error("API rate limit exceeded. Please retry later.")]
    RateLimited,

    #[error("API quota exhausted: {0}")]
    QuotaExhausted(String),

    #[error("API error ({code}): {message}")]
    Api { code: u16, message: String },

    #[error("malformed API response: {0}")]
    Malformed(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),
}

/// Text generation against a fixed prompt.
/// Implemented by `GeminiClient` for production; mock implementations used in tests.
pub trait GenerationClient {
    async fn generate(&self, prompt: &str) -> Result<String, GeminiError>;
}

/// Batch text embedding. One vector per input, input order preserved.
pub trait EmbeddingClient {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, GeminiError>;
}

/// Web search via grounded generation.
pub trait SearchClient {
    async fn search(&self, query: &str) -> Result<Vec<SearchHit>, GeminiError>;
}

#[derive(Clone)]
struct ApiKey(String);

impl std::fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("[REDACTED]")
    }
}

#[derive(Clone)]
pub struct GeminiClient {
    http: Client,
    api_key: ApiKey,
    model: String,
    embed_model: String,
    base_url: String,
}

impl GeminiClient {
    pub fn new(
        http: Client,
        api_key: Option<String>,
        model: String,
        embed_model: String,
    ) -> Result<Self, GeminiError> {
        let api_key = api_key
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
            .ok_or(GeminiError::ApiKeyNotSet)?;
        Ok(Self {
            http,
            api_key: ApiKey(api_key),
            model,
            embed_model,
            base_url: API_BASE.to_string(),
        })
    }

    #[cfg(test)]
    pub(crate) fn with_base_url(http: Client, base_url: &str) -> Self {
        Self {
            http,
            api_key: ApiKey("test-key".to_string()),
            model: "gemini-2.5-flash".to_string(),
            embed_model: "gemini-embedding-001".to_string(),
            base_url: base_url.to_string(),
        }
    }

    async fn post_api<B: Serialize>(&self, url: &str, request: &B) -> Result<String, GeminiError> {
        debug_assert!(
            url.starts_with("https://") || cfg!(test),
            "API key must only be sent over HTTPS"
        );

        let response = self
            .http
            .post(url)
            .header("x-goog-api-key", &self.api_key.0)
            .header("User-Agent", crate::USER_AGENT)
            .json(request)
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await?;

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            warn!("Gemini API rate limited");
            return Err(GeminiError::RateLimited);
        }
        let text = response.text().await?;
        if !status.is_success() {
            if let Ok(envelope) = serde_json::from_str::<ErrorEnvelope>(&text)
                && let Some(err) = &envelope.error
            {
                let classified = classify_api_error(err);
                warn!(error = %classified, "Gemini API error");
                return Err(classified);
            }
            // Truncate by chars, not bytes: the body may be multi-byte text.
            let snippet: String = text.chars().take(200).collect();
            warn!(status = %status, "Gemini API error (no structured body)");
            return Err(GeminiError::Api {
                code: status.as_u16(),
                message: format!("HTTP {status}: {snippet}"),
            });
        }
        Ok(text)
    }

    async fn generate_once(
        &self,
        prompt: &str,
        grounded: bool,
    ) -> Result<GenerateContentResponse, GeminiError> {
        let url = format!("{}/{}:generateContent", self.base_url, self.model);

        let request = GenerateContentRequest {
            contents: vec![Content {
                parts: vec![Part {
                    text: prompt.to_string(),
                }],
                role: None,
            }],
            tools: if grounded {
                vec![Tool {
                    google_search: GoogleSearch {},
                }]
            } else {
                Vec::new()
            },
            generation_config: (!grounded).then_some(GenerationConfig {
                temperature: GENERATION_TEMPERATURE,
            }),
        };

        let body = self.post_api(&url, &request).await?;
        let parsed: GenerateContentResponse = serde_json::from_str(&body)
            .map_err(|e| GeminiError::Malformed(format!("invalid JSON body: {e}")))?;
        debug!(model = %self.model, grounded, "gemini generation complete");

        if let Some(err) = &parsed.error {
            let classified = classify_api_error(err);
            warn!(error = %classified, "Gemini API error in 200 response");
            return Err(classified);
        }

        Ok(parsed)
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, GeminiError> {
        let url = format!("{}/{}:batchEmbedContents", self.base_url, self.embed_model);

        let request = BatchEmbedContentsRequest {
            requests: texts
                .iter()
                .map(|text| EmbedContentRequest {
                    model: format!("models/{}", self.embed_model),
                    content: Content {
                        parts: vec![Part { text: text.clone() }],
                        role: None,
                    },
                })
                .collect(),
        };

        let body = self.post_api(&url, &request).await?;
        let parsed: BatchEmbedContentsResponse = serde_json::from_str(&body)
            .map_err(|e| GeminiError::Malformed(format!("invalid JSON body: {e}")))?;

        if let Some(err) = &parsed.error {
            let classified = classify_api_error(err);
            warn!(error = %classified, "Gemini API error in 200 response");
            return Err(classified);
        }

        let embeddings = parsed.embeddings.unwrap_or_default();
        if embeddings.len() != texts.len() {
            return Err(GeminiError::Malformed(format!(
                "got {} embeddings for {} inputs",
                embeddings.len(),
                texts.len()
            )));
        }
        Ok(embeddings.into_iter().map(|e| e.values).collect())
    }
}

const MAX_RETRIES: u32 = 3;
const INITIAL_BACKOFF_MS: u64 = 1000;

impl GenerationClient for GeminiClient {
    async fn generate(&self, prompt: &str) -> Result<String, GeminiError> {
        let response = with_retry(|| self.generate_once(prompt, false)).await?;
        extract_text(&response).ok_or_else(|| {
            GeminiError::Malformed("no candidate text (safety filter or empty response)".into())
        })
    }
}

impl EmbeddingClient for GeminiClient {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, GeminiError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let batches: Vec<Vec<String>> = texts
            .chunks(EMBED_BATCH_SIZE)
            .map(|chunk| chunk.to_vec())
            .collect();

        // `buffered` keeps batch order so vectors line up with inputs.
        let outcomes: Vec<Result<Vec<Vec<f32>>, GeminiError>> = stream::iter(batches)
            .map(|batch| async move { with_retry(|| self.embed_batch(&batch)).await })
            .buffered(EMBED_CONCURRENCY)
            .collect()
            .await;

        let mut vectors = Vec::with_capacity(texts.len());
        for outcome in outcomes {
            vectors.extend(outcome?);
        }
        Ok(vectors)
    }
}

impl SearchClient for GeminiClient {
    async fn search(&self, query: &str) -> Result<Vec<SearchHit>, GeminiError> {
        let response = with_retry(|| self.generate_once(query, true)).await?;
        Ok(extract_search_hits(&response))
    }
}

async fn with_retry<T, F, Fut>(mut op: F) -> Result<T, GeminiError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, GeminiError>>,
{
    let mut last_err = None;
    for attempt in 0..MAX_RETRIES {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if is_retriable(&e) => {
                last_err = Some(e);
                if attempt + 1 < MAX_RETRIES {
                    let delay_ms = jittered_backoff(attempt);
                    debug!(
                        attempt = attempt + 1,
                        delay_ms, "retrying after transient error"
                    );
                    tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                }
            }
            Err(e) => return Err(e),
        }
    }
    Err(last_err.unwrap_or(GeminiError::RateLimited))
}

fn is_retriable(e: &GeminiError) -> bool {
    matches!(
        e,
        GeminiError::RateLimited
            | GeminiError::Api {
                code: 500..=599,
                ..
            }
    )
}

/// Equal jitter backoff: base/2 + rand(0, base/2).
fn jittered_backoff(attempt: u32) -> u64 {
    let base = INITIAL_BACKOFF_MS * 2u64.pow(attempt);
    let half = base / 2;
    half + fastrand::u64(..half.max(1))
}

#[derive(Debug, serde::Deserialize)]
struct ErrorEnvelope {
    error: Option<ApiError>,
}

fn classify_api_error(err: &ApiError) -> GeminiError {
    let message = err
        .message
        .clone()
        .unwrap_or_else(|| "Unknown error".to_string());

    match err.code {
        Some(429) => GeminiError::RateLimited,
        Some(403) => GeminiError::QuotaExhausted(message),
        Some(code) => GeminiError::Api { code, message },
        None => GeminiError::Api {
            code: 0,
            message: format!("Unknown error (no status code): {message}"),
        },
    }
}


#[cfg(test)]
mod http_tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, method, path_regex};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn generate_success_returns_text() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path_regex(r":generateContent$"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "candidates": [{
                    "content": {
                        "parts": [{"text": "Welcome to Marrakech"}],
                        "role": "model"
                    }
                }]
            })))
            .mount(&server)
            .await;

        let client = GeminiClient::with_base_url(Client::new(), &server.uri());
        let answer = client.generate("greet the visitor").await.unwrap();

        assert_eq!(answer, "Welcome to Marrakech");
    }

    #[tokio::test]
    async fn generate_empty_candidates_is_malformed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path_regex(r":generateContent$"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"candidates": []})),
            )
            .mount(&server)
            .await;

        let client = GeminiClient::with_base_url(Client::new(), &server.uri());
        let result = client.generate("anything").await;

        assert!(matches!(result, Err(GeminiError::Malformed(_))));
    }

    #[tokio::test]
    async fn generate_429_returns_rate_limited() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path_regex(r":generateContent$"))
            .respond_with(ResponseTemplate::new(429))
            .mount(&server)
            .await;

        let client = GeminiClient::with_base_url(Client::new(), &server.uri());
        let result = client.generate("anything").await;

        assert!(matches!(result, Err(GeminiError::RateLimited)));
    }

    #[tokio::test]
    async fn generate_200_with_error_field_returns_classified_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path_regex(r":generateContent$"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "error": {
                    "code": 403,
                    "message": "Quota exceeded"
                }
            })))
            .mount(&server)
            .await;

        let client = GeminiClient::with_base_url(Client::new(), &server.uri());
        let result = client.generate("anything").await;

        assert!(matches!(result, Err(GeminiError::QuotaExhausted(_))));
    }

    #[tokio::test]
    async fn generate_500_with_invalid_body_returns_generic_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path_regex(r":generateContent$"))
            .respond_with(ResponseTemplate::new(500).set_body_string("not json"))
            .mount(&server)
            .await;

        let client = GeminiClient::with_base_url(Client::new(), &server.uri());
        let result = client.generate("anything").await;

        match &result {
            Err(GeminiError::Api { code: 500, message }) => {
                assert!(message.contains("not json"), "expected body snippet, got: {message}");
            }
            other => panic!("expected Api(500), got: {other:?}"),
        }
    }

    #[tokio::test]
    async fn error_snippet_truncation_respects_char_boundaries() {
        let server = MockServer::start().await;
        // 199 ASCII bytes followed by multi-byte chars straddling index 200.
        let body = format!("{}☂☂☂", "a".repeat(199));
        Mock::given(method("POST"))
            .and(path_regex(r":generateContent$"))
            .respond_with(ResponseTemplate::new(400).set_body_string(body))
            .mount(&server)
            .await;

        let client = GeminiClient::with_base_url(Client::new(), &server.uri());
        let result = client.generate("anything").await;

        match &result {
            Err(GeminiError::Api { code: 400, message }) => {
                assert!(message.contains("aaa"), "expected body snippet, got: {message}");
                assert!(message.contains('☂'), "expected truncation inside the body, got: {message}");
            }
            other => panic!("expected Api(400) with snippet, got: {other:?}"),
        }
    }

    #[tokio::test]
    async fn embed_returns_vectors_in_input_order() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path_regex(r":batchEmbedContents$"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "embeddings": [
                    {"values": [1.0, 0.0]},
                    {"values": [0.0, 1.0]}
                ]
            })))
            .mount(&server)
            .await;

        let client = GeminiClient::with_base_url(Client::new(), &server.uri());
        let vectors = client
            .embed(&["medina".to_string(), "kasbah".to_string()])
            .await
            .unwrap();

        assert_eq!(vectors, vec![vec![1.0, 0.0], vec![0.0, 1.0]]);
    }

    #[tokio::test]
    async fn embed_count_mismatch_is_malformed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path_regex(r":batchEmbedContents$"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "embeddings": [{"values": [1.0]}]
            })))
            .mount(&server)
            .await;

        let client = GeminiClient::with_base_url(Client::new(), &server.uri());
        let result = client
            .embed(&["medina".to_string(), "kasbah".to_string()])
            .await;

        assert!(matches!(result, Err(GeminiError::Malformed(_))));
    }

    #[tokio::test]
    async fn embed_empty_input_skips_network() {
        // No mock mounted: any request would fail.
        let client = GeminiClient::with_base_url(Client::new(), "http://127.0.0.1:0");
        let vectors = client.embed(&[]).await.unwrap();
        assert!(vectors.is_empty());
    }

    #[tokio::test]
    async fn search_requests_grounding_tool_and_extracts_hits() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path_regex(r":generateContent$"))
            .and(body_partial_json(serde_json::json!({
                "tools": [{"google_search": {}}]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "candidates": [{
                    "content": {
                        "parts": [{"text": "Recent reports"}],
                        "role": "model"
                    },
                    "groundingMetadata": {
                        "groundingChunks": [{
                            "web": {
                                "uri": "https://news.example",
                                "title": "Local News"
                            }
                        }],
                        "groundingSupports": [{
                            "segment": {"text": "a reported incident"},
                            "groundingChunkIndices": [0]
                        }]
                    }
                }]
            })))
            .mount(&server)
            .await;

        let client = GeminiClient::with_base_url(Client::new(), &server.uri());
        let hits = client.search("city news").await.unwrap();

        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].url, "https://news.example");
        assert_eq!(hits[0].title, "Local News");
        assert_eq!(hits[0].snippet, "a reported incident");
    }
}
