//! Embedding providers and the shared [`Embedder`] service.
//!
//! Providers implement [`EmbeddingProvider`]. Selecting `disabled` makes
//! [`Embedder::from_config`] fail with `ModelUnavailable`, since nothing in the
//! pipeline can run without vectors.
//!
//! - **[`LocalProvider`]**: fastembed, model loaded once and shared.
//! - **[`OpenAIProvider`]**: `POST /v1/embeddings` with retry and backoff.
//! - **[`OllamaProvider`]**: `POST /api/embed` on a local Ollama.
//! - **[`HashedProvider`]**: deterministic feature hashing, no model at all.
//!
//! [`Embedder`] wraps one provider and enforces the output contract: one
//! vector per input, in order, every vector of [`Embedder::dims`] components
//! and of unit L2 length. It is created once per process and shared behind
//! an `Arc` by both record instances, the watchers, and the HTTP handlers.
//!
//! # Retry Strategy
//!
//! Remote providers back off exponentially on transient errors:
//! - HTTP 429 and 5xx → retry
//! - other HTTP 4xx → fail immediately
//! - network errors → retry
//! - delays: 1s, 2s, 4s, ... capped at 32s

mod hashed;
#[cfg(feature = "local-embeddings-fastembed")]
mod local;

pub use hashed::HashedProvider;
#[cfg(feature = "local-embeddings-fastembed")]
pub use local::LocalProvider;

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use record_rag_core::embedding::l2_normalize;
use record_rag_core::RagError;
use std::time::Duration;
use tracing::debug;

use crate::config::EmbeddingConfig;

/// A backend that turns text into raw (not necessarily normalized) vectors.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    fn model_name(&self) -> &str;
    fn dims(&self) -> usize;
    /// Embed one batch. Must return one vector per input, in input order.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

/// Process-wide embedding service.
pub struct Embedder {
    provider: Box<dyn EmbeddingProvider>,
    batch_size: usize,
}

impl Embedder {
    /// Build the provider named in config. Model loading happens here, once.
    pub fn from_config(config: &EmbeddingConfig) -> std::result::Result<Self, RagError> {
        let provider = create_provider(config).map_err(|e| match e.downcast::<RagError>() {
            Ok(rag) => rag,
            Err(other) => RagError::ModelUnavailable(format!("{:#}", other)),
        })?;
        Ok(Self::with_provider(provider, config.batch_size))
    }

    pub fn with_provider(provider: Box<dyn EmbeddingProvider>, batch_size: usize) -> Self {
        Self {
            provider,
            batch_size: batch_size.max(1),
        }
    }

    pub fn model_name(&self) -> &str {
        self.provider.model_name()
    }

    pub fn dims(&self) -> usize {
        self.provider.dims()
    }

    /// Embed `texts` in batches. An empty input yields an empty output
    /// without touching the provider.
    pub async fn embed(&self, texts: &[String]) -> std::result::Result<Vec<Vec<f32>>, RagError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let dims = self.dims();
        let mut out = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.batch_size) {
            let vectors = self
                .provider
                .embed_batch(batch)
                .await
                .map_err(into_rag_error)?;
            if vectors.len() != batch.len() {
                return Err(RagError::Embedding(format!(
                    "provider returned {} vectors for {} texts",
                    vectors.len(),
                    batch.len()
                )));
            }
            for mut v in vectors {
                if v.len() != dims {
                    return Err(RagError::DimensionMismatch {
                        expected: dims,
                        actual: v.len(),
                    });
                }
                l2_normalize(&mut v);
                out.push(v);
            }
        }
        debug!(texts = texts.len(), model = self.model_name(), "embedded batch");
        Ok(out)
    }

    pub async fn embed_query(&self, text: &str) -> std::result::Result<Vec<f32>, RagError> {
        self.embed(&[text.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| RagError::Embedding("empty embedding response".into()))
    }
}

impl std::fmt::Debug for Embedder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Embedder")
            .field("model", &self.model_name())
            .field("dims", &self.dims())
            .field("batch_size", &self.batch_size)
            .finish()
    }
}

fn into_rag_error(err: anyhow::Error) -> RagError {
    match err.downcast::<RagError>() {
        Ok(rag) => rag,
        Err(other) => RagError::Embedding(format!("{:#}", other)),
    }
}

/// Create the provider named by `config.provider`.
///
/// | Config Value | Provider |
/// |-------------|----------|
/// | `"disabled"` | error: `ModelUnavailable` |
/// | `"local"` | [`LocalProvider`] |
/// | `"openai"` | [`OpenAIProvider`] |
/// | `"ollama"` | [`OllamaProvider`] |
/// | `"hashed"` | [`HashedProvider`] |
pub fn create_provider(config: &EmbeddingConfig) -> Result<Box<dyn EmbeddingProvider>> {
    match config.provider.as_str() {
        "disabled" => {
            Err(RagError::ModelUnavailable("embedding provider is disabled".into()).into())
        }
        "openai" => Ok(Box::new(OpenAIProvider::new(config)?)),
        "ollama" => Ok(Box::new(OllamaProvider::new(config)?)),
        "hashed" => Ok(Box::new(HashedProvider::new(
            config.dims.unwrap_or(hashed::DEFAULT_DIMS),
        ))),
        #[cfg(feature = "local-embeddings-fastembed")]
        "local" => Ok(Box::new(LocalProvider::new(config)?)),
        #[cfg(not(feature = "local-embeddings-fastembed"))]
        "local" => Err(RagError::ModelUnavailable(
            "local embeddings require --features local-embeddings-fastembed".into(),
        )
        .into()),
        other => bail!("Unknown embedding provider: {}", other),
    }
}

// ============ Remote providers ============

/// Embedding provider using the OpenAI API. Reads `OPENAI_API_KEY`.
pub struct OpenAIProvider {
    model: String,
    dims: usize,
    client: reqwest::Client,
    max_retries: u32,
}

impl OpenAIProvider {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow!("embedding.model required for OpenAI provider"))?;
        let dims = config
            .dims
            .ok_or_else(|| anyhow!("embedding.dims required for OpenAI provider"))?;

        if std::env::var("OPENAI_API_KEY").is_err() {
            bail!("OPENAI_API_KEY environment variable not set");
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            model,
            dims,
            client,
            max_retries: config.max_retries,
        })
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAIProvider {
    fn model_name(&self) -> &str {
        &self.model
    }
    fn dims(&self) -> usize {
        self.dims
    }
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let api_key =
            std::env::var("OPENAI_API_KEY").map_err(|_| anyhow!("OPENAI_API_KEY not set"))?;
        let body = serde_json::json!({ "model": self.model, "input": texts });
        let request = || {
            self.client
                .post("https://api.openai.com/v1/embeddings")
                .bearer_auth(&api_key)
                .json(&body)
        };
        let json = post_with_retry("OpenAI", request, self.max_retries).await?;
        parse_openai_response(&json)
    }
}

/// Embedding provider using a local Ollama instance (default `http://localhost:11434`).
pub struct OllamaProvider {
    model: String,
    dims: usize,
    url: String,
    client: reqwest::Client,
    max_retries: u32,
}

impl OllamaProvider {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow!("embedding.model required for Ollama provider"))?;
        let dims = config
            .dims
            .ok_or_else(|| anyhow!("embedding.dims required for Ollama provider"))?;
        let url = config
            .url
            .clone()
            .unwrap_or_else(|| "http://localhost:11434".to_string());
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            model,
            dims,
            url,
            client,
            max_retries: config.max_retries,
        })
    }
}

#[async_trait]
impl EmbeddingProvider for OllamaProvider {
    fn model_name(&self) -> &str {
        &self.model
    }
    fn dims(&self) -> usize {
        self.dims
    }
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let body = serde_json::json!({ "model": self.model, "input": texts });
        let endpoint = format!("{}/api/embed", self.url.trim_end_matches('/'));
        let request = || self.client.post(&endpoint).json(&body);
        let json = post_with_retry("Ollama", request, self.max_retries)
            .await
            .map_err(|e| anyhow!("{:#} (is Ollama running at {}?)", e, self.url))?;
        parse_ollama_response(&json)
    }
}

/// Send a JSON POST, retrying 429/5xx and network errors with exponential backoff.
pub(crate) async fn post_with_retry<F>(
    service: &str,
    request: F,
    max_retries: u32,
) -> Result<serde_json::Value>
where
    F: Fn() -> reqwest::RequestBuilder,
{
    let mut last_err = None;

    for attempt in 0..=max_retries {
        if attempt > 0 {
            let delay = Duration::from_secs(1 << (attempt - 1).min(5));
            debug!(service, attempt, ?delay, "retrying request");
            tokio::time::sleep(delay).await;
        }

        match request().send().await {
            Ok(response) => {
                let status = response.status();
                if status.is_success() {
                    return Ok(response.json().await?);
                }

                let body_text = response.text().await.unwrap_or_default();
                if status.as_u16() == 429 || status.is_server_error() {
                    last_err = Some(anyhow!("{} API error {}: {}", service, status, body_text));
                    continue;
                }
                bail!("{} API error {}: {}", service, status, body_text);
            }
            Err(e) => {
                last_err = Some(anyhow!("{} connection error: {}", service, e));
            }
        }
    }

    Err(last_err.unwrap_or_else(|| anyhow!("{} request failed after retries", service)))
}

fn parse_openai_response(json: &serde_json::Value) -> Result<Vec<Vec<f32>>> {
    let data = json
        .get("data")
        .and_then(|d| d.as_array())
        .ok_or_else(|| anyhow!("Invalid OpenAI response: missing data array"))?;

    let mut indexed = Vec::with_capacity(data.len());
    for (fallback, item) in data.iter().enumerate() {
        let index = item
            .get("index")
            .and_then(|i| i.as_u64())
            .map(|i| i as usize)
            .unwrap_or(fallback);
        let embedding = item
            .get("embedding")
            .and_then(|e| e.as_array())
            .ok_or_else(|| anyhow!("Invalid OpenAI response: missing embedding"))?;
        indexed.push((index, json_floats(embedding)));
    }
    indexed.sort_by_key(|(i, _)| *i);
    Ok(indexed.into_iter().map(|(_, v)| v).collect())
}

fn parse_ollama_response(json: &serde_json::Value) -> Result<Vec<Vec<f32>>> {
    let embeddings = json
        .get("embeddings")
        .and_then(|e| e.as_array())
        .ok_or_else(|| anyhow!("Invalid Ollama response: missing embeddings array"))?;

    embeddings
        .iter()
        .map(|e| {
            e.as_array()
                .map(|values| json_floats(values))
                .ok_or_else(|| anyhow!("Invalid Ollama response: embedding is not an array"))
        })
        .collect()
}

fn json_floats(values: &[serde_json::Value]) -> Vec<f32> {
    values
        .iter()
        .map(|v| v.as_f64().unwrap_or(0.0) as f32)
        .collect()
}
