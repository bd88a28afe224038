//! Generation collaborator: turns retrieved context into a short answer.
//!
//! The pipeline never fails because of this step. Blank context and
//! provider errors both come back as [`Answer::Warning`].

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use record_rag_core::parser::Language;
use record_rag_core::RagError;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::GenerationConfig;
use crate::embedding::post_with_retry;

pub const NO_CONTEXT: &str = "No sufficient context found.";

/// An opaque text-completion backend.
#[async_trait]
pub trait Generator: Send + Sync {
    fn name(&self) -> &str;
    async fn complete(&self, prompt: &str) -> Result<String>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "text", rename_all = "lowercase")]
pub enum Answer {
    Summary(String),
    Warning(String),
}

impl Answer {
    pub fn text(&self) -> &str {
        match self {
            Answer::Summary(s) | Answer::Warning(s) => s,
        }
    }

    pub fn is_warning(&self) -> bool {
        matches!(self, Answer::Warning(_))
    }
}

impl std::fmt::Display for Answer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Answer::Summary(s) => write!(f, "{}", s),
            Answer::Warning(s) => write!(f, "⚠️  {}", s),
        }
    }
}

/// Which prompt to wrap the context in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptKind {
    /// One-sentence root cause over retrieved network-log messages.
    RootCause,
    /// Short answer grounded in a filtered trip table.
    TripTable(Language),
}

impl PromptKind {
    pub fn render(self, context: &str, user_input: &str) -> String {
        match self {
            PromptKind::RootCause => format!(
                "You are a network reliability AI assistant.\n\
                 Based on the following network log messages, identify the most likely root cause.\n\n\
                 Question: {user_input}\n\n\
                 Log messages:\n{context}\n\n\
                 Respond in one concise technical sentence."
            ),
            PromptKind::TripTable(Language::Turkish) => format!(
                "Sen bir otobüs seferi asistanısın. Yalnızca aşağıdaki tabloya dayanarak Türkçe cevap ver.\n\
                 Kurallar:\n\
                 - En fazla 3 cümle kullan.\n\
                 - Tabloda olmayan bilgi uydurma.\n\
                 - Fiyatları TL, süreleri saat olarak belirt.\n\n\
                 Tablo:\n{context}\n\n\
                 Soru: {user_input}"
            ),
            PromptKind::TripTable(Language::English) => format!(
                "You are an intercity bus trip assistant. Answer in English using only the table below.\n\
                 Rules:\n\
                 - Use at most 3 sentences.\n\
                 - Do not invent information that is not in the table.\n\
                 - Give prices in TRY and durations in hours.\n\n\
                 Table:\n{context}\n\n\
                 Question: {user_input}"
            ),
        }
    }
}

/// Ask `generator` about `context`.
///
/// Blank context short-circuits without calling the generator.
pub async fn generate_answer(
    generator: &dyn Generator,
    context: &str,
    user_input: &str,
    kind: PromptKind,
) -> Answer {
    if context.trim().is_empty() {
        return Answer::Warning(NO_CONTEXT.to_string());
    }

    let prompt = kind.render(context, user_input);
    match request_completion(generator, &prompt).await {
        Ok(text) => Answer::Summary(text),
        Err(e) => {
            warn!(generator = generator.name(), error = %e, "generation failed");
            let reason = match e {
                RagError::Generation(reason) => reason,
                other => other.to_string(),
            };
            Answer::Warning(format!("LLM request failed: {}", reason))
        }
    }
}

/// One trimmed completion; provider failures become [`RagError::Generation`].
pub async fn request_completion(
    generator: &dyn Generator,
    prompt: &str,
) -> std::result::Result<String, RagError> {
    debug!(generator = generator.name(), chars = prompt.len(), "requesting completion");
    generator
        .complete(prompt)
        .await
        .map(|text| text.trim().to_string())
        .map_err(|e| RagError::Generation(format!("{:#}", e)))
}

/// Create the generator named by `config.provider`.
///
/// A provider that cannot be set up (for example a missing API key) is
/// replaced by a [`DisabledGenerator`] carrying the reason, so retrieval keeps
/// working and answers explain what is missing.
pub fn create_generator(config: &GenerationConfig) -> Arc<dyn Generator> {
    let built: Result<Arc<dyn Generator>> = match config.provider.as_str() {
        "gemini" => GeminiGenerator::new(config).map(|g| Arc::new(g) as Arc<dyn Generator>),
        "ollama" => OllamaGenerator::new(config).map(|g| Arc::new(g) as Arc<dyn Generator>),
        "disabled" => Err(anyhow!("generation provider is disabled")),
        other => Err(anyhow!("unknown generation provider: {}", other)),
    };
    built.unwrap_or_else(|e| {
        if config.provider != "disabled" {
            warn!(provider = %config.provider, error = %e, "generation unavailable");
        }
        Arc::new(DisabledGenerator::new(format!("{:#}", e)))
    })
}

pub struct DisabledGenerator {
    reason: String,
}

impl DisabledGenerator {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl Generator for DisabledGenerator {
    fn name(&self) -> &str {
        "disabled"
    }

    async fn complete(&self, _prompt: &str) -> Result<String> {
        Err(anyhow!("{}", self.reason))
    }
}

/// Google Gemini `generateContent`.
pub struct GeminiGenerator {
    model: String,
    api_key: String,
    base_url: String,
    client: reqwest::Client,
    max_retries: u32,
}

impl GeminiGenerator {
    pub fn new(config: &GenerationConfig) -> Result<Self> {
        let api_key = std::env::var(&config.api_key_env)
            .map_err(|_| anyhow!("{} environment variable not set", config.api_key_env))?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            model: config.model.clone(),
            api_key,
            base_url: config
                .url
                .clone()
                .unwrap_or_else(|| "https://generativelanguage.googleapis.com".to_string()),
            client,
            max_retries: config.max_retries,
        })
    }
}

#[async_trait]
impl Generator for GeminiGenerator {
    fn name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, prompt: &str) -> Result<String> {
        let endpoint = format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url.trim_end_matches('/'),
            self.model
        );
        let body = serde_json::json!({
            "contents": [{ "parts": [{ "text": prompt }] }]
        });
        let request = || {
            self.client
                .post(&endpoint)
                .header("x-goog-api-key", &self.api_key)
                .json(&body)
        };
        let json = post_with_retry("Gemini", request, self.max_retries).await?;
        parse_gemini_response(&json)
    }
}

fn parse_gemini_response(json: &serde_json::Value) -> Result<String> {
    let parts = json
        .pointer("/candidates/0/content/parts")
        .and_then(|p| p.as_array())
        .ok_or_else(|| anyhow!("Invalid Gemini response: missing candidates"))?;
    let text: String = parts
        .iter()
        .filter_map(|p| p.get("text").and_then(|t| t.as_str()))
        .collect();
    if text.trim().is_empty() {
        return Err(anyhow!("Gemini returned an empty answer"));
    }
    Ok(text)
}

/// Ollama `/api/generate`, non-streaming.
pub struct OllamaGenerator {
    model: String,
    url: String,
    client: reqwest::Client,
    max_retries: u32,
}

impl OllamaGenerator {
    pub fn new(config: &GenerationConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            model: config.model.clone(),
            url: config
                .url
                .clone()
                .unwrap_or_else(|| "http://localhost:11434".to_string()),
            client,
            max_retries: config.max_retries,
        })
    }
}

#[async_trait]
impl Generator for OllamaGenerator {
    fn name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, prompt: &str) -> Result<String> {
        let endpoint = format!("{}/api/generate", self.url.trim_end_matches('/'));
        let body = serde_json::json!({
            "model": self.model,
            "prompt": prompt,
            "stream": false,
        });
        let request = || self.client.post(&endpoint).json(&body);
        let json = post_with_retry("Ollama", request, self.max_retries).await?;
        json.get("response")
            .and_then(|r| r.as_str())
            .map(str::to_string)
            .ok_or_else(|| anyhow!("Invalid Ollama response: missing response"))
    }
}
