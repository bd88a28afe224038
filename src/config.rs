//! TOML configuration.
//!
//! One file configures the embedder, the generation collaborator, retrieval
//! and watcher tuning, the HTTP server, the evaluator, and the two record
//! instances (`[logs]`, `[trips]`). Either instance may be omitted.
//!
//! ```toml
//! [embedding]
//! provider = "local"
//! model = "all-minilm-l6-v2"
//!
//! [generation]
//! provider = "gemini"
//!
//! [logs]
//! data_dir = "data/logs"
//! snapshot_path = "data/logs.idx"
//! ```

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub watcher: WatcherConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub evaluation: EvaluationConfig,
    pub logs: Option<SourceConfig>,
    pub trips: Option<SourceConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_embedding_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub url: Option<String>,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            model: None,
            dims: None,
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
            url: None,
        }
    }
}

fn default_embedding_provider() -> String {
    "local".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct GenerationConfig {
    #[serde(default = "default_generation_provider")]
    pub provider: String,
    #[serde(default = "default_generation_model")]
    pub model: String,
    /// Environment variable holding the API key.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_generation_retries")]
    pub max_retries: u32,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            provider: default_generation_provider(),
            model: default_generation_model(),
            api_key_env: default_api_key_env(),
            url: None,
            timeout_secs: default_timeout_secs(),
            max_retries: default_generation_retries(),
        }
    }
}

fn default_generation_provider() -> String {
    "disabled".to_string()
}
fn default_generation_model() -> String {
    "gemini-2.5-flash".to_string()
}
fn default_api_key_env() -> String {
    "GEMINI_API_KEY".to_string()
}
fn default_generation_retries() -> u32 {
    2
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
        }
    }
}

fn default_top_k() -> usize {
    3
}

/// What the watcher does with a changed file.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum UpdatePolicy {
    /// Re-embed the changed file and append its rows. Rows that were already
    /// indexed appear again.
    #[default]
    Append,
    /// Rebuild the corpus from every source file and swap it in.
    Rebuild,
}

#[derive(Debug, Deserialize, Clone)]
pub struct WatcherConfig {
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    #[serde(default)]
    pub policy: UpdatePolicy,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            policy: UpdatePolicy::default(),
        }
    }
}

fn default_interval_secs() -> u64 {
    15
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:7341".to_string()
}

/// One record instance: where its CSV files live and where its index
/// snapshot goes.
#[derive(Debug, Deserialize, Clone)]
pub struct SourceConfig {
    pub data_dir: PathBuf,
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
    #[serde(default)]
    pub snapshot_path: Option<PathBuf>,
}

fn default_include_globs() -> Vec<String> {
    vec!["*.csv".to_string()]
}

#[derive(Debug, Deserialize, Clone)]
pub struct EvaluationConfig {
    #[serde(default = "default_report_path")]
    pub report_path: PathBuf,
    #[serde(default = "default_top_k")]
    pub k: usize,
    #[serde(default)]
    pub queries: Vec<EvalQuery>,
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        Self {
            report_path: default_report_path(),
            k: default_top_k(),
            queries: Vec::new(),
        }
    }
}

fn default_report_path() -> PathBuf {
    PathBuf::from("data/eval_results.csv")
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct EvalQuery {
    pub query: String,
    pub keywords: Vec<String>,
}

impl EvaluationConfig {
    /// Configured queries, or the built-in network-log set.
    pub fn queries_or_default(&self) -> Vec<EvalQuery> {
        if !self.queries.is_empty() {
            return self.queries.clone();
        }
        [
            ("packet loss in node 1", ["packet loss", "node_1"]),
            ("cpu usage high", ["cpu usage", "threshold"]),
            ("link down alert", ["link down", "interface"]),
            ("power issue node 5", ["power", "node_5"]),
        ]
        .iter()
        .map(|(q, kws)| EvalQuery {
            query: q.to_string(),
            keywords: kws.iter().map(|k| k.to_string()).collect(),
        })
        .collect()
    }
}

impl Config {
    pub fn logs(&self) -> Result<&SourceConfig> {
        self.logs
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("[logs] instance not configured"))
    }

    pub fn trips(&self) -> Result<&SourceConfig> {
        self.trips
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("[trips] instance not configured"))
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    if config.retrieval.top_k < 1 {
        bail!("retrieval.top_k must be >= 1");
    }
    if config.evaluation.k < 1 {
        bail!("evaluation.k must be >= 1");
    }
    if config.watcher.interval_secs < 1 {
        bail!("watcher.interval_secs must be >= 1");
    }
    if config.embedding.batch_size < 1 {
        bail!("embedding.batch_size must be >= 1");
    }

    match config.embedding.provider.as_str() {
        "disabled" | "local" | "hashed" => {}
        "openai" | "ollama" => {
            if config.embedding.model.is_none() {
                bail!(
                    "embedding.model must be specified when provider is '{}'",
                    config.embedding.provider
                );
            }
            if config.embedding.dims.unwrap_or(0) == 0 {
                bail!(
                    "embedding.dims must be > 0 when provider is '{}'",
                    config.embedding.provider
                );
            }
        }
        other => bail!(
            "Unknown embedding provider: '{}'. Must be local, hashed, openai, ollama, or disabled.",
            other
        ),
    }

    match config.generation.provider.as_str() {
        "disabled" | "gemini" | "ollama" => {}
        other => bail!(
            "Unknown generation provider: '{}'. Must be gemini, ollama, or disabled.",
            other
        ),
    }

    for (name, source) in [("logs", &config.logs), ("trips", &config.trips)] {
        if let Some(s) = source {
            if s.include_globs.is_empty() {
                bail!("{}.include_globs must not be empty", name);
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config: Config = toml::from_str(
            r#"
            [logs]
            data_dir = "data"
            "#,
        )
        .unwrap();
        validate(&config).unwrap();
        assert_eq!(config.retrieval.top_k, 3);
        assert_eq!(config.watcher.interval_secs, 15);
        assert_eq!(config.watcher.policy, UpdatePolicy::Append);
        assert_eq!(config.embedding.provider, "local");
        assert_eq!(config.logs().unwrap().include_globs, vec!["*.csv"]);
        assert!(config.trips().is_err());
    }

    #[test]
    fn test_rebuild_policy() {
        let config: Config = toml::from_str(
            r#"
            [watcher]
            policy = "rebuild"
            interval_secs = 2
            "#,
        )
        .unwrap();
        assert_eq!(config.watcher.policy, UpdatePolicy::Rebuild);
    }

    #[test]
    fn test_remote_embedding_requires_dims() {
        let config: Config = toml::from_str(
            r#"
            [embedding]
            provider = "openai"
            model = "text-embedding-3-small"
            "#,
        )
        .unwrap();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_unknown_generation_provider() {
        let config: Config = toml::from_str(
            r#"
            [generation]
            provider = "telepathy"
            "#,
        )
        .unwrap();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_default_eval_queries() {
        let queries = EvaluationConfig::default().queries_or_default();
        assert_eq!(queries.len(), 4);
        assert_eq!(queries[0].keywords, vec!["packet loss", "node_1"]);
    }
}
