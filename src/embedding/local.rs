//! Local inference via fastembed.
//!
//! `TextEmbedding` needs exclusive access while embedding, so the model sits
//! behind `Arc<Mutex<_>>` and every call runs on the blocking pool.

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use tracing::info;

use super::EmbeddingProvider;
use crate::config::EmbeddingConfig;

pub const DEFAULT_MODEL: &str = "all-minilm-l6-v2";

pub struct LocalProvider {
    model: Arc<Mutex<fastembed::TextEmbedding>>,
    model_name: String,
    dims: usize,
    batch_size: usize,
}

impl LocalProvider {
    /// Load the model. Downloads it on first use, then runs offline.
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let model_name = config
            .model
            .clone()
            .unwrap_or_else(|| DEFAULT_MODEL.to_string());
        let (model_enum, native_dims) = resolve_model(&model_name)?;
        if let Some(dims) = config.dims {
            if dims != native_dims {
                bail!(
                    "embedding.dims = {} but model '{}' produces {} dimensions",
                    dims,
                    model_name,
                    native_dims
                );
            }
        }

        info!(model = %model_name, "loading local embedding model");
        let text_embedding = fastembed::TextEmbedding::try_new(
            fastembed::InitOptions::new(model_enum).with_show_download_progress(false),
        )
        .map_err(|e| anyhow!("Failed to initialize local embedding model: {}", e))?;

        Ok(Self {
            model: Arc::new(Mutex::new(text_embedding)),
            model_name,
            dims: native_dims,
            batch_size: config.batch_size,
        })
    }
}

#[async_trait]
impl EmbeddingProvider for LocalProvider {
    fn model_name(&self) -> &str {
        &self.model_name
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let model = self.model.clone();
        let texts = texts.to_vec();
        let batch_size = self.batch_size;

        tokio::task::spawn_blocking(move || {
            let mut model = model
                .lock()
                .map_err(|e| anyhow!("embedding model mutex poisoned: {}", e))?;
            model
                .embed(texts, Some(batch_size))
                .map_err(|e| anyhow!("Local embedding failed: {}", e))
        })
        .await?
    }
}

fn resolve_model(name: &str) -> Result<(fastembed::EmbeddingModel, usize)> {
    use fastembed::EmbeddingModel as M;
    match name {
        "all-minilm-l6-v2" => Ok((M::AllMiniLML6V2, 384)),
        "bge-small-en-v1.5" => Ok((M::BGESmallENV15, 384)),
        "bge-base-en-v1.5" => Ok((M::BGEBaseENV15, 768)),
        "bge-large-en-v1.5" => Ok((M::BGELargeENV15, 1024)),
        "multilingual-e5-small" => Ok((M::MultilingualE5Small, 384)),
        "multilingual-e5-base" => Ok((M::MultilingualE5Base, 768)),
        other => bail!(
            "Unknown local embedding model: '{}'. Supported models: \
             all-minilm-l6-v2, bge-small-en-v1.5, bge-base-en-v1.5, bge-large-en-v1.5, \
             multilingual-e5-small, multilingual-e5-base",
            other
        ),
    }
}
