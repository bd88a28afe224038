#![allow(dead_code)]

use async_trait::async_trait;
use record_rag::config::{EmbeddingConfig, SourceConfig};
use record_rag::embedding::{Embedder, EmbeddingProvider, HashedProvider};
use record_rag::generation::Generator;
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

pub const LOG_HEADER: &str = "timestamp,node_id,severity,alarm_code,message\n";
pub const TRIP_HEADER: &str =
    "from_city,to_city,avg_duration_hr,avg_price_try,company,freq_per_day\n";

pub fn log_line(node: &str, severity: &str, alarm: &str, message: &str) -> String {
    format!("2025-01-01 10:00:00,{node},{severity},{alarm},{message}\n")
}

pub fn write_logs(dir: &Path, name: &str, lines: &[String]) {
    let mut body = LOG_HEADER.to_string();
    for line in lines {
        body.push_str(line);
    }
    fs::write(dir.join(name), body).unwrap();
}

pub fn sample_logs() -> Vec<String> {
    vec![
        log_line("node_1", "critical", "PKT_LOSS", "packet loss detected on node_1 uplink"),
        log_line("node_2", "warning", "CPU_HIGH", "cpu usage above threshold on node_2"),
        log_line("node_3", "critical", "LINK_DOWN", "link down on interface eth0"),
        log_line("node_5", "critical", "PWR_FAIL", "power supply failure on node_5"),
    ]
}

pub fn hashed_embedder() -> Arc<Embedder> {
    let config = EmbeddingConfig {
        provider: "hashed".to_string(),
        dims: Some(64),
        ..Default::default()
    };
    Arc::new(Embedder::from_config(&config).unwrap())
}

/// Hashed provider whose dimension can be changed after the index is built,
/// the way a swapped model would.
pub struct ResizableProvider {
    pub dims: Arc<AtomicUsize>,
}

#[async_trait]
impl EmbeddingProvider for ResizableProvider {
    fn model_name(&self) -> &str {
        "resizable"
    }

    fn dims(&self) -> usize {
        self.dims.load(Ordering::SeqCst)
    }

    async fn embed_batch(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        HashedProvider::new(self.dims()).embed_batch(texts).await
    }
}

pub fn resizable_embedder(dims: usize) -> (Arc<Embedder>, Arc<AtomicUsize>) {
    let dims = Arc::new(AtomicUsize::new(dims));
    let provider = ResizableProvider {
        dims: Arc::clone(&dims),
    };
    (Arc::new(Embedder::with_provider(Box::new(provider), 16)), dims)
}

pub fn source_config(dir: &Path) -> SourceConfig {
    SourceConfig {
        data_dir: dir.to_path_buf(),
        include_globs: vec!["*.csv".to_string()],
        exclude_globs: vec![],
        snapshot_path: None,
    }
}

/// Generator that records how often it was called.
pub struct CountingGenerator {
    pub calls: AtomicUsize,
}

impl CountingGenerator {
    pub fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Generator for CountingGenerator {
    fn name(&self) -> &str {
        "counting"
    }

    async fn complete(&self, _prompt: &str) -> anyhow::Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok("Packet loss on node_1 caused by a failing uplink.".to_string())
    }
}
