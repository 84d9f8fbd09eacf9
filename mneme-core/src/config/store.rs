//! Store configuration types.
//!
//! These types define the resolved (non-optional) settings used by
//! `mneme-store`. They are created from the user-facing file settings in
//! [`super::settings`] via `From`.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::settings::{EmbeddingFileSettings, StoreFileSettings};

/// Resolved store settings (all values filled with defaults).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreSettings {
    /// Override the corpus root directory.
    /// When unset the root is `$MNEME_CORPUS_DIR` or `<data dir>/corpus`.
    #[serde(default)]
    pub corpus_root_override: Option<PathBuf>,
    /// Override the root data directory for all store paths.
    /// When set, everything (cache, registry, index, snapshots) derives from
    /// this root instead of `MNEME_DATA_DIR` / XDG. Primarily for testing.
    #[serde(default)]
    pub data_root_override: Option<PathBuf>,
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
    #[serde(default = "default_keep_versions")]
    pub keep_versions: usize,
    #[serde(default = "default_watch_debounce_ms")]
    pub watch_debounce_ms: u64,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            corpus_root_override: None,
            data_root_override: None,
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
            keep_versions: default_keep_versions(),
            watch_debounce_ms: default_watch_debounce_ms(),
        }
    }
}

/// Resolved embedding endpoint settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingSettings {
    #[serde(default = "default_embedding_url")]
    pub base_url: String,
    #[serde(default = "default_embedding_model")]
    pub model: String,
    #[serde(default)]
    pub dimensions: Option<usize>,
    #[serde(default = "default_embedding_batch")]
    pub batch: usize,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            base_url: default_embedding_url(),
            model: default_embedding_model(),
            dimensions: None,
            batch: default_embedding_batch(),
        }
    }
}

fn default_chunk_size() -> usize {
    1000
}

fn default_chunk_overlap() -> usize {
    200
}

fn default_keep_versions() -> usize {
    5
}

fn default_watch_debounce_ms() -> u64 {
    2000
}

fn default_embedding_url() -> String {
    std::env::var("MNEME_EMBEDDING_URL")
        .ok()
        .filter(|url| !url.is_empty())
        .unwrap_or_else(|| "http://127.0.0.1:11434".to_string())
}

fn default_embedding_model() -> String {
    "all-minilm".to_string()
}

fn default_embedding_batch() -> usize {
    32
}

impl From<&StoreFileSettings> for StoreSettings {
    fn from(value: &StoreFileSettings) -> Self {
        let mut settings = StoreSettings::default();
        if let Some(dir) = &value.corpus_dir {
            settings.corpus_root_override = Some(PathBuf::from(dir));
        }
        if let Some(dir) = &value.data_dir {
            settings.data_root_override = Some(PathBuf::from(dir));
        }
        if let Some(size) = value.chunk_size {
            settings.chunk_size = size;
        }
        if let Some(overlap) = value.chunk_overlap {
            settings.chunk_overlap = overlap;
        }
        if let Some(keep) = value.keep_versions {
            settings.keep_versions = keep;
        }
        if let Some(ms) = value.watch_debounce_ms {
            settings.watch_debounce_ms = ms;
        }
        settings
    }
}

impl From<&EmbeddingFileSettings> for EmbeddingSettings {
    fn from(value: &EmbeddingFileSettings) -> Self {
        let mut settings = EmbeddingSettings::default();
        if let Some(url) = &value.url {
            settings.base_url = url.clone();
        }
        if let Some(model) = &value.model {
            settings.model = model.clone();
        }
        if let Some(dim) = value.dimensions {
            settings.dimensions = Some(dim);
        }
        if let Some(batch) = value.batch {
            settings.batch = batch;
        }
        settings
    }
}
