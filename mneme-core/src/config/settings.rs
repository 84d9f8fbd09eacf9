//! Settings configuration loaded from TOML files.
//!
//! This module handles the user-facing configuration stored in TOML format
//! in the XDG config directory (~/.config/mneme/config.toml). All fields are
//! optional here; resolution into non-optional runtime settings happens in
//! [`super::store`].

use std::fs;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Default TOML configuration file content
const DEFAULT_CONFIG_TOML: &str = r#"# mneme configuration file
# Located at: ~/.config/mneme/config.toml
#
# Every value is optional; unset values fall back to built-in defaults.

[store]
# Corpus root holding factual/, example/ and rule/ directories.
# Defaults to ~/.local/share/mneme/corpus (or $MNEME_CORPUS_DIR).
# corpus_dir = "/home/me/corpus"

# State directory for the build cache, version registry, index and
# snapshots. Defaults to ~/.local/share/mneme (or $MNEME_DATA_DIR).
# data_dir = "/home/me/.mneme"

# Chunking of factual documents before indexing.
# chunk_size = 1000
# chunk_overlap = 200

# Default number of snapshots kept by `mneme cleanup`.
# keep_versions = 5

# Debounce window for `mneme watch`, in milliseconds.
# watch_debounce_ms = 2000

[embedding]
# Ollama-compatible embedding endpoint.
# url = "http://127.0.0.1:11434"
# model = "all-minilm"
# dimensions = 384
# batch = 32

[logging]
level = "info"
"#;

/// Settings loaded from the TOML configuration file.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Settings {
    /// Store configuration (corpus location, state dir, chunking, retention)
    #[serde(default)]
    pub store: StoreFileSettings,

    /// Embedding endpoint configuration
    #[serde(default)]
    pub embedding: EmbeddingFileSettings,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingSettings,
}

/// Store settings as written in the config file (all optional).
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct StoreFileSettings {
    /// Corpus root directory
    pub corpus_dir: Option<String>,

    /// State directory (cache, registry, index, snapshots)
    pub data_dir: Option<String>,

    /// Chunk size for factual documents, in characters
    pub chunk_size: Option<usize>,

    /// Overlap between consecutive chunks, in characters
    pub chunk_overlap: Option<usize>,

    /// Default snapshot retention for cleanup
    pub keep_versions: Option<usize>,

    /// Watch-mode debounce window in milliseconds
    pub watch_debounce_ms: Option<u64>,
}

/// Embedding settings as written in the config file (all optional).
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct EmbeddingFileSettings {
    /// Embedding provider base URL
    pub url: Option<String>,

    /// Embedding model name
    pub model: Option<String>,

    /// Embedding dimension (if known)
    pub dimensions: Option<usize>,

    /// Embedding batch size
    pub batch: Option<usize>,
}

/// Logging settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingSettings {
    /// Log level (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// Errors that can occur when loading settings
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Config directory not found")]
    ConfigDirNotFound,
}

impl Settings {
    /// Load settings from the TOML configuration file.
    ///
    /// If the config file doesn't exist, creates it with default values.
    /// The file is located at `~/.config/mneme/config.toml`.
    pub fn load() -> Result<Self, SettingsError> {
        let config_path = Self::config_path()?;

        if !config_path.exists() {
            tracing::info!("Creating default configuration at {:?}", config_path);
            Self::create_default_config(&config_path)?;
        }

        let content = fs::read_to_string(&config_path)?;
        Self::from_toml(&content)
    }

    /// Parse settings from TOML content.
    pub fn from_toml(content: &str) -> Result<Self, SettingsError> {
        let settings: Self = toml::from_str(content)?;
        Ok(settings)
    }

    /// Serialize settings to TOML content.
    pub fn to_toml(&self) -> Result<String, SettingsError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Get the configuration file path.
    ///
    /// Uses XDG config directory: `~/.config/mneme/config.toml`
    pub fn config_path() -> Result<PathBuf, SettingsError> {
        if let Ok(override_dir) = std::env::var("MNEME_CONFIG_DIR") {
            let dir = PathBuf::from(override_dir);
            return Ok(dir.join("config.toml"));
        }

        let config_dir = dirs::config_dir()
            .ok_or(SettingsError::ConfigDirNotFound)?
            .join("mneme");

        Ok(config_dir.join("config.toml"))
    }

    /// Create the default configuration file.
    fn create_default_config(path: &PathBuf) -> Result<(), SettingsError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        fs::write(path, DEFAULT_CONFIG_TOML)?;

        Ok(())
    }

    /// Save settings to the default configuration file path.
    pub fn save(&self) -> Result<(), SettingsError> {
        let config_path = Self::config_path()?;
        self.save_to_path(&config_path)
    }

    /// Save settings to a specific file path.
    pub fn save_to_path(&self, path: &PathBuf) -> Result<(), SettingsError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let content = self.to_toml()?;
        fs::write(path, content)?;
        Ok(())
    }
}
