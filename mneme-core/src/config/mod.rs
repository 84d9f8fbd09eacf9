//! Configuration management for mneme.
//!
//! Settings live in a TOML file in the XDG config directory
//! (`~/.config/mneme/config.toml`). Every value has a default, so a missing
//! file or a partial file is always valid. A small number of environment
//! variables override the file for scripting and tests:
//!
//! - `MNEME_CONFIG_DIR` - directory holding `config.toml`
//! - `MNEME_DATA_DIR` - state directory (cache, registry, index, snapshots)
//! - `MNEME_CORPUS_DIR` - corpus root holding `factual/`, `example/`, `rule/`
//!
//! ```toml
//! [store]
//! corpus_dir = "/home/me/corpus"
//! chunk_size = 1000
//! chunk_overlap = 200
//! keep_versions = 5
//!
//! [embedding]
//! url = "http://127.0.0.1:11434"
//! model = "all-minilm"
//! ```

mod settings;
pub mod store;

pub use settings::{
    EmbeddingFileSettings, LoggingSettings, Settings, SettingsError, StoreFileSettings,
};
pub use store::{EmbeddingSettings, StoreSettings};

/// Load .env file if it exists (for development convenience).
pub fn load_dotenv() {
    let _ = dotenvy::dotenv();
}
