pub mod config;

pub use config::{
    EmbeddingSettings, LoggingSettings, Settings, SettingsError, StoreSettings, load_dotenv,
};
