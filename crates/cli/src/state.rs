use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use blob_store::{
    BlobProvider, BlobStoreError, ObjectStoreConfig, RetryPolicy, StaticContentModel,
    StorageOptions, SweepConfig, Template,
};
use serde::{Deserialize, Serialize};

pub const APP_NAME: &str = "cloudblob";
pub const CONFIG_FILE_NAME: &str = "config.toml";
pub const DB_FILE_NAME: &str = "blobs.sqlite";
pub const OBJECTS_DIR_NAME: &str = "objects";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Upper bound on a single object storage call
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Where blob bytes are stored
    #[serde(default)]
    pub object_store: ObjectStoreConfig,
    #[serde(default)]
    pub sweep: SweepSettings,
    #[serde(default)]
    pub log: LogSettings,
    /// Templates consulted for blob references during a sweep
    #[serde(default)]
    pub templates: Vec<Template>,
}

fn default_request_timeout_secs() -> u64 {
    30
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: default_request_timeout_secs(),
            object_store: ObjectStoreConfig::default(),
            sweep: SweepSettings::default(),
            log: LogSettings::default(),
            templates: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepSettings {
    /// Blobs written more recently than this are never swept
    #[serde(default = "default_grace_secs")]
    pub grace_secs: u64,
    /// Time between scheduled sweeps
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
}

fn default_grace_secs() -> u64 {
    60 * 60
}

fn default_interval_secs() -> u64 {
    60 * 60
}

fn default_max_attempts() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    500
}

impl Default for SweepSettings {
    fn default() -> Self {
        Self {
            grace_secs: default_grace_secs(),
            interval_secs: default_interval_secs(),
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
        }
    }
}

impl SweepSettings {
    pub fn sweep_config(&self) -> SweepConfig {
        SweepConfig {
            grace_window: Duration::from_secs(self.grace_secs),
            retry: RetryPolicy {
                max_attempts: self.max_attempts,
                base_delay: Duration::from_millis(self.base_delay_ms),
                ..RetryPolicy::default()
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogSettings {
    /// Default level when RUST_LOG is unset
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Also write daily-rolling log files here
    #[serde(default)]
    pub dir: Option<PathBuf>,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            dir: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppState {
    /// Path to the config directory (~/.cloudblob)
    pub app_dir: PathBuf,
    /// Path to the SQLite blob ledger
    pub db_path: PathBuf,
    /// Path to the config file
    pub config_path: PathBuf,
    /// Loaded configuration
    pub config: AppConfig,
}

impl AppState {
    /// Get the config directory path (custom or default ~/.cloudblob)
    pub fn app_dir(custom_path: Option<PathBuf>) -> Result<PathBuf, StateError> {
        if let Some(path) = custom_path {
            return Ok(path);
        }

        let home = dirs::home_dir().ok_or(StateError::NoHomeDirectory)?;
        Ok(home.join(format!(".{}", APP_NAME)))
    }

    /// Default object storage for a config directory: a local `objects/` folder.
    pub fn default_object_store(app_dir: &Path) -> ObjectStoreConfig {
        ObjectStoreConfig::Local {
            path: app_dir.join(OBJECTS_DIR_NAME),
        }
    }

    /// Initialize a new config directory.
    ///
    /// The ledger database itself is created by the caller once a runtime
    /// is available.
    pub fn init(custom_path: Option<PathBuf>, config: AppConfig) -> Result<Self, StateError> {
        let app_dir = Self::app_dir(custom_path)?;

        if app_dir.join(CONFIG_FILE_NAME).exists() {
            return Err(StateError::AlreadyInitialized);
        }

        fs::create_dir_all(&app_dir)?;

        let config_path = app_dir.join(CONFIG_FILE_NAME);
        let config_toml = toml::to_string_pretty(&config)?;
        fs::write(&config_path, config_toml)?;

        let db_path = app_dir.join(DB_FILE_NAME);

        Ok(Self {
            app_dir,
            db_path,
            config_path,
            config,
        })
    }

    /// Load existing state from the config directory
    pub fn load(custom_path: Option<PathBuf>) -> Result<Self, StateError> {
        let app_dir = Self::app_dir(custom_path)?;

        if !app_dir.exists() {
            return Err(StateError::NotInitialized);
        }

        let db_path = app_dir.join(DB_FILE_NAME);
        let config_path = app_dir.join(CONFIG_FILE_NAME);

        if !config_path.exists() {
            return Err(StateError::MissingFile(CONFIG_FILE_NAME.to_string()));
        }
        if !db_path.exists() {
            return Err(StateError::MissingFile(DB_FILE_NAME.to_string()));
        }

        let config_toml = fs::read_to_string(&config_path)?;
        let config: AppConfig = toml::from_str(&config_toml)?;

        Ok(Self {
            app_dir,
            db_path,
            config_path,
            config,
        })
    }

    pub fn storage_options(&self) -> StorageOptions {
        StorageOptions {
            request_timeout: Duration::from_secs(self.config.request_timeout_secs),
            ..StorageOptions::default()
        }
    }

    /// Open the blob provider described by the config.
    pub async fn provider(&self) -> Result<BlobProvider, BlobStoreError> {
        let provider = BlobProvider::new(
            &self.db_path,
            self.config.object_store.clone(),
            &self.storage_options(),
        )
        .await?;
        Ok(provider.with_sweep_config(self.config.sweep.sweep_config()))
    }

    /// Content model built from the configured templates.
    pub fn content_model(&self) -> StaticContentModel {
        StaticContentModel::new(self.config.templates.clone())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("cloudblob directory not initialized. Run 'cloudblob init' first")]
    NotInitialized,

    #[error("cloudblob directory already initialized")]
    AlreadyInitialized,

    #[error("no home directory found")]
    NoHomeDirectory,

    #[error("missing required file: {0}")]
    MissingFile(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML serialization error: {0}")]
    TomlSer(#[from] toml::ser::Error),

    #[error("TOML deserialization error: {0}")]
    TomlDe(#[from] toml::de::Error),
}
