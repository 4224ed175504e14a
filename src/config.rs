use serde::Deserialize;
use std::env;
use std::fs;
use std::path::Path;

/// Application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub retry: RetrySettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

/// Blob backend selection plus the per-backend connection parameters.
/// The selector string is resolved once at startup; see `storage::select_backend`.
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_backend")]
    pub backend: String,
    #[serde(default)]
    pub local: LocalBackendConfig,
    #[serde(default)]
    pub cloud: CloudBackendConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LocalBackendConfig {
    #[serde(default = "default_local_root")]
    pub root_path: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CloudBackendConfig {
    #[serde(default)]
    pub secret_id: String,
    #[serde(default)]
    pub secret_key: String,
    #[serde(default)]
    pub bucket: String,
    #[serde(default)]
    pub region: String,
    /// Overrides the derived object-store host when set.
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub base_path: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RetrySettings {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,
}

// Default values
fn default_db_path() -> String {
    "data/strongbox.db".to_string()
}

fn default_backend() -> String {
    "Local".to_string()
}

fn default_local_root() -> String {
    "data/blobs".to_string()
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_delay_ms() -> u64 {
    250
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            local: LocalBackendConfig::default(),
            cloud: CloudBackendConfig::default(),
        }
    }
}

impl Default for LocalBackendConfig {
    fn default() -> Self {
        Self {
            root_path: default_local_root(),
        }
    }
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay_ms: default_initial_delay_ms(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database: DatabaseConfig::default(),
            storage: StorageConfig::default(),
            retry: RetrySettings::default(),
        }
    }
}

impl Config {
    /// Load configuration from file and environment variables
    pub fn load() -> anyhow::Result<Self> {
        let mut config = Self::load_from_file()?;
        config.apply_env_overrides();
        config.ensure_directories()?;
        Ok(config)
    }

    /// Load configuration from config.toml
    fn load_from_file() -> anyhow::Result<Self> {
        let config_paths = ["config.toml", "data/config.toml"];

        for path in config_paths {
            if Path::new(path).exists() {
                let content = fs::read_to_string(path)?;
                let config: Config = toml::from_str(&content)?;
                tracing::info!("Loaded configuration from {}", path);
                return Ok(config);
            }
        }

        tracing::info!("No configuration file found, using defaults");
        Ok(Config::default())
    }

    /// Apply environment variable overrides
    /// Format: SB_CONF_<SECTION>_<KEY>
    fn apply_env_overrides(&mut self) {
        if let Ok(val) = env::var("SB_CONF_DATABASE_PATH") {
            self.database.path = val;
        }

        if let Ok(val) = env::var("SB_CONF_STORAGE_BACKEND") {
            self.storage.backend = val;
        }
        if let Ok(val) = env::var("SB_CONF_STORAGE_LOCAL_ROOT") {
            self.storage.local.root_path = val;
        }
        if let Ok(val) = env::var("SB_CONF_STORAGE_CLOUD_BUCKET") {
            self.storage.cloud.bucket = val;
        }
        if let Ok(val) = env::var("SB_CONF_STORAGE_CLOUD_REGION") {
            self.storage.cloud.region = val;
        }
        if let Ok(val) = env::var("SB_CONF_STORAGE_CLOUD_SECRET_ID") {
            self.storage.cloud.secret_id = val;
        }
        if let Ok(val) = env::var("SB_CONF_STORAGE_CLOUD_SECRET_KEY") {
            self.storage.cloud.secret_key = val;
        }
        if let Ok(val) = env::var("SB_CONF_STORAGE_CLOUD_ENDPOINT") {
            if !val.trim().is_empty() {
                self.storage.cloud.endpoint = Some(val);
            }
        }

        if let Ok(val) = env::var("SB_CONF_RETRY_MAX_ATTEMPTS") {
            if let Ok(n) = val.parse() {
                self.retry.max_attempts = n;
            }
        }
        if let Ok(val) = env::var("SB_CONF_RETRY_INITIAL_DELAY_MS") {
            if let Ok(ms) = val.parse() {
                self.retry.initial_delay_ms = ms;
            }
        }
    }

    /// Ensure required directories exist
    fn ensure_directories(&self) -> anyhow::Result<()> {
        if let Some(parent) = Path::new(&self.database.path).parent() {
            fs::create_dir_all(parent)?;
        }

        fs::create_dir_all(&self.storage.local.root_path)?;

        Ok(())
    }
}
