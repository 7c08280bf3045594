use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};

use super::datasets::DatasetRegistry;

/// Environment variable holding the open-data portal key.
pub const API_KEY_ENV: &str = "DATA_GOV_API_KEY";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub api: ApiSection,
    #[serde(default)]
    pub data: DataSection,
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub chat: ChatSection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiSection {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_page_limit")]
    pub page_limit: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataSection {
    #[serde(default = "default_data_dir")]
    pub dir: PathBuf,
    #[serde(default = "default_rice_file")]
    pub rice_file: String,
    #[serde(default = "default_jowar_file")]
    pub jowar_file: String,
    #[serde(default = "default_rainfall_cache_file")]
    pub rainfall_cache_file: String,
    #[serde(default)]
    pub registry_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSection {
    #[serde(default = "default_bind")]
    pub bind: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatSection {
    #[serde(default = "default_webhook_url")]
    pub webhook_url: String,
    #[serde(default)]
    pub sender: Option<String>,
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: u64,
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,
}

fn default_base_url() -> String {
    "https://api.data.gov.in".to_string()
}
fn default_page_limit() -> u32 {
    1000
}
fn default_timeout_secs() -> u64 {
    15
}
fn default_user_agent() -> String {
    "SamarthRainfallBot/1.0".to_string()
}
fn default_data_dir() -> PathBuf {
    PathBuf::from("data_json")
}
fn default_rice_file() -> String {
    "rice.json".to_string()
}
fn default_jowar_file() -> String {
    "jowar.json".to_string()
}
fn default_rainfall_cache_file() -> String {
    "rainfall_district.json".to_string()
}
fn default_bind() -> String {
    "0.0.0.0:5055".to_string()
}
fn default_webhook_url() -> String {
    "http://localhost:5005/webhooks/rest/webhook".to_string()
}
fn default_cache_capacity() -> u64 {
    256
}
fn default_cache_ttl_secs() -> u64 {
    600
}

impl Default for ApiSection {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_key: None,
            page_limit: default_page_limit(),
            timeout_secs: default_timeout_secs(),
            user_agent: default_user_agent(),
        }
    }
}

impl Default for DataSection {
    fn default() -> Self {
        Self {
            dir: default_data_dir(),
            rice_file: default_rice_file(),
            jowar_file: default_jowar_file(),
            rainfall_cache_file: default_rainfall_cache_file(),
            registry_file: None,
        }
    }
}

impl Default for ServerSection {
    fn default() -> Self {
        Self { bind: default_bind() }
    }
}

impl Default for ChatSection {
    fn default() -> Self {
        Self {
            webhook_url: default_webhook_url(),
            sender: None,
            cache_capacity: default_cache_capacity(),
            cache_ttl_secs: default_cache_ttl_secs(),
        }
    }
}

impl AppConfig {
    /// Layers an optional TOML file and `SAMARTH_*` environment variables
    /// (e.g. `SAMARTH_API__TIMEOUT_SECS`) over the defaults, then picks up
    /// the API key from `DATA_GOV_API_KEY` when the file did not set one.
    pub fn load(path: &Path) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::from(path).required(false))
            .add_source(
                config::Environment::with_prefix("SAMARTH")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .with_context(|| format!("Failed to read configuration: {}", path.display()))?;

        let mut config: AppConfig = settings
            .try_deserialize()
            .with_context(|| format!("Failed to parse configuration: {}", path.display()))?;

        config.load_credentials();
        Ok(config)
    }

    pub fn load_credentials(&mut self) {
        if self.api.api_key.as_deref().is_none_or(str::is_empty) {
            self.api.api_key = env::var(API_KEY_ENV).ok().filter(|key| !key.trim().is_empty());
        }
    }

    /// The key is mandatory for anything that talks to the portal. There is
    /// no built-in fallback key.
    pub fn get_api_key(&self) -> Result<&str> {
        self.api.api_key.as_deref().ok_or_else(|| {
            anyhow!(
                "Missing open-data API key: set {} or api.api_key in the config file",
                API_KEY_ENV
            )
        })
    }

    pub fn dataset_registry(&self) -> Result<DatasetRegistry> {
        match &self.data.registry_file {
            Some(path) => DatasetRegistry::from_file(path),
            None => Ok(DatasetRegistry::builtin()),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.api.base_url.is_empty() {
            return Err(anyhow!("api.base_url cannot be empty"));
        }
        if self.api.page_limit == 0 {
            return Err(anyhow!("api.page_limit must be positive"));
        }
        if self.chat.cache_capacity == 0 {
            return Err(anyhow!("chat.cache_capacity must be positive"));
        }
        self.get_api_key()?;
        Ok(())
    }
}
