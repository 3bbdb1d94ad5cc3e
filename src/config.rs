use crate::caspio::ResponseFormat;
use crate::error::{AppError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

const CONFIG_DIR_PREFIX: &str = "caspio-client";
const DEFAULT_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct Config {
    pub caspio: CaspioConfig,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct CaspioConfig {
    /// Integration URL of the account, e.g. `https://c1abc123.caspio.com`
    pub account_url: String,
    pub client_id: String,
    pub client_secret: String,
    #[serde(default)]
    pub response_format: ResponseFormat,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

impl Default for CaspioConfig {
    fn default() -> Self {
        Self {
            account_url: String::new(),
            client_id: String::new(),
            client_secret: String::new(),
            response_format: ResponseFormat::default(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

impl CaspioConfig {
    fn base_url(&self) -> &str {
        self.account_url.trim_end_matches('/')
    }

    pub fn token_url(&self) -> String {
        format!("{}/oauth/token", self.base_url())
    }

    pub fn rest_url(&self) -> String {
        format!("{}/rest/v2", self.base_url())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    fn validate(&self) -> Result<()> {
        if self.account_url.is_empty() {
            return Err(AppError::Config(
                "Caspio account_url must be set in config file".to_string(),
            ));
        }

        if self.client_id.is_empty() || self.client_secret.is_empty() {
            return Err(AppError::Config(
                "Caspio client_id and client_secret must be set in config file".to_string(),
            ));
        }

        Ok(())
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let config_path = Self::config_file()?;

        if !config_path.exists() {
            return Err(AppError::Config(format!(
                "Config file not found at {:?}. Please create one.",
                config_path
            )));
        }

        let contents = fs::read_to_string(&config_path)?;
        Self::parse(&contents)
    }

    fn parse(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents)
            .map_err(|e| AppError::Config(format!("Failed to parse config: {}", e)))?;

        config.caspio.validate()?;

        Ok(config)
    }

    fn xdg_dirs() -> xdg::BaseDirectories {
        xdg::BaseDirectories::with_prefix(CONFIG_DIR_PREFIX)
    }

    /// Get the config file path
    pub fn config_file() -> Result<PathBuf> {
        let xdg_dirs = Self::xdg_dirs();
        xdg_dirs
            .place_config_file("config.toml")
            .map_err(|e| AppError::Config(format!("Failed to create config directory: {}", e)))
    }

    /// Get the cache directory path
    pub fn cache_dir() -> Result<PathBuf> {
        let xdg = Self::xdg_dirs();
        xdg.get_cache_home()
            .ok_or_else(|| AppError::Config("Failed to determine cache directory".to_string()))
    }

    /// Get a cache file path
    pub fn cache_file(filename: &str) -> Result<PathBuf> {
        let xdg = Self::xdg_dirs();
        xdg.place_cache_file(filename)
            .map_err(|e| AppError::Config(format!("Failed to create cache file path: {}", e)))
    }
}
