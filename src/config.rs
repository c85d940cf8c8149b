//! Runtime configuration, read from the environment (and `.env` via dotenvy).

use crate::ai::providers::gemini::DEFAULT_ENDPOINT;
use crate::storage::{DEFAULT_STORAGE_KEY, FileStorage};
use reqwest::Url;
use std::path::PathBuf;

const API_KEY_VARS: &[&str] = &["GEMINI_API_KEY", "VITE_GEMINI_API_KEY"];

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid GEMINI_ENDPOINT '{value}': {reason}")]
    InvalidEndpoint { value: String, reason: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Missing key is allowed here; the completion client reports it per call.
    pub api_key: Option<String>,
    pub endpoint: String,
    pub storage_key: String,
    pub data_dir: PathBuf,
    /// Answer with canned replies instead of calling the API.
    pub offline: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_key: None,
            endpoint: DEFAULT_ENDPOINT.to_string(),
            storage_key: DEFAULT_STORAGE_KEY.to_string(),
            data_dir: FileStorage::default_root(),
            offline: false,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from any variable source; `from_env` passes the process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());
        let defaults = Self::default();

        let api_key = API_KEY_VARS.iter().find_map(|name| non_empty(*name));

        let endpoint = match non_empty("GEMINI_ENDPOINT") {
            Some(value) => validate_endpoint(value.trim())?,
            None => defaults.endpoint,
        };

        let storage_key = non_empty("CHATBOT_STORAGE_KEY").unwrap_or(defaults.storage_key);
        let data_dir = non_empty("CHATBOT_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or(defaults.data_dir);
        let offline = non_empty("CHATBOT_OFFLINE").is_some_and(|value| is_truthy(&value));

        Ok(Self {
            api_key,
            endpoint,
            storage_key,
            data_dir,
            offline,
        })
    }
}

fn is_truthy(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

fn validate_endpoint(value: &str) -> Result<String, ConfigError> {
    let invalid = |reason: String| ConfigError::InvalidEndpoint {
        value: value.to_string(),
        reason,
    };

    let url = Url::parse(value).map_err(|e| invalid(e.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(invalid(format!("unsupported scheme '{}'", url.scheme())));
    }
    Ok(value.to_string())
}
