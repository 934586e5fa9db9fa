use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use camino::Utf8PathBuf;
use directories::BaseDirs;
use serde::{Deserialize, Serialize};

use crate::error::EuDataError;

pub const DEFAULT_SPARQL_ENDPOINT: &str = "https://data.europa.eu/sparql";
pub const DEFAULT_REST_API_BASE: &str = "https://data.europa.eu/api/hub/repo/datasets/";
pub const DEFAULT_CACHE_TTL_SECS: u64 = 86_400;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 120;
pub const DEFAULT_REQUEST_DELAY_MS: u64 = 500;
const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";
const CONFIG_FILE: &str = "eu-data.json";

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ClientConfig {
    pub cache_enabled: bool,
    pub cache_dir: Utf8PathBuf,
    pub cache_ttl_secs: u64,
    pub preferred_formats: Vec<String>,
    pub user_agent: String,
    pub request_timeout_secs: u64,
    pub request_delay_ms: u64,
    pub sparql_endpoint: String,
    pub rest_api_base: String,
    pub default_locale: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            cache_enabled: true,
            cache_dir: Utf8PathBuf::from(".eu_data_cache"),
            cache_ttl_secs: DEFAULT_CACHE_TTL_SECS,
            preferred_formats: default_preferred_formats(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            request_delay_ms: DEFAULT_REQUEST_DELAY_MS,
            sparql_endpoint: DEFAULT_SPARQL_ENDPOINT.to_string(),
            rest_api_base: DEFAULT_REST_API_BASE.to_string(),
            default_locale: "en".to_string(),
        }
    }
}

impl ClientConfig {
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Downloads get twice the regular timeout.
    pub fn download_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.saturating_mul(2))
    }

    pub fn request_delay(&self) -> Duration {
        Duration::from_millis(self.request_delay_ms)
    }

    pub fn user_cache_dir() -> Result<Utf8PathBuf, EuDataError> {
        BaseDirs::new()
            .and_then(|dirs| {
                Utf8PathBuf::from_path_buf(dirs.cache_dir().join("eu-data-tool")).ok()
            })
            .ok_or_else(|| EuDataError::Filesystem("unable to resolve cache directory".to_string()))
    }
}

pub fn default_preferred_formats() -> Vec<String> {
    vec![
        "CSV".to_string(),
        "JSON".to_string(),
        "XML".to_string(),
        "RDF".to_string(),
    ]
}

pub struct ConfigLoader;

impl ConfigLoader {
    pub fn resolve(path: Option<&str>) -> Result<ClientConfig, EuDataError> {
        let config_path = match path {
            Some(path) => PathBuf::from(path),
            None => PathBuf::from(CONFIG_FILE),
        };

        if path.is_none() && !config_path.exists() {
            return Ok(ClientConfig::default());
        }

        let content = fs::read_to_string(&config_path)
            .map_err(|_| EuDataError::ConfigRead(config_path.clone()))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<ClientConfig, EuDataError> {
        let mut config: ClientConfig =
            serde_json::from_str(content).map_err(|err| EuDataError::ConfigParse(err.to_string()))?;
        config.preferred_formats = config
            .preferred_formats
            .into_iter()
            .map(|format| format.trim().to_uppercase())
            .filter(|format| !format.is_empty())
            .collect();
        if config.preferred_formats.is_empty() {
            config.preferred_formats = default_preferred_formats();
        }
        Ok(config)
    }
}
