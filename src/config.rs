use serde::Deserialize;
use std::env;
use std::fs;

use crate::error::{Result, SliError};

/// Endpoint and credentials for the metrics backend.
#[derive(Debug, Clone, Deserialize)]
pub struct BackendConfig {
    pub base_url: String,
    pub api_token: String,
}

impl BackendConfig {
    /// Tenant URLs are often configured without a scheme; default to https.
    pub fn normalized_base_url(&self) -> String {
        let trimmed = self.base_url.trim_end_matches('/');
        if trimmed.starts_with("https://") || trimmed.starts_with("http://") {
            trimmed.to_string()
        } else {
            format!("https://{trimmed}")
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct Config {
    pub backend: BackendConfig,
}

impl Config {
    /// Loads settings from a TOML file.
    pub fn load(config_path: &str) -> Result<Self> {
        let config_content = fs::read_to_string(config_path).map_err(|e| {
            SliError::Config(format!("Failed to read config file '{config_path}': {e}"))
        })?;

        let config: Config = toml::from_str(&config_content)?;
        Ok(config)
    }

    /// Environment-based settings for containerized runs; takes precedence
    /// over `gate.toml` when both are present.
    pub fn from_env() -> Result<Self> {
        let base_url = env::var("GATE_BASE_URL")
            .map_err(|_| SliError::Config("GATE_BASE_URL is not set".to_string()))?;
        let api_token = env::var("GATE_API_TOKEN")
            .map_err(|_| SliError::Config("GATE_API_TOKEN is not set".to_string()))?;
        Ok(Self {
            backend: BackendConfig { base_url, api_token },
        })
    }
}

/// Per-service engine configuration document (`gate/gate.conf.yaml`),
/// fetched through the resource store with service -> stage -> project
/// fallback. `dashboard` holds an explicit dashboard ID; empty means locate
/// one by naming convention.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct EngineConfigFile {
    pub spec_version: String,
    pub credentials: String,
    pub dashboard: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_gains_https_scheme() {
        let config = BackendConfig {
            base_url: "tenant.example.com/".to_string(),
            api_token: "token".to_string(),
        };
        assert_eq!(config.normalized_base_url(), "https://tenant.example.com");
    }

    #[test]
    fn explicit_scheme_is_kept() {
        let config = BackendConfig {
            base_url: "http://localhost:8080".to_string(),
            api_token: "token".to_string(),
        };
        assert_eq!(config.normalized_base_url(), "http://localhost:8080");
    }

    #[test]
    fn engine_config_defaults_when_fields_missing() {
        let parsed: EngineConfigFile =
            serde_yaml::from_str("spec_version: '0.1.0'\ndashboard: dash-1\n").unwrap();
        assert_eq!(parsed.dashboard, "dash-1");
        assert!(parsed.credentials.is_empty());
    }
}
