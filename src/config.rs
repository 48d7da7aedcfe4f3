//! Configuration management for Junction
//!
//! Configuration is loaded from environment variables. Provider records live
//! in the registry, not here; an optional seed file can populate an empty
//! registry at startup.

use std::collections::HashMap;
use std::env;

use anyhow::{Context, Result};

use crate::registry::ProviderRecord;

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Host to bind to
    pub host: String,
    /// Port to listen on
    pub port: u16,

    /// Redis connection URL. When unset, storage backends are in-memory and
    /// nothing survives a restart.
    pub redis_url: Option<String>,

    /// Bearer token required on all /admin endpoints
    pub admin_token: String,

    /// Upstream timeout applied when a provider record has none configured
    pub default_timeout_seconds: u64,

    /// Optional JSON file of provider records loaded into an empty registry
    pub providers_file: Option<String>,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            host: env::var("JUNCTION_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: env::var("JUNCTION_PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .context("Invalid JUNCTION_PORT")?,

            redis_url: env::var("REDIS_URL").ok(),

            admin_token: env::var("JUNCTION_ADMIN_TOKEN")
                .context("JUNCTION_ADMIN_TOKEN must be set")?,

            default_timeout_seconds: env::var("JUNCTION_DEFAULT_TIMEOUT_SECONDS")
                .unwrap_or_else(|_| "10".to_string())
                .parse()
                .context("Invalid JUNCTION_DEFAULT_TIMEOUT_SECONDS")?,

            providers_file: env::var("JUNCTION_PROVIDERS_FILE").ok(),
        })
    }
}

/// Parse a provider seed file.
///
/// The file is a JSON object keyed by provider name; the key wins over any
/// `name` field inside the record.
pub fn parse_seed_providers(raw: &str) -> Result<Vec<ProviderRecord>> {
    let map: HashMap<String, ProviderRecord> =
        serde_json::from_str(raw).context("Malformed provider seed file")?;

    let mut records: Vec<ProviderRecord> = map
        .into_iter()
        .map(|(name, mut record)| {
            record.name = name;
            record
        })
        .collect();
    records.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_values() {
        env::set_var("JUNCTION_ADMIN_TOKEN", "test-token");
        env::remove_var("JUNCTION_PORT");
        env::remove_var("REDIS_URL");

        let config = Config::from_env().unwrap();

        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 8080);
        assert_eq!(config.redis_url, None);
        assert_eq!(config.default_timeout_seconds, 10);

        env::remove_var("JUNCTION_ADMIN_TOKEN");
    }

    #[test]
    fn test_seed_file_key_wins_over_name_field() {
        let raw = r#"{
            "openai": {
                "name": "ignored",
                "base_url": "https://api.openai.com",
                "auth_type": "bearer",
                "auth_value": "sk-test"
            },
            "local": {
                "base_url": "http://localhost:11434"
            }
        }"#;

        let records = parse_seed_providers(raw).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].name, "local");
        assert_eq!(records[1].name, "openai");
        assert_eq!(records[1].base_url, "https://api.openai.com");
    }

    #[test]
    fn test_seed_file_rejects_malformed_json() {
        assert!(parse_seed_providers("[not json").is_err());
    }
}
