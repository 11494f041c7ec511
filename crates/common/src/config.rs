//! Application configuration.

use serde::Deserialize;
use std::path::Path;

/// Application configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Server configuration.
    pub server: ServerConfig,
    /// Database configuration.
    pub database: DatabaseConfig,
    /// Vote engine configuration.
    #[serde(default)]
    pub votes: VotesConfig,
}

/// Server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Host to bind to.
    #[serde(default = "default_host")]
    pub host: String,
    /// Port to bind to.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Public URL of this instance.
    pub url: String,
}

/// Database connection configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// `PostgreSQL` connection URL.
    pub url: String,
    /// Maximum number of connections in the pool.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// Minimum number of connections in the pool.
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
}

/// Vote engine configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct VotesConfig {
    /// Recompute every comment tally from the vote records once at startup.
    #[serde(default)]
    pub reconcile_on_startup: bool,
    /// Seconds between background reconciliation passes (0 disables).
    #[serde(default)]
    pub reconcile_interval_secs: u64,
    /// Comments loaded per reconciliation batch.
    #[serde(default = "default_reconcile_batch_size")]
    pub reconcile_batch_size: u64,
}

impl Default for VotesConfig {
    fn default() -> Self {
        Self {
            reconcile_on_startup: false,
            reconcile_interval_secs: 0,
            reconcile_batch_size: default_reconcile_batch_size(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

const fn default_port() -> u16 {
    3000
}

const fn default_max_connections() -> u32 {
    100
}

const fn default_min_connections() -> u32 {
    5
}

const fn default_reconcile_batch_size() -> u64 {
    500
}

impl Config {
    /// Load configuration from files and environment variables.
    ///
    /// Configuration is loaded in the following order:
    /// 1. `.env` (if present)
    /// 2. `config/default.toml`
    /// 3. `config/{environment}.toml` (based on `PERSONA_ENV`)
    /// 4. Environment variables with `PERSONA_` prefix
    pub fn load() -> Result<Self, config::ConfigError> {
        dotenvy::dotenv().ok();
        let env = std::env::var("PERSONA_ENV").unwrap_or_else(|_| "development".to_string());

        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name(&format!("config/{env}")).required(false))
            .add_source(
                config::Environment::with_prefix("PERSONA")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Load configuration from a specific file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, config::ConfigError> {
        let config = config::Config::builder()
            .add_source(config::File::from(path.as_ref()))
            .add_source(
                config::Environment::with_prefix("PERSONA")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_votes_config_defaults() {
        let votes = VotesConfig::default();
        assert!(!votes.reconcile_on_startup);
        assert_eq!(votes.reconcile_interval_secs, 0);
        assert_eq!(votes.reconcile_batch_size, 500);
    }

    #[test]
    fn test_deserialize_without_votes_section() {
        let config: Config = config::Config::builder()
            .set_override("server.url", "http://localhost:3000")
            .unwrap()
            .set_override("database.url", "postgres://localhost/persona")
            .unwrap()
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();

        assert_eq!(config.server.port, 3000);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.database.max_connections, 100);
        assert_eq!(config.votes.reconcile_batch_size, 500);
    }
}
