//! Configuration for the vote ledger service

use std::fs;
use std::path::Path;

use serde::Deserialize;
use thiserror::Error;

use crate::blockchain::crypto::MAX_DIFFICULTY;
use crate::registry::{Candidate, Voter};

/// Environment variable naming the configuration file
pub const CONFIG_PATH_ENV: &str = "VOTE_LEDGER_CONFIG";

const DEFAULT_CONFIG_PATH: &str = "config.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("Failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub ledger: LedgerConfig,
    pub seed: SeedConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LedgerConfig {
    #[serde(default = "default_difficulty")]
    pub difficulty: u8,

    /// Directory of the sled database
    #[serde(default = "default_data_dir")]
    pub data_dir: String,

    /// Keep the chain in memory only, nothing survives a restart
    #[serde(default)]
    pub in_memory: bool,

    /// Upper bound on nonces tried per vote
    #[serde(default)]
    pub max_mining_attempts: Option<u64>,
}

/// Registry records loaded at startup
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SeedConfig {
    #[serde(default)]
    pub candidates: Vec<Candidate>,
    #[serde(default)]
    pub voters: Vec<Voter>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            difficulty: default_difficulty(),
            data_dir: default_data_dir(),
            in_memory: false,
            max_mining_attempts: None,
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_difficulty() -> u8 {
    4
}

fn default_data_dir() -> String {
    "data/ledger".to_string()
}

impl Config {
    /// Parses and validates a TOML document
    pub fn from_toml(source: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads the configuration at `path`, defaults if the file is absent
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();

        if !path.exists() {
            log::warn!("{} not found, using default configuration", path.display());
            return Ok(Config::default());
        }

        let source = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;

        Self::from_toml(&source)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.ledger.difficulty > MAX_DIFFICULTY {
            return Err(ConfigError::Invalid(format!(
                "ledger.difficulty must be at most {}",
                MAX_DIFFICULTY
            )));
        }

        if self.server.port == 0 {
            return Err(ConfigError::Invalid("server.port must be non-zero".to_string()));
        }

        if !self.ledger.in_memory && self.ledger.data_dir.trim().is_empty() {
            return Err(ConfigError::Invalid("ledger.data_dir must not be empty".to_string()));
        }

        if self.seed.candidates.iter().any(|c| c.name.trim().is_empty()) {
            return Err(ConfigError::Invalid("seed candidates need a name".to_string()));
        }

        if self.seed.voters.iter().any(|v| v.voter_id.trim().is_empty()) {
            return Err(ConfigError::Invalid("seed voters need a voter_id".to_string()));
        }

        Ok(())
    }
}

/// Loads the configuration named by `VOTE_LEDGER_CONFIG`, or `config.toml`
pub fn load_config() -> Result<Config, ConfigError> {
    let path = std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
    Config::from_path(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_config() {
        let config = Config::from_toml(
            r#"
            [server]
            host = "0.0.0.0"
            port = 5000

            [ledger]
            difficulty = 2
            data_dir = "/tmp/ledger"
            max_mining_attempts = 1000000

            [[seed.candidates]]
            name = "Alice Johnson"
            party = "Progressive Party"

            [[seed.voters]]
            voter_id = "V001"
            name = "John Smith"
            email = "john@example.com"
            "#,
        )
        .unwrap();

        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 5000);
        assert_eq!(config.ledger.difficulty, 2);
        assert_eq!(config.ledger.data_dir, "/tmp/ledger");
        assert!(!config.ledger.in_memory);
        assert_eq!(config.ledger.max_mining_attempts, Some(1_000_000));
        assert_eq!(config.seed.candidates[0].description, "");
        assert!(!config.seed.voters[0].has_voted);
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_toml("").unwrap();

        assert_eq!(config.server.port, 8080);
        assert_eq!(config.ledger.difficulty, 4);
        assert_eq!(config.ledger.data_dir, "data/ledger");
        assert!(config.seed.candidates.is_empty());
    }

    #[test]
    fn test_rejects_excessive_difficulty() {
        let result = Config::from_toml("[ledger]\ndifficulty = 65\n");

        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_rejects_malformed_toml() {
        assert!(matches!(
            Config::from_toml("[ledger\n"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();

        let config = Config::from_path(dir.path().join("absent.toml")).unwrap();

        assert_eq!(config.ledger.difficulty, 4);
    }
}
