//! Server configuration.

use std::path::{Path, PathBuf};

use keyward_custody::{Params, DEFAULT_FEE_DENOM};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Configuration loading failures.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file exists but could not be read.
    #[error("failed to read {path}: {source}")]
    Read {
        /// Config file path.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The file is not valid TOML for [`Config`].
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// A value is out of range.
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Top-level server configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub ledger: LedgerConfig,
    pub logging: LoggingConfig,
    pub genesis: GenesisConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// HTTP listen address.
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:8300".to_string(),
        }
    }
}

/// Which storage engine holds ledger state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageKind {
    /// Volatile, for development.
    #[default]
    Memory,
    /// One SQLite file per namespace under `data_dir`.
    Sqlite,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageKind,
    pub data_dir: PathBuf,
    pub namespace: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageKind::Memory,
            data_dir: PathBuf::from("data"),
            namespace: "ledger".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// Time between blocks.
    pub block_interval_ms: u64,
    /// Blocks-to-live applied when a request asks for 0.
    pub default_btl: u64,
    /// Denomination keychain fees are charged in.
    pub fee_denom: String,
    /// Gas budget of one analyzer call.
    pub analyzer_gas_limit: u64,
    /// Address allowed to reject any pending action.
    pub authority: Option<String>,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        let params = Params::default();
        Self {
            block_interval_ms: 1000,
            default_btl: params.default_btl,
            fee_denom: DEFAULT_FEE_DENOM.to_string(),
            analyzer_gas_limit: params.analyzer_gas_limit,
            authority: None,
        }
    }
}

impl LedgerConfig {
    /// Custody module parameters derived from this section.
    pub fn params(&self) -> Params {
        Params {
            fee_denom: self.fee_denom.clone(),
            default_btl: self.default_btl,
            analyzer_gas_limit: self.analyzer_gas_limit,
            authority: self.authority.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive; `RUST_LOG` takes precedence.
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GenesisConfig {
    /// JSON genesis file applied on first start.
    pub path: Option<PathBuf>,
}

impl Config {
    /// Loads `path`, falling back to defaults when the file does not exist.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&content)
    }

    /// Parses TOML content.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Rejects values the ledger cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.ledger.block_interval_ms == 0 {
            return Err(ConfigError::Invalid("ledger.block_interval_ms must be positive".into()));
        }
        if self.ledger.default_btl == 0 {
            return Err(ConfigError::Invalid("ledger.default_btl must be positive".into()));
        }
        if self.ledger.fee_denom.is_empty() {
            return Err(ConfigError::Invalid("ledger.fee_denom must not be empty".into()));
        }
        if self.ledger.analyzer_gas_limit == 0 {
            return Err(ConfigError::Invalid("ledger.analyzer_gas_limit must be positive".into()));
        }
        Ok(())
    }
}
