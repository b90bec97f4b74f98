//! Configuration for the growth service

use crate::error::{ServiceError, ServiceResult};
use seed_gate::GateConfig;
use seed_phase::{BootstrapConfig, HealthConfig, PhaseConfig, PhaseTable};
use seed_risk::RiskWeights;
use serde::{Deserialize, Serialize};

/// Main service configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SeedConfig {
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Storage configuration
    #[serde(default)]
    pub storage: StorageConfig,

    /// Risk signal weights
    #[serde(default)]
    pub risk: RiskWeights,

    /// Review window and retry budget
    #[serde(default)]
    pub gate: GateConfig,

    /// Health score and demotion triggers
    #[serde(default)]
    pub health: HealthConfig,

    /// Starting phase by account age
    #[serde(default)]
    pub bootstrap: BootstrapConfig,

    /// Per-phase policy tables
    #[serde(default)]
    pub phases: PhaseTable,
}

/// Storage configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StorageConfig {
    /// In-memory storage (for development/testing)
    #[default]
    Memory,

    /// PostgreSQL storage
    Postgres {
        /// Connection URL
        url: String,

        /// Maximum connections in pool
        #[serde(default = "default_pool_size")]
        max_connections: u32,

        /// Connection timeout in seconds
        #[serde(default = "default_connection_timeout")]
        connect_timeout_secs: u64,
    },
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter when `RUST_LOG` is unset
    #[serde(default = "default_log_level")]
    pub level: String,

    /// JSON format
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

fn default_pool_size() -> u32 {
    10
}

fn default_connection_timeout() -> u64 {
    5
}

fn default_log_level() -> String {
    "info".to_string()
}

impl SeedConfig {
    /// Layer defaults, an optional TOML file and `SEED__*` environment
    /// variables, e.g. `SEED__GATE__REVIEW_TTL_HOURS=12`.
    pub fn load(path: Option<&str>) -> ServiceResult<Self> {
        let mut builder = config::Config::builder()
            .add_source(config::Config::try_from(&SeedConfig::default())?);

        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path).required(true));
        }

        builder = builder.add_source(
            config::Environment::with_prefix("SEED")
                .separator("__")
                .try_parsing(true),
        );

        let config: SeedConfig = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a TOML document layered over the defaults.
    pub fn from_toml(contents: &str) -> ServiceResult<Self> {
        let config: SeedConfig = config::Config::builder()
            .add_source(config::Config::try_from(&SeedConfig::default())?)
            .add_source(config::File::from_str(contents, config::FileFormat::Toml))
            .build()?
            .try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> ServiceResult<String> {
        toml::to_string_pretty(self).map_err(|e| ServiceError::Config(e.to_string()))
    }

    pub fn phase_config(&self) -> PhaseConfig {
        PhaseConfig {
            phases: self.phases.clone(),
            health: self.health,
            bootstrap: self.bootstrap,
        }
    }

    pub fn validate(&self) -> ServiceResult<()> {
        self.phase_config()
            .validate()
            .map_err(|e| ServiceError::Config(e.to_string()))?;
        if !self.risk.is_valid() {
            return Err(ServiceError::Config(
                "risk weights must be non-negative with a positive sum".to_string(),
            ));
        }
        if self.gate.review_ttl_hours <= 0 {
            return Err(ServiceError::Config(format!(
                "review ttl {}h must be positive",
                self.gate.review_ttl_hours
            )));
        }
        if let StorageConfig::Postgres { url, .. } = &self.storage {
            if url.is_empty() {
                return Err(ServiceError::Config("postgres url is empty".to_string()));
            }
        }
        Ok(())
    }
}
