use async_trait::async_trait;
use seed_types::Platform;
use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum SignalError {
    #[error("signal unavailable: {0}")]
    Unavailable(String),

    #[error("unknown target: {0}")]
    UnknownTarget(String),
}

/// Outbound capability: how likely the target account is automated.
/// Values are expected in [0,1]; anything else is treated as missing.
#[async_trait]
pub trait AuthenticitySignal: Send + Sync {
    async fn bot_likelihood(&self, target: &str, platform: Platform) -> Result<f64, SignalError>;
}

/// Signal backed by a fixed table, with an optional fallback value.
#[derive(Clone, Debug, Default)]
pub struct FixedAuthenticitySignal {
    fallback: Option<f64>,
    overrides: HashMap<String, f64>,
}

impl FixedAuthenticitySignal {
    /// Every target gets `value`.
    pub fn constant(value: f64) -> Self {
        Self {
            fallback: Some(value),
            overrides: HashMap::new(),
        }
    }

    /// No target resolves.
    pub fn unavailable() -> Self {
        Self::default()
    }

    pub fn with_target(mut self, target: impl Into<String>, value: f64) -> Self {
        self.overrides.insert(target.into(), value);
        self
    }
}

#[async_trait]
impl AuthenticitySignal for FixedAuthenticitySignal {
    async fn bot_likelihood(&self, target: &str, _platform: Platform) -> Result<f64, SignalError> {
        self.overrides
            .get(target)
            .copied()
            .or(self.fallback)
            .ok_or_else(|| SignalError::Unavailable(format!("no value for {target}")))
    }
}
