use std::{path::Path, time::Duration};

use config::{Config, ConfigError, Environment, File};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    configuration::{
        default_unit_price, DEFAULT_SYMBOL_PREFIX, DEFAULT_TOKEN_COUNT, MAX_TOKEN_COUNT,
        MIN_TOKEN_COUNT,
    },
    simulator::{DEFAULT_PROGRESS_STEP, DEFAULT_TICK_INTERVAL_MS},
};

pub const ENV_PREFIX: &str = "APP";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkflowSettings {
    pub tick_interval_ms: u64,
    pub progress_step: u8,
    pub default_token_count: u32,
    pub default_unit_price: Decimal,
    pub symbol_prefix: String,
    pub placeholder_balance: Decimal,
}

impl Default for WorkflowSettings {
    fn default() -> Self {
        Self {
            tick_interval_ms: DEFAULT_TICK_INTERVAL_MS,
            progress_step: DEFAULT_PROGRESS_STEP,
            default_token_count: DEFAULT_TOKEN_COUNT,
            default_unit_price: default_unit_price(),
            symbol_prefix: DEFAULT_SYMBOL_PREFIX.into(),
            placeholder_balance: Decimal::new(1, 1),
        }
    }
}

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("failed to load settings: {0}")]
    Load(#[from] ConfigError),
    #[error("tick_interval_ms must be greater than zero")]
    ZeroTickInterval,
    #[error("progress_step must be within 1..=100, got {0}")]
    ProgressStep(u8),
    #[error("default_token_count must be within 10..=1000, got {0}")]
    DefaultTokenCount(u32),
    #[error("default_unit_price must be greater than zero, got {0}")]
    DefaultUnitPrice(Decimal),
    #[error("placeholder_balance must not be negative, got {0}")]
    PlaceholderBalance(Decimal),
}

impl WorkflowSettings {
    /// Defaults, then the optional settings file, then `APP__*` environment
    /// variables (e.g. `APP__TICK_INTERVAL_MS=50`).
    pub fn load(path: Option<&Path>) -> Result<Self, SettingsError> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::from(path).required(true));
        }
        let settings: Self = builder
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.tick_interval_ms == 0 {
            return Err(SettingsError::ZeroTickInterval);
        }
        if self.progress_step == 0 || self.progress_step > 100 {
            return Err(SettingsError::ProgressStep(self.progress_step));
        }
        if !(MIN_TOKEN_COUNT..=MAX_TOKEN_COUNT).contains(&self.default_token_count) {
            return Err(SettingsError::DefaultTokenCount(self.default_token_count));
        }
        if self.default_unit_price <= Decimal::ZERO {
            return Err(SettingsError::DefaultUnitPrice(self.default_unit_price));
        }
        if self.placeholder_balance < Decimal::ZERO {
            return Err(SettingsError::PlaceholderBalance(self.placeholder_balance));
        }
        Ok(())
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }
}

#[cfg(test)]
#[path = "tests/settings_tests.rs"]
mod tests;
