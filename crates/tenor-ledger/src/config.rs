//! Ledger configuration.
//!
//! [`LedgerConfig`] has working defaults and can be layered from an optional
//! TOML file and `TENOR_`-prefixed environment variables:
//!
//! ```toml
//! max_catch_up_days = 365   # 0 removes the cap
//! retoggle_policy = "permissive"
//! ```

use std::path::Path;

use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Deserializer, Serialize};
use tenor_core::constants::{CONFIG_ENV_PREFIX, DEFAULT_MAX_CATCH_UP_DAYS};
use tenor_core::error::ConfigError;
use tracing::debug;

use crate::tier::RetogglePolicy;

/// Engine settings.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct LedgerConfig {
    /// Most calendar days one catch-up call walks. `None` or zero walks everything.
    #[serde(deserialize_with = "zero_is_unbounded")]
    pub max_catch_up_days: Option<u32>,
    pub retoggle_policy: RetogglePolicy,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            max_catch_up_days: Some(DEFAULT_MAX_CATCH_UP_DAYS),
            retoggle_policy: RetogglePolicy::default(),
        }
    }
}

fn zero_is_unbounded<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<u32>, D::Error> {
    let days = Option::<u32>::deserialize(deserializer)?;
    Ok(days.filter(|d| *d > 0))
}

impl LedgerConfig {
    /// Same as the default, without a catch-up cap.
    pub fn unbounded() -> Self {
        Self { max_catch_up_days: None, ..Self::default() }
    }

    /// Defaults, overridden by `path` (TOML, if given) and then by the environment.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        Self::from_sources(path, Environment::with_prefix(CONFIG_ENV_PREFIX))
    }

    fn from_sources(path: Option<&Path>, env: Environment) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::from(path).format(FileFormat::Toml).required(true));
        }
        let settings = builder
            .add_source(env.try_parsing(true))
            .build()
            .map_err(|e| ConfigError::Source(e.to_string()))?;
        let config: Self = settings
            .try_deserialize()
            .map_err(|e| ConfigError::Source(e.to_string()))?;
        debug!(?config, "ledger configuration loaded");
        Ok(config)
    }
}
