//! Runtime settings.
//!
//! Hierarchical loading:
//! 1. Default values in code
//! 2. Optional `config/palletflow.toml`
//! 3. Environment variable overrides with the `PALLETFLOW__` prefix
//!    (e.g. `PALLETFLOW__DEFAULT_EXPIRY_DAYS=14`)

use config::{Config, ConfigBuilder, ConfigError, Environment, File, FileFormat};
use config::builder::DefaultState;
use serde::Deserialize;

use crate::domain::DEFAULT_EXPIRY_DAYS;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Settings {
    /// Shelf life for products created without an explicit expiry.
    pub default_expiry_days: u32,

    /// Reject scans from drivers other than the task's assignee.
    pub enforce_driver_assignment: bool,

    /// Put FEFO-withdrawn warehouse pallets back when a warehouse-origin
    /// task is deleted.
    pub restore_withdrawals_on_delete: bool,

    /// `EnvFilter` directive used when `RUST_LOG` is not set.
    pub log_filter: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            default_expiry_days: DEFAULT_EXPIRY_DAYS,
            enforce_driver_assignment: true,
            restore_withdrawals_on_delete: false,
            log_filter: "info".to_string(),
        }
    }
}

impl Settings {
    /// Load settings from `config/palletflow.toml` and the environment.
    pub fn load() -> Result<Self, ConfigError> {
        defaults()?
            .add_source(File::with_name("config/palletflow").required(false))
            .add_source(
                Environment::with_prefix("PALLETFLOW")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }

    /// Load settings from an inline TOML document layered over the defaults.
    pub fn from_toml(source: &str) -> Result<Self, ConfigError> {
        defaults()?
            .add_source(File::from_str(source, FileFormat::Toml))
            .build()?
            .try_deserialize()
    }
}

fn defaults() -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    let d = Settings::default();
    Config::builder()
        .set_default("default_expiry_days", i64::from(d.default_expiry_days))?
        .set_default("enforce_driver_assignment", d.enforce_driver_assignment)?
        .set_default("restore_withdrawals_on_delete", d.restore_withdrawals_on_delete)?
        .set_default("log_filter", d.log_filter)
}
