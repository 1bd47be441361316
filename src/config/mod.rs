//! Configuration loading and management.
//!
//! - [`types`]: Config struct definitions and TOML loading
//! - [`defaults`]: serde default value functions
//! - [`validation`]: startup validation collecting every problem found

mod defaults;
mod types;
mod validation;

pub use types::{
    BindingConfig, CatalogConfig, Config, ConfigError, LoggingConfig, RolesConfig,
};
pub use validation::{ValidationError, validate};
