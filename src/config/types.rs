//! Core configuration types and loading.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

use super::defaults::{default_log_filter, default_role_database};
use crate::catalog::CategoryMeta;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Access-control configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Permission catalog persistence.
    #[serde(default)]
    pub catalog: CatalogConfig,
    /// Category metadata joined into catalog listings.
    #[serde(default)]
    pub categories: Vec<CategoryMeta>,
    /// Role store configuration.
    #[serde(default)]
    pub roles: RolesConfig,
    /// Route binding behaviour.
    #[serde(default)]
    pub binding: BindingConfig,
    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }
}

/// Catalog snapshot configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CatalogConfig {
    /// JSON snapshot file. When absent the snapshot is kept in memory.
    pub snapshot_path: Option<PathBuf>,
}

/// Role store configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct RolesConfig {
    /// Path to the SQLite role database (`:memory:` allowed).
    #[serde(default = "default_role_database")]
    pub database_path: String,
    /// Cache role lookups by id. Off by default: grant changes must then be
    /// followed by an explicit invalidation.
    #[serde(default)]
    pub cache: bool,
}

impl Default for RolesConfig {
    fn default() -> Self {
        Self {
            database_path: default_role_database(),
            cache: false,
        }
    }
}

/// Route binding configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BindingConfig {
    /// Reject unknown action kinds instead of falling back to read/GET.
    #[serde(default)]
    pub strict_action_kinds: bool,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    #[serde(default = "default_log_filter")]
    pub filter: String,
    /// Emit JSON lines instead of human-readable output.
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: default_log_filter(),
            json: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ability::Action;
    use crate::catalog::CategoryStatus;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = Config::from_toml("").unwrap();
        assert!(config.catalog.snapshot_path.is_none());
        assert!(config.categories.is_empty());
        assert_eq!(config.roles.database_path, "roles.db");
        assert!(!config.roles.cache);
        assert!(!config.binding.strict_action_kinds);
        assert_eq!(config.logging.filter, "info");
    }

    #[test]
    fn test_full_config() {
        let config = Config::from_toml(
            r#"
[catalog]
snapshot_path = "data/permissions.json"

[[categories]]
category = "banners"
display_name = "Banners"
status = "active"
static_features = [{ action = "block", subject = "banners", description = "Block banner" }]
hidden_features = [{ action = "delete", subject = "banners/:id" }]

[[categories]]
category = "payroll"
display_name = "Payroll"
status = "inactive"

[roles]
database_path = ":memory:"
cache = true

[binding]
strict_action_kinds = true

[logging]
filter = "admin_access=debug"
json = true
"#,
        )
        .unwrap();

        assert_eq!(config.categories.len(), 2);
        let banners = &config.categories[0];
        assert_eq!(banners.static_features[0].action, Action::Other("block".into()));
        assert_eq!(banners.hidden_features[0].description, "");
        assert_eq!(config.categories[1].status, CategoryStatus::Inactive);
        assert!(config.roles.cache);
        assert!(config.binding.strict_action_kinds);
        assert!(config.logging.json);
    }

    #[test]
    fn test_bad_status_is_parse_error() {
        let err = Config::from_toml(
            r#"
[[categories]]
category = "banners"
display_name = "Banners"
status = "paused"
"#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }
}
