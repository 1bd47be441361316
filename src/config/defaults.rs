//! Default value functions for configuration.

pub fn default_log_filter() -> String {
    "info".to_string()
}

pub fn default_role_database() -> String {
    "roles.db".to_string()
}
