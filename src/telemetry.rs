//! Tracing setup and span constructors.

use tracing_subscriber::EnvFilter;

use crate::config::LoggingConfig;

/// Install a global `tracing` subscriber for the host service.
///
/// `RUST_LOG` takes precedence over the configured filter. Returns `false`
/// when a subscriber was already installed.
pub fn init(config: &LoggingConfig) -> bool {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.filter));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);

    let result = if config.json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    result.is_ok()
}

/// Standardized span constructors for authorization observability.
pub mod spans {
    use tracing::{Span, debug_span, info_span};

    /// Span covering one policy check.
    pub fn authorize(principal: &str, resource: &str) -> Span {
        debug_span!("authz.check", principal = %principal, resource = %resource)
    }

    /// Span covering startup route registration.
    pub fn registration(routes: usize) -> Span {
        info_span!("authz.registration", routes)
    }
}
