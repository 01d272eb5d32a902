//! Observability
//!
//! Structured logging for the portal. Application code uses plain `tracing`
//! macros and [`security_event!`] for audit-relevant events; this module only
//! decides how those records are rendered.
//!
//! ```ignore
//! use school_portal::observability::{init, ObservabilityConfig};
//!
//! init(&ObservabilityConfig::from_env())?;
//! ```

mod config;
mod events;
mod providers;

pub use config::{LogFormat, ObservabilityConfig, ObservabilityConfigBuilder};
pub use events::{security_event, SecurityEvent, Severity};

use tracing::info;

/// Initialize logging.
///
/// Call once at startup, before any other logging happens.
pub fn init(config: &ObservabilityConfig) -> Result<(), ObservabilityError> {
    providers::init_tracing(config)?;

    info!(
        service = %config.service_name,
        log_format = ?config.log_format,
        "Observability initialized"
    );

    Ok(())
}

/// Observability initialization errors
#[derive(Debug, thiserror::Error)]
pub enum ObservabilityError {
    /// Invalid configuration
    #[error("Observability config error: {0}")]
    Config(String),
    /// Subscriber installation failed
    #[error("Provider error: {0}")]
    Provider(String),
}
