//! Observability Configuration
//!
//! Log format, filter and request-tracing switches for the portal.

use std::env;

use crate::parse::parse_bool;

/// Log output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable format for development
    #[default]
    Pretty,
    /// JSON format for production/log aggregation
    Json,
    /// Compact single-line format
    Compact,
}

impl LogFormat {
    /// Parse a format name, falling back to `Pretty`
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_lowercase().as_str() {
            "json" => Self::Json,
            "compact" => Self::Compact,
            _ => Self::Pretty,
        }
    }
}

/// Complete observability configuration
#[derive(Debug, Clone)]
pub struct ObservabilityConfig {
    /// Service name attached to the startup log line
    pub service_name: String,
    /// Log output format
    pub log_format: LogFormat,
    /// Log level filter (e.g., "info", "school_portal=debug,tower_http=info")
    pub log_filter: String,
    /// Trace every HTTP request through `TraceLayer`
    pub enable_request_tracing: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            service_name: "school-portal".to_string(),
            log_format: LogFormat::default(),
            log_filter: "info,school_portal=debug".to_string(),
            enable_request_tracing: true,
        }
    }
}

impl ObservabilityConfig {
    /// Create configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `SERVICE_NAME`: service name (default: "school-portal")
    /// - `LOG_FORMAT`: "pretty", "json", or "compact" (default: "pretty")
    /// - `RUST_LOG`: Log filter directive (default: "info,school_portal=debug")
    /// - `TRACING_ENABLED`: Enable request tracing (default: "true")
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let service_name = env::var("SERVICE_NAME").unwrap_or(defaults.service_name);

        let log_format = env::var("LOG_FORMAT")
            .map(|v| LogFormat::from_name(&v))
            .unwrap_or(defaults.log_format);

        let log_filter = env::var("RUST_LOG").unwrap_or(defaults.log_filter);

        let enable_request_tracing = env::var("TRACING_ENABLED")
            .ok()
            .and_then(|v| parse_bool(&v))
            .unwrap_or(true);

        Self {
            service_name,
            log_format,
            log_filter,
            enable_request_tracing,
        }
    }

    /// Create a new configuration builder
    pub fn builder() -> ObservabilityConfigBuilder {
        ObservabilityConfigBuilder::default()
    }
}

/// Builder for ObservabilityConfig
#[derive(Default)]
pub struct ObservabilityConfigBuilder {
    config: ObservabilityConfig,
}

impl ObservabilityConfigBuilder {
    /// Set the service name
    pub fn service_name(mut self, name: impl Into<String>) -> Self {
        self.config.service_name = name.into();
        self
    }

    /// Set the log format
    pub fn log_format(mut self, format: LogFormat) -> Self {
        self.config.log_format = format;
        self
    }

    /// Set the log filter
    pub fn log_filter(mut self, filter: impl Into<String>) -> Self {
        self.config.log_filter = filter.into();
        self
    }

    /// Enable or disable request tracing
    pub fn enable_request_tracing(mut self, enable: bool) -> Self {
        self.config.enable_request_tracing = enable;
        self
    }

    /// Build the configuration
    pub fn build(self) -> ObservabilityConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ObservabilityConfig::default();
        assert_eq!(config.log_format, LogFormat::Pretty);
        assert_eq!(config.service_name, "school-portal");
        assert!(config.enable_request_tracing);
    }

    #[test]
    fn test_log_format_names() {
        assert_eq!(LogFormat::from_name("JSON"), LogFormat::Json);
        assert_eq!(LogFormat::from_name("compact"), LogFormat::Compact);
        assert_eq!(LogFormat::from_name("anything"), LogFormat::Pretty);
    }

    #[test]
    fn test_builder() {
        let config = ObservabilityConfig::builder()
            .log_format(LogFormat::Json)
            .log_filter("debug")
            .enable_request_tracing(false)
            .build();

        assert_eq!(config.log_format, LogFormat::Json);
        assert_eq!(config.log_filter, "debug");
        assert!(!config.enable_request_tracing);
    }
}
