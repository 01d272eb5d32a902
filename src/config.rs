//! Portal configuration
//!
//! Everything environment-dependent hangs off [`Environment`]: login
//! thresholds, password hashing cost, error detail exposure and the
//! reserved test identifiers. Values are read from environment variables
//! with defaults suitable for the selected environment.
//!
//! ```ignore
//! use school_portal::PortalConfig;
//!
//! let config = PortalConfig::from_env()?;
//! let tracker = LoginTracker::new(config.lockout.clone());
//! ```

use std::net::SocketAddr;
use std::time::Duration;

use crate::auth::HashCost;
use crate::login::LockoutPolicy;
use crate::parse::{parse_duration, parse_list};

/// Secret used when running in development without `JWT_SECRET`
const DEV_JWT_SECRET: &str = "dev-secret-key-change-in-production";

/// Minimum accepted length for a production signing secret
const MIN_SECRET_LEN: usize = 32;

/// Deployment environment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Environment {
    /// Local development and test runs: relaxed thresholds, cheap hashing
    #[default]
    Development,
    /// Production: strict thresholds, full hashing cost, no error details
    Production,
}

impl Environment {
    /// Parse an environment name. Only "production"/"prod" select production.
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_lowercase().as_str() {
            "production" | "prod" => Self::Production,
            _ => Self::Development,
        }
    }

    /// Read `PORTAL_ENV`, then `APP_ENV`
    pub fn from_env() -> Self {
        std::env::var("PORTAL_ENV")
            .or_else(|_| std::env::var("APP_ENV"))
            .map(|v| Self::from_name(&v))
            .unwrap_or_default()
    }

    pub fn is_production(&self) -> bool {
        matches!(self, Self::Production)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Development => "development",
            Self::Production => "production",
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("JWT_SECRET environment variable is required in production")]
    MissingSecret,

    #[error("JWT_SECRET must be at least {MIN_SECRET_LEN} characters")]
    WeakSecret,

    #[error("invalid value for {name}: {value}")]
    InvalidValue { name: &'static str, value: String },
}

/// Portal configuration
#[derive(Debug, Clone)]
pub struct PortalConfig {
    /// Deployment environment
    pub environment: Environment,

    /// HMAC secret for signing access tokens
    pub jwt_secret: String,

    /// Access token lifetime (15 minutes unless overridden)
    pub token_lifetime: Duration,

    /// Address the HTTP server binds to
    pub listen_addr: SocketAddr,

    /// How often the login housekeeping sweep runs
    pub sweep_interval: Duration,

    /// Login attempt and violation thresholds
    pub lockout: LockoutPolicy,

    /// Argon2 cost used when (re)hashing passwords
    pub hash_cost: HashCost,

    /// Include internal error details in HTTP responses
    pub expose_error_details: bool,
}

impl PortalConfig {
    /// Defaults for an environment, with the development secret filled in.
    ///
    /// Production callers are expected to replace `jwt_secret`.
    pub fn for_environment(environment: Environment) -> Self {
        Self {
            environment,
            jwt_secret: DEV_JWT_SECRET.to_string(),
            token_lifetime: Duration::from_secs(15 * 60),
            listen_addr: SocketAddr::from(([0, 0, 0, 0], 5000)),
            sweep_interval: Duration::from_secs(5 * 60),
            lockout: LockoutPolicy::for_environment(environment),
            hash_cost: HashCost::for_environment(environment),
            expose_error_details: !environment.is_production(),
        }
    }

    /// Load configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `PORTAL_ENV` / `APP_ENV`: "production" or anything else (development)
    /// - `JWT_SECRET`: token signing secret, required in production (≥ 32 chars)
    /// - `TOKEN_LIFETIME`: e.g. "15m" (default: "15m")
    /// - `LISTEN_ADDR`: e.g. "0.0.0.0:5000" (default)
    /// - `LOGIN_SWEEP_INTERVAL`: e.g. "5m" (default: "5m")
    /// - `LOGIN_EXEMPT_IDENTIFIERS`: comma-separated reserved test identifiers
    pub fn from_env() -> Result<Self, ConfigError> {
        let environment = Environment::from_env();
        let mut config = Self::for_environment(environment);

        match std::env::var("JWT_SECRET") {
            Ok(secret) => {
                if environment.is_production() && secret.len() < MIN_SECRET_LEN {
                    return Err(ConfigError::WeakSecret);
                }
                config.jwt_secret = secret;
            }
            Err(_) if environment.is_production() => return Err(ConfigError::MissingSecret),
            Err(_) => {
                tracing::warn!("JWT_SECRET not set, using development secret");
            }
        }

        if let Ok(value) = std::env::var("TOKEN_LIFETIME") {
            config.token_lifetime = parse_duration(&value).ok_or(ConfigError::InvalidValue {
                name: "TOKEN_LIFETIME",
                value,
            })?;
        }

        if let Ok(value) = std::env::var("LOGIN_SWEEP_INTERVAL") {
            config.sweep_interval = parse_duration(&value)
                .filter(|d| !d.is_zero())
                .ok_or(ConfigError::InvalidValue {
                    name: "LOGIN_SWEEP_INTERVAL",
                    value,
                })?;
        }

        if let Ok(value) = std::env::var("LISTEN_ADDR") {
            config.listen_addr = value.parse().map_err(|_| ConfigError::InvalidValue {
                name: "LISTEN_ADDR",
                value,
            })?;
        }

        if let Ok(value) = std::env::var("LOGIN_EXEMPT_IDENTIFIERS") {
            config.lockout.exempt_identifiers = parse_list(&value)
                .into_iter()
                .map(|id| id.to_lowercase())
                .collect();
        }

        Ok(config)
    }
}

impl Default for PortalConfig {
    fn default() -> Self {
        Self::for_environment(Environment::Development)
    }
}
