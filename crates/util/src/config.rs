use std::{env, fmt, net::SocketAddr, time::Duration};

use super::{database_url, server_bind_address};

const DEV_JWT_SECRET: &str = "skillz-development-secret";
const DEFAULT_TOKEN_TTL_SECS: u64 = 24 * 60 * 60;
/// Upper bound for token lifetimes: ten years.
pub const MAX_TOKEN_TTL_SECS: u64 = 10 * 365 * 24 * 60 * 60;
const DEFAULT_UPDATES_LIMIT: u32 = 50;

/// Application runtime environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Production,
    Test,
}

impl Environment {
    fn from_str(value: &str) -> Result<Self, ConfigError> {
        match value {
            "development" | "dev" => Ok(Self::Development),
            "production" | "prod" => Ok(Self::Production),
            "test" => Ok(Self::Test),
            other => Err(ConfigError::InvalidEnvironment(other.to_string())),
        }
    }

    /// Returns the canonical name used for logging/metrics labels.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Development => "development",
            Self::Production => "production",
            Self::Test => "test",
        }
    }
}

/// Runtime configuration resolved from environment variables.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_addr: SocketAddr,
    pub environment: Environment,
    pub database_url: String,
    pub jwt_secret: Vec<u8>,
    pub token_ttl: Duration,
    pub updates_limit: u32,
}

impl AppConfig {
    /// Constructs the configuration by reading and validating environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let env_value = env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());
        let environment = Environment::from_str(&env_value)?;
        let bind_addr = server_bind_address().map_err(ConfigError::BindAddress)?;

        let jwt_secret = match env::var("APP_JWT_SECRET") {
            Ok(value) if !value.is_empty() => value.into_bytes(),
            _ if environment == Environment::Production => {
                return Err(ConfigError::MissingVariable("APP_JWT_SECRET"))
            }
            _ => DEV_JWT_SECRET.as_bytes().to_vec(),
        };

        let token_ttl_secs = parse_number("APP_TOKEN_TTL_SECS", DEFAULT_TOKEN_TTL_SECS)?;
        if token_ttl_secs == 0 || token_ttl_secs > MAX_TOKEN_TTL_SECS {
            return Err(ConfigError::InvalidNumber {
                name: "APP_TOKEN_TTL_SECS",
                value: token_ttl_secs.to_string(),
            });
        }
        let updates_limit = parse_number("APP_UPDATES_LIMIT", DEFAULT_UPDATES_LIMIT)?;

        Ok(Self {
            bind_addr,
            environment,
            database_url: database_url(),
            jwt_secret,
            token_ttl: Duration::from_secs(token_ttl_secs),
            updates_limit,
        })
    }
}

fn parse_number<T: std::str::FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidNumber { name, value }),
        Err(_) => Ok(default),
    }
}

/// Errors that can occur during configuration loading.
#[derive(Debug)]
pub enum ConfigError {
    InvalidEnvironment(String),
    BindAddress(std::net::AddrParseError),
    MissingVariable(&'static str),
    InvalidNumber { name: &'static str, value: String },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidEnvironment(value) => write!(
                f,
                "APP_ENV must be one of 'development', 'production', or 'test' (got {value})"
            ),
            Self::BindAddress(err) => write!(f, "invalid APP_BIND_ADDR value: {err}"),
            Self::MissingVariable(name) => write!(f, "{name} must be set in production"),
            Self::InvalidNumber { name, value } => {
                write!(f, "{name} must be a positive integer within range (got {value})")
            }
        }
    }
}

impl std::error::Error for ConfigError {}
