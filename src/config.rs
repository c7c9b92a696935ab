//! Application configuration loaded from environment variables.

use std::env;
use std::time::Duration;

/// Development default values - NEVER use in production.
pub mod defaults {
    pub const DEV_DATABASE_URL: &str = "sqlite://data/harness.db?mode=rwc";
    pub const DEV_HOST: &str = "127.0.0.1";
    pub const DEV_PORT: u16 = 8080;
    pub const DEV_DEFAULT_TIMEOUT: &str = "5m";
    pub const DEV_RUNNER_IMAGE: &str = "multiarch-test-runner";
    pub const DEV_DOCKER_BIN: &str = "docker";
}

/// Runtime environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Production,
}

impl Environment {
    /// Parse environment from string.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "development" | "dev" => Some(Self::Development),
            "production" | "prod" => Some(Self::Production),
            _ => None,
        }
    }

    /// Check if this is a development environment.
    pub fn is_development(&self) -> bool {
        matches!(self, Self::Development)
    }

    /// Check if this is a production environment.
    pub fn is_production(&self) -> bool {
        matches!(self, Self::Production)
    }
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Development => write!(f, "development"),
            Self::Production => write!(f, "production"),
        }
    }
}

/// Which store backend holds job state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    /// Volatile in-process map. Jobs are lost on restart.
    Memory,
    /// SQLite via SeaORM.
    Database,
}

impl StoreBackend {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "memory" | "mem" => Some(Self::Memory),
            "database" | "db" | "sqlite" => Some(Self::Database),
            _ => None,
        }
    }
}

impl std::fmt::Display for StoreBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Memory => write!(f, "memory"),
            Self::Database => write!(f, "database"),
        }
    }
}

/// Application configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Runtime environment
    pub environment: Environment,
    /// Server host address
    pub host: String,
    /// Server port
    pub port: u16,
    /// Database URL (SQLite connection string)
    pub database_url: String,
    /// Store backend holding job state
    pub store_backend: StoreBackend,
    /// Deadline applied to a target when neither the target nor the job declares one
    pub default_timeout: Duration,
    /// Image name prefix; the target architecture is appended as the tag
    pub runner_image: String,
    /// Container runtime binary to invoke
    pub docker_bin: String,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// In development mode (RUST_ENV=development):
    /// - All variables have sensible defaults
    /// - Only RUST_ENV is required
    ///
    /// In production mode (RUST_ENV=production):
    /// - Server will NOT start if the database backend is selected and
    ///   DATABASE_URL still matches the development default
    ///
    /// Environment variables:
    /// - `RUST_ENV`: Environment (development/production) - REQUIRED
    /// - `MTH_HOST`: Server host (default: 127.0.0.1)
    /// - `MTH_PORT`: Server port (default: 8080)
    /// - `DATABASE_URL`: SQLite connection string (required in production)
    /// - `MTH_STORE`: Store backend, memory or database (default: database)
    /// - `MTH_DEFAULT_TIMEOUT`: Fallback target deadline, e.g. "30s", "5m" (default: 5m)
    /// - `MTH_RUNNER_IMAGE`: Runner image name prefix (default: multiarch-test-runner)
    /// - `MTH_DOCKER_BIN`: Container runtime binary (default: docker)
    pub fn from_env() -> Result<Self, ConfigError> {
        // Parse environment - required
        let env_str = env::var("RUST_ENV").map_err(|_| ConfigError::MissingEnvVar("RUST_ENV"))?;

        let environment = Environment::parse(&env_str).ok_or(ConfigError::InvalidValue(
            "RUST_ENV must be 'development' or 'production'",
        ))?;

        // Load values with defaults
        let host = env::var("MTH_HOST").unwrap_or_else(|_| defaults::DEV_HOST.to_string());

        let port = env::var("MTH_PORT")
            .unwrap_or_else(|_| defaults::DEV_PORT.to_string())
            .parse::<u16>()
            .map_err(|_| ConfigError::InvalidValue("MTH_PORT must be a valid port number"))?;

        let database_url =
            env::var("DATABASE_URL").unwrap_or_else(|_| defaults::DEV_DATABASE_URL.to_string());

        let store_backend = match env::var("MTH_STORE") {
            Ok(v) => StoreBackend::parse(&v).ok_or(ConfigError::InvalidValue(
                "MTH_STORE must be 'memory' or 'database'",
            ))?,
            Err(_) => StoreBackend::Database,
        };

        let timeout_str = env::var("MTH_DEFAULT_TIMEOUT")
            .unwrap_or_else(|_| defaults::DEV_DEFAULT_TIMEOUT.to_string());
        let default_timeout = parse_duration(&timeout_str).ok_or(ConfigError::InvalidValue(
            "MTH_DEFAULT_TIMEOUT must be a duration like '30s', '5m' or '1h'",
        ))?;

        let runner_image =
            env::var("MTH_RUNNER_IMAGE").unwrap_or_else(|_| defaults::DEV_RUNNER_IMAGE.to_string());

        let docker_bin =
            env::var("MTH_DOCKER_BIN").unwrap_or_else(|_| defaults::DEV_DOCKER_BIN.to_string());

        let config = Config {
            environment,
            host,
            port,
            database_url,
            store_backend,
            default_timeout,
            runner_image,
            docker_bin,
        };

        // Validate production configuration
        if environment.is_production() {
            config.validate_production()?;
        }

        Ok(config)
    }

    /// Validate that production configuration does not use development defaults.
    fn validate_production(&self) -> Result<(), ConfigError> {
        let mut errors = Vec::new();

        if self.store_backend == StoreBackend::Database
            && self.database_url == defaults::DEV_DATABASE_URL
        {
            errors.push(format!(
                "DATABASE_URL is using development default '{}'. Set a production SQLite URL.",
                defaults::DEV_DATABASE_URL
            ));
        }

        if self.store_backend == StoreBackend::Memory {
            errors.push(
                "MTH_STORE=memory loses all job state on restart. Use the database backend in production."
                    .to_string(),
            );
        }

        if !errors.is_empty() {
            return Err(ConfigError::ProductionValidation(errors));
        }

        Ok(())
    }

    /// Get the server bind address.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Check if running in development mode.
    pub fn is_development(&self) -> bool {
        self.environment.is_development()
    }
}

/// Parse a duration string like "45s", "5m" or "2h".
///
/// A bare number is taken as seconds.
pub fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }

    let (value, unit) = match s.char_indices().rfind(|(_, c)| c.is_ascii_digit()) {
        Some((idx, _)) => s.split_at(idx + 1),
        None => return None,
    };

    let n: u64 = value.parse().ok()?;
    match unit {
        "" | "s" => Some(Duration::from_secs(n)),
        "m" => Some(Duration::from_secs(n * 60)),
        "h" => Some(Duration::from_secs(n * 3600)),
        _ => None,
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(&'static str),

    #[error("Invalid configuration value: {0}")]
    InvalidValue(&'static str),

    #[error("Production configuration validation failed:\n{}", .0.iter().map(|e| format!("  - {}", e)).collect::<Vec<_>>().join("\n"))]
    ProductionValidation(Vec<String>),
}
