use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

/// Distinguishes runtime behavior for different stages of the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnvironment {
    Development,
    Test,
    Production,
}

impl AppEnvironment {
    fn from_str(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "prod" | "production" => Self::Production,
            "test" | "ci" => Self::Test,
            _ => Self::Development,
        }
    }
}

/// Top-level configuration for the application.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: AppEnvironment,
    pub server: ServerConfig,
    pub telemetry: TelemetryConfig,
    pub admission: AdmissionConfig,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let environment = AppEnvironment::from_str(
            &env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
        );

        let host = env::var("APP_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("APP_PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse::<u16>()
            .map_err(|_| ConfigError::InvalidPort)?;

        let log_level = env::var("APP_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        let defaults = AdmissionConfig::default();
        let admission = AdmissionConfig {
            request_timeout: Duration::from_secs(numeric_var(
                "APP_REQUEST_TIMEOUT_SECS",
                defaults.request_timeout.as_secs(),
            )?),
            assessment_timeout: Duration::from_secs(numeric_var(
                "APP_ASSESSMENT_TIMEOUT_SECS",
                defaults.assessment_timeout.as_secs(),
            )?),
            auto_approve_threshold: numeric_var(
                "APP_AUTO_APPROVE_THRESHOLD",
                defaults.auto_approve_threshold,
            )?
            .min(100),
            conflict_retry_limit: numeric_var(
                "APP_CONFLICT_RETRIES",
                defaults.conflict_retry_limit,
            )?,
        };

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig { log_level },
            admission,
        })
    }
}

fn numeric_var<T>(key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
{
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|_| ConfigError::InvalidNumber { key }),
        Err(_) => Ok(default),
    }
}

/// Settings controlling the HTTP server binding.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        if self.host.eq_ignore_ascii_case("localhost") {
            return Ok(SocketAddr::new(IpAddr::from([127, 0, 0, 1]), self.port));
        }

        let ip: IpAddr = self
            .host
            .parse()
            .map_err(|source| ConfigError::InvalidHost { source })?;

        Ok(SocketAddr::new(ip, self.port))
    }
}

/// Tracing controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
}

/// Time bounds and policy dials for the join pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdmissionConfig {
    /// Upper bound on the synchronous part of a join request.
    pub request_timeout: Duration,
    /// Internal timeout for a single deferred assessment run.
    pub assessment_timeout: Duration,
    /// Match percentage at which the rubric assessor approves without review.
    pub auto_approve_threshold: u8,
    /// How many times the check-then-act loop re-reads after a store conflict.
    pub conflict_retry_limit: u8,
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(30),
            assessment_timeout: Duration::from_secs(120),
            auto_approve_threshold: 80,
            conflict_retry_limit: 3,
        }
    }
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost { source: std::net::AddrParseError },
    InvalidNumber { key: &'static str },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::InvalidNumber { key } => {
                write!(f, "{key} must be a non-negative integer")
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidPort | ConfigError::InvalidNumber { .. } => None,
            ConfigError::InvalidHost { source } => Some(source),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::sync::{Mutex, OnceLock};

    fn env_guard() -> &'static Mutex<()> {
        static GUARD: OnceLock<Mutex<()>> = OnceLock::new();
        GUARD.get_or_init(|| Mutex::new(()))
    }

    fn reset_env() {
        for key in [
            "APP_ENV",
            "APP_HOST",
            "APP_PORT",
            "APP_LOG_LEVEL",
            "APP_REQUEST_TIMEOUT_SECS",
            "APP_ASSESSMENT_TIMEOUT_SECS",
            "APP_AUTO_APPROVE_THRESHOLD",
            "APP_CONFLICT_RETRIES",
        ] {
            env::remove_var(key);
        }
    }

    #[test]
    fn load_uses_defaults_when_env_missing() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        let config = AppConfig::load().expect("config loads with defaults");
        assert_eq!(config.environment, AppEnvironment::Development);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.telemetry.log_level, "info");
        assert_eq!(config.admission, AdmissionConfig::default());
    }

    #[test]
    fn accepts_localhost_host() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("APP_HOST", "localhost");
        let config = AppConfig::load().expect("config loads");
        let addr = config.server.socket_addr().expect("localhost resolves");
        assert_eq!(addr, SocketAddr::new(IpAddr::from([127, 0, 0, 1]), 3000));
        reset_env();
    }

    #[test]
    fn admission_overrides_are_parsed_and_threshold_clamped() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("APP_ASSESSMENT_TIMEOUT_SECS", "45");
        env::set_var("APP_AUTO_APPROVE_THRESHOLD", "140");
        env::set_var("APP_CONFLICT_RETRIES", "1");
        let config = AppConfig::load().expect("config loads");
        assert_eq!(config.admission.assessment_timeout, Duration::from_secs(45));
        assert_eq!(config.admission.auto_approve_threshold, 100);
        assert_eq!(config.admission.conflict_retry_limit, 1);
        reset_env();
    }

    #[test]
    fn rejects_non_numeric_timeouts() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("APP_REQUEST_TIMEOUT_SECS", "soon");
        match AppConfig::load() {
            Err(ConfigError::InvalidNumber { key }) => {
                assert_eq!(key, "APP_REQUEST_TIMEOUT_SECS")
            }
            other => panic!("expected invalid number error, got {other:?}"),
        }
        reset_env();
    }
}
