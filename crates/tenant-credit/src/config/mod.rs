use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use crate::workflows::credit_check::{CreditCheckFee, PollConfig};

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
    pub credit_check: CreditCheckConfig,
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
        let ansi = env_flag("APP_LOG_ANSI")?;

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig { log_level, ansi },
            credit_check: CreditCheckConfig::from_env()?,
        })
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
    pub ansi: bool,
}

/// Fee and polling policy for the credit check workflow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreditCheckConfig {
    pub fee: CreditCheckFee,
    pub poll: PollConfig,
    pub minimum_age: u32,
    pub session_idle_timeout: Duration,
}

impl Default for CreditCheckConfig {
    fn default() -> Self {
        Self {
            fee: CreditCheckFee::default(),
            poll: PollConfig::default(),
            minimum_age: 18,
            session_idle_timeout: Duration::from_secs(30 * 60),
        }
    }
}

impl CreditCheckConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let fee = CreditCheckFee {
            amount_cents: env_number("CREDIT_CHECK_FEE_CENTS", defaults.fee.amount_cents)?,
            currency: env::var("CREDIT_CHECK_CURRENCY")
                .map(|value| value.trim().to_ascii_uppercase())
                .unwrap_or(defaults.fee.currency),
            description: defaults.fee.description,
        };
        if fee.amount_cents == 0 {
            return Err(ConfigError::InvalidNumber {
                key: "CREDIT_CHECK_FEE_CENTS",
            });
        }

        let poll = PollConfig {
            interval: env_positive_seconds(
                "CREDIT_CHECK_POLL_INTERVAL_SECS",
                defaults.poll.interval,
            )?,
            tick_timeout: env_positive_seconds(
                "CREDIT_CHECK_TICK_TIMEOUT_SECS",
                defaults.poll.tick_timeout,
            )?,
            initial_backoff: env_positive_seconds(
                "CREDIT_CHECK_INITIAL_BACKOFF_SECS",
                defaults.poll.initial_backoff,
            )?,
            max_backoff: env_positive_seconds(
                "CREDIT_CHECK_MAX_BACKOFF_SECS",
                defaults.poll.max_backoff,
            )?,
            max_tick_failures: env_number(
                "CREDIT_CHECK_MAX_TICK_FAILURES",
                defaults.poll.max_tick_failures,
            )?,
            max_wait: env_positive_seconds("CREDIT_CHECK_MAX_WAIT_SECS", defaults.poll.max_wait)?,
        };
        if poll.max_tick_failures == 0 {
            return Err(ConfigError::InvalidNumber {
                key: "CREDIT_CHECK_MAX_TICK_FAILURES",
            });
        }
        if poll.max_backoff < poll.initial_backoff {
            return Err(ConfigError::InvalidBackoff);
        }

        Ok(Self {
            fee,
            poll,
            minimum_age: env_number("CREDIT_CHECK_MIN_AGE", defaults.minimum_age)?,
            session_idle_timeout: env_positive_seconds(
                "CREDIT_CHECK_SESSION_IDLE_SECS",
                defaults.session_idle_timeout,
            )?,
        })
    }
}

fn env_number<T>(key: &'static str, default: T) -> Result<T, ConfigError>
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

fn env_positive_seconds(key: &'static str, default: Duration) -> Result<Duration, ConfigError> {
    match env_number(key, default.as_secs())? {
        0 => Err(ConfigError::InvalidNumber { key }),
        secs => Ok(Duration::from_secs(secs)),
    }
}

fn env_flag(key: &'static str) -> Result<bool, ConfigError> {
    match env::var(key) {
        Ok(raw) => match raw.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" | "" => Ok(false),
            _ => Err(ConfigError::InvalidFlag { key }),
        },
        Err(_) => Ok(false),
    }
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost { source: std::net::AddrParseError },
    InvalidNumber { key: &'static str },
    InvalidBackoff,
    InvalidFlag { key: &'static str },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::InvalidNumber { key } => {
                write!(f, "{key} must be a positive whole number")
            }
            ConfigError::InvalidBackoff => write!(
                f,
                "CREDIT_CHECK_MAX_BACKOFF_SECS must not be below CREDIT_CHECK_INITIAL_BACKOFF_SECS"
            ),
            ConfigError::InvalidFlag { key } => write!(f, "{key} must be true or false"),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidHost { source } => Some(source),
            ConfigError::InvalidPort
            | ConfigError::InvalidNumber { .. }
            | ConfigError::InvalidBackoff
            | ConfigError::InvalidFlag { .. } => None,
        }
    }
}
