use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};

use crate::workflows::offers::{IdStrategy, UsagePricing};

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

/// Top-level configuration for the offer desk.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: AppEnvironment,
    pub server: ServerConfig,
    pub telemetry: TelemetryConfig,
    pub offers: OfferDeskConfig,
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
        let log_format = match env::var("APP_LOG_FORMAT") {
            Ok(value) => LogFormat::parse(&value)?,
            Err(_) => LogFormat::Compact,
        };

        let id_strategy = match env::var("OFFER_ID_STRATEGY") {
            Ok(value) => parse_id_strategy(&value)?,
            Err(_) => IdStrategy::Sequence,
        };

        let defaults = UsagePricing::default();
        let pricing = UsagePricing {
            offer_creation_cents: fee_cents("OFFER_CREATION_FEE_CENTS", defaults.offer_creation_cents)?,
            document_extraction_cents: fee_cents(
                "DOCUMENT_EXTRACTION_FEE_CENTS",
                defaults.document_extraction_cents,
            )?,
        };
        if pricing.document_extraction_cents <= pricing.offer_creation_cents {
            return Err(ConfigError::InvalidFeeOrder {
                offer_creation_cents: pricing.offer_creation_cents,
                document_extraction_cents: pricing.document_extraction_cents,
            });
        }

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig {
                log_level,
                log_format,
            },
            offers: OfferDeskConfig {
                id_strategy,
                pricing,
            },
        })
    }
}

fn parse_id_strategy(value: &str) -> Result<IdStrategy, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "sequence" | "seq" => Ok(IdStrategy::Sequence),
        "uuid" => Ok(IdStrategy::Uuid),
        _ => Err(ConfigError::InvalidIdStrategy(value.to_string())),
    }
}

fn fee_cents(key: &'static str, default: u32) -> Result<u32, ConfigError> {
    match env::var(key) {
        Ok(value) => value
            .trim()
            .parse::<u32>()
            .map_err(|_| ConfigError::InvalidFee { key }),
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

/// Log line layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Compact,
    Json,
}

impl LogFormat {
    fn parse(value: &str) -> Result<Self, ConfigError> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" | "text" => Ok(Self::Compact),
            "json" => Ok(Self::Json),
            _ => Err(ConfigError::InvalidLogFormat(value.to_string())),
        }
    }
}

/// Tracing controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
    pub log_format: LogFormat,
}

/// Id generation and usage pricing for the offer service.
#[derive(Debug, Clone, Copy)]
pub struct OfferDeskConfig {
    pub id_strategy: IdStrategy,
    pub pricing: UsagePricing,
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost { source: std::net::AddrParseError },
    InvalidLogFormat(String),
    InvalidIdStrategy(String),
    InvalidFee { key: &'static str },
    InvalidFeeOrder {
        offer_creation_cents: u32,
        document_extraction_cents: u32,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::InvalidLogFormat(value) => {
                write!(f, "APP_LOG_FORMAT must be 'compact' or 'json', got '{value}'")
            }
            ConfigError::InvalidIdStrategy(value) => {
                write!(f, "OFFER_ID_STRATEGY must be 'sequence' or 'uuid', got '{value}'")
            }
            ConfigError::InvalidFee { key } => {
                write!(f, "{key} must be a whole number of cents")
            }
            ConfigError::InvalidFeeOrder {
                offer_creation_cents,
                document_extraction_cents,
            } => write!(
                f,
                "DOCUMENT_EXTRACTION_FEE_CENTS ({document_extraction_cents}) must exceed OFFER_CREATION_FEE_CENTS ({offer_creation_cents})"
            ),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidHost { source } => Some(source),
            _ => None,
        }
    }
}
