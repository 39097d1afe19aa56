//! Configuration types.
//!
//! Everything is read from environment variables. Each component exposes a
//! `from_lookup` constructor taking a key → value function so it can be built
//! from a plain map in tests; `from_env` wires that to the process environment.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;

use crate::channels::{EmailConfig, WhatsAppConfig};
use crate::error::ConfigError;
use crate::pipeline::PipelineConfig;
use crate::store::DatabaseConfig;
use crate::stream::KafkaConfig;

// ── Lookup helpers ──────────────────────────────────────────────────

/// Fetch a variable, trimmed. Blank values count as unset.
pub(crate) fn lookup_string<F>(lookup: &F, key: &str) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Fetch and parse a variable. Unset is `Ok(None)`; unparseable is an error.
pub(crate) fn lookup_parsed<T, F>(lookup: &F, key: &str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup_string(lookup, key) {
        Some(raw) => raw
            .parse::<T>()
            .map(Some)
            .map_err(|e| ConfigError::InvalidValue {
                key: key.to_string(),
                message: format!("{raw:?}: {e}"),
            }),
        None => Ok(None),
    }
}

/// Fetch a variable that must be present.
pub(crate) fn require_string<F>(lookup: &F, key: &str) -> Result<String, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    lookup_string(lookup, key).ok_or_else(|| ConfigError::MissingEnvVar(key.to_string()))
}

// ── HTTP server ─────────────────────────────────────────────────────

/// Query API listener.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

impl ServerConfig {
    pub fn from_lookup<F>(lookup: &F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        Ok(Self {
            host: lookup_string(lookup, "HTTP_HOST").unwrap_or(defaults.host),
            port: lookup_parsed(lookup, "APP_PORT")?.unwrap_or(defaults.port),
        })
    }

    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|e| ConfigError::InvalidValue {
                key: "HTTP_HOST".to_string(),
                message: format!("{}: {e}", self.host),
            })
    }
}

// ── Logging ─────────────────────────────────────────────────────────

/// Optional file logging in addition to stderr.
#[derive(Debug, Clone, Default)]
pub struct LogConfig {
    /// Directory for daily-rotated log files. `None` logs to stderr only.
    pub dir: Option<PathBuf>,
}

impl LogConfig {
    pub fn from_lookup<F>(lookup: &F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        Self {
            dir: lookup_string(lookup, "LOG_DIR").map(PathBuf::from),
        }
    }
}

// ── Application ─────────────────────────────────────────────────────

/// Full service configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub kafka: KafkaConfig,
    pub database: DatabaseConfig,
    pub server: ServerConfig,
    pub pipeline: PipelineConfig,
    /// `None` when SMTP is not configured.
    pub email: Option<EmailConfig>,
    /// `None` when the WhatsApp provider is not configured.
    pub whatsapp: Option<WhatsAppConfig>,
    pub log: LogConfig,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        Ok(Self {
            kafka: KafkaConfig::from_lookup(&lookup)?,
            database: DatabaseConfig::from_lookup(&lookup)?,
            server: ServerConfig::from_lookup(&lookup)?,
            pipeline: PipelineConfig::from_lookup(&lookup)?,
            email: EmailConfig::from_lookup(&lookup)?,
            whatsapp: WhatsAppConfig::from_lookup(&lookup)?,
            log: LogConfig::from_lookup(&lookup),
        })
    }
}

/// Build a lookup function over fixed key/value pairs.
#[cfg(test)]
pub(crate) fn test_lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> + use<> {
    let map: std::collections::HashMap<String, String> = vars
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    move |k| map.get(k).cloned()
}
