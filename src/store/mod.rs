//! Persistence layer — libSQL-backed storage for processed notifications.

pub mod libsql_backend;
pub mod migrations;
pub mod traits;

use std::path::PathBuf;
use std::sync::Arc;

pub use libsql_backend::LibSqlBackend;
pub use traits::{Database, NotificationFilter};

use crate::config::lookup_string;
use crate::error::{ConfigError, DatabaseError};

/// Which storage backend to open.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatabaseBackend {
    /// Local libSQL file.
    LibSql,
    /// Process-local, discarded on exit.
    Memory,
}

impl std::str::FromStr for DatabaseBackend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "libsql" | "sqlite" => Ok(Self::LibSql),
            "memory" => Ok(Self::Memory),
            other => Err(ConfigError::UnsupportedDatabase(other.to_string())),
        }
    }
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub backend: DatabaseBackend,
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            backend: DatabaseBackend::LibSql,
            path: PathBuf::from("./data/notifications.db"),
        }
    }
}

impl DatabaseConfig {
    pub fn from_lookup<F>(lookup: &F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let backend = match lookup_string(lookup, "DATABASE_TYPE") {
            Some(raw) => raw.parse()?,
            None => defaults.backend,
        };
        Ok(Self {
            backend,
            path: lookup_string(lookup, "DATABASE_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.path),
        })
    }
}

/// Open the configured backend with its schema applied.
pub async fn open_database(config: &DatabaseConfig) -> Result<Arc<dyn Database>, DatabaseError> {
    let db: Arc<dyn Database> = match config.backend {
        DatabaseBackend::LibSql => Arc::new(LibSqlBackend::new_local(&config.path).await?),
        DatabaseBackend::Memory => {
            tracing::warn!("Using in-memory database; records are lost on exit");
            Arc::new(LibSqlBackend::new_memory().await?)
        }
    };
    Ok(db)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::test_lookup;

    #[test]
    fn backend_names() {
        assert_eq!("libsql".parse::<DatabaseBackend>().unwrap(), DatabaseBackend::LibSql);
        assert_eq!("MEMORY".parse::<DatabaseBackend>().unwrap(), DatabaseBackend::Memory);
        assert!(matches!(
            "postgres".parse::<DatabaseBackend>(),
            Err(ConfigError::UnsupportedDatabase(_))
        ));
    }

    #[test]
    fn config_reads_type_and_path() {
        let cfg = DatabaseConfig::from_lookup(&test_lookup(&[
            ("DATABASE_TYPE", "memory"),
            ("DATABASE_PATH", "/tmp/n.db"),
        ]))
        .unwrap();
        assert_eq!(cfg.backend, DatabaseBackend::Memory);
        assert_eq!(cfg.path, PathBuf::from("/tmp/n.db"));
    }

    #[tokio::test]
    async fn open_memory_database() {
        let cfg = DatabaseConfig {
            backend: DatabaseBackend::Memory,
            ..DatabaseConfig::default()
        };
        let db = open_database(&cfg).await.unwrap();
        let all = db
            .list_notifications(&NotificationFilter::default())
            .await
            .unwrap();
        assert!(all.is_empty());
    }
}
