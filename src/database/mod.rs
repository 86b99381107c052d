//! Job database: connection setup and schema migrations
//!
//! Stream jobs, their media and the run history may live in SQLite,
//! PostgreSQL or MySQL; the backend is picked from the URL scheme.

use anyhow::{Context, Result};
use sea_orm::{ConnectOptions, Database as SeaOrmDatabase, DatabaseBackend, DatabaseConnection};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use crate::config::DatabaseConfig;

pub mod migrations;
pub mod repositories;

/// Shared handle to the job database
#[derive(Clone)]
pub struct Database {
    pub connection: Arc<DatabaseConnection>,
    pub backend: DatabaseBackend,
}

impl Database {
    pub async fn new(config: &DatabaseConfig) -> Result<Self> {
        let backend = Self::detect_backend(&config.url)?;
        info!("Connecting to {:?} database", backend);

        let connection_url = match backend {
            DatabaseBackend::Sqlite => Self::ensure_sqlite_auto_creation(&config.url)?,
            _ => config.url.clone(),
        };

        let mut connect_options = ConnectOptions::new(&connection_url);
        connect_options
            .max_connections(config.max_connections)
            .min_connections(1)
            .connect_timeout(Duration::from_secs(5))
            .acquire_timeout(Duration::from_secs(3))
            .idle_timeout(Duration::from_secs(600))
            .max_lifetime(Duration::from_secs(1800))
            .sqlx_logging_level(tracing::log::LevelFilter::Debug);

        let connection = SeaOrmDatabase::connect(connect_options)
            .await
            .with_context(|| format!("Failed to connect to database at '{}'", config.url))?;

        debug!("Connected to {:?} job database", backend);

        Ok(Self {
            connection: Arc::new(connection),
            backend,
        })
    }

    fn detect_backend(url: &str) -> Result<DatabaseBackend> {
        let scheme = url.split(':').next().unwrap_or_default();
        match scheme {
            "sqlite" => Ok(DatabaseBackend::Sqlite),
            "postgres" | "postgresql" => Ok(DatabaseBackend::Postgres),
            "mysql" => Ok(DatabaseBackend::MySql),
            _ => anyhow::bail!("Unsupported job database URL: {url}"),
        }
    }

    /// File-backed SQLite URLs get `mode=rwc` so a fresh install creates its database.
    fn ensure_sqlite_auto_creation(url: &str) -> Result<String> {
        if url.contains("mode=") || url.contains(":memory:") {
            return Ok(url.to_string());
        }

        let location = url
            .strip_prefix("sqlite://")
            .or_else(|| url.strip_prefix("sqlite:"))
            .with_context(|| format!("Invalid SQLite URL: {url}"))?;
        let db_file = std::path::Path::new(location.split('?').next().unwrap_or(location));
        if db_file.exists() {
            return Ok(url.to_string());
        }

        let missing_dir = db_file
            .parent()
            .filter(|dir| !dir.as_os_str().is_empty() && !dir.exists());
        if let Some(dir) = missing_dir {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create job database directory {}", dir.display()))?;
            info!("Created job database directory {}", dir.display());
        }

        let separator = if url.contains('?') { '&' } else { '?' };
        Ok(format!("{url}{separator}mode=rwc"))
    }

    /// Create or upgrade the job, media and history tables.
    pub async fn migrate(&self) -> Result<()> {
        use migrations::Migrator;
        use sea_orm_migration::MigratorTrait;

        debug!("Applying job database migrations");
        Migrator::up(&*self.connection, None)
            .await
            .context("Failed to migrate the job database")?;
        info!("Job database schema is up to date");
        Ok(())
    }

    pub fn connection(&self) -> Arc<DatabaseConnection> {
        self.connection.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_backends_from_url_scheme() {
        assert_eq!(Database::detect_backend("sqlite::memory:").unwrap(), DatabaseBackend::Sqlite);
        assert_eq!(
            Database::detect_backend("postgresql://u:p@localhost/db").unwrap(),
            DatabaseBackend::Postgres
        );
        assert_eq!(Database::detect_backend("mysql://localhost/db").unwrap(), DatabaseBackend::MySql);
        assert!(Database::detect_backend("redis://localhost").is_err());
    }

    #[test]
    fn sqlite_urls_gain_create_mode() {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}/sub/jobs.db", dir.path().display());

        let adjusted = Database::ensure_sqlite_auto_creation(&url).unwrap();

        assert_eq!(adjusted, format!("{url}?mode=rwc"));
        assert!(dir.path().join("sub").exists());
        assert_eq!(
            Database::ensure_sqlite_auto_creation("sqlite::memory:").unwrap(),
            "sqlite::memory:"
        );
    }
}
