//! Database interaction logic using `sqlx` and SQLite.
//!
//! This module keeps pool construction and schema bootstrap in one place so
//! other modules can depend on well-defined functions instead of scattering
//! DDL across the code. Catalog queries live in [`crate::registry`].

use std::path::Path;

use std::str::FromStr;

use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    ConnectOptions, Pool, Sqlite,
};
use thiserror::Error;

/// Custom error type for database operations.
#[derive(Debug, Error)]
pub enum DbError {
    /// Represents a failure to connect to the database.
    #[error("Failed to connect to the database: {0}")]
    ConnectionFailed(sqlx::Error),

    /// Represents a failure during a database query.
    #[error("Database query failed: {0}")]
    QueryFailed(#[from] sqlx::Error),
}

/// A handle to the database connection pool.
pub type DbPool = Pool<Sqlite>;

/// Initializes the database connection pool.
///
/// # Arguments
/// * `database_url` - The SQLite connection string.
pub async fn init_db(database_url: &str) -> Result<DbPool, DbError> {
    create_sqlite_parent_dir(database_url);

    let options = SqliteConnectOptions::from_str(database_url)
        .map_err(DbError::ConnectionFailed)?
        .create_if_missing(true)
        .disable_statement_logging();

    SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await
        .map_err(DbError::ConnectionFailed)
}

/// Ensures the catalog schema exists.
pub async fn ensure_schema(pool: &DbPool) -> Result<(), DbError> {
    let statements = [
        r#"
        CREATE TABLE IF NOT EXISTS workers (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            media_types TEXT NOT NULL DEFAULT '[]',
            enabled INTEGER NOT NULL DEFAULT 1,
            created_at TEXT NOT NULL
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS providers (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            type TEXT NOT NULL DEFAULT 'api',
            base_endpoint TEXT,
            auth_type TEXT NOT NULL DEFAULT 'bearer',
            auth_secret_name TEXT,
            priority INTEGER NOT NULL DEFAULT 100,
            enabled INTEGER NOT NULL DEFAULT 1,
            rate_limit_rpm INTEGER,
            daily_quota INTEGER,
            created_at TEXT NOT NULL
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS models (
            id TEXT PRIMARY KEY,
            provider_id TEXT NOT NULL,
            model_id TEXT NOT NULL,
            worker_id TEXT NOT NULL,
            capabilities TEXT NOT NULL DEFAULT '[]',
            context_window INTEGER,
            cost_input_per_1k REAL NOT NULL DEFAULT 0,
            cost_output_per_1k REAL NOT NULL DEFAULT 0,
            quality_tier TEXT NOT NULL DEFAULT 'standard',
            speed_tier TEXT NOT NULL DEFAULT 'medium',
            priority INTEGER NOT NULL DEFAULT 100,
            enabled INTEGER NOT NULL DEFAULT 1
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS worker_providers (
            worker_id TEXT NOT NULL,
            provider_id TEXT NOT NULL,
            priority INTEGER,
            UNIQUE(worker_id, provider_id)
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS provider_status (
            provider_id TEXT PRIMARY KEY,
            healthy INTEGER NOT NULL DEFAULT 1,
            last_success_at TEXT,
            last_failure_at TEXT,
            consecutive_failures INTEGER NOT NULL DEFAULT 0,
            quota_used_today INTEGER NOT NULL DEFAULT 0,
            quota_resets_at TEXT,
            marked_exhausted_until TEXT
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS workflows (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            description TEXT,
            definition TEXT NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS provider_usage (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            provider TEXT NOT NULL,
            model TEXT,
            worker TEXT,
            success INTEGER NOT NULL,
            latency_ms INTEGER NOT NULL,
            tokens_used INTEGER,
            cost_cents REAL,
            error_message TEXT,
            created_at TEXT NOT NULL
        )
        "#,
        r#"
        CREATE INDEX IF NOT EXISTS idx_models_provider_worker
        ON models(provider_id, worker_id, enabled, priority)
        "#,
        r#"
        CREATE INDEX IF NOT EXISTS idx_worker_providers_worker
        ON worker_providers(worker_id, priority)
        "#,
        r#"
        CREATE INDEX IF NOT EXISTS idx_provider_usage_provider_time
        ON provider_usage(provider, created_at)
        "#,
    ];

    for statement in statements {
        let result = sqlx::query(statement)
            .execute(pool)
            .await
            .map_err(DbError::QueryFailed)?;
        let _ = result.rows_affected();
    }

    Ok(())
}

fn create_sqlite_parent_dir(database_url: &str) {
    if let Some(path) = extract_sqlite_path(database_url) {
        if let Some(parent) = path.parent() {
            if let Err(err) = std::fs::create_dir_all(parent) {
                eprintln!("genrelay: failed to create database directory {parent:?}: {err}");
            }
        }
    }
}

fn extract_sqlite_path(database_url: &str) -> Option<std::path::PathBuf> {
    let trimmed = database_url.strip_prefix("sqlite:")?;
    if trimmed.starts_with("memory") || trimmed == ":memory:" {
        return None;
    }
    let path = trimmed.trim_start_matches("//");
    if path.is_empty() {
        None
    } else {
        Some(Path::new(path).to_path_buf())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_url_has_no_path() {
        assert_eq!(extract_sqlite_path("sqlite::memory:"), None);
        assert_eq!(extract_sqlite_path("sqlite:memory"), None);
    }

    #[test]
    fn file_url_extracts_path() {
        assert_eq!(
            extract_sqlite_path("sqlite:///tmp/app.db"),
            Some(Path::new("/tmp/app.db").to_path_buf())
        );
    }
}
