use anyhow::{Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;
use std::time::Duration;

use crate::config::{Config, DatabaseConfig};

/// Open the data source behind `url` read-only. The file must exist.
pub async fn connect_data_source(url: &str, config: &DatabaseConfig) -> Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str(url)
        .with_context(|| format!("Invalid database url: {}", url))?
        .read_only(true)
        .busy_timeout(Duration::from_secs(config.busy_timeout_secs));

    let pool = SqlitePoolOptions::new()
        .max_connections(config.pool_size)
        .connect_with(options)
        .await
        .with_context(|| format!("Failed to open data source: {}", url))?;

    Ok(pool)
}

/// Open (creating if needed) the document store database.
pub async fn connect_documents(config: &Config) -> Result<SqlitePool> {
    let db_path = &config.documents.path;

    // Ensure parent directory exists
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", db_path.display()))?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_secs(config.database.busy_timeout_secs));

    let pool = SqlitePoolOptions::new()
        .max_connections(config.database.pool_size)
        .connect_with(options)
        .await?;

    run_migrations(&pool).await?;
    Ok(pool)
}

async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS documents (
            id TEXT PRIMARY KEY,
            filename TEXT NOT NULL,
            format TEXT NOT NULL,
            text TEXT NOT NULL,
            ingested_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_documents_ingested_at ON documents(ingested_at)")
        .execute(pool)
        .await?;

    Ok(())
}
