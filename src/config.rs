use std::path::PathBuf;

use anyhow::Context;
use clap::Args;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::info;

use crate::db::PgRowSource;
use crate::export::DirectoryDownload;

/// Connection and output settings, built once at startup and handed to
/// whatever needs the backend or the download sink.
#[derive(Debug, Clone, Args)]
pub struct Config {
    /// Postgres connection string for the dashboard tables
    #[arg(long, env = "DATABASE_URL", hide_env_values = true)]
    pub database_url: String,

    /// Upper bound on pooled connections
    #[arg(long, env = "DASHBOARD_MAX_CONNECTIONS", default_value_t = 5)]
    pub max_connections: u32,

    /// Directory that CSV exports are written into
    #[arg(long, env = "DASHBOARD_EXPORT_DIR", default_value = ".")]
    pub export_dir: PathBuf,
}

impl Config {
    pub async fn connect(&self) -> anyhow::Result<PgPool> {
        let pool = PgPoolOptions::new()
            .max_connections(self.max_connections.max(1))
            .connect(&self.database_url)
            .await
            .context("failed to connect to Postgres")?;
        info!(max_connections = self.max_connections, "connected to Postgres");
        Ok(pool)
    }

    pub fn row_source(&self, pool: &PgPool) -> PgRowSource {
        PgRowSource::new(pool.clone())
    }

    pub fn downloads(&self) -> DirectoryDownload {
        DirectoryDownload::new(&self.export_dir)
    }
}
