use crate::config::PostgresqlConfig;
use anyhow::{Context, Result};
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::PgPool;
use std::str::FromStr;
use std::time::Duration;

/// Build the connection pool from `postgresql.*`.
///
/// Pool limits protect the database from overload; the acquire timeout
/// bounds how long a request waits for a pooled connection before failing
/// fast instead of hanging.
pub async fn connect(config: &PostgresqlConfig) -> Result<PgPool> {
    let options = PgConnectOptions::from_str(&config.url).context("parse postgresql.url")?;
    PgPoolOptions::new()
        .max_connections(config.max_open_connections)
        .min_connections(config.max_idle_connections)
        .max_lifetime(Duration::from_millis(config.max_lifetime_ms))
        .acquire_timeout(Duration::from_millis(
            config.migration.statement_duration_ms,
        ))
        .connect_with(options)
        .await
        .context("connect to postgresql")
}

/// Apply the embedded migrations. Runs before anything serves so that
/// every handler can assume the schema exists; a failure aborts startup.
pub async fn run_migrations(pool: &PgPool) -> Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .context("run migrations")?;
    tracing::info!("migrations applied");
    Ok(())
}

/// Drop and re-create the schema. Used by the `reset` subcommand; the
/// migration bookkeeping table goes with the schema, so a following
/// [`run_migrations`] rebuilds everything from scratch.
pub async fn reset_schema(pool: &PgPool) -> Result<()> {
    tracing::warn!("dropping schema public");
    sqlx::query("DROP SCHEMA public CASCADE")
        .execute(pool)
        .await
        .context("drop schema")?;
    sqlx::query("CREATE SCHEMA public")
        .execute(pool)
        .await
        .context("recreate schema")?;
    Ok(())
}

