use anyhow::{Context, Result};
use sqlx::{PgPool, postgres::PgPoolOptions};
use tracing::info;

const SETTLEMENT_SCHEMA: &str = include_str!("../migrations/0001_settlement.sql");

pub async fn connect_database(database_url: &str) -> Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(database_url)
        .await?;

    Ok(pool)
}

/// Applies the settlement schema. Every statement is `IF NOT EXISTS`, so running it on
/// each start is harmless.
pub async fn apply_schema(pool: &PgPool) -> Result<()> {
    sqlx::raw_sql(SETTLEMENT_SCHEMA)
        .execute(pool)
        .await
        .context("failed to apply settlement schema")?;
    info!("settlement schema applied");
    Ok(())
}
