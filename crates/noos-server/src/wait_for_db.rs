//! `wait-for-db` subcommand: polls the configured database until it accepts
//! connections and (optionally) until every embedded migration has been
//! applied, retrying with a fixed backoff (§4.5.1, teacher's
//! `wait_for_db`-style startup gate in `main.rs`).

#[cfg(feature = "sqlx-postgres")]
pub(crate) async fn wait_for_db(
    check_migrations: bool,
    retries: u32,
    backoff_secs: u64,
    check_db: bool,
) -> anyhow::Result<()> {
    if !check_db && !check_migrations {
        return Ok(());
    }

    let database_url = &noos_engine::CONFIG.storage.database_url;
    if database_url.is_empty() {
        anyhow::bail!("NOOS__STORAGE__DATABASE_URL is not set; cannot wait for a database");
    }

    let mut attempt = 0u32;
    loop {
        match sqlx::postgres::PgPoolOptions::new()
            .max_connections(1)
            .connect(database_url)
            .await
        {
            Ok(pool) => {
                if check_migrations {
                    wait_for_migrations(&pool, retries.saturating_sub(attempt), backoff_secs).await?;
                }
                tracing::info!("Database connection established.");
                return Ok(());
            }
            Err(e) if attempt < retries => {
                attempt += 1;
                tracing::warn!(attempt, error = %e, "database not reachable yet, retrying");
                tokio::time::sleep(std::time::Duration::from_secs(backoff_secs)).await;
            }
            Err(e) => anyhow::bail!("could not connect to database after {retries} retries: {e}"),
        }
    }
}

#[cfg(feature = "sqlx-postgres")]
async fn wait_for_migrations(pool: &sqlx::PgPool, retries: u32, backoff_secs: u64) -> anyhow::Result<()> {
    static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("../noos-engine/migrations");

    let mut attempt = 0u32;
    loop {
        let applied: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM _sqlx_migrations WHERE success",
        )
        .fetch_optional(pool)
        .await
        .unwrap_or(None)
        .unwrap_or(0);

        if applied as usize >= MIGRATOR.iter().count() {
            return Ok(());
        }
        if attempt >= retries {
            anyhow::bail!("database migrations are not fully applied after {retries} retries");
        }
        attempt += 1;
        tracing::warn!(attempt, "migrations not fully applied yet, retrying");
        tokio::time::sleep(std::time::Duration::from_secs(backoff_secs)).await;
    }
}

#[cfg(not(feature = "sqlx-postgres"))]
pub(crate) async fn wait_for_db(
    _check_migrations: bool,
    _retries: u32,
    _backoff_secs: u64,
    _check_db: bool,
) -> anyhow::Result<()> {
    tracing::info!("built without sqlx-postgres; nothing to wait for");
    Ok(())
}
