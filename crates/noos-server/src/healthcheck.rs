//! `healthcheck` subcommand: a one-shot liveness probe suitable for a
//! container `HEALTHCHECK` directive, grounded on the teacher's
//! `check_db`/`check_server` split in `main.rs`'s `Healthcheck` subcommand.

use anyhow::anyhow;

use crate::config::CONFIG_BIN;

pub(crate) async fn health(check_db: bool, check_server: bool) -> anyhow::Result<()> {
    let mut failures = Vec::new();

    if check_db {
        if let Err(e) = check_database().await {
            failures.push(format!("database: {e}"));
        } else {
            println!("database: ok");
        }
    }

    if check_server {
        if let Err(e) = check_server_listening().await {
            failures.push(format!("server: {e}"));
        } else {
            println!("server: ok");
        }
    }

    if !check_db && !check_server {
        println!("healthcheck: nothing selected, pass -d/-s/-a");
    }

    if failures.is_empty() {
        Ok(())
    } else {
        for f in &failures {
            eprintln!("FAIL: {f}");
        }
        Err(anyhow!("{} health check(s) failed", failures.len()))
    }
}

#[cfg(feature = "sqlx-postgres")]
async fn check_database() -> anyhow::Result<()> {
    let database_url = &noos_engine::CONFIG.storage.database_url;
    if database_url.is_empty() {
        anyhow::bail!("NOOS__STORAGE__DATABASE_URL is not set");
    }
    sqlx::postgres::PgPoolOptions::new()
        .max_connections(1)
        .connect(database_url)
        .await?;
    Ok(())
}

#[cfg(not(feature = "sqlx-postgres"))]
async fn check_database() -> anyhow::Result<()> {
    Ok(())
}

async fn check_server_listening() -> anyhow::Result<()> {
    let addr = std::net::SocketAddr::from((CONFIG_BIN.bind_ip, CONFIG_BIN.listen_port));
    tokio::net::TcpStream::connect(addr).await?;
    Ok(())
}
