#![warn(missing_debug_implementations, rust_2018_idioms, unreachable_pub, clippy::pedantic)]
#![forbid(unsafe_code)]
#![allow(clippy::module_name_repetitions, clippy::similar_names)]

use clap::{Parser, Subcommand};
use tracing_subscriber::{filter::LevelFilter, EnvFilter};

mod config;
mod error_response;
mod healthcheck;
mod request_tracing;
mod routes;
mod serve;
mod wait_for_db;

pub(crate) use config::CONFIG_BIN;
const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Parser)]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run pending database migrations.
    Migrate {},
    /// Wait for the database to be up and migrated.
    WaitForDB {
        #[clap(default_value = "false", short = 'd', help = "Test DB connection, requires postgres env values.")]
        check_db: bool,
        #[clap(default_value = "false", short = 'm', help = "Check migrations, implies -d.")]
        check_migrations: bool,
        #[clap(default_value_t = 15, long, short, help = "Number of retries to connect to the database.")]
        retries: u32,
        #[clap(default_value_t = 2, long, short, help = "Delay in seconds between retries.")]
        backoff: u64,
    },
    /// Run the server.
    Serve {
        #[clap(
            default_value = "true",
            short = 'f',
            long = "force-start",
            help = "Start server even if DB is not up or migrations aren't complete."
        )]
        force_start: bool,
    },
    /// Check the health of the server.
    Healthcheck {
        #[clap(default_value = "false", short = 'a', help = "Check all services, implies -d and -s.")]
        check_all: bool,
        #[clap(
            default_value = "false",
            short = 'd',
            help = "Only test DB connection, requires postgres env values.",
            conflicts_with("check_all")
        )]
        check_db: bool,
        #[clap(
            default_value = "false",
            short = 's',
            help = "Check that the server is accepting connections.",
            conflicts_with("check_all")
        )]
        check_server: bool,
    },
    /// Print the version of the server.
    Version {},
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .json()
        .flatten_event(true)
        .with_current_span(true)
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .from_env_lossy(),
        )
        .init();

    match cli.command {
        Some(Commands::WaitForDB { check_db, check_migrations, retries, backoff }) => {
            let check_db = check_db || check_migrations;
            wait_for_db::wait_for_db(check_migrations, retries, backoff, check_db).await?;
        }
        Some(Commands::Migrate {}) => {
            print_info();
            migrate().await?;
        }
        Some(Commands::Serve { force_start }) => {
            print_info();
            serve_and_maybe_migrate(force_start).await?;
        }
        Some(Commands::Healthcheck { check_all, mut check_db, mut check_server }) => {
            check_db |= check_all;
            check_server |= check_all;
            healthcheck::health(check_db, check_server).await?;
        }
        Some(Commands::Version {}) => {
            println!("{}", env!("CARGO_PKG_VERSION"));
        }
        None => {
            if CONFIG_BIN.debug.auto_serve {
                print_info();
                serve_and_maybe_migrate(true).await?;
            } else {
                eprintln!("No subcommand provided. Use --help for more information.");
                anyhow::bail!("No subcommand provided");
            }
        }
    }

    Ok(())
}

async fn serve_and_maybe_migrate(force_start: bool) -> anyhow::Result<()> {
    if CONFIG_BIN.debug.migrate_before_serve {
        wait_for_db::wait_for_db(false, 15, 2, true).await?;
        migrate().await?;
    }
    serve(force_start).await
}

#[cfg(feature = "sqlx-postgres")]
async fn migrate() -> anyhow::Result<()> {
    println!("Migrating database...");
    let storage = noos_engine::service::storage::postgres::PostgresStorage::connect(
        &noos_engine::CONFIG.storage.database_url,
        noos_engine::CONFIG.storage.max_connections,
    )
    .await?;
    storage.migrate().await?;
    println!("Database migration complete.");
    Ok(())
}

#[cfg(not(feature = "sqlx-postgres"))]
async fn migrate() -> anyhow::Result<()> {
    println!("built without sqlx-postgres; nothing to migrate");
    Ok(())
}

async fn serve(force_start: bool) -> anyhow::Result<()> {
    tracing::info!("Starting server on {}:{}...", CONFIG_BIN.bind_ip, CONFIG_BIN.listen_port);
    let bind_addr = std::net::SocketAddr::from((CONFIG_BIN.bind_ip, CONFIG_BIN.listen_port));
    if !force_start && !CONFIG_BIN.memory {
        wait_for_db::wait_for_db(true, 0, 0, true).await?;
    }
    serve::serve(bind_addr).await
}

fn print_info() {
    println!("noos-server {VERSION} — retail analytics task engine and NOOS classifier");
    tracing::info!(version = VERSION, "starting noos-server");
}
