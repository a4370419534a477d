use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod api;
mod assembler;
mod codec;
mod error;
#[cfg(test)]
mod fakes;
mod models;
mod rating;
mod semester;
mod snapshot;
mod store;

use assembler::ResultAssembler;
use snapshot::ConfigSnapshot;
use store::{KeyValueStore, RedisStore};

#[derive(Parser)]
#[command(name = "score-api")]
#[command(about = "Student score and rating lookups over the score Redis", long_about = None)]
struct Cli {
    /// Redis connection string, e.g. redis://localhost:6379/0
    #[arg(long, env = "REDIS_DSN", default_value = "")]
    redis_dsn: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the HTTP API
    Serve {
        #[arg(long, env = "LISTEN", default_value = "")]
        listen: String,
    },
    /// Print every current discipline of a student with its rating
    Disciplines {
        #[arg(long)]
        student_id: i64,
    },
    /// Print one discipline with rating and scores
    Discipline {
        #[arg(long)]
        student_id: i64,
        #[arg(long)]
        discipline_id: i64,
    },
    /// Print a single lesson score
    Score {
        #[arg(long)]
        student_id: i64,
        #[arg(long)]
        discipline_id: i64,
        #[arg(long)]
        lesson_id: i64,
    },
}

fn load_env_file(path: &Path) -> anyhow::Result<()> {
    if path.exists() {
        dotenvy::from_path(path)
            .with_context(|| format!("Error loading {} file", path.display()))?;
    }
    Ok(())
}

fn require(name: &str, value: &str) -> anyhow::Result<()> {
    if value.trim().is_empty() {
        anyhow::bail!("empty {name}");
    }
    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    load_env_file(Path::new(".env"))?;
    let cli = Cli::parse();
    require("REDIS_DSN", &cli.redis_dsn)?;

    let redis = RedisStore::connect(&cli.redis_dsn)
        .await
        .context("failed to open Redis connection")?;
    if let Err(err) = redis.ping().await {
        warn!(error = %err, "failed to ping Redis, continuing");
    }
    let store: Arc<dyn KeyValueStore> = Arc::new(redis);

    let initial = snapshot::load_snapshot(store.as_ref(), &ConfigSnapshot::default()).await;
    if !initial.is_ready() {
        warn!(year = initial.year, "config snapshot not ready yet");
    }

    match cli.command {
        Commands::Serve { listen } => {
            require("LISTEN", &listen)?;
            let (publisher, reader) = snapshot::channel(initial);
            let refresher = snapshot::spawn_refresher(Arc::clone(&store), publisher);
            let assembler = Arc::new(ResultAssembler::new(store, reader));

            let listener = tokio::net::TcpListener::bind(&listen)
                .await
                .with_context(|| format!("failed to bind {listen}"))?;
            info!(%listen, "score api listening");
            axum::serve(listener, api::router(assembler))
                .await
                .context("http server failed")?;
            refresher.abort();
        }
        Commands::Disciplines { student_id } => {
            let (_publisher, reader) = snapshot::channel(initial);
            let assembler = ResultAssembler::new(store, reader);
            print_json(&assembler.discipline_results(student_id).await?)?;
        }
        Commands::Discipline {
            student_id,
            discipline_id,
        } => {
            let (_publisher, reader) = snapshot::channel(initial);
            let assembler = ResultAssembler::new(store, reader);
            let result = assembler.discipline_result(student_id, discipline_id).await?;
            if !result.is_found() {
                println!("Discipline {discipline_id} not found for student {student_id}.");
                return Ok(());
            }
            print_json(&result)?;
        }
        Commands::Score {
            student_id,
            discipline_id,
            lesson_id,
        } => {
            let (_publisher, reader) = snapshot::channel(initial);
            let assembler = ResultAssembler::new(store, reader);
            let result = assembler
                .discipline_score(student_id, discipline_id, lesson_id)
                .await?;
            if !result.is_found() {
                println!("Discipline {discipline_id} not found for student {student_id}.");
                return Ok(());
            }
            print_json(&result)?;
        }
    }

    Ok(())
}
