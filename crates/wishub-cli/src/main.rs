//! wishub-skill server entry point.
//!
//! Starts the HTTP surface (`/skill/invoke`, `/skill/orchestrate`, ...)
//! backed by SQLite task/workflow storage, a filesystem artifact store, and
//! a Docker sandbox for untrusted skill execution.

mod config;
mod http;
mod paths;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use wishub_orchestrator::{InvocationService, Orchestrator};
use wishub_sandbox::{BollardEngine, DockerSandboxRunner};
use wishub_store::{FilesystemArtifactStore, SqliteStore};

use config::Settings;
use http::AppState;
use paths::WishubPaths;

#[derive(Parser)]
#[command(name = "wishub")]
#[command(about = "Sandboxed skill execution and workflow orchestration server", long_about = None)]
struct Cli {
    /// Config file path (defaults to the system config directory)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Address to bind the HTTP server to (overrides config)
    #[arg(long, env = "WISHUB_BIND_ADDR")]
    bind: Option<String>,

    /// SQLite database path (overrides config)
    #[arg(long, env = "WISHUB_DATABASE_PATH")]
    database: Option<PathBuf>,

    /// Artifact storage root (overrides config)
    #[arg(long, env = "WISHUB_ARTIFACT_ROOT")]
    artifact_root: Option<PathBuf>,

    /// Log level
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Log format: "json" or "pretty"
    #[arg(long, default_value = "json")]
    log_format: String,
}

fn init_logging(level: &str, format: &str) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("{}={}", env!("CARGO_CRATE_NAME"), level).into());

    let registry = tracing_subscriber::registry().with(env_filter);
    if format == "json" {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_level, &cli.log_format);

    let paths = WishubPaths::new().context("failed to determine system directories")?;
    paths.ensure_directories()?;

    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(|| paths.default_config_file());
    let mut settings = Settings::load(Some(config_path.as_path()))?;

    if let Some(bind) = &cli.bind {
        if let Some((host, port)) = bind.rsplit_once(':') {
            settings.bind_host = host.to_string();
            settings.bind_port = port.parse().context("invalid --bind port")?;
        }
    }
    let database_path = cli
        .database
        .clone()
        .or_else(|| settings.database_path.clone().map(PathBuf::from))
        .unwrap_or(paths.database_path);
    let artifact_root = cli
        .artifact_root
        .clone()
        .or_else(|| settings.artifact_root.clone().map(PathBuf::from))
        .unwrap_or(paths.artifact_root);

    info!(
        database = %database_path.display(),
        artifacts = %artifact_root.display(),
        "starting wishub-skill"
    );

    let store = Arc::new(
        SqliteStore::new(&database_path)
            .await
            .context("failed to open sqlite store")?,
    );
    let artifacts = Arc::new(FilesystemArtifactStore::new(artifact_root));

    let engine = Arc::new(BollardEngine::connect().context("failed to connect to Docker")?);
    let scratch_root = std::env::temp_dir().join("wishub-skill-scratch");
    std::fs::create_dir_all(&scratch_root)?;
    let sandbox = Arc::new(DockerSandboxRunner::new(engine.clone(), scratch_root));

    let invocation = Arc::new(InvocationService::new(
        store.clone(),
        artifacts.clone(),
        sandbox,
        store.clone(),
        settings.max_concurrent_containers,
    ));
    let orchestrator = Arc::new(Orchestrator::new(invocation.clone(), store.clone()));

    let bind_addr = settings.bind_addr();
    let state = Arc::new(AppState {
        settings,
        invocation,
        orchestrator,
        store: store.clone(),
        artifacts,
        catalog: store,
        engine,
    });

    let app = http::router(state);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {bind_addr}"))?;
    info!(addr = %bind_addr, "HTTP server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.unwrap();
            info!("shutting down");
        })
        .await?;

    Ok(())
}
