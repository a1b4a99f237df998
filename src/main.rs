use std::net::SocketAddr;
use std::sync::Arc;

use axum::routing::get;
use axum::{Json, Router};
use clap::{Parser, Subcommand};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tracing::{error, info};

use reddit_fleet::auth::{OAuthTokenProvider, Sealer};
use reddit_fleet::models::{RedditCredentials, ScraperType};
use reddit_fleet::services::{
    CommentsWorker, CountingTransport, PostsWorker, RateLimitOracle, RedditClient, UsageRecorder,
};
use reddit_fleet::{db, AppConfig, AppState};

/// The crate builds a single binary: run with no arguments to be the
/// control plane supervisor, or as `worker --scraper-id <id>` to be a
/// re-invoked supervised child.
#[derive(Parser)]
#[command(name = "reddit-fleet")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Serve the operator HTTP API and supervise worker processes.
    Supervise,
    /// Run one scraper's rotation loop. Spawned by the Supervisor.
    Worker {
        #[arg(long)]
        scraper_id: String,
        #[arg(long, default_value_t = 9100)]
        health_port: u16,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive("reddit_fleet=info".parse()?))
        .init();

    let cli = Cli::parse();
    match cli.command.unwrap_or(Command::Supervise) {
        Command::Supervise => run_supervise().await,
        Command::Worker { scraper_id, health_port } => run_worker(scraper_id, health_port).await,
    }
}

async fn run_supervise() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::from_env();
    info!(addr = %config.server_address(), "starting control plane supervisor");

    let state = AppState::new(config.clone()).await?;

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    tokio::spawn(state.supervisor.clone().run_liveness_loop(shutdown_rx));

    let app = reddit_fleet::routes::create_routes()
        .layer(CorsLayer::permissive())
        .with_state(state);

    let addr: SocketAddr = config.server_address().parse()?;
    let listener = TcpListener::bind(&addr).await?;
    info!(%addr, "control plane listening");

    let server = axum::serve(listener, app);
    tokio::select! {
        result = server => {
            if let Err(e) = result {
                error!(error = %e, "server exited with error");
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("received shutdown signal, draining workers");
            let _ = shutdown_tx.send(true);
        }
    }

    Ok(())
}

async fn run_worker(scraper_id: String, health_port: u16) -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::from_env();
    info!(scraper_id, health_port, "starting worker process");

    let store = db::build_store(&config).await?;
    let sealer = Sealer::new(&config.seal_key);
    let record = store.scrapers.load(&scraper_id).await?;
    let credentials: RedditCredentials = sealer.unseal_json(&record.sealed_credentials)?;

    let oracle = Arc::new(RateLimitOracle::new(config.rate_limit_threshold));
    let transport = Arc::new(CountingTransport::new(
        &credentials.user_agent,
        oracle.clone(),
        config.cost_per_1000_requests,
    )?);
    let tokens = Arc::new(OAuthTokenProvider::new(credentials)?);
    let reddit_client: Arc<dyn reddit_fleet::services::RedditTransport> =
        Arc::new(RedditClient::new(transport.clone(), tokens));

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);

    let recorder = Arc::new(UsageRecorder::new(store.usage.clone(), transport.clone(), config.flush_interval_secs));
    tokio::spawn(recorder.run(shutdown_rx.clone()));

    let rotation_handle = match record.scraper_type {
        ScraperType::Posts => {
            let worker = PostsWorker::new(scraper_id.clone(), store.clone(), reddit_client, oracle);
            tokio::spawn(worker.run(shutdown_rx.clone()))
        }
        ScraperType::Comments => {
            let worker = CommentsWorker::new(scraper_id.clone(), store.clone(), reddit_client, oracle);
            tokio::spawn(worker.run(shutdown_rx.clone()))
        }
    };

    let health_app = Router::new().route("/health", get(worker_health));
    let addr = SocketAddr::from(([127, 0, 0, 1], health_port));
    let listener = TcpListener::bind(&addr).await?;
    info!(%addr, "worker health endpoint listening");

    tokio::select! {
        _ = axum::serve(listener, health_app) => {}
        _ = wait_for_termination() => {
            info!(scraper_id, "worker received shutdown signal");
            let _ = shutdown_tx.send(true);
        }
    }

    let _ = rotation_handle.await;
    Ok(())
}

/// Resolves on SIGTERM (sent by the Supervisor's graceful stop) or
/// Ctrl-C, whichever arrives first.
#[cfg(unix)]
async fn wait_for_termination() {
    use tokio::signal::unix::{signal, SignalKind};
    let mut sigterm = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
    tokio::select! {
        _ = sigterm.recv() => {}
        _ = tokio::signal::ctrl_c() => {}
    }
}

#[cfg(not(unix))]
async fn wait_for_termination() {
    let _ = tokio::signal::ctrl_c().await;
}

async fn worker_health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}
