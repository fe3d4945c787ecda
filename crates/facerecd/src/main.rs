use anyhow::{Context, Result};
use clap::Parser;
use facerec_core::RecognitionWorkflow;
use facerec_vision::{FaceAligner, FaceDetector, FaceEmbedder, GalleryRecognizer, SqlitePersonStore};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

mod config;
mod pages;
mod routes;
mod session;
mod state;

use config::Config;
use session::SessionStore;
use state::AppState;

const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Parser)]
#[command(name = "facerecd", about = "Face recognition web daemon")]
struct Cli {
    /// Port to listen on (overrides FACEREC_PORT)
    #[arg(short, long)]
    port: Option<u16>,
    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(short, long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    let mut config = Config::from_env()?;
    if let Some(port) = cli.port {
        config.port = port;
    }
    tracing::info!(?config, "facerecd starting");

    let store = Arc::new(
        SqlitePersonStore::open(&config.db_path, &config.faces_dir)
            .context("opening person store")?,
    );

    let detector = FaceDetector::load(&config.scrfd_model_path()).context("loading face detector")?;
    let aligner = Arc::new(FaceAligner::new(detector, &config.aligned_dir));

    let embedder =
        FaceEmbedder::load(&config.arcface_model_path()).context("loading face embedder")?;
    let recognizer = Arc::new(GalleryRecognizer::new(
        embedder,
        store.clone(),
        config.similarity_threshold,
    ));
    let gallery = recognizer.reload().context("building face gallery")?;
    tracing::info!(gallery, "recognizer ready");

    let workflow = RecognitionWorkflow::new(&config.upload_dir, aligner, recognizer, store.clone());
    let sessions = SessionStore::new(Duration::from_secs(config.session_ttl_secs));
    spawn_sweeper(sessions.clone());

    let app = routes::router(AppState {
        workflow: Arc::new(workflow),
        sessions,
        people: store,
    });

    let addr = format!("{}:{}", config.bind, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    tracing::info!(%addr, "facerecd listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serving HTTP")?;

    tracing::info!("facerecd shutting down");
    Ok(())
}

fn spawn_sweeper(sessions: SessionStore) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(SWEEP_INTERVAL);
        loop {
            interval.tick().await;
            let removed = sessions.sweep();
            if removed > 0 {
                tracing::debug!(removed, remaining = sessions.len(), "idle sessions dropped");
            }
        }
    });
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for ctrl-c");
    }
}
