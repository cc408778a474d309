//! Codetrans Server - HTTP API for streaming code translation

use std::path::PathBuf;

use clap::Parser;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod api;
mod error;
mod state;

use codetrans_core::{EngineConfig, Translator};
use state::{AppState, TranslationMode};

const DEFAULT_LOG_FILTER: &str = "codetrans_server=debug,codetrans_core=debug,tower_http=debug";

#[derive(Debug, Parser)]
#[command(name = "codetrans-server", version, about = "Streaming code translation server")]
struct Args {
    /// Host to bind to
    #[arg(long, default_value = "0.0.0.0", env = "CODETRANS_HOST")]
    host: String,

    /// Port to listen on
    #[arg(long, default_value_t = 8000, env = "CODETRANS_PORT")]
    port: u16,

    /// Checkpoint directory (config.json, tokenizer, weights)
    #[arg(long, env = "CODETRANS_MODEL_DIR")]
    model_dir: Option<PathBuf>,

    /// JSON engine configuration; flags override its values
    #[arg(long, value_name = "PATH", env = "CODETRANS_CONFIG")]
    config: Option<PathBuf>,

    /// Inference device: auto, cpu, cuda or metal
    #[arg(long, env = "CODETRANS_DEVICE")]
    device: Option<String>,

    /// Response mode for /translate-code/
    #[arg(long, value_enum, default_value_t = TranslationMode::Streaming, env = "CODETRANS_MODE")]
    mode: TranslationMode,

    /// Maximum concurrent translations
    #[arg(long, default_value_t = 100, env = "CODETRANS_MAX_CONCURRENT")]
    max_concurrent: usize,

    /// Generation timeout in seconds (0 disables)
    #[arg(long, env = "CODETRANS_TIMEOUT")]
    timeout: Option<u64>,

    /// Increments buffered between generation and the response writer
    #[arg(long, env = "CODETRANS_CHANNEL_CAPACITY")]
    channel_capacity: Option<usize>,

    /// Log filter directives
    #[arg(long, env = "RUST_LOG")]
    log_level: Option<String>,
}

impl Args {
    fn engine_config(&self) -> anyhow::Result<EngineConfig> {
        let mut config = match &self.config {
            Some(path) => EngineConfig::from_file(path)?,
            None => EngineConfig::default(),
        };

        if let Some(dir) = &self.model_dir {
            config.model_dir = dir.clone();
        }
        if let Some(device) = &self.device {
            config.device = device.clone();
        }
        if let Some(timeout) = self.timeout {
            config.generation_timeout_secs = timeout;
        }
        if let Some(capacity) = self.channel_capacity {
            config.stream_channel_capacity = capacity;
        }

        config.validate()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let filter = match args.log_level.as_deref() {
        Some(directives) => EnvFilter::try_new(directives)?,
        None => EnvFilter::new(DEFAULT_LOG_FILTER),
    };
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Codetrans Server");

    let config = args.engine_config()?;
    info!("Model directory: {:?}", config.model_dir);

    // Weight loading is blocking and can take a while.
    let translator = tokio::task::spawn_blocking(move || Translator::load(config)).await??;
    let state = AppState::new(translator, args.mode, args.max_concurrent);
    info!(
        "Translator initialized (model: {}, mode: {})",
        state.translator.model_name(),
        args.mode.as_str()
    );

    let app = api::create_router(state);

    let addr = format!("{}:{}", args.host, args.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Server listening on http://{}", addr);

    let server = axum::serve(listener, app).with_graceful_shutdown(shutdown_signal());

    info!("Server ready. Press Ctrl+C to stop.");
    server.await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            warn!("failed to listen for Ctrl+C: {}", err);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                warn!("failed to install SIGTERM handler: {}", err);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down...");
        },
        _ = terminate => {
            info!("Received SIGTERM, shutting down...");
        },
    }
}
