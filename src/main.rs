use anyhow::{Context, Result};
use clap::Parser;
use lectern::audio::CaptureFactory;
use lectern::http::{AppState, CaptureBuilder, EngineBuilder};
use lectern::recognizer::UnavailableEngine;
use lectern::upload::HttpTranscribeClient;
use lectern::Config;
use std::sync::Arc;
use tracing::info;

#[derive(Parser)]
#[command(name = "lectern", about = "Streaming lecture/meeting transcription service")]
struct Cli {
    /// Path to the configuration file (without extension)
    #[arg(long, default_value = "config/lectern")]
    config: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let config = Arc::new(Config::load(&cli.config)?);

    info!("lectern v{}", env!("CARGO_PKG_VERSION"));
    info!("Loaded config: {}", config.service.name);

    let client = Arc::new(HttpTranscribeClient::new(
        config.transcription.endpoint.clone(),
        config.transcription.auth_token.clone(),
    )?);

    let source_spec = config.audio.source.clone();
    let capture_factory: Arc<CaptureBuilder> = Arc::new(move || {
        let source = CaptureFactory::parse_source(&source_spec)?;
        CaptureFactory::create(source)
    });

    // Speech recognition is an external capability injected through the
    // library API; the bare service surfaces the unavailable-capability path
    let engine_factory: Arc<EngineBuilder> = Arc::new(|| Box::new(UnavailableEngine));

    let state = AppState::new(Arc::clone(&config), client, capture_factory, engine_factory);
    let router = lectern::create_router(state);

    let addr = format!("{}:{}", config.service.http.bind, config.service.http.port);
    info!("HTTP server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    axum::serve(listener, router)
        .await
        .context("HTTP server error")?;

    Ok(())
}
