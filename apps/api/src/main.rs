mod config;
mod documents;
mod errors;
mod matches;
mod models;
mod pipeline;
mod progress;
mod remote;
mod routes;
mod state;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::Config;
use crate::progress::local::LocalProgressChannel;
use crate::progress::pubsub::RedisProgressChannel;
use crate::progress::ProgressChannel;
use crate::remote::http::HttpRemoteProcessor;
use crate::routes::build_router;
use crate::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (fails on missing required env vars)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_PKG_NAME"), &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Resumatch API v{}", env!("CARGO_PKG_VERSION"));

    // Remote processor
    let remote = HttpRemoteProcessor::new(
        &config.remote_api_url,
        config.remote_api_token.clone(),
        config.stage_timeout,
    )?;
    info!("Remote processor at {}", config.remote_api_url);

    // Progress channel
    let progress: Arc<dyn ProgressChannel> = match &config.redis_url {
        Some(url) => {
            let client = redis::Client::open(url.as_str())?;
            info!("Progress over Redis topic '{}'", config.progress_topic);
            Arc::new(RedisProgressChannel::new(client))
        }
        None => {
            warn!("REDIS_URL not set; sessions will report stage transitions only");
            Arc::new(LocalProgressChannel::new())
        }
    };

    let state = AppState::new(config.clone(), Arc::new(remote), progress);

    // Build router
    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive()); // TODO: restrict origins once the frontend host is fixed

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
