use clap::Parser;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use forum_gateway::config::Args;
use forum_gateway::rate_limit::cleanup_task;
use forum_gateway::state::AppState;
use forum_gateway::store::MemoryNotificationStore;
use forum_gateway::{logging, server};

#[tokio::main]
async fn main() -> std::io::Result<()> {
    // parse cli arguments
    let args = Args::parse();
    logging::init(&args.log_level, args.log_json);

    let rate_limit = args.rate_limit_config();
    let stream = args.stream_config();
    let shutdown = CancellationToken::new();

    let store = Arc::new(MemoryNotificationStore::new());
    let state = Arc::new(AppState::new(&rate_limit, stream, store, shutdown.clone()));

    if rate_limit.enabled {
        tokio::spawn(cleanup_task(
            Arc::clone(&state.rate_limiter),
            rate_limit.cleanup_interval,
            shutdown.clone(),
        ));
        info!(
            limit = rate_limit.requests_limit,
            window_secs = rate_limit.window_seconds,
            "rate limiting enabled"
        );
    } else {
        info!("rate limiting disabled");
    }

    // cancel everything (cleanup sweep, open streams, server) on ctrl-c
    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to listen for shutdown signal");
            return;
        }
        info!("shutdown requested");
        signal_token.cancel();
    });

    let addr = format!("0.0.0.0:{}", args.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    server::serve(listener, state).await
}
