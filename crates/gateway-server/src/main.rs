mod error;
mod handlers;
mod state;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use clap::Parser;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::handlers::*;
use crate::state::{create_default_config, load_config, AppState};

/// Control plane for the gateway: resolves routes and access policies from
/// the configuration database and serves them to operators.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    #[arg(long, default_value = "gateway.toml")]
    config: PathBuf,
    #[arg(long, default_value = "0.0.0.0:8081")]
    listen: SocketAddr,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    if !args.config.exists() {
        warn!(path = %args.config.display(), "config file missing, writing defaults");
        if let Err(err) = create_default_config(&args.config) {
            warn!(error = %err, "could not write default config");
        }
    }

    let (raw, config) = load_config(&args.config)?;
    let config_path = args.config.clone();
    // the store drivers block, keep them off the runtime threads
    let state =
        tokio::task::spawn_blocking(move || AppState::from_config(config_path, raw, config))
            .await??;

    let app = router(Arc::new(state));
    info!(listen = %args.listen, "gateway-server started");
    let listener = tokio::net::TcpListener::bind(args.listen).await?;
    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    info!("gateway-server stopped");

    Ok(())
}

fn router(state: Arc<AppState>) -> Router {
    let admin_routes = Router::new()
        .route("/system/reload", post(reload))
        .route("/system/notify", post(notify))
        .route("/system-config", get(get_system_config))
        .route("/snapshot", get(get_snapshot))
        .route("/routes", get(list_routes))
        .route("/authorities", get(list_authorities))
        .route("/ip/black", get(list_ip_blacklist))
        .route("/ip/white", get(list_ip_whitelist))
        .layer(middleware::from_fn_with_state(state.clone(), admin_auth));

    Router::new()
        .route("/health", get(health))
        .nest("/api", admin_routes)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "ctrl-c handler unavailable");
        std::future::pending::<()>().await;
    }
}
