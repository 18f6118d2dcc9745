use rimbridge::{
    config::{normalize_path, ServerConfig},
    host::{host_factory, SimulatedHost},
    mcp::{mcp_router, ToolRegistry},
    plugins::PluginLoader,
    services::execution_bridge,
    AppState,
};

use clap::Parser;
use std::{net::SocketAddr, path::PathBuf};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "rimbridge")]
#[command(about = "MCP tool server bridging JSON-RPC clients to a host process", long_about = None)]
struct Args {
    /// Address to listen on (overrides RIMBRIDGE_BIND)
    #[arg(long)]
    bind: Option<SocketAddr>,

    /// Endpoint path (overrides RIMBRIDGE_PATH)
    #[arg(long)]
    path: Option<String>,

    /// Host tick interval in milliseconds (overrides RIMBRIDGE_TICK_MS)
    #[arg(long)]
    tick_ms: Option<u64>,

    /// Read additional environment variables from this file instead of ./.env
    #[arg(long)]
    env_file: Option<PathBuf>,
}

impl Args {
    fn apply(&self, config: &mut ServerConfig) {
        if let Some(bind) = self.bind {
            config.bind = bind;
        }
        if let Some(path) = &self.path {
            config.path = normalize_path(path);
        }
        if let Some(ms) = self.tick_ms {
            config.tick_interval = std::time::Duration::from_millis(ms.max(1));
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Load environment variables
    match &args.env_file {
        Some(path) => {
            dotenvy::from_path(path)?;
        }
        None => {
            dotenvy::dotenv().ok();
        }
    }

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "rimbridge=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let mut config = ServerConfig::from_env()?;
    args.apply(&mut config);
    config.validate()?;
    config.log_security_posture();

    // Host owns the drain; everything else gets a handle
    let (bridge, drain) = execution_bridge();
    let host = SimulatedHost::new(drain, config.tick_interval);

    let mut registry = ToolRegistry::new();
    let report = PluginLoader::new(bridge.clone())
        .load_all(vec![host_factory(host.state())], &mut registry);
    tracing::info!(
        plugins = ?report.loaded_ids(),
        failed = report.failed.len(),
        "Plugins loaded"
    );

    let shutdown = CancellationToken::new();
    let host_thread = host.spawn(shutdown.clone())?;

    let addr = config.bind;
    let path = config.path.clone();
    let state = AppState::new(config, registry.freeze(), bridge, shutdown.clone());
    let app = mcp_router(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("MCP endpoint listening on http://{}{}", addr, path);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal(shutdown.clone()))
    .await?;

    shutdown.cancel();
    if host_thread.join().is_err() {
        tracing::error!("Host thread panicked during shutdown");
    }

    tracing::info!("Server stopped");
    Ok(())
}

/// Resolves on Ctrl-C or when `shutdown` is cancelled elsewhere, cancelling
/// it in the first case so in-flight tool calls observe the stop.
async fn shutdown_signal(shutdown: CancellationToken) {
    tokio::select! {
        _ = ctrl_c() => tracing::info!("Shutdown requested"),
        _ = shutdown.cancelled() => {}
    }
    shutdown.cancel();
}

async fn ctrl_c() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
}
