//! ADW Daemon entry point: loads `DaemonConfig`, opens the SQLite state
//! store, and serves the HTTP/WebSocket API described in spec §6 until
//! SIGINT/SIGTERM.

use adw_core::{Discovery, SqliteStateStore};
use adw_daemon::{AppState, BroadcastManager, DaemonConfig, MonitorRegistry};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "adw-daemon", about = "HTTP/WebSocket daemon fronting the ADW orchestrator's state store", version = env!("CARGO_PKG_VERSION"))]
struct Args {
    /// TOML configuration file; falls back to `DaemonConfig::default()`.
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,

    #[arg(long, value_name = "ADDR")]
    bind_addr: Option<String>,

    #[arg(long, value_name = "PORT")]
    bind_port: Option<u16>,

    #[arg(long, value_name = "PATH")]
    repo_root: Option<PathBuf>,

    /// One-shot import of any `agents/<adw_id>/adw_state.json` mirrors not
    /// already present in the database, then exit without serving.
    #[arg(long)]
    import_legacy_json: bool,

    #[arg(long, default_value = "info")]
    log_level: String,
}

fn load_config(args: &Args) -> anyhow::Result<DaemonConfig> {
    let mut config = match &args.config {
        Some(path) => {
            let raw = std::fs::read_to_string(path)?;
            toml::from_str(&raw)?
        }
        None => DaemonConfig::default(),
    };

    if let Some(addr) = &args.bind_addr {
        config.bind_addr = addr.clone();
    }
    if let Some(port) = args.bind_port {
        config.bind_port = port;
    }
    if let Some(root) = &args.repo_root {
        config.repo_root = root.clone();
    }

    Ok(config)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(args.log_level.clone())))
        .with_target(false)
        .init();

    info!(version = adw_daemon::VERSION, "starting adw-daemon");

    let config = load_config(&args)?;
    let db_path = config.resolved_db_path();
    let sqlite_store = SqliteStateStore::new(&db_path).await?;
    sqlite_store.initialize().await?;

    if args.import_legacy_json {
        let imported = sqlite_store.import_legacy_json_mirror(&config.agents_dir()).await?;
        info!(imported, "legacy JSON mirror import complete");
        return Ok(());
    }

    let store: Arc<dyn adw_core::StateStore> = Arc::new(sqlite_store);
    let discovery = Arc::new(Discovery::new(store.clone()));
    let broadcast = BroadcastManager::new();
    let monitors = MonitorRegistry::new(config.agents_dir(), broadcast.clone());
    let config = Arc::new(config);

    let state = AppState { store, discovery, broadcast: broadcast.clone(), config: config.clone(), monitors };

    let heartbeat_interval = config.heartbeat_interval_secs;
    let heartbeat_broadcast = broadcast.clone();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(std::time::Duration::from_secs(heartbeat_interval.max(1)));
        loop {
            ticker.tick().await;
            heartbeat_broadcast.broadcast_heartbeat();
        }
    });

    let router = adw_daemon::build_router(state);
    let bind = format!("{}:{}", config.bind_addr, config.bind_port);
    let listener = tokio::net::TcpListener::bind(&bind).await?;
    info!(addr = %bind, "adw-daemon listening");

    axum::serve(listener, router).with_graceful_shutdown(shutdown_signal()).await?;

    info!("adw-daemon stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to install CTRL+C handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => warn!(error = %e, "failed to install SIGTERM handler"),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("received SIGINT"),
        () = terminate => info!("received SIGTERM"),
    }
}
