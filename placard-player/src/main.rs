//! Placard player - main entry point
//!
//! Headless player instance: joins the shared state store, bootstraps its
//! device identity, runs the playback engine against a logging render
//! surface, and serves the control API.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tokio::sync::{mpsc, watch};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use placard_common::blob::{BlobStore, FsBlobStore};
use placard_common::bus::CommandBus;
use placard_common::catalog::Catalog;
use placard_common::config::{resolve_data_dir, DataPaths};
use placard_common::registry::Registry;
use placard_common::store::{ConsumerId, MemoryStateStore, SqliteStateStore, StateStore};

use placard_player::api::{self, AppContext};
use placard_player::heartbeat::{device_beat, HeartbeatService};
use placard_player::identity::Identity;
use placard_player::playback::surface::LogSurface;
use placard_player::playback::{InstanceState, PlayerEngine};

/// Command-line arguments for placard-player
#[derive(Parser, Debug)]
#[command(name = "placard-player")]
#[command(about = "Signage player instance for placard")]
#[command(version)]
struct Args {
    /// Port to listen on
    #[arg(short, long, default_value = "5850", env = "PLACARD_PORT")]
    port: u16,

    /// Data directory (state db, blobs, device identity)
    #[arg(short, long)]
    data_dir: Option<String>,

    /// Adopt this device id on first run instead of generating one
    #[arg(long)]
    device_id: Option<String>,

    /// Initial display name for this device
    #[arg(long)]
    name: Option<String>,

    /// Keep all shared state in memory (lost on exit)
    #[arg(long)]
    ephemeral: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "placard=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    let data_dir =
        resolve_data_dir(args.data_dir.as_deref(), "PLACARD_DATA_DIR").context("resolve data dir")?;
    let paths = DataPaths::new(&data_dir);
    info!("Starting placard player, data dir {}", paths.root.display());

    let store: Arc<dyn StateStore> = if args.ephemeral {
        info!("Using in-memory state store (ephemeral)");
        Arc::new(MemoryStateStore::new())
    } else {
        Arc::new(
            SqliteStateStore::open(&paths.state_db)
                .await
                .context("open state store")?,
        )
    };
    let blobs: Arc<dyn BlobStore> = Arc::new(FsBlobStore::new(&paths.blobs_dir));

    let identity = Identity::load_or_create(
        &paths.identity_file,
        args.device_id.as_deref(),
        args.name.as_deref(),
    )?;
    let device_id = identity.device_id().to_string();
    let device_name = identity.name().to_string();
    info!("Device identity: {} ('{}')", device_id, device_name);

    let bus = CommandBus::new();
    let shared = Arc::new(InstanceState::new());
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let (nudge_tx, nudge_rx) = mpsc::channel(8);

    // Engine, heartbeat, and API each hold their own consumer identity so
    // none of them reacts to its own store writes.
    let engine_catalog = Catalog::new(Arc::clone(&store), ConsumerId::new());
    let engine = PlayerEngine::new(
        engine_catalog.clone(),
        Registry::new(engine_catalog),
        blobs,
        bus.clone(),
        Arc::new(LogSurface),
        Arc::clone(&shared),
        identity,
        nudge_tx,
        shutdown_rx.clone(),
    );
    let engine_task = tokio::spawn(engine.run());

    let beat_catalog = Catalog::new(Arc::clone(&store), ConsumerId::new());
    let heartbeat = HeartbeatService::new(
        Registry::new(beat_catalog),
        device_beat(&device_id, &device_name, args.port),
        nudge_rx,
        shutdown_rx,
    );
    let heartbeat_task = tokio::spawn(heartbeat.run());

    let api_catalog = Catalog::new(store, ConsumerId::new());
    let ctx = AppContext {
        registry: Registry::new(api_catalog.clone()),
        catalog: api_catalog,
        bus,
        state: shared,
        device_id,
    };
    let app = api::create_router(ctx);

    let addr = SocketAddr::from(([0, 0, 0, 0], args.port));
    info!("Starting HTTP server on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("bind to address")?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    // Stop the engine and let the heartbeat send its final beat
    let _ = shutdown_tx.send(true);
    let _ = engine_task.await;
    let _ = heartbeat_task.await;

    info!("Shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if signal::ctrl_c().await.is_err() {
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
