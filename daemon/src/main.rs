//! `hostlink-daemon` — the HTTP Control API process that wires every
//! `hostlink-core` collaborator together, grounded on `rekindle-server`'s
//! startup/shutdown idiom and `rekindle-e2e-server`'s axum wiring.

mod error;
mod logging;
mod routes;
mod state;

use std::sync::Arc;

use hostlink_core::{
    identity_store, AppPaths, BoxArtWorker, Discovery, PollerManager, Registry, SettingsStore,
    StreamSession, TaskManager, TransportConfig, Watchdog,
};
use tokio::sync::{mpsc, watch};

use state::{AppState, FederatedTokenHolder, LoggingEventSink};

/// The executable name this daemon shuts itself down under once gone —
/// the UI shell that spawns and supervises this process (§4.J).
const WATCHDOG_PARENT_PROCESS: &str = "hostlink-ui";

struct Args {
    port: Option<u16>,
}

fn parse_args() -> Args {
    let mut args = std::env::args().skip(1);
    let mut port = None;
    while let Some(arg) = args.next() {
        if arg == "--port" {
            port = args.next().and_then(|v| v.parse().ok());
        }
    }
    Args { port }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();
    tracing::info!("hostlink-daemon starting");

    let args = parse_args();

    let paths = Arc::new(AppPaths::resolve().expect("failed to resolve app-data directory"));
    let identity = Arc::new(
        identity_store::load_or_generate(&paths).expect("failed to load or generate client identity"),
    );
    let settings = Arc::new(SettingsStore::load(paths.settings_file()).expect("failed to load settings"));

    let events: Arc<LoggingEventSink> = Arc::new(LoggingEventSink);
    let registry = Arc::new(
        Registry::load(paths.hosts_file(), events.clone() as Arc<dyn hostlink_core::EventSink>)
            .expect("failed to load host registry"),
    );

    let transport_config = TransportConfig {
        identity_pem: Arc::new(identity_store::combined_pem(&identity)),
        client_unique_id: Arc::new(identity.unique_id().to_string()),
    };

    let poller_manager = Arc::new(PollerManager::new(Arc::clone(&registry), transport_config.clone()));
    let tasks = Arc::new(TaskManager::new());
    let boxart = BoxArtWorker::spawn(Arc::clone(&paths));
    let stream_session = Arc::new(StreamSession::new());

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let watchdog = Arc::new(Watchdog::new(WATCHDOG_PARENT_PROCESS));
    tokio::spawn(Arc::clone(&watchdog).run(shutdown_tx.clone()));

    let discovery = Arc::new(Discovery::new());
    let (advert_tx, advert_rx) = mpsc::unbounded_channel();
    tokio::spawn(Arc::clone(&discovery).run(advert_tx));
    tokio::spawn(discovery_consumer(
        advert_rx,
        Arc::clone(&registry),
        Arc::clone(&poller_manager),
        transport_config.clone(),
    ));

    let save_worker = tokio::spawn(Arc::clone(&registry).run_debounced_save(shutdown_rx.clone()));

    for record in registry.all() {
        poller_manager.start(record.uuid.clone());
    }

    let app_state = Arc::new(AppState {
        registry: Arc::clone(&registry),
        poller_manager: Arc::clone(&poller_manager),
        tasks: Arc::clone(&tasks),
        settings: Arc::clone(&settings),
        identity: Arc::clone(&identity),
        transport_config: transport_config.clone(),
        boxart,
        paths: Arc::clone(&paths),
        stream_session: Arc::clone(&stream_session),
        events: Arc::clone(&events),
        federated_token: parking_lot::Mutex::new(FederatedTokenHolder::default()),
        shutdown: shutdown_tx.clone(),
        started_at: std::time::Instant::now(),
    });

    let port = args.port.unwrap_or_else(|| settings.uihttpport());
    let addr = std::net::SocketAddr::from(([127, 0, 0, 1], port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .unwrap_or_else(|e| panic!("failed to bind control API to {addr}: {e}"));
    tracing::info!(%addr, "control API listening");

    let router = routes::build(app_state);
    let mut shutdown_rx_for_server = shutdown_rx.clone();
    let server = axum::serve(listener, router).with_graceful_shutdown(async move {
        let _ = shutdown_rx_for_server.changed().await;
    });

    if let Err(e) = server.await {
        tracing::error!(error = %e, "control API server exited with error");
    }

    tracing::info!("hostlink-daemon shutting down");

    watchdog.stop();
    discovery.stop();
    poller_manager.stop_all_and_join().await;
    registry.save_hosts();
    let _ = save_worker.await;

    tracing::info!("hostlink-daemon stopped");
}

/// Folds mDNS advertisements into the registry by delegating to the same
/// fetch-and-merge path an explicit `/addcomputer` uses (§4.E, §4.H).
async fn discovery_consumer(
    mut advertisements: mpsc::UnboundedReceiver<hostlink_core::Advertisement>,
    registry: Arc<Registry>,
    poller_manager: Arc<PollerManager>,
    transport_config: TransportConfig,
) {
    let tasks = TaskManager::new();
    while let Some(advertisement) = advertisements.recv().await {
        let _ = hostlink_core::task::spawn_add_task(
            &tasks,
            Arc::clone(&registry),
            Arc::clone(&poller_manager),
            transport_config.clone(),
            advertisement.ipv4,
        );
    }
}
