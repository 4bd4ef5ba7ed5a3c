//! Shared daemon state, one `Arc<AppState>` cloned into every axum
//! handler — mirrors `rekindle-e2e-server`'s `ServerState`/`SharedServer`
//! pair, generalized from a single bridged process to the full set of
//! `hostlink-core` collaborators an HTTP Control API sits on top of.

use std::sync::Arc;

use hostlink_core::{
    AppPaths, BoxArtWorker, EventSink, PollerManager, Registry, SettingsStore,
    SharedStreamSession, TaskManager, TransportConfig,
};
use hostlink_crypto::Identity;
use parking_lot::Mutex;
use tokio::sync::watch;

/// Credentials injected by `POST /XRazerJWT` (§4.I), consumed by the next
/// federated pair attempt against any host.
#[derive(Clone, Default)]
pub struct FederatedTokenHolder {
    pub pair_token: Option<String>,
    pub uuid: Option<String>,
}

/// Forwards registry/session events into structured logs. The UI's own
/// notification channel (toast, SSE, native window message — §9 "abstract
/// as an event sink interface") is an external collaborator; this daemon
/// only needs the hand-off point to exist and be exercised by `/stream`
/// and `/quitapp`.
pub struct LoggingEventSink;

impl EventSink for LoggingEventSink {
    fn on_host_changed(&self, uuid: &str) {
        tracing::debug!(%uuid, "host record changed");
    }

    fn on_stream_requested(&self, uuid: &str, app_id: i32) {
        tracing::info!(%uuid, app_id, "stream requested, handing off to session collaborator");
    }

    fn on_quit_requested(&self) {
        tracing::info!("quit requested");
    }
}

pub struct AppState {
    pub registry: Arc<Registry>,
    pub poller_manager: Arc<PollerManager>,
    pub tasks: Arc<TaskManager>,
    pub settings: Arc<SettingsStore>,
    pub identity: Arc<Identity>,
    pub transport_config: TransportConfig,
    pub boxart: BoxArtWorker,
    pub paths: Arc<AppPaths>,
    pub stream_session: SharedStreamSession,
    pub events: Arc<LoggingEventSink>,
    pub federated_token: Mutex<FederatedTokenHolder>,
    pub shutdown: watch::Sender<bool>,
    pub started_at: std::time::Instant,
}

pub type SharedState = Arc<AppState>;
