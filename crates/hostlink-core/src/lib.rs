//! Host registry, discovery, pairing, polling, task orchestration, and
//! the ambient background workers (box-art, watchdog) that make up the
//! core the HTTP Control API sits on top of. No module here knows about
//! HTTP — `hostlink-core` is usable headless.

pub mod boxart;
pub mod discovery;
pub mod error;
pub mod events;
pub mod identity_store;
pub mod pairing;
pub mod paths;
pub mod poller;
pub mod registry;
pub mod settings;
pub mod stream_session;
pub mod stun;
pub mod task;
pub mod watchdog;

pub use boxart::BoxArtWorker;
pub use discovery::{Advertisement, Discovery};
pub use error::CoreError;
pub use events::{EventSink, NullEventSink};
pub use pairing::{pair, FederatedCredentials, PairOutcome};
pub use paths::AppPaths;
pub use poller::{PollerManager, TransportConfig};
pub use registry::Registry;
pub use settings::SettingsStore;
pub use stream_session::{SharedStreamSession, StreamResult, StreamSession};
pub use task::{TaskManager, TaskResult};
pub use watchdog::Watchdog;

/// This machine's display name for the `/something` endpoint's "local
/// device name" field (spec §4.I). Falls back to a fixed placeholder
/// rather than failing the request if the OS won't report one.
pub fn local_device_name() -> String {
    gethostname::gethostname()
        .into_string()
        .unwrap_or_else(|_| "unknown-device".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_device_name_is_never_empty() {
        assert!(!local_device_name().is_empty());
    }
}
