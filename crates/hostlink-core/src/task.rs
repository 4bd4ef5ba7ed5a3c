//! Task Manager (§4.H), built as the uniform `Task<Result>` abstraction
//! §9 recommends in place of the source's four parallel per-kind tables
//! (`PendingPairingTaskRazer`, `PendingAddTaskRazer`,
//! `DeferredHostDeletionTaskRazer`, `PendingQuitTaskRazer` in
//! `original_source/app/backend/asynctaskmanager.cpp`). One table, one
//! mutex, keyed by a fresh random UUID; only pair tasks carry a
//! cancellation handle.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use hostlink_protocol::{HostRecord, PairState};
use hostlink_transport::{HttpTransport, StopSignal, TransportError};
use parking_lot::Mutex;
use tokio::sync::watch;
use uuid::Uuid;

use crate::pairing::{self, FederatedCredentials, PairOutcome};
use crate::paths::AppPaths;
use crate::poller::{PollerManager, TransportConfig};
use crate::registry::Registry;
use crate::stun;

const POST_COMPLETION_WAIT: Duration = Duration::from_secs(3);
const POST_COMPLETION_CHUNK: Duration = Duration::from_millis(100);
const DEFAULT_HTTP_PORT: u16 = 47989;
const DEFAULT_HTTPS_PORT: u16 = 47984;

/// `{completed, succeeded, errorString}` (§4.H). A not-yet-completed
/// poll is `{false, false, ""}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskResult {
    pub completed: bool,
    pub succeeded: bool,
    pub error_string: String,
}

impl TaskResult {
    pub fn pending() -> Self {
        Self {
            completed: false,
            succeeded: false,
            error_string: String::new(),
        }
    }

    pub fn success() -> Self {
        Self {
            completed: true,
            succeeded: true,
            error_string: String::new(),
        }
    }

    pub fn failure(error_string: impl Into<String>) -> Self {
        Self {
            completed: true,
            succeeded: false,
            error_string: error_string.into(),
        }
    }
}

struct TaskEntry {
    result: watch::Receiver<TaskResult>,
    cancel: Option<StopSignal>,
}

/// Single uniform task table. `spawn` registers a fresh id and hands the
/// worker future a `watch::Sender` to publish its terminal result
/// through once; `poll`/`cancel`/`remove` are the only HTTP-layer-facing
/// operations.
pub struct TaskManager {
    tasks: Mutex<HashMap<String, TaskEntry>>,
}

impl TaskManager {
    pub fn new() -> Self {
        Self {
            tasks: Mutex::new(HashMap::new()),
        }
    }

    fn register<F>(&self, cancel: Option<StopSignal>, worker: F) -> String
    where
        F: std::future::Future<Output = TaskResult> + Send + 'static,
    {
        let id = Uuid::new_v4().to_string();
        let (tx, rx) = watch::channel(TaskResult::pending());
        tokio::spawn(async move {
            let result = worker.await;
            let _ = tx.send(result);
        });
        self.tasks.lock().insert(id.clone(), TaskEntry { result: rx, cancel });
        id
    }

    /// A known task always returns a result; an unknown one returns
    /// `None`, which the HTTP layer maps to "not found" (§4.H).
    pub fn poll(&self, task_id: &str) -> Option<TaskResult> {
        self.tasks.lock().get(task_id).map(|e| e.result.borrow().clone())
    }

    /// Cancel a pair task's in-flight request (§4.H "the only
    /// first-class" cancellation). Returns `false` for an unknown task
    /// or one with no cancellation handle.
    pub fn cancel(&self, task_id: &str) -> bool {
        match self.tasks.lock().get(task_id).and_then(|e| e.cancel.as_ref()) {
            Some(stop) => {
                stop.request();
                true
            }
            None => false,
        }
    }

    pub fn remove(&self, task_id: &str) -> bool {
        self.tasks.lock().remove(task_id).is_some()
    }
}

impl Default for TaskManager {
    fn default() -> Self {
        Self::new()
    }
}

/// Start a pair task. After a successful handshake, waits up to 3 s for
/// the polled record's `pairState` to become `Paired` before reporting
/// success, so a client polling `/pairstate` right after sees consistent
/// data (§4.H "Pair task").
#[allow(clippy::too_many_arguments)]
pub fn spawn_pair_task(
    tasks: &TaskManager,
    registry: Arc<Registry>,
    record: HostRecord,
    pin: String,
    identity: Arc<hostlink_crypto::Identity>,
    transport_config: TransportConfig,
    federated: Option<FederatedCredentials>,
) -> String {
    let stop = StopSignal::new();
    let cancel = stop.clone();
    let uuid = record.uuid.clone();

    tasks.register(Some(cancel), async move {
        let outcome = pairing::pair(&record, &pin, &identity, &transport_config, stop, federated).await;
        match outcome {
            PairOutcome::Paired { server_cert_pem } => {
                let mut paired = record.clone();
                paired.server_cert_pem = server_cert_pem;
                paired.pair_state = PairState::Paired;
                registry.merge(&paired);
                registry.save_host(&uuid);

                wait_for(POST_COMPLETION_WAIT, || {
                    registry.get(&uuid).is_some_and(|r| r.pair_state == PairState::Paired)
                })
                .await;
                TaskResult::success()
            }
            PairOutcome::PinWrong => TaskResult::failure("remote_play_client_pair_res_failed_1"),
            PairOutcome::AlreadyInProgress => TaskResult::failure("remote_play_client_pair_in_progress"),
            PairOutcome::RazerWrong => TaskResult::failure("remote_play_client_pair_razer_wrong"),
            PairOutcome::Failed(msg) => TaskResult::failure(msg),
        }
    })
}

/// Start a delete task: remove the record, stop its poller, delete its
/// on-disk artwork directory (§4.H "Delete task").
pub fn spawn_delete_task(
    tasks: &TaskManager,
    registry: Arc<Registry>,
    poller_manager: Arc<PollerManager>,
    paths: Arc<AppPaths>,
    uuid: String,
) -> String {
    tasks.register(None, async move {
        poller_manager.stop(&uuid);
        let removed = registry.remove(&uuid);
        if removed.is_none() {
            return TaskResult::failure("host not found");
        }

        let artwork_dir = paths.artwork_dir(&uuid);
        if artwork_dir.exists() {
            if let Err(e) = std::fs::remove_dir_all(&artwork_dir) {
                tracing::warn!(%uuid, error = %e, "failed to delete cached artwork for removed host");
            }
        }
        TaskResult::success()
    })
}

/// Start a quit-app task: issue the host's `cancel` request, then wait
/// up to 3 s for `currentGameId` to return to 0 (§4.H "Quit-app task").
/// A `599` status means this client isn't the stream's owner (§7).
pub fn spawn_quitapp_task(
    tasks: &TaskManager,
    registry: Arc<Registry>,
    transport_config: TransportConfig,
    uuid: String,
) -> String {
    tasks.register(None, async move {
        let Some(record) = registry.get(&uuid) else {
            return TaskResult::failure("host not found");
        };
        if record.current_game_id == 0 {
            return TaskResult::success();
        }
        let Some(address) = record.unique_addresses().into_iter().next() else {
            return TaskResult::failure("no known address for host");
        };

        let transport = match HttpTransport::new(
            transport_config.identity_pem.as_str(),
            address.host.clone(),
            if address.port == 0 { DEFAULT_HTTP_PORT } else { address.port },
            if record.active_https_port == 0 { DEFAULT_HTTPS_PORT } else { record.active_https_port },
            transport_config.client_unique_id.as_str(),
        ) {
            Ok(t) => t,
            Err(e) => return TaskResult::failure(e.to_string()),
        };

        match transport.get_https("/cancel", &[], Some(Duration::from_secs(10))).await {
            Ok(_) => {
                wait_for(POST_COMPLETION_WAIT, || {
                    registry.get(&uuid).map_or(true, |r| r.current_game_id == 0)
                })
                .await;
                TaskResult::success()
            }
            Err(TransportError::Protocol(hostlink_protocol::ProtocolError::Gfe(e))) if e.code == 599 => {
                TaskResult::failure("remote_play_host_quit_failed_1")
            }
            Err(e) => TaskResult::failure(e.to_string()),
        }
    })
}

/// Start an add task: two-phase handshake (initial HTTP `serverinfo`,
/// then HTTPS re-fetch if an existing record with the same uuid has a
/// pinned cert), merge-or-insert, STUN lookup when the reported address
/// is private (§4.H "Add task").
pub fn spawn_add_task(
    tasks: &TaskManager,
    registry: Arc<Registry>,
    poller_manager: Arc<PollerManager>,
    transport_config: TransportConfig,
    ip: String,
) -> String {
    tasks.register(None, async move {
        let transport = match HttpTransport::new(
            transport_config.identity_pem.as_str(),
            ip.clone(),
            DEFAULT_HTTP_PORT,
            DEFAULT_HTTPS_PORT,
            transport_config.client_unique_id.as_str(),
        ) {
            Ok(t) => t,
            Err(e) => return TaskResult::failure(e.to_string()),
        };

        let resp = match transport.get_http("/serverinfo", &[], Some(Duration::from_secs(5))).await {
            Ok(r) => r,
            Err(e) => return TaskResult::failure(e.to_string()),
        };
        let mut fetched = HostRecord::from_server_info(&resp);
        fetched.manual_address = Some(hostlink_protocol::Address { host: ip.clone(), port: DEFAULT_HTTP_PORT });

        if let Some(existing) = registry.get(&fetched.uuid) {
            if !existing.server_cert_pem.is_empty() {
                let https_transport = match HttpTransport::new(
                    transport_config.identity_pem.as_str(),
                    ip.clone(),
                    DEFAULT_HTTP_PORT,
                    DEFAULT_HTTPS_PORT,
                    transport_config.client_unique_id.as_str(),
                ) {
                    Ok(t) => t,
                    Err(e) => return TaskResult::failure(e.to_string()),
                };
                if let Ok(https_resp) = https_transport.get_https("/serverinfo", &[], Some(Duration::from_secs(5))).await {
                    let https_fetched = HostRecord::from_server_info(&https_resp);
                    if https_fetched.uuid == fetched.uuid {
                        fetched.update(&https_fetched);
                        fetched.server_cert_pem = existing.server_cert_pem.clone();
                        fetched.active_https_port = DEFAULT_HTTPS_PORT;
                    }
                }
            }
        }

        if let std::net::IpAddr::V4(v4) = parse_ip(&ip) {
            if stun::is_private_ipv4(v4) {
                if let Some(wan) = stun::lookup_external_ipv4().await {
                    fetched.remote_address = Some(hostlink_protocol::Address {
                        host: wan.to_string(),
                        port: DEFAULT_HTTP_PORT,
                    });
                }
            }
        }

        let uuid = fetched.uuid.clone();
        if registry.contains(&uuid) {
            registry.merge(&fetched);
        } else {
            registry.insert_new(fetched);
        }
        poller_manager.start(uuid);
        TaskResult::success()
    })
}

fn parse_ip(ip: &str) -> std::net::IpAddr {
    ip.parse().unwrap_or(std::net::IpAddr::V4(std::net::Ipv4Addr::UNSPECIFIED))
}

async fn wait_for<F: Fn() -> bool>(max_wait: Duration, condition: F) {
    let mut waited = Duration::ZERO;
    while waited < max_wait {
        if condition() {
            return;
        }
        tokio::time::sleep(POST_COMPLETION_CHUNK).await;
        waited += POST_COMPLETION_CHUNK;
    }
}
