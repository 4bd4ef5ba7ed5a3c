//! One monitor loop per host record (§4.F). `PollerManager` owns the
//! uuid-keyed set of active workers and a drain list of interrupted ones
//! that haven't finished exiting yet (§3 invariant: "at most one polling
//! worker is *active* per uuid; previously interrupted workers may exist
//! in a drain-list until they terminate").

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use hostlink_protocol::{parse_app_list, HostRecord, HostState, PairState};
use hostlink_transport::{HttpTransport, TransportError};
use parking_lot::Mutex;
use tokio::task::JoinHandle;

use crate::registry::Registry;

const DEFAULT_HTTP_PORT: u16 = 47989;
const DEFAULT_HTTPS_PORT: u16 = 47984;
const SLEEP_TOTAL: Duration = Duration::from_secs(3);
const SLEEP_CHUNK: Duration = Duration::from_millis(100);
const APP_LIST_STALE_ITERATIONS: u32 = 10;

#[derive(Clone)]
pub struct TransportConfig {
    pub identity_pem: Arc<String>,
    pub client_unique_id: Arc<String>,
}

struct PollerHandle {
    stop: Arc<AtomicBool>,
    join: JoinHandle<()>,
}

pub struct PollerManager {
    registry: Arc<Registry>,
    transport_config: TransportConfig,
    active: Mutex<HashMap<String, PollerHandle>>,
    drain: Mutex<Vec<JoinHandle<()>>>,
}

impl PollerManager {
    pub fn new(registry: Arc<Registry>, transport_config: TransportConfig) -> Self {
        Self {
            registry,
            transport_config,
            active: Mutex::new(HashMap::new()),
            drain: Mutex::new(Vec::new()),
        }
    }

    /// Start a fresh worker for `uuid`. If one is already running, it is
    /// signalled to stop and moved to the drain list immediately — the
    /// new worker begins right away without waiting for the old one to
    /// actually exit (§4.F: "a subsequent start for the same host begins
    /// a fresh worker even if the old one has not yet finished").
    pub fn start(self: &Arc<Self>, uuid: String) {
        let stop = Arc::new(AtomicBool::new(false));
        let join = tokio::spawn(Arc::clone(self).run(uuid.clone(), Arc::clone(&stop)));
        let new_handle = PollerHandle { stop, join };

        let old = self.active.lock().insert(uuid, new_handle);
        if let Some(old) = old {
            old.stop.store(true, Ordering::SeqCst);
            self.drain.lock().push(old.join);
        }
    }

    pub fn stop(&self, uuid: &str) {
        if let Some(handle) = self.active.lock().remove(uuid) {
            handle.stop.store(true, Ordering::SeqCst);
            self.drain.lock().push(handle.join);
        }
    }

    /// Stop every active poller, then join everything (active + already
    /// draining) — used during the registry shutdown sequence (§4.G).
    pub async fn stop_all_and_join(&self) {
        let handles: Vec<PollerHandle> = self.active.lock().drain().map(|(_, h)| h).collect();
        for handle in &handles {
            handle.stop.store(true, Ordering::SeqCst);
        }
        let mut joins: Vec<JoinHandle<()>> = handles.into_iter().map(|h| h.join).collect();
        joins.extend(self.drain.lock().drain(..));
        for join in joins {
            let _ = join.await;
        }
    }

    async fn run(self: Arc<Self>, uuid: String, stop: Arc<AtomicBool>) {
        let mut iterations_with_empty_apps: u32 = 0;

        loop {
            if stop.load(Ordering::SeqCst) {
                break;
            }

            let Some(before) = self.registry.get(&uuid) else {
                tracing::debug!(%uuid, "poller target no longer in registry, exiting");
                break;
            };

            let attempts_per_address = if before.state == HostState::Online { 2 } else { 1 };
            let addresses = before.unique_addresses();

            let mut fetched: Option<HostRecord> = None;
            'addresses: for address in &addresses {
                for _ in 0..attempts_per_address {
                    if stop.load(Ordering::SeqCst) {
                        return;
                    }
                    match self.fetch_server_info(&before, address.host.as_str(), address.port).await {
                        Ok(record) if record.uuid == uuid => {
                            fetched = Some(record);
                            break 'addresses;
                        }
                        Ok(_) => {
                            tracing::warn!(%uuid, host = %address.host, "serverinfo uuid mismatch, ignoring response");
                        }
                        Err(e) => {
                            tracing::debug!(%uuid, host = %address.host, error = %e, "serverinfo attempt failed");
                        }
                    }
                }
            }

            match fetched {
                Some(mut fresh) => {
                    let was_online_paired = before.state == HostState::Online && before.pair_state == PairState::Paired;
                    self.registry.merge(&fresh);

                    let now_online_paired = fresh.state == HostState::Online && fresh.pair_state == PairState::Paired;
                    let should_fetch_apps = (!was_online_paired && now_online_paired)
                        || (fresh.app_list.is_empty() && iterations_with_empty_apps >= APP_LIST_STALE_ITERATIONS);

                    if fresh.app_list.is_empty() {
                        iterations_with_empty_apps += 1;
                    } else {
                        iterations_with_empty_apps = 0;
                    }

                    if should_fetch_apps {
                        if let Some(address) = fresh.active_address.clone().or_else(|| fresh.unique_addresses().into_iter().next()) {
                            match self.fetch_app_list(&fresh, &address.host, address.port).await {
                                Ok(apps) => {
                                    fresh.app_list = apps;
                                    self.registry.merge(&fresh);
                                }
                                Err(e) => {
                                    tracing::debug!(%uuid, error = %e, "applist fetch failed");
                                }
                            }
                        }
                    }
                }
                None => {
                    if before.state != HostState::Offline {
                        let mut offline = before.clone();
                        offline.state = HostState::Offline;
                        self.registry.merge(&offline);
                    }
                }
            }

            if !Self::sleep_interruptible(&stop).await {
                break;
            }
        }

        tracing::debug!(%uuid, "poller exited");
    }

    async fn fetch_server_info(
        &self,
        record: &HostRecord,
        host: &str,
        http_port: u16,
    ) -> Result<HostRecord, TransportError> {
        let has_pinned_cert = !record.server_cert_pem.is_empty() && record.active_https_port != 0;

        if has_pinned_cert {
            let transport = self.build_transport(host, http_port, record.active_https_port)?;
            match transport.get_https("/serverinfo", &[], Some(Duration::from_secs(5))).await {
                Ok(resp) => return Ok(HostRecord::from_server_info(&resp)),
                Err(e) if e.is_unauthorized() => {
                    tracing::debug!(%host, "serverinfo got 401 over https, falling back to http");
                }
                Err(e) => return Err(e),
            }
        }

        let transport = self.build_transport(host, http_port, DEFAULT_HTTPS_PORT)?;
        let resp = transport.get_http("/serverinfo", &[], Some(Duration::from_secs(5))).await?;
        Ok(HostRecord::from_server_info(&resp))
    }

    async fn fetch_app_list(
        &self,
        record: &HostRecord,
        host: &str,
        http_port: u16,
    ) -> Result<Vec<hostlink_protocol::Application>, TransportError> {
        let transport = self.build_transport(host, http_port, record.active_https_port)?;
        let use_https = !record.server_cert_pem.is_empty() && record.active_https_port != 0;
        let resp = if use_https {
            transport.get_https("/applist", &[], Some(Duration::from_secs(5))).await?
        } else {
            transport.get_http("/applist", &[], Some(Duration::from_secs(5))).await?
        };
        Ok(parse_app_list(&resp))
    }

    fn build_transport(&self, host: &str, http_port: u16, https_port: u16) -> Result<HttpTransport, TransportError> {
        HttpTransport::new(
            &self.transport_config.identity_pem,
            host,
            if http_port == 0 { DEFAULT_HTTP_PORT } else { http_port },
            if https_port == 0 { DEFAULT_HTTPS_PORT } else { https_port },
            self.transport_config.client_unique_id.as_str(),
        )
    }

    /// Sleep for 3 s in 100 ms chunks, returning `false` the moment
    /// interruption is observed (§4.F step 7).
    async fn sleep_interruptible(stop: &AtomicBool) -> bool {
        let mut slept = Duration::ZERO;
        while slept < SLEEP_TOTAL {
            if stop.load(Ordering::SeqCst) {
                return false;
            }
            tokio::time::sleep(SLEEP_CHUNK).await;
            slept += SLEEP_CHUNK;
        }
        !stop.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::NullEventSink;

    fn manager() -> (tempfile::TempDir, Arc<PollerManager>, Arc<Registry>) {
        let dir = tempfile::tempdir().unwrap();
        let registry = Arc::new(Registry::load(dir.path().join("hosts.ini"), Arc::new(NullEventSink)).unwrap());
        let config = TransportConfig {
            identity_pem: Arc::new(String::new()),
            client_unique_id: Arc::new("CAFEBABE00000000".to_string()),
        };
        let manager = Arc::new(PollerManager::new(Arc::clone(&registry), config));
        (dir, manager, registry)
    }

    #[tokio::test]
    async fn starting_twice_for_same_uuid_drains_the_old_worker() {
        let (_dir, manager, registry) = manager();
        registry.insert_new(HostRecord::new("u1".into(), "Host".into()));

        manager.start("u1".to_string());
        manager.start("u1".to_string());
        assert_eq!(manager.active.lock().len(), 1);
        assert_eq!(manager.drain.lock().len(), 1);

        manager.stop_all_and_join().await;
    }

    #[tokio::test]
    async fn stop_all_and_join_empties_both_lists() {
        let (_dir, manager, registry) = manager();
        registry.insert_new(HostRecord::new("u1".into(), "Host".into()));
        registry.insert_new(HostRecord::new("u2".into(), "Host2".into()));
        manager.start("u1".to_string());
        manager.start("u2".to_string());

        manager.stop_all_and_join().await;
        assert_eq!(manager.active.lock().len(), 0);
        assert_eq!(manager.drain.lock().len(), 0);
    }

    #[tokio::test]
    async fn poller_marks_unreachable_host_offline() {
        let (_dir, manager, registry) = manager();
        let mut record = HostRecord::new("u1".into(), "Host".into());
        record.local_address = Some(hostlink_protocol::Address {
            host: "198.51.100.1".to_string(),
            port: 1,
        });
        registry.insert_new(record);

        manager.start("u1".to_string());
        tokio::time::sleep(Duration::from_millis(300)).await;
        manager.stop_all_and_join().await;

        assert_eq!(registry.get("u1").unwrap().state, HostState::Offline);
    }
}
