//! Host Registry (§4.G): the authoritative `uuid -> HostRecord` map plus
//! its debounced write-back to `hosts.ini`.
//!
//! Per §9's re-architecture guidance, records are plain value types with
//! no embedded lock; the registry itself is the thing that's locked.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use hostlink_protocol::{ini_store, HostRecord};
use parking_lot::RwLock;
use tokio::sync::Notify;

use crate::error::CoreError;
use crate::events::EventSink;

pub struct Registry {
    hosts: RwLock<HashMap<String, HostRecord>>,
    /// Snapshot of persisted fields as of the last successful disk
    /// write, for single-record change detection (§4.G `saveHost`).
    last_serialized: RwLock<HashMap<String, HostRecord>>,
    needs_flush: Arc<AtomicBool>,
    flush_requested: Arc<Notify>,
    hosts_file: PathBuf,
    events: Arc<dyn EventSink>,
}

impl Registry {
    pub fn load(hosts_file: PathBuf, events: Arc<dyn EventSink>) -> Result<Self, CoreError> {
        let hosts = if hosts_file.exists() {
            let text = std::fs::read_to_string(&hosts_file)?;
            ini_store::deserialize(&text)?
        } else {
            Vec::new()
        };

        let map: HashMap<String, HostRecord> =
            hosts.into_iter().map(|h| (h.uuid.clone(), h)).collect();
        let last_serialized = map.clone();

        Ok(Self {
            hosts: RwLock::new(map),
            last_serialized: RwLock::new(last_serialized),
            needs_flush: Arc::new(AtomicBool::new(false)),
            flush_requested: Arc::new(Notify::new()),
            hosts_file,
            events,
        })
    }

    pub fn get(&self, uuid: &str) -> Option<HostRecord> {
        self.hosts.read().get(uuid).cloned()
    }

    pub fn all(&self) -> Vec<HostRecord> {
        self.hosts.read().values().cloned().collect()
    }

    pub fn contains(&self, uuid: &str) -> bool {
        self.hosts.read().contains_key(uuid)
    }

    pub fn insert_new(&self, record: HostRecord) {
        let uuid = record.uuid.clone();
        self.hosts.write().insert(uuid.clone(), record);
        self.events.on_host_changed(&uuid);
        self.save_host(&uuid);
    }

    /// Merge a freshly-fetched record into the live one under the
    /// registry's write lock (§4.F step 4). Returns whether anything
    /// changed; notifies only after the lock is released (§4.F step 6).
    pub fn merge(&self, incoming: &HostRecord) -> bool {
        let changed = {
            let mut hosts = self.hosts.write();
            match hosts.get_mut(&incoming.uuid) {
                Some(existing) => existing.update(incoming),
                None => return false,
            }
        };
        if changed {
            self.events.on_host_changed(&incoming.uuid);
            self.save_host(&incoming.uuid);
        }
        changed
    }

    /// Toggle the client-only `hidden` flag for one app (`PUT /hideapp`,
    /// spec §4.I). Bypasses `merge`/`update`, which always treats the
    /// incoming list as server-authoritative and would stomp this
    /// client-side toggle right back via `merge_app_lists`.
    pub fn set_app_hidden(&self, uuid: &str, app_id: i32, hidden: bool) -> bool {
        let found = {
            let mut hosts = self.hosts.write();
            match hosts.get_mut(uuid).and_then(|r| r.app_list.iter_mut().find(|a| a.id == app_id)) {
                Some(app) => {
                    app.hidden = hidden;
                    true
                }
                None => false,
            }
        };
        if found {
            self.events.on_host_changed(uuid);
            self.save_host(uuid);
        }
        found
    }

    /// Record a freshly-cached box-art path against one app, same
    /// bypass-`update()` reasoning as [`Self::set_app_hidden`].
    pub fn set_app_box_art(&self, uuid: &str, app_id: i32, box_art: String) -> bool {
        let found = {
            let mut hosts = self.hosts.write();
            match hosts.get_mut(uuid).and_then(|r| r.app_list.iter_mut().find(|a| a.id == app_id)) {
                Some(app) => {
                    app.box_art = box_art;
                    true
                }
                None => false,
            }
        };
        if found {
            self.save_host(uuid);
        }
        found
    }

    pub fn remove(&self, uuid: &str) -> Option<HostRecord> {
        let removed = self.hosts.write().remove(uuid);
        if removed.is_some() {
            self.last_serialized.write().remove(uuid);
            self.save_hosts();
        }
        removed
    }

    /// Unconditionally request a flush (§4.G `saveHosts`).
    pub fn save_hosts(&self) {
        self.needs_flush.store(true, Ordering::SeqCst);
        self.flush_requested.notify_one();
    }

    /// Only request a flush if `uuid`'s persisted fields actually
    /// changed since the last write (§4.G `saveHost`), to avoid a flush
    /// storm when only ephemeral state flips.
    pub fn save_host(&self, uuid: &str) {
        let Some(current) = self.hosts.read().get(uuid).cloned() else {
            return;
        };
        let unchanged = self
            .last_serialized
            .read()
            .get(uuid)
            .is_some_and(|prior| prior.is_equal_serialized(&current));
        if !unchanged {
            self.save_hosts();
        }
    }

    /// Background debounce worker (§4.G, §9 "classic coalescing
    /// producer/consumer"). Runs until `shutdown` fires; performs one
    /// final flush afterward if a flush was still pending.
    pub async fn run_debounced_save(self: Arc<Self>, mut shutdown: tokio::sync::watch::Receiver<bool>) {
        loop {
            tokio::select! {
                () = self.flush_requested.notified() => {
                    self.flush_if_needed();
                }
                result = shutdown.changed() => {
                    if result.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        self.flush_if_needed();
        tracing::info!("save-debounce worker stopped");
    }

    fn flush_if_needed(&self) {
        if !self.needs_flush.swap(false, Ordering::SeqCst) {
            return;
        }
        let snapshot: HashMap<String, HostRecord> = {
            let hosts = self.hosts.read();
            hosts.clone()
        };
        let ordered: Vec<HostRecord> = snapshot.values().cloned().collect();
        let text = ini_store::serialize(&ordered);
        match std::fs::write(&self.hosts_file, text) {
            Ok(()) => {
                *self.last_serialized.write() = snapshot;
                tracing::debug!(count = ordered.len(), "hosts.ini flushed");
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to write hosts.ini, will retry on next flush");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::NullEventSink;
    use hostlink_protocol::HostState;

    fn registry() -> (tempfile::TempDir, Registry) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hosts.ini");
        let registry = Registry::load(path, Arc::new(NullEventSink)).unwrap();
        (dir, registry)
    }

    #[test]
    fn insert_then_get_roundtrips() {
        let (_dir, registry) = registry();
        registry.insert_new(HostRecord::new("u1".into(), "Host".into()));
        assert!(registry.contains("u1"));
        assert_eq!(registry.get("u1").unwrap().name, "Host");
    }

    #[test]
    fn merge_on_unknown_uuid_is_a_noop() {
        let (_dir, registry) = registry();
        let incoming = HostRecord::new("missing".into(), "X".into());
        assert!(!registry.merge(&incoming));
    }

    #[test]
    fn merge_applies_ephemeral_state_changes() {
        let (_dir, registry) = registry();
        registry.insert_new(HostRecord::new("u1".into(), "Host".into()));

        let mut incoming = HostRecord::new("u1".into(), "Host".into());
        incoming.state = HostState::Online;
        assert!(registry.merge(&incoming));
        assert_eq!(registry.get("u1").unwrap().state, HostState::Online);
    }

    #[test]
    fn set_app_hidden_flips_flag_and_leaves_others_untouched() {
        use hostlink_protocol::Application;
        let (_dir, registry) = registry();
        let mut record = HostRecord::new("u1".into(), "Host".into());
        record.app_list = vec![
            Application { id: 1, guid: "g1".into(), name: "A".into(), game_platform: String::new(), hdr_supported: false, is_app_collector_game: false, hidden: false, direct_launch: false, last_app_start_time: 0, box_art: String::new() },
            Application { id: 2, guid: "g2".into(), name: "B".into(), game_platform: String::new(), hdr_supported: false, is_app_collector_game: false, hidden: false, direct_launch: false, last_app_start_time: 0, box_art: String::new() },
        ];
        registry.insert_new(record);

        assert!(registry.set_app_hidden("u1", 1, true));
        let reloaded = registry.get("u1").unwrap();
        assert!(reloaded.app_list.iter().find(|a| a.id == 1).unwrap().hidden);
        assert!(!reloaded.app_list.iter().find(|a| a.id == 2).unwrap().hidden);
    }

    #[test]
    fn set_app_hidden_on_unknown_app_is_false() {
        let (_dir, registry) = registry();
        registry.insert_new(HostRecord::new("u1".into(), "Host".into()));
        assert!(!registry.set_app_hidden("u1", 99, true));
    }

    #[test]
    fn remove_drops_record_and_last_serialized_entry() {
        let (_dir, registry) = registry();
        registry.insert_new(HostRecord::new("u1".into(), "Host".into()));
        assert!(registry.remove("u1").is_some());
        assert!(!registry.contains("u1"));
    }

    #[tokio::test]
    async fn debounced_save_writes_once_per_batch_of_requests() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hosts.ini");
        let registry = Arc::new(Registry::load(path.clone(), Arc::new(NullEventSink)).unwrap());
        registry.insert_new(HostRecord::new("u1".into(), "Host".into()));

        let (tx, rx) = tokio::sync::watch::channel(false);
        let worker = tokio::spawn(Arc::clone(&registry).run_debounced_save(rx));

        registry.save_hosts();
        registry.save_hosts();
        registry.save_hosts();
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        tx.send(true).unwrap();
        worker.await.unwrap();

        let on_disk = std::fs::read_to_string(&path).unwrap();
        let parsed = ini_store::deserialize(&on_disk).unwrap();
        assert_eq!(parsed.len(), 1);
    }
}
