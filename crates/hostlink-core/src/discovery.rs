//! mDNS discovery (§4.E). Grounded on `mohsenil85-imbolc-workspace`'s
//! `imbolc-net::discovery` for the `mdns-sd` usage pattern, and on
//! `original_source/app/backend/mdnswarp.cpp` for the exact cadence: one
//! query, process results, sleep 60 s in 100 ms chunks, repeat — and for
//! `updateCacheList`'s change-detection rule (updates and additions fire
//! once each, removals never re-fire).

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use mdns_sd::{ServiceDaemon, ServiceEvent};
use tokio::sync::mpsc::UnboundedSender;

const SERVICE_TYPE: &str = "_nvstream._tcp.local.";
const QUERY_WINDOW: Duration = Duration::from_secs(2);
const SLEEP_TOTAL: Duration = Duration::from_secs(60);
const SLEEP_CHUNK: Duration = Duration::from_millis(100);

/// One resolved host advertisement, keyed externally by `srv_name` for
/// change detection (§9 "Discovery as a library").
#[derive(Debug, Clone, PartialEq)]
pub struct Advertisement {
    pub ipv4: String,
    pub ipv6: Option<String>,
    pub port: u16,
    pub srv_name: String,
}

pub struct Discovery {
    stop: Arc<AtomicBool>,
}

impl Discovery {
    pub fn new() -> Self {
        Self {
            stop: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
    }

    /// Runs until `stop()` is called. Each genuine change (new `srv_name`
    /// or a changed one) is sent once; removals never re-fire. mDNS
    /// failures are logged and the worker keeps retrying on the next
    /// cycle rather than exiting (§4.E "errors ... do not terminate the
    /// worker").
    pub async fn run(self: Arc<Self>, tx: UnboundedSender<Advertisement>) {
        let stop = Arc::clone(&self.stop);
        if let Err(e) = tokio::task::spawn_blocking(move || query_loop(&stop, &tx)).await {
            tracing::error!(error = %e, "discovery worker task panicked");
        }
    }
}

impl Default for Discovery {
    fn default() -> Self {
        Self::new()
    }
}

fn query_loop(stop: &AtomicBool, tx: &UnboundedSender<Advertisement>) {
    let mut cache: HashMap<String, Advertisement> = HashMap::new();

    while !stop.load(Ordering::SeqCst) {
        match execute_query(stop) {
            Ok(found) => update_cache_and_notify(&mut cache, found, tx),
            Err(e) => tracing::warn!(error = %e, "mDNS query failed, will retry next cycle"),
        }

        if !sleep_interruptible(stop) {
            break;
        }
    }
    tracing::debug!("discovery worker stopped");
}

/// One query cycle: stand up a fresh daemon, browse for `QUERY_WINDOW`,
/// tear it down. Mirrors the original's one-shot `executeQuery` rather
/// than holding a single long-lived browse session.
fn execute_query(stop: &AtomicBool) -> Result<Vec<Advertisement>, mdns_sd::Error> {
    let daemon = ServiceDaemon::new()?;
    let receiver = daemon.browse(SERVICE_TYPE)?;

    let mut found = Vec::new();
    let mut waited = Duration::ZERO;
    while waited < QUERY_WINDOW {
        if stop.load(Ordering::SeqCst) {
            break;
        }
        match receiver.recv_timeout(SLEEP_CHUNK) {
            Ok(ServiceEvent::ServiceResolved(info)) => {
                if let Some(advertisement) = resolved_to_advertisement(&info) {
                    found.push(advertisement);
                }
            }
            Ok(_) => {}
            Err(flume::RecvTimeoutError::Timeout) => {}
            Err(flume::RecvTimeoutError::Disconnected) => break,
        }
        waited += SLEEP_CHUNK;
    }

    let _ = daemon.shutdown();
    Ok(found)
}

fn resolved_to_advertisement(info: &mdns_sd::ServiceInfo) -> Option<Advertisement> {
    let addresses = info.get_addresses();
    let ipv4 = addresses.iter().find(|ip| matches!(ip, IpAddr::V4(_)))?;
    let ipv6 = addresses
        .iter()
        .find(|ip| matches!(ip, IpAddr::V6(_)))
        .map(ToString::to_string);

    Some(Advertisement {
        ipv4: ipv4.to_string(),
        ipv6,
        port: info.get_port(),
        srv_name: info.get_fullname().to_string(),
    })
}

/// `updateCacheList` (§4.E): updates and additions fire the callback
/// exactly once each; entries missing from `found` are dropped from the
/// cache silently (no removal callback).
fn update_cache_and_notify(
    cache: &mut HashMap<String, Advertisement>,
    found: Vec<Advertisement>,
    tx: &UnboundedSender<Advertisement>,
) {
    let seen: std::collections::HashSet<&str> =
        found.iter().map(|a| a.srv_name.as_str()).collect();
    cache.retain(|srv_name, _| seen.contains(srv_name.as_str()));

    for advertisement in found {
        let changed = cache.get(&advertisement.srv_name) != Some(&advertisement);
        if changed {
            cache.insert(advertisement.srv_name.clone(), advertisement.clone());
            if tx.send(advertisement).is_err() {
                return;
            }
        }
    }
}

fn sleep_interruptible(stop: &AtomicBool) -> bool {
    let mut slept = Duration::ZERO;
    while slept < SLEEP_TOTAL {
        if stop.load(Ordering::SeqCst) {
            return false;
        }
        std::thread::sleep(SLEEP_CHUNK);
        slept += SLEEP_CHUNK;
    }
    !stop.load(Ordering::SeqCst)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn advertisement(srv_name: &str, port: u16) -> Advertisement {
        Advertisement {
            ipv4: "192.168.1.5".to_string(),
            ipv6: None,
            port,
            srv_name: srv_name.to_string(),
        }
    }

    #[test]
    fn addition_fires_once() {
        let mut cache = HashMap::new();
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        update_cache_and_notify(&mut cache, vec![advertisement("host-a", 47989)], &tx);
        drop(tx);
        let received: Vec<_> = std::iter::from_fn(|| rx.try_recv().ok()).collect();
        assert_eq!(received.len(), 1);
    }

    #[test]
    fn unchanged_entry_does_not_refire() {
        let mut cache = HashMap::new();
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        update_cache_and_notify(&mut cache, vec![advertisement("host-a", 47989)], &tx);
        update_cache_and_notify(&mut cache, vec![advertisement("host-a", 47989)], &tx);
        drop(tx);
        let received: Vec<_> = std::iter::from_fn(|| rx.try_recv().ok()).collect();
        assert_eq!(received.len(), 1);
    }

    #[test]
    fn changed_address_refires() {
        let mut cache = HashMap::new();
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        update_cache_and_notify(&mut cache, vec![advertisement("host-a", 47989)], &tx);
        update_cache_and_notify(&mut cache, vec![advertisement("host-a", 48000)], &tx);
        drop(tx);
        let received: Vec<_> = std::iter::from_fn(|| rx.try_recv().ok()).collect();
        assert_eq!(received.len(), 2);
    }

    #[test]
    fn removal_does_not_fire_but_drops_from_cache() {
        let mut cache = HashMap::new();
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        update_cache_and_notify(&mut cache, vec![advertisement("host-a", 47989)], &tx);
        update_cache_and_notify(&mut cache, vec![], &tx);
        assert!(cache.is_empty());
        drop(tx);
        let received: Vec<_> = std::iter::from_fn(|| rx.try_recv().ok()).collect();
        assert_eq!(received.len(), 1);
    }
}
