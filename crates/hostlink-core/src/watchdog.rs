//! Heartbeat Watchdog (§4.J). Grounded on `computermanager.cpp`'s
//! `HeartBeat` class: a 1-second interruption-checked sleep loop that
//! enumerates OS processes for a fixed executable name, and tears the
//! client down when it disappears. Process enumeration uses `sysinfo`
//! rather than the original's direct `CreateToolhelp32Snapshot` calls,
//! for the cross-platform coverage this core needs.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use sysinfo::System;
use tokio::sync::watch;

const SLEEP_CHUNK: Duration = Duration::from_millis(100);
const SLEEP_TOTAL: Duration = Duration::from_secs(1);

/// Fires `shutdown` the moment the named parent process disappears. This
/// is the only way the core quits other than an explicit `/exit`
/// request (§4.J).
pub struct Watchdog {
    parent_process_name: String,
    stop: Arc<AtomicBool>,
}

impl Watchdog {
    pub fn new(parent_process_name: impl Into<String>) -> Self {
        Self {
            parent_process_name: parent_process_name.into(),
            stop: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
    }

    /// Runs until `stop()` is called or the watched process disappears,
    /// in which case `shutdown` is signalled exactly once.
    pub async fn run(self: Arc<Self>, shutdown: watch::Sender<bool>) {
        let stop = Arc::clone(&self.stop);
        let process_name = self.parent_process_name.clone();
        let disappeared = tokio::task::spawn_blocking(move || watch_loop(&process_name, &stop))
            .await
            .unwrap_or(false);

        if disappeared {
            tracing::info!(process = %self.parent_process_name, "watchdog's parent process is gone, shutting down");
            let _ = shutdown.send(true);
        }
        tracing::debug!("watchdog stopped");
    }
}

fn watch_loop(process_name: &str, stop: &AtomicBool) -> bool {
    let mut system = System::new();
    while !stop.load(Ordering::SeqCst) {
        system.refresh_processes(sysinfo::ProcessesToUpdate::All, true);
        if !process_is_running(&system, process_name) {
            return true;
        }
        if !sleep_interruptible(stop) {
            return false;
        }
    }
    false
}

fn process_is_running(system: &System, process_name: &str) -> bool {
    system
        .processes()
        .values()
        .any(|p| p.name().to_string_lossy().eq_ignore_ascii_case(process_name))
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

    #[test]
    fn running_process_is_found_by_name() {
        let mut system = System::new();
        system.refresh_processes(sysinfo::ProcessesToUpdate::All, true);
        let self_process = system
            .process(sysinfo::get_current_pid().unwrap())
            .expect("current process must be visible to itself");
        let self_name = self_process.name().to_string_lossy().to_string();
        assert!(process_is_running(&system, &self_name));
    }

    #[test]
    fn nonexistent_process_name_is_not_found() {
        let mut system = System::new();
        system.refresh_processes(sysinfo::ProcessesToUpdate::All, true);
        assert!(!process_is_running(&system, "definitely-not-a-real-process-name.exe"));
    }

    #[tokio::test]
    async fn stop_before_run_exits_without_signalling_shutdown() {
        let watchdog = Arc::new(Watchdog::new("definitely-not-a-real-process-name.exe"));
        watchdog.stop();
        let (tx, mut rx) = watch::channel(false);
        watchdog.run(tx).await;
        assert!(!*rx.borrow_and_update());
    }
}
