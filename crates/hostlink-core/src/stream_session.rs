//! Single-streaming-session lock (§5 "Single-session constraint").
//! Grounded on `original_source/app/streaming/session.h`'s static
//! `s_busy`/`s_busyMutex` pair: at most one streaming session may be
//! in flight across the whole process. The session itself is an
//! external collaborator (§1); this core only owns the lock and the
//! terminal-state mailbox the collaborator publishes into.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

/// Published once the external session collaborator finishes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamResult {
    pub succeeded: bool,
    pub error_string: String,
}

impl StreamResult {
    pub fn success() -> Self {
        Self {
            succeeded: true,
            error_string: String::new(),
        }
    }

    pub fn failure(error_string: impl Into<String>) -> Self {
        Self {
            succeeded: false,
            error_string: error_string.into(),
        }
    }
}

/// Tracks whether a stream is active and the most recent terminal
/// result (§4.I `/stream`, `/streamstate`).
pub struct StreamSession {
    busy: AtomicBool,
    last_result: Mutex<Option<StreamResult>>,
}

impl StreamSession {
    pub fn new() -> Self {
        Self {
            busy: AtomicBool::new(false),
            last_result: Mutex::new(None),
        }
    }

    /// Mirrors `tryAcquireSessionControl()`: atomically claims the lock
    /// if free, clearing any stale result from a prior session.
    pub fn try_acquire(&self) -> bool {
        if self
            .busy
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            *self.last_result.lock() = None;
            true
        } else {
            false
        }
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::SeqCst)
    }

    /// Called by the session collaborator when it terminates.
    pub fn publish_result(&self, result: StreamResult) {
        *self.last_result.lock() = Some(result);
        self.busy.store(false, Ordering::SeqCst);
    }

    /// `None` means no session has ever completed since the lock was
    /// last acquired (`/streamstate` keeps returning "not yet done").
    pub fn last_result(&self) -> Option<StreamResult> {
        self.last_result.lock().clone()
    }
}

impl Default for StreamSession {
    fn default() -> Self {
        Self::new()
    }
}

pub type SharedStreamSession = Arc<StreamSession>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_acquire_fails_while_busy() {
        let session = StreamSession::new();
        assert!(session.try_acquire());
        assert!(!session.try_acquire());
    }

    #[test]
    fn publish_result_releases_the_lock() {
        let session = StreamSession::new();
        session.try_acquire();
        session.publish_result(StreamResult::success());
        assert!(!session.is_busy());
        assert!(session.try_acquire());
    }

    #[test]
    fn fresh_acquire_clears_stale_result() {
        let session = StreamSession::new();
        session.try_acquire();
        session.publish_result(StreamResult::failure("remote_play_client_stream_failed_1"));
        assert!(session.last_result().is_some());

        session.try_acquire();
        assert!(session.last_result().is_none());
    }
}
