use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

/// A cooperative cancellation flag, polled at a fixed cadence from inside
/// a blocking wait (§4.C, §5). Cloning shares the same underlying flag.
#[derive(Clone, Default)]
pub struct StopSignal(Arc<AtomicBool>);

impl StopSignal {
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(false)))
    }

    pub fn request(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

static PROCESS_STOP: OnceLock<StopSignal> = OnceLock::new();

/// The process-wide stop flag (§5: "a process-wide stop flag plus a
/// per-instance stop flag; both polled at 200 ms cadence").
pub fn process_stop() -> &'static StopSignal {
    PROCESS_STOP.get_or_init(StopSignal::new)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_signal_is_not_stopped() {
        assert!(!StopSignal::new().is_stopped());
    }

    #[test]
    fn request_then_reset_roundtrips() {
        let s = StopSignal::new();
        s.request();
        assert!(s.is_stopped());
        s.reset();
        assert!(!s.is_stopped());
    }

    #[test]
    fn clones_share_state() {
        let a = StopSignal::new();
        let b = a.clone();
        a.request();
        assert!(b.is_stopped());
    }
}
