//! Cross-thread UI notification, abstracted as a trait rather than the
//! teacher's native-window-message pattern (§9 Design Notes: "Abstract
//! as an event sink interface"). The HTTP Control API's SSE/polling
//! surface is one possible implementor; tests use a recording one.

pub trait EventSink: Send + Sync {
    fn on_host_changed(&self, uuid: &str);
    fn on_stream_requested(&self, uuid: &str, app_id: i32);
    fn on_quit_requested(&self);
}

/// Drops every event. Useful for components that are exercised without
/// a full daemon wired up behind them.
pub struct NullEventSink;

impl EventSink for NullEventSink {
    fn on_host_changed(&self, _uuid: &str) {}
    fn on_stream_requested(&self, _uuid: &str, _app_id: i32) {}
    fn on_quit_requested(&self) {}
}
