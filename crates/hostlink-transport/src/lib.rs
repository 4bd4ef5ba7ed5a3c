pub mod client;
pub mod error;
pub mod stop;

pub use client::HttpTransport;
pub use error::TransportError;
pub use stop::{process_stop, StopSignal};
