use thiserror::Error;

/// Fatal errors terminate the process per §7 — everything else is
/// absorbed into a task's `errorString` or logged and retried.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("transport error: {0}")]
    Transport(#[from] hostlink_transport::TransportError),

    #[error("protocol error: {0}")]
    Protocol(#[from] hostlink_protocol::ProtocolError),

    #[error("crypto error: {0}")]
    Crypto(#[from] hostlink_crypto::CryptoError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("host not found: {0}")]
    HostNotFound(String),

    #[error("task not found: {0}")]
    TaskNotFound(String),

    #[error("precondition failed: {0}")]
    Precondition(&'static str),

    #[error("could not resolve app-data directory")]
    NoAppDataDir,

    #[error("fatal: {0}")]
    Fatal(String),
}
