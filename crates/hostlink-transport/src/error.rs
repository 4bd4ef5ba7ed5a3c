use thiserror::Error;

use hostlink_crypto::CryptoError;
use hostlink_protocol::ProtocolError;

/// Transport-layer failures (§7 "Transport" taxonomy). Protocol-level
/// failures (non-`200` `status_code`) are reported separately via
/// [`ProtocolError`].
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("host returned HTTP status {status}")]
    HttpStatus { status: u16 },

    #[error("request cancelled")]
    Cancelled,

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error("invalid client identity: {0}")]
    InvalidIdentity(String),

    #[error(transparent)]
    Crypto(#[from] CryptoError),
}

impl TransportError {
    /// `true` for the one status the Poller is expected to retry over
    /// HTTP instead of treating as fatal (§4.F, §7).
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, TransportError::HttpStatus { status: 401 })
    }
}
