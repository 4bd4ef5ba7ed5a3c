use thiserror::Error;

/// A non-`200` `status_code` from a host's XML response. `401` triggers an
/// HTTPS→HTTP fallback at the transport layer; `-1`/"Invalid" is remapped to
/// `418` with an operator-facing hint; everything else is surfaced verbatim.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("GFE response error {code}: {message}")]
pub struct GfeResponseError {
    pub code: i32,
    pub message: String,
}

impl GfeResponseError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        let message = message.into();
        if code == -1 && message == "Invalid" {
            return Self {
                code: 418,
                message: "host rejected the request as malformed — this usually means the \
                          client and host have a protocol version mismatch"
                    .to_string(),
            };
        }
        Self { code, message }
    }
}

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("xml parse error: {0}")]
    XmlParse(String),

    #[error("malformed host response: {0}")]
    MalformedResponse(String),

    #[error(transparent)]
    Gfe(#[from] GfeResponseError),

    #[error("ini parse error: {0}")]
    IniParse(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
