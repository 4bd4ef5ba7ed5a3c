use std::time::Duration;

use hostlink_protocol::xml::{self, XmlResponse};
use reqwest::{Client, Identity};
use uuid::Uuid;

use crate::error::TransportError;
use crate::stop::{process_stop, StopSignal};

const POLL_INTERVAL: Duration = Duration::from_millis(200);

/// GET-based request/response transport to one (host, port-pair) target
/// (§4.C). HTTPS requests present this client's own certificate and key
/// for mutual TLS; server name verification is disabled — pairing trust
/// instead comes from the pinned-cert comparison the Pairing Engine
/// performs against the bytes a host actually returns.
pub struct HttpTransport {
    client: Client,
    host: String,
    http_port: u16,
    https_port: u16,
    /// This client's own 16-hex-digit identity, sent as `uniqueid` on
    /// every request.
    client_unique_id: String,
    stop: StopSignal,
}

impl HttpTransport {
    /// `identity_pem` must contain both the client's certificate and its
    /// private key (concatenated PEM blocks), as `reqwest::Identity`
    /// requires.
    pub fn new(
        identity_pem: &str,
        host: impl Into<String>,
        http_port: u16,
        https_port: u16,
        client_unique_id: impl Into<String>,
    ) -> Result<Self, TransportError> {
        let identity = Identity::from_pem(identity_pem.as_bytes())
            .map_err(|e| TransportError::InvalidIdentity(e.to_string()))?;

        let client = Client::builder()
            .identity(identity)
            .danger_accept_invalid_certs(true)
            .build()?;

        Ok(Self {
            client,
            host: host.into(),
            http_port,
            https_port,
            client_unique_id: client_unique_id.into(),
            stop: StopSignal::new(),
        })
    }

    /// The per-instance stop flag. Pairing cancellation (§4.H) signals
    /// this one rather than the process-wide flag, so cancelling one
    /// pair attempt does not interrupt unrelated in-flight requests.
    pub fn stop_signal(&self) -> StopSignal {
        self.stop.clone()
    }

    /// Replace the per-instance stop flag with a caller-supplied one, so
    /// a task manager can hold the same handle used to cancel this
    /// transport's in-flight request (§4.H pair cancellation).
    #[must_use]
    pub fn with_stop_signal(mut self, stop: StopSignal) -> Self {
        self.stop = stop;
        self
    }

    pub fn https_port(&self) -> u16 {
        self.https_port
    }

    pub fn set_https_port(&mut self, port: u16) {
        self.https_port = port;
    }

    /// `timeout = None` means unlimited, used only by the pairing
    /// `getservercert` round, which must wait on the host user's PIN
    /// entry (§4.C, §4.D).
    pub async fn get_http(
        &self,
        path: &str,
        query: &[(&str, &str)],
        timeout: Option<Duration>,
    ) -> Result<XmlResponse, TransportError> {
        let url = format!("http://{}:{}{}", self.host, self.http_port, path);
        self.get(url, query, timeout).await
    }

    pub async fn get_https(
        &self,
        path: &str,
        query: &[(&str, &str)],
        timeout: Option<Duration>,
    ) -> Result<XmlResponse, TransportError> {
        let url = format!("https://{}:{}{}", self.host, self.https_port, path);
        self.get(url, query, timeout).await
    }

    async fn get(
        &self,
        url: String,
        query: &[(&str, &str)],
        timeout: Option<Duration>,
    ) -> Result<XmlResponse, TransportError> {
        let request_uuid = Uuid::new_v4().to_string();
        let mut full_query: Vec<(&str, &str)> =
            vec![("uniqueid", self.client_unique_id.as_str()), ("uuid", &request_uuid)];
        full_query.extend_from_slice(query);

        let mut builder = self.client.get(&url).query(&full_query);
        if let Some(t) = timeout {
            builder = builder.timeout(t);
        }

        let response = self.send_cancellable(builder).await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            tracing::warn!(%url, status = status.as_u16(), "host returned non-success HTTP status");
            return Err(TransportError::HttpStatus {
                status: status.as_u16(),
            });
        }

        Ok(xml::parse_root(&body)?)
    }

    /// Race the request against a 200 ms-cadence poll of both stop flags
    /// (§4.C, §5). `send()`'s own future already honors any timeout set
    /// via `.timeout()` on the builder.
    async fn send_cancellable(
        &self,
        builder: reqwest::RequestBuilder,
    ) -> Result<reqwest::Response, TransportError> {
        let request_future = builder.send();
        tokio::pin!(request_future);

        loop {
            tokio::select! {
                result = &mut request_future => return Ok(result?),
                () = tokio::time::sleep(POLL_INTERVAL) => {
                    if self.stop.is_stopped() || process_stop().is_stopped() {
                        return Err(TransportError::Cancelled);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // A self-signed cert/key pair is required to exercise `new()`
    // end-to-end; that's covered by hostlink-core's integration tests,
    // which already hold a generated `Identity`. Here we only check the
    // query-building and cancellation plumbing that don't need a live
    // TLS handshake.

    #[tokio::test]
    async fn stop_signal_is_independent_per_instance() {
        // Constructing a transport needs a real PEM identity; assemble a
        // throwaway self-signed one inline to avoid a cross-crate dev-dep
        // on hostlink-crypto.
        let identity_pem = minimal_self_signed_pem();
        let a = HttpTransport::new(&identity_pem, "127.0.0.1", 47989, 47984, "CAFEBABE00000000").unwrap();
        let b = HttpTransport::new(&identity_pem, "127.0.0.1", 47989, 47984, "CAFEBABE00000000").unwrap();
        a.stop_signal().request();
        assert!(a.stop_signal().is_stopped());
        assert!(!b.stop_signal().is_stopped());
    }

    fn minimal_self_signed_pem() -> String {
        // Generated once and inlined: a throwaway 2048-bit RSA key plus a
        // self-signed certificate over it, for transport-layer tests that
        // need *a* valid identity but don't care whose.
        include_str!("../testdata/throwaway_identity.pem").to_string()
    }
}
