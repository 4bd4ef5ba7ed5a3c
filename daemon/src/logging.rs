//! Per-request access log (§4.I: "method, path, query, body, status,
//! response body, truncated per policy"). Bodies over 2 KiB are cut with
//! a `"...<N more bytes>"` suffix (§4.M/N truncation policy) rather than
//! logged in full — request/response payloads can carry a pairing PIN or
//! a host's certificate PEM, and this is the one place every one of them
//! passes through.

use axum::body::{to_bytes, Body};
use axum::extract::Request;
use axum::middleware::Next;
use axum::response::Response;

const TRUNCATE_AT: usize = 2048;
const BODY_READ_LIMIT: usize = 1024 * 1024;

fn truncated(bytes: &[u8]) -> String {
    let text = String::from_utf8_lossy(bytes);
    if text.len() <= TRUNCATE_AT {
        text.into_owned()
    } else {
        let more = text.len() - TRUNCATE_AT;
        format!("{}...<{more} more bytes>", &text[..TRUNCATE_AT])
    }
}

pub async fn access_log(req: Request, next: Next) -> Response {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let query = req.uri().query().unwrap_or_default().to_string();

    let (parts, body) = req.into_parts();
    let body_bytes = to_bytes(body, BODY_READ_LIMIT).await.unwrap_or_default();
    let request_body = truncated(&body_bytes);
    let req = Request::from_parts(parts, Body::from(body_bytes));

    let response = next.run(req).await;
    let status = response.status();

    let (parts, body) = response.into_parts();
    let body_bytes = to_bytes(body, BODY_READ_LIMIT).await.unwrap_or_default();
    let response_body = truncated(&body_bytes);

    tracing::info!(
        %method,
        %path,
        %query,
        request_body,
        %status,
        response_body,
        "request"
    );

    Response::from_parts(parts, Body::from(body_bytes))
}
