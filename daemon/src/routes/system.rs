//! `/exit`, `/alive`, `/XRazerJWT`, `/something` (§4.I).

use axum::extract::State;
use axum::Json;
use hostlink_protocol::HostState;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::state::{FederatedTokenHolder, SharedState};

pub async fn get_exit(State(state): State<SharedState>) -> &'static str {
    tracing::info!("shutdown requested via /exit");
    let _ = state.shutdown.send(true);
    ""
}

pub async fn get_alive() -> &'static str {
    ""
}

#[derive(Deserialize)]
pub struct XRazerJwtBody {
    #[serde(rename = "RazerPairToken")]
    razer_pair_token: String,
    #[serde(rename = "RazerUUID")]
    razer_uuid: String,
}

pub async fn post_xrazerjwt(State(state): State<SharedState>, Json(body): Json<XRazerJwtBody>) -> Json<Value> {
    *state.federated_token.lock() = FederatedTokenHolder {
        pair_token: Some(body.razer_pair_token),
        uuid: Some(body.razer_uuid),
    };
    Json(json!({ "ok": true }))
}

pub async fn get_something(State(state): State<SharedState>) -> Json<Value> {
    let hosts = state.registry.all();
    let online: Vec<_> = hosts.iter().filter(|h| h.state == HostState::Online).collect();

    Json(json!({
        "onlineCount": online.len(),
        "firstOnlineName": online.first().map(|h| h.name.clone()).unwrap_or_default(),
        "deviceName": hostlink_core::local_device_name(),
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
