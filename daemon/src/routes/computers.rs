//! `/computers`, `/apps`, `/hideapp`, `/razerid/availability` (§4.I).

use axum::extract::{Query, State};
use axum::Json;
use hostlink_protocol::{HostRecord, HostState, PairState};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::{valid_uuid, ApiError};
use crate::state::SharedState;

#[derive(Deserialize)]
pub struct ComputerQuery {
    computer: Option<String>,
}

#[derive(Serialize)]
struct ComputerSummary {
    name: String,
    uuid: String,
    #[serde(rename = "computerState")]
    computer_state: &'static str,
    #[serde(rename = "pairState")]
    pair_state: &'static str,
    wakeable: bool,
    #[serde(rename = "statusUnknown")]
    status_unknown: bool,
    #[serde(rename = "serverSupported")]
    server_supported: bool,
}

fn computer_state_str(state: HostState) -> &'static str {
    match state {
        HostState::Unknown => "UNKNOWN",
        HostState::Online => "ONLINE",
        HostState::Offline => "OFFLINE",
    }
}

fn pair_state_str(state: PairState) -> &'static str {
    match state {
        PairState::Unknown => "UNKNOWN",
        PairState::NotPaired => "NOT_PAIRED",
        PairState::Paired => "PAIRED",
    }
}

fn summarize(record: &HostRecord) -> ComputerSummary {
    ComputerSummary {
        name: record.name.clone(),
        uuid: record.uuid.clone(),
        computer_state: computer_state_str(record.state),
        pair_state: pair_state_str(record.pair_state),
        wakeable: !record.mac.is_empty(),
        status_unknown: record.state == HostState::Unknown,
        server_supported: record.is_nvidia_software,
    }
}

pub async fn get_computers(
    State(state): State<SharedState>,
    Query(q): Query<ComputerQuery>,
) -> Result<Json<Value>, ApiError> {
    if let Some(uuid) = &q.computer {
        if !uuid.is_empty() && !valid_uuid(uuid) {
            return Err(ApiError::InvalidUuid);
        }
    }

    let records: Vec<ComputerSummary> = match q.computer.as_deref() {
        Some(uuid) if !uuid.is_empty() => state
            .registry
            .get(uuid)
            .iter()
            .map(summarize)
            .collect(),
        _ => state.registry.all().iter().map(summarize).collect(),
    };
    Ok(Json(json!(records)))
}

#[derive(Deserialize)]
pub struct AppsQuery {
    computer: String,
}

pub async fn get_apps(
    State(state): State<SharedState>,
    Query(q): Query<AppsQuery>,
) -> Result<Json<Value>, ApiError> {
    if !valid_uuid(&q.computer) {
        return Err(ApiError::InvalidUuid);
    }
    let record = state
        .registry
        .get(&q.computer)
        .ok_or(ApiError::NotFound("host"))?;

    let online_paired = record.state == HostState::Online && record.pair_state == PairState::Paired;
    if !online_paired && !state.stream_session.is_busy() {
        return Err(ApiError::BadRequest(
            "host must be online and paired (or actively streaming)".to_string(),
        ));
    }

    let visible: Vec<Value> = record
        .app_list
        .iter()
        .filter(|app| !app.hidden)
        .map(|app| {
            if app.box_art.is_empty() {
                match hostlink_core::BoxArtWorker::cached_path(&state.paths, &record.uuid, app.id) {
                    Some(path) => {
                        let path_str = path.to_string_lossy().to_string();
                        state.registry.set_app_box_art(&record.uuid, app.id, path_str.clone());
                        return json!({
                            "id": app.id,
                            "name": app.name,
                            "hidden": app.hidden,
                            "directLaunch": app.direct_launch,
                            "boxArt": path_str,
                        });
                    }
                    None => state.boxart.enqueue(record.uuid.clone(), app.id),
                }
            }
            json!({
                "id": app.id,
                "name": app.name,
                "hidden": app.hidden,
                "directLaunch": app.direct_launch,
                "boxArt": app.box_art,
            })
        })
        .collect();

    Ok(Json(json!(visible)))
}

#[derive(Deserialize)]
pub struct HideAppBody {
    computer: String,
    app: i32,
    hide: bool,
}

pub async fn put_hideapp(
    State(state): State<SharedState>,
    Json(body): Json<HideAppBody>,
) -> Result<Json<Value>, ApiError> {
    if !valid_uuid(&body.computer) {
        return Err(ApiError::InvalidUuid);
    }
    if !state.registry.set_app_hidden(&body.computer, body.app, body.hide) {
        return Err(ApiError::NotFound("app"));
    }
    Ok(Json(json!({ "ok": true })))
}

pub async fn get_razerid_availability(
    State(state): State<SharedState>,
    Query(q): Query<ComputerQuery>,
) -> Result<Json<Value>, ApiError> {
    let Some(uuid) = q.computer.filter(|u| !u.is_empty()) else {
        return Err(ApiError::BadRequest("missing computer".to_string()));
    };
    if !valid_uuid(&uuid) {
        return Err(ApiError::InvalidUuid);
    }
    let Some(record) = state.registry.get(&uuid) else {
        return Ok(Json(json!({ "available": false, "message": "host not found" })));
    };
    let available = record.state == HostState::Online
        && record.federated_pair_mode != hostlink_protocol::FederatedPairMode::Disable;
    let message = if available {
        String::new()
    } else if record.state != HostState::Online {
        "host is offline".to_string()
    } else {
        "federated identity pairing is disabled for this host".to_string()
    };
    Ok(Json(json!({ "available": available, "message": message })))
}
