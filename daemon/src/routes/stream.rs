//! `/stream`, `/streamstate`, `/quitapp`, `/quitstate` (§4.I, §5).

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::Json;
use hostlink_core::task::spawn_quitapp_task;
use hostlink_core::EventSink;
use hostlink_protocol::{HostState, PairState};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::{valid_uuid, ApiError};
use crate::routes::pairing::TaskIdQuery;
use crate::state::SharedState;

#[derive(Deserialize)]
pub struct StreamQuery {
    computer: String,
    app: i32,
}

pub async fn get_stream(
    State(state): State<SharedState>,
    Query(q): Query<StreamQuery>,
) -> Result<Json<Value>, ApiError> {
    if !valid_uuid(&q.computer) {
        return Err(ApiError::InvalidUuid);
    }
    let Some(record) = state.registry.get(&q.computer) else {
        return Err(ApiError::NotFound("host"));
    };

    if let Some(err) = precondition_error(&record, q.app, &state) {
        return Ok(Json(json!({ "succeed": false, "errorstring": err })));
    }

    if !state.stream_session.try_acquire() {
        return Ok(Json(json!({
            "succeed": false,
            "errorstring": "remote_play_client_stream_failed_1",
        })));
    }

    state.events.on_stream_requested(&record.uuid, q.app);
    Ok(Json(json!({ "succeed": true, "errorstring": "" })))
}

fn precondition_error(record: &hostlink_protocol::HostRecord, app_id: i32, state: &SharedState) -> Option<String> {
    if record.state != HostState::Online {
        return Some("remote_play_client_stream_failed_3".to_string());
    }
    if record.pair_state != PairState::Paired {
        return Some("remote_play_client_stream_failed_4".to_string());
    }
    if !record.app_list.iter().any(|a| a.id == app_id) {
        return Some("remote_play_client_stream_failed_5".to_string());
    }
    if state.stream_session.is_busy() {
        return Some("remote_play_client_stream_failed_1".to_string());
    }
    if record.pending_quit {
        return Some("remote_play_client_stream_failed_6".to_string());
    }
    None
}

pub async fn get_streamstate(State(state): State<SharedState>) -> Json<Value> {
    match state.stream_session.last_result() {
        Some(result) => Json(json!({
            "completed": true,
            "succeed": result.succeeded,
            "errorstring": result.error_string,
        })),
        None => Json(json!({ "completed": false, "succeed": false, "errorstring": "" })),
    }
}

pub async fn get_quitapp(
    State(state): State<SharedState>,
    Query(q): Query<StreamQueryComputerOnly>,
) -> Result<(axum::http::StatusCode, Json<Value>), ApiError> {
    if !valid_uuid(&q.computer) {
        return Err(ApiError::InvalidUuid);
    }
    if !state.registry.contains(&q.computer) {
        return Err(ApiError::NotFound("host"));
    }
    state.events.on_quit_requested();
    let task_id = spawn_quitapp_task(
        &state.tasks,
        Arc::clone(&state.registry),
        state.transport_config.clone(),
        q.computer,
    );
    Ok((axum::http::StatusCode::ACCEPTED, Json(json!({ "taskid": task_id }))))
}

#[derive(Deserialize)]
pub struct StreamQueryComputerOnly {
    computer: String,
}

pub async fn get_quitstate(
    State(state): State<SharedState>,
    Query(q): Query<TaskIdQuery>,
) -> Result<Json<Value>, ApiError> {
    if !valid_uuid(&q.taskid) {
        return Err(ApiError::InvalidUuid);
    }
    match state.tasks.poll(&q.taskid) {
        Some(result) => Ok(Json(json!({
            "completed": result.completed,
            "succeed": result.succeeded,
            "errorstring": result.error_string,
        }))),
        None => Err(ApiError::NotFound("task")),
    }
}
