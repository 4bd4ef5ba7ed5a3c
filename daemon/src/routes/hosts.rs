//! `/addcomputer`, `/addstate`, `/deletecomputer`, `/deletestate` (§4.I).

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::Json;
use hostlink_core::task::{spawn_add_task, spawn_delete_task};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::{valid_uuid, ApiError};
use crate::routes::pairing::TaskIdQuery;
use crate::state::SharedState;

#[derive(Deserialize)]
pub struct AddComputerBody {
    ip: String,
}

fn valid_host(ip: &str) -> bool {
    !ip.is_empty() && (ip.parse::<std::net::Ipv4Addr>().is_ok() || ip.parse::<std::net::Ipv6Addr>().is_ok())
}

pub async fn post_addcomputer(
    State(state): State<SharedState>,
    Json(body): Json<AddComputerBody>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    if !valid_host(&body.ip) {
        return Err(ApiError::BadRequest("ip must be a valid IPv4 or IPv6 address".to_string()));
    }
    let task_id = spawn_add_task(
        &state.tasks,
        Arc::clone(&state.registry),
        Arc::clone(&state.poller_manager),
        state.transport_config.clone(),
        body.ip,
    );
    Ok((StatusCode::ACCEPTED, Json(json!({ "taskid": task_id }))))
}

pub async fn get_addstate(
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

#[derive(Deserialize)]
pub struct ComputerOnlyQuery {
    computer: String,
}

pub async fn delete_computer(
    State(state): State<SharedState>,
    Query(q): Query<ComputerOnlyQuery>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    if !valid_uuid(&q.computer) {
        return Err(ApiError::InvalidUuid);
    }
    if !state.registry.contains(&q.computer) {
        return Err(ApiError::NotFound("host"));
    }
    let task_id = spawn_delete_task(
        &state.tasks,
        Arc::clone(&state.registry),
        Arc::clone(&state.poller_manager),
        Arc::clone(&state.paths),
        q.computer,
    );
    Ok((StatusCode::ACCEPTED, Json(json!({ "taskid": task_id }))))
}

pub async fn get_deletestate(
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
