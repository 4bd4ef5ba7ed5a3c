//! `/pair`, `/pairstate`, `/cancelpair` (§4.I, §4.H).

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::Json;
use hostlink_core::pairing::FederatedCredentials;
use hostlink_core::task::spawn_pair_task;
use hostlink_core::TaskResult;
use rand::RngCore;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::{valid_uuid, ApiError};
use crate::state::SharedState;

#[derive(Deserialize)]
pub struct PairQuery {
    computer: String,
    #[serde(rename = "useRazerJWT", default)]
    use_razer_jwt: bool,
}

fn generate_pin() -> String {
    let n = rand::rngs::OsRng.next_u32() % 10_000;
    format!("{n:04}")
}

pub async fn get_pair(
    State(state): State<SharedState>,
    Query(q): Query<PairQuery>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    if !valid_uuid(&q.computer) {
        return Err(ApiError::InvalidUuid);
    }
    let Some(record) = state.registry.get(&q.computer) else {
        return Err(ApiError::NotFound("host"));
    };

    let federated = if q.use_razer_jwt {
        let held = state.federated_token.lock();
        match (&held.pair_token, &held.uuid) {
            (Some(token), Some(uuid)) => Some(FederatedCredentials {
                secret: token.clone().into_bytes(),
                pincode_uuid: uuid.clone(),
            }),
            _ => None,
        }
    } else {
        None
    };

    let pin = generate_pin();
    let task_id = spawn_pair_task(
        &state.tasks,
        Arc::clone(&state.registry),
        record,
        pin.clone(),
        Arc::clone(&state.identity),
        state.transport_config.clone(),
        federated,
    );

    Ok((
        StatusCode::ACCEPTED,
        Json(json!({ "pin": pin, "taskid": task_id, "msg": "" })),
    ))
}

#[derive(Deserialize)]
pub struct TaskIdQuery {
    pub taskid: String,
}

fn task_result_json(result: &TaskResult) -> Value {
    json!({
        "completed": result.completed,
        "succeed": result.succeeded,
        "errorstring": result.error_string,
    })
}

pub async fn get_pairstate(
    State(state): State<SharedState>,
    Query(q): Query<TaskIdQuery>,
) -> Result<Json<Value>, ApiError> {
    if !valid_uuid(&q.taskid) {
        return Err(ApiError::InvalidUuid);
    }
    match state.tasks.poll(&q.taskid) {
        Some(result) => Ok(Json(task_result_json(&result))),
        None => Err(ApiError::NotFound("task")),
    }
}

pub async fn get_cancelpair(
    State(state): State<SharedState>,
    Query(q): Query<TaskIdQuery>,
) -> Result<Json<Value>, ApiError> {
    if !valid_uuid(&q.taskid) {
        return Err(ApiError::InvalidUuid);
    }
    if state.tasks.cancel(&q.taskid) {
        Ok(Json(json!({ "ok": true })))
    } else {
        Err(ApiError::NotFound("task"))
    }
}
