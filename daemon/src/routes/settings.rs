//! `/settings`, `/settings/reset`, `/settings/screeninfo` (§4.I, §4.K).

use axum::extract::State;
use axum::Json;
use serde_json::{json, Map, Value};

use crate::error::ApiError;
use crate::state::SharedState;

pub async fn get_settings(State(state): State<SharedState>) -> Json<Value> {
    Json(Value::Object(state.settings.get_all()))
}

pub async fn put_settings(
    State(state): State<SharedState>,
    Json(patch): Json<Map<String, Value>>,
) -> Result<Json<Value>, ApiError> {
    state.settings.update(patch)?;
    Ok(Json(Value::Object(state.settings.get_all())))
}

pub async fn put_settings_reset(State(state): State<SharedState>) -> Result<Json<Value>, ApiError> {
    state.settings.reset()?;
    Ok(Json(Value::Object(state.settings.get_all())))
}

/// Display enumeration lives in the UI's own native-surface collaborator
/// (§1 "abstract as a display-enumeration interface"); this daemon only
/// has to report that no displays are known from here.
pub async fn get_screeninfo() -> Json<Value> {
    Json(json!({ "displays": [] }))
}
