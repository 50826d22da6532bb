//! Route handlers: the main endpoint, health check and admin API.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::Json;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;

use super::error::ApiError;
use super::{to_iso8601, AppState};
use crate::ratelimit::{KeyStatus, LimitRule};

/// Body of the admin configuration endpoints.
#[derive(Debug, Deserialize)]
pub struct ConfigRequest {
    limit: Option<i64>,
    #[serde(rename = "windowMs")]
    window_ms: Option<i64>,
}

impl ConfigRequest {
    fn values(&self) -> Result<(i64, i64), ApiError> {
        match (self.limit, self.window_ms) {
            (Some(limit), Some(window_ms)) => Ok((limit, window_ms)),
            _ => Err(ApiError::BadRequest(
                "Both 'limit' and 'windowMs' are required".to_string(),
            )),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    default_config: LimitRule,
    active_limits: BTreeMap<String, KeyStatus>,
    total_keys: usize,
    timestamp: String,
}

pub async fn root() -> Json<Value> {
    Json(json!({
        "message": "OK",
        "timestamp": to_iso8601(Utc::now()),
    }))
}

pub async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "uptime": state.started_at.elapsed().as_secs_f64(),
        "timestamp": to_iso8601(Utc::now()),
    }))
}

pub async fn get_default_config(State(state): State<AppState>) -> Json<LimitRule> {
    Json(state.limiter.default_config())
}

pub async fn update_default_config(
    State(state): State<AppState>,
    payload: Result<Json<ConfigRequest>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let Json(payload) = payload?;
    let (limit, window_ms) = payload.values()?;

    let config = state.limiter.set_default_config(limit, window_ms)?;

    Ok(Json(json!({
        "message": "Default configuration updated",
        "config": config,
    })))
}

pub async fn update_key_config(
    State(state): State<AppState>,
    Path(key): Path<String>,
    payload: Result<Json<ConfigRequest>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let Json(payload) = payload?;
    let (limit, window_ms) = payload.values()?;

    let rule = state
        .limiter
        .set_config(&key, limit, window_ms, Utc::now())?;

    Ok(Json(json!({
        "message": format!("Rate limit updated for key: {}", key),
        "key": key,
        "limit": rule.limit(),
        "windowMs": rule.window_ms(),
    })))
}

pub async fn status(State(state): State<AppState>) -> Json<StatusResponse> {
    let active_limits = state.limiter.snapshot_all(Utc::now());

    Json(StatusResponse {
        default_config: state.limiter.default_config(),
        total_keys: active_limits.len(),
        active_limits,
        timestamp: to_iso8601(Utc::now()),
    })
}
