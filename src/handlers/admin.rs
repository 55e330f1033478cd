use std::sync::Arc;

use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use chrono::Utc;
use serde::Deserialize;

use crate::errors::AppError;
use crate::models::{AutoRespondConfig, AutoRespondConfigPatch, AutoRespondResult, IncomingSms};
use crate::services::orchestrator::{AutoRespondStats, HealthReport};
use crate::state::AppState;

fn check_auth(headers: &HeaderMap, expected_token: &str) -> Result<(), AppError> {
    let auth = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");

    let token = auth.strip_prefix("Bearer ").unwrap_or("");
    if token.is_empty() || token != expected_token {
        return Err(AppError::Unauthorized);
    }
    Ok(())
}

// GET /api/sms-auto-respond/health
pub async fn get_health(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<HealthReport>, AppError> {
    check_auth(&headers, &state.config.admin_token)?;
    Ok(Json(state.orchestrator.health().await))
}

// GET /api/sms-auto-respond/config
pub async fn get_config(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<AutoRespondConfig>, AppError> {
    check_auth(&headers, &state.config.admin_token)?;
    Ok(Json(state.orchestrator.auto_respond_config()))
}

// PUT /api/sms-auto-respond/config
pub async fn update_config(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(patch): Json<AutoRespondConfigPatch>,
) -> Result<Json<AutoRespondConfig>, AppError> {
    check_auth(&headers, &state.config.admin_token)?;

    if let Some(threshold) = patch.confidence_threshold {
        if !(0.0..=1.0).contains(&threshold) {
            return Err(AppError::BadRequest(
                "confidence_threshold must be between 0 and 1".to_string(),
            ));
        }
    }
    if patch.max_response_length == Some(0) {
        return Err(AppError::BadRequest(
            "max_response_length must be positive".to_string(),
        ));
    }

    Ok(Json(state.orchestrator.update_config(patch)))
}

#[derive(Deserialize)]
pub struct PhoneNumbersRequest {
    pub phone_numbers: Vec<String>,
}

// PUT /api/sms-auto-respond/phone-numbers
pub async fn update_phone_numbers(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<PhoneNumbersRequest>,
) -> Result<Json<AutoRespondConfig>, AppError> {
    check_auth(&headers, &state.config.admin_token)?;

    let numbers: Vec<String> = body
        .phone_numbers
        .into_iter()
        .map(|n| n.trim().to_string())
        .filter(|n| !n.is_empty())
        .collect();
    tracing::info!(count = numbers.len(), "auto-respond numbers replaced");
    Ok(Json(state.orchestrator.set_auto_respond_numbers(numbers)))
}

// GET /api/sms-auto-respond/stats
pub async fn get_stats(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<AutoRespondStats>, AppError> {
    check_auth(&headers, &state.config.admin_token)?;
    Ok(Json(state.orchestrator.stats()))
}

#[derive(Deserialize)]
pub struct TestMessageRequest {
    pub from: String,
    pub to: String,
    pub body: String,
}

// POST /api/sms-auto-respond/test
pub async fn test_message(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<TestMessageRequest>,
) -> Result<Json<AutoRespondResult>, AppError> {
    check_auth(&headers, &state.config.admin_token)?;

    if req.from.trim().is_empty() || req.body.trim().is_empty() {
        return Err(AppError::BadRequest("from and body are required".to_string()));
    }

    let now = Utc::now();
    let sms = IncomingSms {
        from: req.from.trim().to_string(),
        to: req.to.trim().to_string(),
        body: req.body.trim().to_string(),
        timestamp: now.to_rfc3339(),
        message_id: format!("test_{}", now.timestamp_millis()),
    };
    Ok(Json(state.orchestrator.process_incoming_sms(&sms).await))
}
