pub mod admin;
pub mod health;
pub mod webhook;

use std::sync::Arc;

use axum::routing::{get, post, put};
use axum::Router;

use crate::state::AppState;

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health::health))
        .route(
            "/webhook/sms",
            get(webhook::webhook_ready).post(webhook::sms_webhook),
        )
        .route(
            "/api/sms-auto-respond/webhook",
            get(webhook::webhook_ready).post(webhook::sms_webhook),
        )
        .route("/api/sms-auto-respond/health", get(admin::get_health))
        .route(
            "/api/sms-auto-respond/config",
            get(admin::get_config).put(admin::update_config),
        )
        .route(
            "/api/sms-auto-respond/phone-numbers",
            put(admin::update_phone_numbers),
        )
        .route("/api/sms-auto-respond/stats", get(admin::get_stats))
        .route(
            "/api/sms-auto-respond/test",
            post(admin::test_message),
        )
        .with_state(state)
}
