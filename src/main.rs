use std::sync::Arc;

use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use salonbook::clock::SystemClock;
use salonbook::config::AppConfig;
use salonbook::db::SqliteStorage;
use salonbook::handlers;
use salonbook::services::ai::openai::OpenAiProvider;
use salonbook::services::ai::{DisabledLlm, LlmProvider};
use salonbook::services::messaging::twilio::TwilioSmsProvider;
use salonbook::services::messaging::{LogOnlyMessaging, MessagingProvider};
use salonbook::services::orchestrator::BookingOrchestrator;
use salonbook::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = AppConfig::from_env();

    let storage = SqliteStorage::open(&config.database_url)?;
    if config.seed_demo_data {
        storage.seed_demo_data()?;
    }
    let storage = Arc::new(storage);

    let llm: Arc<dyn LlmProvider> = if config.llm_enabled() {
        tracing::info!("using OpenAI-compatible LLM provider (model: {})", config.llm_model);
        Arc::new(OpenAiProvider::new(
            config.llm_api_key.clone(),
            config.llm_base_url.clone(),
            config.llm_model.clone(),
        ))
    } else {
        tracing::warn!("LLM_API_KEY not set, replies use deterministic paths only");
        Arc::new(DisabledLlm)
    };

    let twilio = TwilioSmsProvider::new(
        config.twilio_account_sid.clone(),
        config.twilio_auth_token.clone(),
        config.twilio_phone_number.clone(),
    );
    let messaging: Arc<dyn MessagingProvider> = if twilio.is_configured() {
        Arc::new(twilio)
    } else {
        tracing::warn!("Twilio credentials missing, outbound SMS will only be logged");
        Arc::new(LogOnlyMessaging)
    };

    let orchestrator = BookingOrchestrator::new(
        &config,
        storage.clone(),
        llm,
        messaging,
        Arc::new(SystemClock),
    );

    let state = Arc::new(AppState {
        config: config.clone(),
        storage,
        orchestrator: Arc::new(orchestrator),
    });

    let app = handlers::router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr = format!("0.0.0.0:{}", config.port);
    tracing::info!("starting server on {addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
