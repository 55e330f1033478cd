mod flow;
mod functions;
pub mod replies;

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use serde::Serialize;

use crate::clock::Clock;
use crate::config::{AppConfig, BusinessProfile};
use crate::db::Storage;
use crate::models::sms::normalize_phone;
use crate::models::{
    AutoRespondConfig, AutoRespondConfigPatch, AutoRespondResult, ConversationState,
    ConversationStep, IncomingSms, MessageIntent, Service,
};
use crate::services::ai::booking_prompt::{self, BookingContext};
use crate::services::ai::LlmProvider;
use crate::services::booking::BookingService;
use crate::services::conversation_store::ConversationStore;
use crate::services::extractor::TIME_MENTION;
use crate::services::intent;
use crate::services::messaging::MessagingProvider;

pub use flow::should_force_availability_check;

/// A reply and how sure we are it is the right one.
#[derive(Debug, Clone)]
struct Reply {
    text: String,
    confidence: f64,
}

impl Reply {
    fn new(text: impl Into<String>, confidence: f64) -> Self {
        Self {
            text: text.into(),
            confidence,
        }
    }
}

const DETERMINISTIC_CONFIDENCE: f64 = 0.9;
const LLM_CONFIDENCE: f64 = 0.8;

#[derive(Debug, Default)]
struct Counters {
    processed: AtomicU64,
    responded: AtomicU64,
    skipped: AtomicU64,
    errors: AtomicU64,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct AutoRespondStats {
    pub messages_processed: u64,
    pub responses_sent: u64,
    pub messages_skipped: u64,
    pub errors: u64,
    pub active_conversations: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub status: &'static str,
    pub config_loaded: bool,
    pub llm_key_available: bool,
    pub storage_connected: bool,
    pub issues: Vec<String>,
}

/// Drives one SMS conversation turn: gates, intent, booking flow, reply.
pub struct BookingOrchestrator {
    storage: Arc<dyn Storage>,
    llm: Arc<dyn LlmProvider>,
    messaging: Arc<dyn MessagingProvider>,
    booking: BookingService,
    conversations: ConversationStore,
    auto_config: RwLock<AutoRespondConfig>,
    business: BusinessProfile,
    llm_enabled: bool,
    llm_timeout: Duration,
    force_availability_check: bool,
    phone_locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
    counters: Counters,
}

impl BookingOrchestrator {
    pub fn new(
        config: &AppConfig,
        storage: Arc<dyn Storage>,
        llm: Arc<dyn LlmProvider>,
        messaging: Arc<dyn MessagingProvider>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            booking: BookingService::new(
                storage.clone(),
                clock.clone(),
                config.fallback_slots,
                &config.business.phone,
            ),
            conversations: ConversationStore::new(clock),
            storage,
            llm,
            messaging,
            auto_config: RwLock::new(AutoRespondConfig::default()),
            business: config.business.clone(),
            llm_enabled: config.llm_enabled(),
            llm_timeout: Duration::from_secs(config.llm_timeout_secs),
            force_availability_check: config.force_availability_check,
            phone_locks: Mutex::new(HashMap::new()),
            counters: Counters::default(),
        }
    }

    pub fn conversations(&self) -> &ConversationStore {
        &self.conversations
    }

    pub fn booking(&self) -> &BookingService {
        &self.booking
    }

    /// Handles one inbound message end to end. Never fails: every outcome is
    /// reported through the returned result.
    pub async fn process_incoming_sms(&self, sms: &IncomingSms) -> AutoRespondResult {
        self.counters.processed.fetch_add(1, Ordering::Relaxed);
        let config = self.auto_respond_config();

        if let Some(reason) = self.gate(&config, sms) {
            tracing::info!(from = %sms.from, reason, "auto-respond skipped");
            self.counters.skipped.fetch_add(1, Ordering::Relaxed);
            return AutoRespondResult::skipped(reason);
        }

        let phone = normalize_phone(&sms.from);
        let lock = self.phone_lock(&phone);
        let result = {
            let _guard = lock.lock().await;
            self.run_turn(sms, &config, &phone).await
        };
        self.release_phone_lock(&phone, lock);
        result
    }

    /// One turn for a sender whose lock is held.
    async fn run_turn(
        &self,
        sms: &IncomingSms,
        config: &AutoRespondConfig,
        phone: &str,
    ) -> AutoRespondResult {
        let reply = self.respond(phone, &sms.body).await;

        if reply.confidence < config.confidence_threshold {
            tracing::info!(
                from = %phone,
                confidence = reply.confidence,
                threshold = config.confidence_threshold,
                "reply below confidence threshold, not sending"
            );
            self.counters.skipped.fetch_add(1, Ordering::Relaxed);
            return AutoRespondResult {
                confidence: Some(reply.confidence),
                ..AutoRespondResult::skipped("Confidence below threshold")
            };
        }

        let text = config.clip(&reply.text);
        match self.messaging.send_message(&sms.from, &text).await {
            Ok(()) => {
                self.counters.responded.fetch_add(1, Ordering::Relaxed);
                AutoRespondResult {
                    success: true,
                    response_sent: true,
                    response: Some(text),
                    confidence: Some(reply.confidence),
                    ..Default::default()
                }
            }
            Err(e) => {
                tracing::error!(error = %e, to = %sms.from, "failed to send reply");
                self.counters.errors.fetch_add(1, Ordering::Relaxed);
                AutoRespondResult {
                    response: Some(text),
                    confidence: Some(reply.confidence),
                    ..AutoRespondResult::failed(format!("failed to send SMS: {e}"))
                }
            }
        }
    }

    fn gate(&self, config: &AutoRespondConfig, sms: &IncomingSms) -> Option<&'static str> {
        if !config.enabled {
            return Some("SMS auto-respond is disabled");
        }
        if config.business_hours_only && !config.business_hours.contains(self.booking.now().time()) {
            return Some("Outside business hours");
        }
        if config.contains_excluded_keyword(&sms.body) {
            return Some("Contains excluded keywords");
        }
        if config.is_excluded_phone(&sms.from) {
            return Some("From excluded phone number");
        }
        if !config.is_auto_respond_number(&sms.to) {
            return Some("Not sent to auto-respond phone number");
        }
        None
    }

    fn phone_lock(&self, phone: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = match self.phone_locks.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        locks.entry(phone.to_string()).or_default().clone()
    }

    /// Drops the sender's lock entry once no other turn holds or awaits it.
    /// Handles are only cloned or released under the map lock.
    fn release_phone_lock(&self, phone: &str, lock: Arc<tokio::sync::Mutex<()>>) {
        let mut locks = match self.phone_locks.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        drop(lock);
        if locks.get(phone).is_some_and(|entry| Arc::strong_count(entry) == 1) {
            locks.remove(phone);
        }
    }

    async fn respond(&self, phone: &str, body: &str) -> Reply {
        let client_name = match self.booking.find_or_create_client(phone, None).await {
            Ok(user) => user.display_name().to_string(),
            Err(e) => {
                tracing::error!(error = %e, phone = %phone, "failed to resolve client");
                "there".to_string()
            }
        };

        let mut state = self.conversations.get(phone);
        let intent = intent::classify(body, state.as_ref());
        tracing::info!(
            from = %phone,
            intent = intent.as_str(),
            step = state.as_ref().map(|s| s.conversation_step.as_str()).unwrap_or("none"),
            "classified message"
        );

        if let Some(current) = &state {
            let leaves_flow = !matches!(
                intent,
                MessageIntent::Booking | MessageIntent::Reschedule | MessageIntent::Cancel
            );
            if current.conversation_step != ConversationStep::Initial
                && leaves_flow
                && !should_preserve(current, body)
            {
                tracing::debug!(from = %phone, "intent switched away from booking, clearing state");
                self.conversations.clear(phone);
                state = None;
            }
        }

        match intent {
            MessageIntent::Booking => flow::handle_booking(self, phone, body, state, &client_name).await,
            MessageIntent::Reschedule | MessageIntent::Cancel => {
                self.handle_change_request(phone, body, intent, state, &client_name).await
            }
            MessageIntent::BusinessQuestion => self.handle_business_question(body, &client_name).await,
            MessageIntent::General => {
                let services = self.services().await;
                Reply::new(
                    replies::general(body, &client_name, &services, &self.business),
                    DETERMINISTIC_CONFIDENCE,
                )
            }
        }
    }

    /// Reschedule and cancel go through the model only to pick up an
    /// appointment ID; anything else gets a call-us reply.
    async fn handle_change_request(
        &self,
        phone: &str,
        body: &str,
        intent: MessageIntent,
        state: Option<ConversationState>,
        client_name: &str,
    ) -> Reply {
        let state = if intent == MessageIntent::Cancel {
            self.conversations.clear(phone);
            None
        } else {
            state
        };

        if self.llm_enabled {
            let context = self.booking_context(client_name).await;
            let response = self.structured_response(body, &context, state.as_ref()).await;
            if let Some(call) = response.function_call {
                return functions::execute(self, phone, &call.name, &call.arguments).await;
            }
        }

        let text = match intent {
            MessageIntent::Cancel => replies::cancel_call_us(&self.business),
            _ => replies::reschedule_call_us(&self.business),
        };
        Reply::new(text, DETERMINISTIC_CONFIDENCE)
    }

    async fn handle_business_question(&self, body: &str, client_name: &str) -> Reply {
        if self.llm_enabled {
            let context = self.booking_context(client_name).await;
            let answer = tokio::time::timeout(
                self.llm_timeout,
                booking_prompt::generate_business_answer(self.llm.as_ref(), body, &context),
            )
            .await;
            match answer {
                Ok(Ok(text)) => return Reply::new(text, LLM_CONFIDENCE),
                Ok(Err(e)) => tracing::warn!(error = %e, "business answer failed, using fallback"),
                Err(_) => tracing::warn!("business answer timed out, using fallback"),
            }
        }
        let services = self.services().await;
        Reply::new(
            replies::business_fallback(body, &services, &self.business),
            DETERMINISTIC_CONFIDENCE,
        )
    }

    /// Structured completion bounded by the configured timeout.
    async fn structured_response(
        &self,
        body: &str,
        context: &BookingContext,
        state: Option<&ConversationState>,
    ) -> booking_prompt::StructuredResponse {
        let call = booking_prompt::generate_structured_booking_response(self.llm.as_ref(), body, context, state);
        match tokio::time::timeout(self.llm_timeout, call).await {
            Ok(response) => response,
            Err(_) => {
                tracing::error!(timeout_secs = self.llm_timeout.as_secs(), "structured booking completion timed out");
                booking_prompt::StructuredResponse {
                    success: false,
                    error: Some("LLM request timed out".to_string()),
                    ..Default::default()
                }
            }
        }
    }

    async fn services(&self) -> Vec<Service> {
        match self.storage.get_all_services().await {
            Ok(services) => services,
            Err(e) => {
                tracing::error!(error = %e, "failed to load services");
                Vec::new()
            }
        }
    }

    async fn booking_context(&self, client_name: &str) -> BookingContext {
        BookingContext {
            business_name: self.business.name.clone(),
            business_phone: self.business.phone.clone(),
            business_address: self.business.address.clone(),
            hours_text: self.business.hours_text.clone(),
            services: self.services().await,
            client_name: client_name.to_string(),
            today: self.booking.today(),
        }
    }

    pub fn auto_respond_config(&self) -> AutoRespondConfig {
        match self.auto_config.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn update_config(&self, patch: AutoRespondConfigPatch) -> AutoRespondConfig {
        let mut guard = match self.auto_config.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        guard.apply(patch);
        tracing::info!(enabled = guard.enabled, "auto-respond config updated");
        guard.clone()
    }

    pub fn set_auto_respond_numbers(&self, numbers: Vec<String>) -> AutoRespondConfig {
        self.update_config(AutoRespondConfigPatch {
            auto_respond_phone_numbers: Some(numbers),
            ..Default::default()
        })
    }

    pub fn stats(&self) -> AutoRespondStats {
        AutoRespondStats {
            messages_processed: self.counters.processed.load(Ordering::Relaxed),
            responses_sent: self.counters.responded.load(Ordering::Relaxed),
            messages_skipped: self.counters.skipped.load(Ordering::Relaxed),
            errors: self.counters.errors.load(Ordering::Relaxed),
            active_conversations: self.conversations.len(),
        }
    }

    pub async fn health(&self) -> HealthReport {
        let config = self.auto_respond_config();
        let config_loaded = config.max_response_length > 0;
        let storage_connected = match self.storage.get_all_services().await {
            Ok(_) => true,
            Err(e) => {
                tracing::error!(error = %e, "storage health check failed");
                false
            }
        };

        let mut issues = Vec::new();
        if !config_loaded {
            issues.push("auto-respond config is invalid".to_string());
        }
        if !self.llm_enabled {
            issues.push("LLM API key not configured".to_string());
        }
        if !storage_connected {
            issues.push("storage is not reachable".to_string());
        }

        HealthReport {
            status: if issues.is_empty() { "healthy" } else { "unhealthy" },
            config_loaded,
            llm_key_available: self.llm_enabled,
            storage_connected,
            issues,
        }
    }

    /// Forgets every conversation and zeroes the counters.
    pub fn reset(&self) {
        self.conversations.reset();
        for counter in [
            &self.counters.processed,
            &self.counters.responded,
            &self.counters.skipped,
            &self.counters.errors,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}

/// Mid-flow progress survives an off-topic message when fields are already
/// collected or the message still talks about a service or a time.
fn should_preserve(state: &ConversationState, body: &str) -> bool {
    state.has_any_field() || body.to_lowercase().contains("head spa") || TIME_MENTION.is_match(body)
}
