use crate::models::{AvailableSlot, BookingRequest, ConversationState, ConversationStep, StatePatch};
use crate::services::ai::booking_prompt::StructuredResponse;
use crate::services::booking::{
    confirmation_message, format_day, format_time, slot_matches_time, suggested_times,
};
use crate::services::extractor;

use super::{functions, replies, BookingOrchestrator, Reply, DETERMINISTIC_CONFIDENCE, LLM_CONFIDENCE};

const MAX_TIME_OPTIONS: usize = 5;

/// Booking fields known after merging this message over stored state.
#[derive(Debug, Default)]
struct Fields {
    service: Option<String>,
    date: Option<String>,
    time: Option<String>,
}

impl Fields {
    fn merge(parsed: &BookingRequest, state: Option<&ConversationState>) -> Self {
        Self {
            service: parsed
                .service_name
                .clone()
                .or_else(|| state.and_then(|s| s.selected_service.clone())),
            date: parsed
                .date
                .clone()
                .or_else(|| state.and_then(|s| s.selected_date.clone())),
            time: parsed
                .time
                .clone()
                .or_else(|| state.and_then(|s| s.selected_time.clone())),
        }
    }

    fn patch(&self, step: ConversationStep) -> StatePatch {
        StatePatch::step(step)
            .service(self.service.clone())
            .date(self.date.clone())
            .time(self.time.clone())
    }
}

/// The model is consulted only when the message carried nothing the
/// extractor understood and a booking is already under way.
pub(super) async fn handle_booking(
    orch: &BookingOrchestrator,
    phone: &str,
    body: &str,
    state: Option<ConversationState>,
    client_name: &str,
) -> Reply {
    let parsed = extractor::parse(body, phone);
    let in_flow = state
        .as_ref()
        .is_some_and(|s| s.conversation_step != ConversationStep::Initial);

    if parsed.is_empty() && !parsed.is_time_rejection && in_flow && orch.llm_enabled {
        return llm_turn(orch, phone, body, state.as_ref(), client_name).await;
    }

    let fields = Fields::merge(&parsed, state.as_ref());
    tracing::debug!(from = %phone, ?fields, rejection = parsed.is_time_rejection, "booking fields");

    if parsed.is_time_rejection && fields.service.is_some() {
        return offer_other_times(orch, phone, &fields).await;
    }

    match (&fields.service, &fields.date, &fields.time) {
        (None, _, _) => {
            orch.conversations
                .update(phone, fields.patch(ConversationStep::ServiceRequested));
            let services = orch.services().await;
            Reply::new(replies::ask_for_service(&services), DETERMINISTIC_CONFIDENCE)
        }
        (Some(_), None, _) => {
            orch.conversations
                .update(phone, fields.patch(ConversationStep::DateRequested));
            Reply::new(replies::ask_for_date(), DETERMINISTIC_CONFIDENCE)
        }
        (Some(service), Some(date), None) => present_times(orch, phone, service, date).await,
        (Some(service), Some(date), Some(time)) => {
            match_and_book(orch, phone, service, date, time).await
        }
    }
}

async fn present_times(orch: &BookingOrchestrator, phone: &str, service: &str, date: &str) -> Reply {
    let Some(day) = orch.booking.resolve_date(date) else {
        return unreadable_date(orch, phone, service);
    };

    let slots = orch.booking.engine().slots_on(Some(service), day).await;
    let times = distinct_times(&slots);
    let label = display_service(service, &slots);

    if times.is_empty() {
        return no_slots(orch, phone, service, &label, &format_day(day));
    }

    orch.conversations.update(
        phone,
        StatePatch::step(ConversationStep::DateSelected)
            .service(Some(service.to_string()))
            .date(Some(date.to_string())),
    );
    Reply::new(
        replies::available_times(&label, &format_day(day), &times),
        DETERMINISTIC_CONFIDENCE,
    )
}

async fn match_and_book(
    orch: &BookingOrchestrator,
    phone: &str,
    service: &str,
    date: &str,
    time: &str,
) -> Reply {
    let Some(day) = orch.booking.resolve_date(date) else {
        return unreadable_date(orch, phone, service);
    };

    let slots = orch.booking.engine().slots_on(Some(service), day).await;
    if let Some(slot) = slots.iter().find(|s| slot_matches_time(s, time)) {
        let on_failure = StatePatch::step(ConversationStep::TimeSelected)
            .service(Some(service.to_string()))
            .date(Some(date.to_string()))
            .time(Some(time.to_string()));
        return commit(orch, phone, slot.clone(), None, on_failure).await;
    }

    let label = display_service(service, &slots);
    let times = distinct_times(&slots);
    if times.is_empty() {
        return no_slots(orch, phone, service, &label, &format_day(day));
    }

    orch.conversations.update(
        phone,
        StatePatch::step(ConversationStep::DateSelected)
            .service(Some(service.to_string()))
            .date(Some(date.to_string()))
            .clear_time(),
    );
    Reply::new(
        replies::time_unavailable(time, &label, &times),
        DETERMINISTIC_CONFIDENCE,
    )
}

async fn offer_other_times(orch: &BookingOrchestrator, phone: &str, fields: &Fields) -> Reply {
    let Some(service) = fields.service.as_deref() else {
        let services = orch.services().await;
        return Reply::new(replies::ask_for_service(&services), DETERMINISTIC_CONFIDENCE);
    };

    let day = fields.date.as_deref().and_then(|d| orch.booking.resolve_date(d));
    let mut slots = match day {
        Some(day) => orch.booking.engine().slots_on(Some(service), day).await,
        None => Vec::new(),
    };
    if slots.is_empty() {
        slots = orch.booking.engine().find_available_slots(Some(service)).await;
    }
    if let Some(rejected) = fields.time.as_deref() {
        slots.retain(|s| !slot_matches_time(s, rejected));
    }

    let label = display_service(service, &slots);
    let suggestions = suggested_times(&slots);
    if suggestions.is_empty() {
        orch.conversations.update(
            phone,
            StatePatch::step(ConversationStep::DateRequested)
                .service(Some(service.to_string()))
                .clear_date()
                .clear_time(),
        );
        return Reply::new(replies::no_openings(&label, &orch.business), DETERMINISTIC_CONFIDENCE);
    }

    let patch = match (day, fields.date.clone()) {
        (Some(_), Some(date)) => StatePatch::step(ConversationStep::DateSelected).date(Some(date)),
        _ => StatePatch::step(ConversationStep::DateRequested).clear_date(),
    };
    orch.conversations
        .update(phone, patch.service(Some(service.to_string())).clear_time());
    Reply::new(replies::other_times(&label, &suggestions), DETERMINISTIC_CONFIDENCE)
}

/// Books `slot`. Success clears the conversation; failure stores the
/// collected fields so the customer can simply try again.
pub(super) async fn commit(
    orch: &BookingOrchestrator,
    phone: &str,
    slot: AvailableSlot,
    client_name: Option<&str>,
    on_failure: StatePatch,
) -> Reply {
    match orch.booking.book_slot(phone, client_name, &slot).await {
        Ok(appointment) => {
            orch.conversations.clear(phone);
            tracing::info!(from = %phone, appointment_id = appointment.id, "booking flow completed");
            Reply::new(confirmation_message(&slot), DETERMINISTIC_CONFIDENCE)
        }
        Err(e) => {
            tracing::error!(error = %e, from = %phone, "booking commit failed, keeping state");
            orch.conversations.update(phone, on_failure);
            Reply::new(e.to_string(), DETERMINISTIC_CONFIDENCE)
        }
    }
}

async fn llm_turn(
    orch: &BookingOrchestrator,
    phone: &str,
    body: &str,
    state: Option<&ConversationState>,
    client_name: &str,
) -> Reply {
    let context = orch.booking_context(client_name).await;
    let response = orch.structured_response(body, &context, state).await;

    if !response.success {
        tracing::warn!(from = %phone, error = ?response.error, "model unavailable for booking turn");
        return Reply::new(replies::llm_unavailable(&orch.business), DETERMINISTIC_CONFIDENCE);
    }

    if let Some(call) = &response.function_call {
        return functions::execute(orch, phone, &call.name, &call.arguments).await;
    }

    if should_force_availability_check(orch.force_availability_check, state, &response) {
        if let Some(s) = state {
            if let (Some(service), Some(date), Some(time)) =
                (&s.selected_service, &s.selected_date, &s.selected_time)
            {
                tracing::info!(from = %phone, "model replied in text with all fields known, checking availability");
                return functions::check_and_book(orch, phone, service, date, time, None).await;
            }
        }
    }

    match response.message.filter(|m| !m.trim().is_empty()) {
        Some(text) => {
            orch.conversations.update(phone, StatePatch::default());
            Reply::new(text, LLM_CONFIDENCE)
        }
        None => Reply::new(replies::llm_unavailable(&orch.business), DETERMINISTIC_CONFIDENCE),
    }
}

/// A text answer while every booking field is already known means the model
/// skipped the function call; the check is then run locally.
pub fn should_force_availability_check(
    enabled: bool,
    state: Option<&ConversationState>,
    response: &StructuredResponse,
) -> bool {
    enabled
        && response.success
        && response.function_call.is_none()
        && state.is_some_and(ConversationState::has_all_fields)
}

fn unreadable_date(orch: &BookingOrchestrator, phone: &str, service: &str) -> Reply {
    orch.conversations.update(
        phone,
        StatePatch::step(ConversationStep::DateRequested)
            .service(Some(service.to_string()))
            .clear_date()
            .clear_time(),
    );
    Reply::new(replies::unreadable_date(&title_case(service)), DETERMINISTIC_CONFIDENCE)
}

fn no_slots(orch: &BookingOrchestrator, phone: &str, service: &str, label: &str, day: &str) -> Reply {
    orch.conversations.update(
        phone,
        StatePatch::step(ConversationStep::DateRequested)
            .service(Some(service.to_string()))
            .clear_date()
            .clear_time(),
    );
    Reply::new(replies::no_slots(label, day), DETERMINISTIC_CONFIDENCE)
}

fn distinct_times(slots: &[AvailableSlot]) -> Vec<String> {
    let mut times: Vec<String> = Vec::new();
    for slot in slots {
        let label = format_time(slot.start_time);
        if !times.contains(&label) {
            times.push(label);
        }
        if times.len() == MAX_TIME_OPTIONS {
            break;
        }
    }
    times
}

/// The real service name when every slot agrees on one, otherwise the
/// customer's wording in title case.
fn display_service(requested: &str, slots: &[AvailableSlot]) -> String {
    match slots.first() {
        Some(first) if slots.iter().all(|s| s.service_id == first.service_id) => {
            first.service_name.clone()
        }
        _ => title_case(requested),
    }
}

fn title_case(text: &str) -> String {
    text.split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDateTime;

    fn state(all: bool) -> ConversationState {
        let now = NaiveDateTime::parse_from_str("2025-06-17 09:00", "%Y-%m-%d %H:%M").unwrap();
        let mut s = ConversationState::new("+15550001111", now);
        s.conversation_step = ConversationStep::DateSelected;
        s.selected_service = Some("signature head spa".into());
        s.selected_date = Some("tomorrow".into());
        if all {
            s.selected_time = Some("2:00 pm".into());
        }
        s
    }

    fn text_response() -> StructuredResponse {
        StructuredResponse {
            success: true,
            message: Some("What time works?".into()),
            ..Default::default()
        }
    }

    #[test]
    fn test_force_check_only_with_all_fields() {
        assert!(should_force_availability_check(true, Some(&state(true)), &text_response()));
        assert!(!should_force_availability_check(true, Some(&state(false)), &text_response()));
        assert!(!should_force_availability_check(true, None, &text_response()));
        assert!(!should_force_availability_check(false, Some(&state(true)), &text_response()));
    }

    #[test]
    fn test_merge_prefers_message_fields() {
        let parsed = BookingRequest {
            date: Some("friday".into()),
            ..Default::default()
        };
        let fields = Fields::merge(&parsed, Some(&state(true)));
        assert_eq!(fields.service.as_deref(), Some("signature head spa"));
        assert_eq!(fields.date.as_deref(), Some("friday"));
        assert_eq!(fields.time.as_deref(), Some("2:00 pm"));
    }

    #[test]
    fn test_title_case() {
        assert_eq!(title_case("deluxe head spa"), "Deluxe Head Spa");
    }
}
