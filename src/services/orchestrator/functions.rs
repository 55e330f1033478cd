use serde_json::Value;

use crate::models::{ConversationStep, StatePatch};
use crate::services::ai::BookingFunction;
use crate::services::booking::{format_day, format_time};

use super::flow::commit;
use super::{replies, BookingOrchestrator, Reply, DETERMINISTIC_CONFIDENCE};

/// Runs a function call requested by the model against local services. The
/// model's own text is never trusted for side effects.
pub(super) async fn execute(
    orch: &BookingOrchestrator,
    phone: &str,
    name: &str,
    arguments: &Value,
) -> Reply {
    let function = match BookingFunction::from_call(name, arguments) {
        Ok(function) => function,
        Err(e) => {
            tracing::warn!(error = %e, from = %phone, "ignoring malformed function call");
            return Reply::new(replies::llm_unavailable(&orch.business), DETERMINISTIC_CONFIDENCE);
        }
    };
    tracing::info!(from = %phone, function = function.name(), "executing model function call");

    match function {
        BookingFunction::CheckAvailability { service, date, time } => {
            check_and_book(orch, phone, &service, &date, &time, None).await
        }
        BookingFunction::BookAppointment {
            service,
            date,
            time,
            client_name,
        } => check_and_book(orch, phone, &service, &date, &time, client_name.as_deref()).await,
        // The sender's own number is authoritative, not the one the model echoed.
        BookingFunction::CancelAppointment { appointment_id, .. } => {
            match orch.booking.cancel_appointment(appointment_id, phone).await {
                Ok(_) => {
                    orch.conversations.clear(phone);
                    Reply::new(replies::cancelled(), DETERMINISTIC_CONFIDENCE)
                }
                Err(e) => Reply::new(e.to_string(), DETERMINISTIC_CONFIDENCE),
            }
        }
        BookingFunction::RescheduleAppointment {
            appointment_id,
            new_date,
            new_time,
            ..
        } => match orch
            .booking
            .reschedule_appointment(appointment_id, phone, &new_date, &new_time)
            .await
        {
            Ok(appointment) => {
                orch.conversations.clear(phone);
                let when = format!(
                    "{} at {}",
                    format_day(appointment.start_time.date()),
                    format_time(appointment.start_time)
                );
                Reply::new(replies::rescheduled(&when), DETERMINISTIC_CONFIDENCE)
            }
            Err(e) => Reply::new(e.to_string(), DETERMINISTIC_CONFIDENCE),
        },
    }
}

/// Books when a slot starts within the match tolerance of the requested
/// time; otherwise stores what is known and offers alternatives.
pub(super) async fn check_and_book(
    orch: &BookingOrchestrator,
    phone: &str,
    service: &str,
    date: &str,
    time: &str,
    client_name: Option<&str>,
) -> Reply {
    let check = orch.booking.check_availability(service, date, time).await;

    if let (true, Some(slot)) = (check.available, check.slot.clone()) {
        let on_failure = StatePatch::step(ConversationStep::TimeSelected)
            .service(Some(service.to_string()))
            .date(Some(date.to_string()))
            .time(Some(time.to_string()));
        return commit(orch, phone, slot, client_name, on_failure).await;
    }

    let patch = if check.suggested_times.is_empty() {
        StatePatch::step(ConversationStep::DateRequested)
            .service(Some(service.to_string()))
            .clear_date()
            .clear_time()
    } else {
        StatePatch::step(ConversationStep::DateSelected)
            .service(Some(service.to_string()))
            .date(Some(date.to_string()))
            .clear_time()
    };
    orch.conversations.update(phone, patch);

    let text = if check.suggested_times.is_empty() {
        check.message
    } else {
        format!("{}\n\nWhich time works best for you? ⏰", check.message)
    };
    Reply::new(text, DETERMINISTIC_CONFIDENCE)
}
