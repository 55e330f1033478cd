use chrono::NaiveDate;
use serde::Serialize;
use serde_json::{json, Value};

use super::{LlmProvider, LlmReply};
use crate::models::{ConversationState, ConversationStep, Service};

pub const SERVICE_CHOICES: &[&str] = &["Signature Head Spa", "Deluxe Head Spa", "Platinum Head Spa"];

/// Business facts injected into every prompt.
#[derive(Debug, Clone)]
pub struct BookingContext {
    pub business_name: String,
    pub business_phone: String,
    pub business_address: String,
    pub hours_text: String,
    pub services: Vec<Service>,
    pub client_name: String,
    pub today: NaiveDate,
}

impl BookingContext {
    fn service_lines(&self) -> String {
        if self.services.is_empty() {
            return "- (no services configured)".to_string();
        }
        self.services
            .iter()
            .map(|s| format!("- {} (${:.0}, {} minutes)", s.name, s.price, s.duration))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct FunctionCall {
    pub name: String,
    pub arguments: Value,
}

/// Result of a structured booking round trip. Errors are folded in rather
/// than returned.
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct StructuredResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub function_call: Option<FunctionCall>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

pub fn booking_functions() -> Vec<Value> {
    let service = json!({
        "type": "string",
        "enum": SERVICE_CHOICES,
        "description": "The service to book",
    });
    let date = json!({ "type": "string", "description": "Date in YYYY-MM-DD format" });
    let time = json!({ "type": "string", "description": "Time in HH:MM AM/PM format, e.g. 2:00 PM" });
    let appointment_id = json!({ "type": "number", "description": "The appointment ID" });
    let client_phone = json!({ "type": "string", "description": "The client's phone number" });

    vec![
        json!({
            "name": "check_availability",
            "description": "Check available time slots for a service on a date. Call this when service, date and time are all known.",
            "parameters": {
                "type": "object",
                "properties": { "service": service, "date": date, "time": time },
                "required": ["service", "date", "time"],
            },
        }),
        json!({
            "name": "book_appointment",
            "description": "Book an appointment once the client has confirmed a specific available time.",
            "parameters": {
                "type": "object",
                "properties": {
                    "service": service,
                    "date": date,
                    "time": time,
                    "client_name": { "type": "string", "description": "The client's name, if known" },
                },
                "required": ["service", "date", "time"],
            },
        }),
        json!({
            "name": "cancel_appointment",
            "description": "Cancel an existing appointment.",
            "parameters": {
                "type": "object",
                "properties": { "appointment_id": appointment_id, "client_phone": client_phone },
                "required": ["appointment_id", "client_phone"],
            },
        }),
        json!({
            "name": "reschedule_appointment",
            "description": "Move an existing appointment to a new date and time.",
            "parameters": {
                "type": "object",
                "properties": {
                    "appointment_id": appointment_id,
                    "client_phone": client_phone,
                    "new_date": date,
                    "new_time": time,
                },
                "required": ["appointment_id", "client_phone", "new_date", "new_time"],
            },
        }),
    ]
}

fn state_line(value: Option<&str>) -> &str {
    value.unwrap_or("NOT SET")
}

pub fn system_prompt(context: &BookingContext, state: Option<&ConversationState>) -> String {
    let step = state.map(|s| s.conversation_step).unwrap_or_default();
    let service = state.and_then(|s| s.selected_service.as_deref());
    let date = state.and_then(|s| s.selected_date.as_deref());
    let time = state.and_then(|s| s.selected_time.as_deref());

    format!(
        r#"You are the SMS booking assistant for {name}. Today is {today}.

CRITICAL BOOKING FLOW RULES:
1. Collect exactly three things: service, date, time. Ask for one missing item at a time.
2. Never invent availability. Only the check_availability function knows which times are open.
3. When service, date AND time are all known, you MUST call check_availability. Do not reply with text.
4. Only call book_appointment after the client has picked a time that check_availability reported as open.
5. Keep replies under 160 characters, warm and professional. No markdown.

CURRENT CONVERSATION STATE:
- Step: {step}
- Service: {service}
- Date: {date}
- Time: {time}

SERVICES:
{services}

DECISION TREE:
- No service yet -> ask which service they would like.
- Service but no date -> ask what day works for them.
- Service and date but no time -> ask what time works for them.
- Service, date and time -> call check_availability.
- Client asks to cancel or reschedule with an appointment ID -> call cancel_appointment or reschedule_appointment.

FUNCTION CALLING:
- Dates are YYYY-MM-DD. Times are H:MM AM/PM.
- The service must be one of: {choices}.

Business hours: {hours}. Phone: {phone}."#,
        name = context.business_name,
        today = context.today.format("%A, %Y-%m-%d"),
        step = step.as_str(),
        service = state_line(service),
        date = state_line(date),
        time = state_line(time),
        services = context.service_lines(),
        choices = SERVICE_CHOICES.join(", "),
        hours = context.hours_text,
        phone = context.business_phone,
    )
}

pub fn user_prompt(message: &str, context: &BookingContext, state: Option<&ConversationState>) -> String {
    let mut prompt = format!("Client Message: \"{message}\"\nClient Name: {}\n", context.client_name);

    let Some(state) = state else {
        prompt.push_str("\nNew conversation. No booking details collected yet.");
        return prompt;
    };

    prompt.push_str(&format!(
        "\nCollected so far:\n- Service: {}\n- Date: {}\n- Time: {}\n",
        state_line(state.selected_service.as_deref()),
        state_line(state.selected_date.as_deref()),
        state_line(state.selected_time.as_deref()),
    ));

    let hint = if state.has_all_fields() {
        "ALL PARAMETERS COLLECTED: call check_availability now."
    } else if state.has_any_field() {
        "PARTIAL: ask only for the missing details."
    } else {
        "INCOMPLETE: find out which service the client wants."
    };
    prompt.push('\n');
    prompt.push_str(hint);

    if state.conversation_step != ConversationStep::Initial {
        prompt.push_str("\nThis is a continuing conversation. Do not greet the client again.");
    }
    prompt
}

pub async fn generate_structured_booking_response(
    llm: &dyn LlmProvider,
    message: &str,
    context: &BookingContext,
    state: Option<&ConversationState>,
) -> StructuredResponse {
    let system = system_prompt(context, state);
    let user = user_prompt(message, context, state);

    match llm.complete(&system, &user, &booking_functions()).await {
        Ok(LlmReply::FunctionCall { name, arguments }) => StructuredResponse {
            success: true,
            function_call: Some(FunctionCall { name, arguments }),
            ..Default::default()
        },
        Ok(LlmReply::Text(text)) => StructuredResponse {
            success: true,
            message: Some(text),
            ..Default::default()
        },
        Err(e) => {
            tracing::error!(error = %e, "structured booking completion failed");
            StructuredResponse {
                success: false,
                error: Some(e.to_string()),
                ..Default::default()
            }
        }
    }
}

pub async fn generate_business_answer(
    llm: &dyn LlmProvider,
    message: &str,
    context: &BookingContext,
) -> anyhow::Result<String> {
    let system = format!(
        "You answer questions by text message for {name}, a head spa.\n\
         Address: {address}\nHours: {hours}\nPhone: {phone}\nServices:\n{services}\n\n\
         Answer in one or two short sentences using only these facts. \
         If you don't know, invite them to call {phone}.",
        name = context.business_name,
        address = context.business_address,
        hours = context.hours_text,
        phone = context.business_phone,
        services = context.service_lines(),
    );
    let user = format!("Client Message: \"{message}\"");

    match llm.complete(&system, &user, &[]).await? {
        LlmReply::Text(text) if !text.is_empty() => Ok(text),
        LlmReply::Text(_) => anyhow::bail!("empty business answer"),
        LlmReply::FunctionCall { name, .. } => {
            anyhow::bail!("unexpected function call {name} for a business question")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDateTime;

    fn context() -> BookingContext {
        BookingContext {
            business_name: "Glo Head Spa".to_string(),
            business_phone: "918-932-5396".to_string(),
            business_address: "123 Main St".to_string(),
            hours_text: "Wednesday-Saturday from 10 AM to 8 PM".to_string(),
            services: vec![Service {
                id: 1,
                name: "Signature Head Spa".to_string(),
                description: None,
                duration: 60,
                price: 99.0,
                is_active: true,
            }],
            client_name: "there".to_string(),
            today: NaiveDate::from_ymd_opt(2025, 6, 17).unwrap(),
        }
    }

    fn state(service: Option<&str>, date: Option<&str>, time: Option<&str>) -> ConversationState {
        let now = NaiveDateTime::parse_from_str("2025-06-17 09:00", "%Y-%m-%d %H:%M").unwrap();
        let mut s = ConversationState::new("+15550001111", now);
        s.conversation_step = ConversationStep::DateRequested;
        s.selected_service = service.map(String::from);
        s.selected_date = date.map(String::from);
        s.selected_time = time.map(String::from);
        s
    }

    #[test]
    fn test_four_functions_declared() {
        let names: Vec<_> = booking_functions()
            .iter()
            .map(|f| f["name"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(
            names,
            ["check_availability", "book_appointment", "cancel_appointment", "reschedule_appointment"]
        );
        assert_eq!(booking_functions()[0]["parameters"]["properties"]["service"]["enum"][2], "Platinum Head Spa");
    }

    #[test]
    fn test_system_prompt_embeds_state() {
        let s = state(Some("deluxe head spa"), None, None);
        let prompt = system_prompt(&context(), Some(&s));
        assert!(prompt.contains("Glo Head Spa"));
        assert!(prompt.contains("- Service: deluxe head spa"));
        assert!(prompt.contains("- Date: NOT SET"));
        assert!(prompt.contains("Signature Head Spa ($99, 60 minutes)"));
    }

    #[test]
    fn test_user_prompt_hints() {
        let ctx = context();
        let complete = state(Some("head spa"), Some("friday"), Some("2:00 pm"));
        let prompt = user_prompt("2pm", &ctx, Some(&complete));
        assert!(prompt.starts_with("Client Message: \"2pm\""));
        assert!(prompt.contains("ALL PARAMETERS COLLECTED"));
        assert!(prompt.contains("Do not greet"));

        let partial = state(Some("head spa"), None, None);
        assert!(user_prompt("hm", &ctx, Some(&partial)).contains("PARTIAL"));
        assert!(user_prompt("hi", &ctx, None).contains("New conversation"));
    }
}
