pub mod booking_prompt;
pub mod openai;

use async_trait::async_trait;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{json, Value};

/// What a chat completion came back with.
#[derive(Debug, Clone, PartialEq)]
pub enum LlmReply {
    Text(String),
    FunctionCall { name: String, arguments: Value },
}

#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// One system + user round trip. `functions` are JSON-schema function
    /// declarations the model may call instead of answering in text.
    async fn complete(&self, system: &str, user: &str, functions: &[Value]) -> anyhow::Result<LlmReply>;
}

/// Stands in when no API key is configured. The orchestrator checks the key
/// first, so this is only reached by misconfiguration.
pub struct DisabledLlm;

#[async_trait]
impl LlmProvider for DisabledLlm {
    async fn complete(&self, _system: &str, _user: &str, _functions: &[Value]) -> anyhow::Result<LlmReply> {
        anyhow::bail!("LLM API key not configured")
    }
}

/// A function call requested by the model, with typed arguments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "name", content = "arguments", rename_all = "snake_case")]
pub enum BookingFunction {
    CheckAvailability {
        service: String,
        date: String,
        time: String,
    },
    BookAppointment {
        service: String,
        date: String,
        time: String,
        #[serde(default)]
        client_name: Option<String>,
    },
    CancelAppointment {
        #[serde(deserialize_with = "id_from_any")]
        appointment_id: i64,
        #[serde(default)]
        client_phone: Option<String>,
    },
    RescheduleAppointment {
        #[serde(deserialize_with = "id_from_any")]
        appointment_id: i64,
        #[serde(default)]
        client_phone: Option<String>,
        new_date: String,
        new_time: String,
    },
}

impl BookingFunction {
    pub fn from_call(name: &str, arguments: &Value) -> anyhow::Result<Self> {
        let tagged = json!({ "name": name, "arguments": arguments });
        serde_json::from_value(tagged)
            .map_err(|e| anyhow::anyhow!("invalid arguments for {name}: {e}"))
    }

    pub fn name(&self) -> &'static str {
        match self {
            BookingFunction::CheckAvailability { .. } => "check_availability",
            BookingFunction::BookAppointment { .. } => "book_appointment",
            BookingFunction::CancelAppointment { .. } => "cancel_appointment",
            BookingFunction::RescheduleAppointment { .. } => "reschedule_appointment",
        }
    }
}

/// Models send ids as either numbers or numeric strings.
fn id_from_any<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i64, D::Error> {
    match Value::deserialize(deserializer)? {
        Value::Number(n) => n
            .as_i64()
            .ok_or_else(|| serde::de::Error::custom("appointment id out of range")),
        Value::String(s) => s
            .trim()
            .trim_start_matches('#')
            .parse()
            .map_err(serde::de::Error::custom),
        other => Err(serde::de::Error::custom(format!("unexpected appointment id {other}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_check_availability() {
        let args = json!({"service": "Signature Head Spa", "date": "2025-06-18", "time": "2:00 PM"});
        let call = BookingFunction::from_call("check_availability", &args).unwrap();
        assert_eq!(
            call,
            BookingFunction::CheckAvailability {
                service: "Signature Head Spa".to_string(),
                date: "2025-06-18".to_string(),
                time: "2:00 PM".to_string(),
            }
        );
        assert_eq!(call.name(), "check_availability");
    }

    #[test]
    fn test_appointment_id_accepts_strings() {
        let args = json!({"appointment_id": "#42", "client_phone": "+15550001111"});
        let call = BookingFunction::from_call("cancel_appointment", &args).unwrap();
        assert!(matches!(
            call,
            BookingFunction::CancelAppointment { appointment_id: 42, .. }
        ));
    }

    #[test]
    fn test_unknown_function_is_an_error() {
        assert!(BookingFunction::from_call("send_flowers", &json!({})).is_err());
        assert!(BookingFunction::from_call("book_appointment", &json!({"service": "x"})).is_err());
    }
}
