use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ConversationStep {
    #[default]
    Initial,
    ServiceRequested,
    ServiceSelected,
    DateRequested,
    DateSelected,
    TimeSelected,
    Completed,
}

impl ConversationStep {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConversationStep::Initial => "initial",
            ConversationStep::ServiceRequested => "service_requested",
            ConversationStep::ServiceSelected => "service_selected",
            ConversationStep::DateRequested => "date_requested",
            ConversationStep::DateSelected => "date_selected",
            ConversationStep::TimeSelected => "time_selected",
            ConversationStep::Completed => "completed",
        }
    }
}

/// Booking progress for one sender. Field values are kept as the customer
/// phrased them; they are resolved against real services and dates only when
/// availability is checked.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationState {
    pub phone_number: String,
    pub selected_service: Option<String>,
    pub selected_date: Option<String>,
    pub selected_time: Option<String>,
    pub conversation_step: ConversationStep,
    pub last_updated: NaiveDateTime,
    /// When `conversation_step` last changed.
    pub step_entered_at: NaiveDateTime,
}

impl ConversationState {
    pub fn new(phone_number: &str, now: NaiveDateTime) -> Self {
        Self {
            phone_number: phone_number.to_string(),
            selected_service: None,
            selected_date: None,
            selected_time: None,
            conversation_step: ConversationStep::Initial,
            last_updated: now,
            step_entered_at: now,
        }
    }

    pub fn has_any_field(&self) -> bool {
        self.selected_service.is_some()
            || self.selected_date.is_some()
            || self.selected_time.is_some()
    }

    pub fn has_all_fields(&self) -> bool {
        self.selected_service.is_some()
            && self.selected_date.is_some()
            && self.selected_time.is_some()
    }
}

/// A partial update merged field-by-field into a stored state.
///
/// `Some(None)` on a field clears it; `None` leaves it unchanged.
#[derive(Debug, Clone, Default)]
pub struct StatePatch {
    pub selected_service: Option<Option<String>>,
    pub selected_date: Option<Option<String>>,
    pub selected_time: Option<Option<String>>,
    pub conversation_step: Option<ConversationStep>,
}

impl StatePatch {
    pub fn step(step: ConversationStep) -> Self {
        Self {
            conversation_step: Some(step),
            ..Default::default()
        }
    }

    pub fn service(mut self, value: Option<String>) -> Self {
        if value.is_some() {
            self.selected_service = Some(value);
        }
        self
    }

    pub fn date(mut self, value: Option<String>) -> Self {
        if value.is_some() {
            self.selected_date = Some(value);
        }
        self
    }

    pub fn time(mut self, value: Option<String>) -> Self {
        if value.is_some() {
            self.selected_time = Some(value);
        }
        self
    }

    pub fn clear_date(mut self) -> Self {
        self.selected_date = Some(None);
        self
    }

    pub fn clear_time(mut self) -> Self {
        self.selected_time = Some(None);
        self
    }
}
