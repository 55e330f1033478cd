use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MessageIntent {
    Booking,
    Reschedule,
    Cancel,
    BusinessQuestion,
    General,
}

impl MessageIntent {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageIntent::Booking => "booking",
            MessageIntent::Reschedule => "reschedule",
            MessageIntent::Cancel => "cancel",
            MessageIntent::BusinessQuestion => "business_question",
            MessageIntent::General => "general",
        }
    }
}
