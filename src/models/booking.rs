use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Fields extracted from one message, optionally merged with stored state.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct BookingRequest {
    pub service_name: Option<String>,
    pub date: Option<String>,
    pub time: Option<String>,
    pub client_phone: String,
    pub client_name: Option<String>,
    pub is_time_rejection: bool,
}

impl BookingRequest {
    pub fn is_empty(&self) -> bool {
        self.service_name.is_none() && self.date.is_none() && self.time.is_none()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AvailableSlot {
    pub start_time: NaiveDateTime,
    pub end_time: NaiveDateTime,
    pub staff_id: i64,
    pub staff_name: String,
    pub service_id: i64,
    pub service_name: String,
    pub service_duration: i64,
    pub service_price: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct AvailabilityCheck {
    pub available: bool,
    pub slot: Option<AvailableSlot>,
    pub message: String,
    pub suggested_times: Vec<String>,
}
