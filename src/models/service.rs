use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Service {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    /// Minutes.
    pub duration: i64,
    pub price: f64,
    pub is_active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewService {
    pub name: String,
    pub description: Option<String>,
    pub duration: i64,
    pub price: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Staff {
    pub id: i64,
    pub user_id: Option<i64>,
    pub title: String,
    pub bio: Option<String>,
    pub is_active: bool,
}

/// One weekly working block for a staff member. Times are `HH:MM`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StaffSchedule {
    pub id: i64,
    pub staff_id: i64,
    pub day_of_week: String,
    pub start_time: String,
    pub end_time: String,
    pub is_blocked: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewStaffSchedule {
    pub staff_id: i64,
    pub day_of_week: String,
    pub start_time: String,
    pub end_time: String,
    #[serde(default)]
    pub is_blocked: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StaffService {
    pub id: i64,
    pub staff_id: i64,
    pub service_id: i64,
}
