use std::sync::Arc;

use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime, Weekday};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::clock::Clock;
use crate::db::Storage;
use crate::models::sms::{phone_digits, same_number};
use crate::models::{
    Appointment, AppointmentPatch, AppointmentStatus, AvailabilityCheck, AvailableSlot,
    NewAppointment, NewUser, User,
};
use crate::services::slots::SlotAvailabilityEngine;

/// A slot starting less than this many minutes from the requested instant
/// counts as the requested time.
pub const MATCH_TOLERANCE_MINUTES: i64 = 30;
const MAX_SUGGESTIONS: usize = 5;
const SUGGESTION_POOL: usize = 10;

pub const SMS_CLIENT_NAME: &str = "SMS Client";

/// Failures surfaced to the texter. `Display` is the SMS reply.
#[derive(Debug, thiserror::Error)]
pub enum BookingError {
    #[error("I couldn't find an appointment with that ID. Please double-check the number and try again.")]
    NotFound,

    #[error("That appointment doesn't match your phone number. Please text us from the number you booked with.")]
    PhoneMismatch,

    #[error("That appointment has already been cancelled.")]
    AlreadyCancelled,

    #[error("I couldn't understand that date and time. Could you try something like \"Friday at 2pm\"?")]
    UnreadableDateTime,

    #[error("{0}")]
    Unavailable(String),

    #[error("I'm sorry, I wasn't able to complete that right now. Please call us at {phone} and we'll take care of it!")]
    Storage {
        phone: String,
        #[source]
        source: anyhow::Error,
    },
}

const MONTHS: &[&str] = &[
    "january", "february", "march", "april", "may", "june", "july", "august", "september",
    "october", "november", "december",
];

static ISO_DATE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d{4})-(\d{1,2})-(\d{1,2})").expect("valid iso date pattern"));
static NUMERIC_DATE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(\d{1,2})[/-](\d{1,2})\b").expect("valid numeric date pattern"));
static MONTH_DAY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"([a-z]+)\s+(\d{1,2})(?:st|nd|rd|th)?\b").expect("valid month-day pattern")
});
static DAY_MONTH: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(\d{1,2})(?:st|nd|rd|th)?\s+([a-z]+)").expect("valid day-month pattern")
});
static CLOCK_12H: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(\d{1,2})(?::(\d{2}))?\s*(am|pm)").expect("valid 12h time pattern")
});
static CLOCK_24H: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d{1,2})(?::(\d{2}))?$").expect("valid 24h time pattern"));

/// Resolves a customer-phrased date against `today`. Dates without a year
/// roll over to next year once passed.
pub fn resolve_date(text: &str, today: NaiveDate) -> Option<NaiveDate> {
    let lower = text.trim().to_lowercase();

    match lower.as_str() {
        "today" => return Some(today),
        "tomorrow" => return today.succ_opt(),
        "next week" => return Some(today + Duration::days(7)),
        _ => {}
    }

    if let Some(caps) = ISO_DATE.captures(&lower) {
        return NaiveDate::from_ymd_opt(
            caps[1].parse().ok()?,
            caps[2].parse().ok()?,
            caps[3].parse().ok()?,
        );
    }
    if let Some(caps) = NUMERIC_DATE.captures(&lower) {
        return upcoming(today, caps[1].parse().ok()?, caps[2].parse().ok()?);
    }
    for caps in MONTH_DAY.captures_iter(&lower) {
        if let Some(month) = month_number(&caps[1]) {
            return upcoming(today, month, caps[2].parse().ok()?);
        }
    }
    for caps in DAY_MONTH.captures_iter(&lower) {
        if let Some(month) = month_number(&caps[2]) {
            return upcoming(today, month, caps[1].parse().ok()?);
        }
    }

    lower
        .split_whitespace()
        .find_map(|word| {
            word.trim_matches(|c: char| !c.is_alphabetic())
                .parse::<Weekday>()
                .ok()
        })
        .map(|weekday| next_weekday(today, weekday))
}

fn month_number(name: &str) -> Option<u32> {
    MONTHS
        .iter()
        .position(|m| *m == name || (name.len() >= 3 && m.starts_with(name)))
        .map(|idx| idx as u32 + 1)
}

fn upcoming(today: NaiveDate, month: u32, day: u32) -> Option<NaiveDate> {
    let this_year = NaiveDate::from_ymd_opt(today.year(), month, day)?;
    if this_year >= today {
        Some(this_year)
    } else {
        NaiveDate::from_ymd_opt(today.year() + 1, month, day)
    }
}

/// Next occurrence of `weekday`, today included.
fn next_weekday(today: NaiveDate, weekday: Weekday) -> NaiveDate {
    let ahead = (7 + weekday.num_days_from_monday() as i64
        - today.weekday().num_days_from_monday() as i64)
        % 7;
    today + Duration::days(ahead)
}

pub fn resolve_time(text: &str) -> Option<NaiveTime> {
    let lower = text.trim().to_lowercase();

    let day_part = match lower.as_str() {
        "morning" => Some((10, 0)),
        "afternoon" => Some((14, 0)),
        "evening" => Some((18, 0)),
        "night" => Some((19, 0)),
        _ => None,
    };
    if let Some((h, m)) = day_part {
        return NaiveTime::from_hms_opt(h, m, 0);
    }

    if let Some(caps) = CLOCK_12H.captures(&lower) {
        let hour: u32 = caps[1].parse().ok()?;
        let minute: u32 = caps.get(2).map_or(Ok(0), |m| m.as_str().parse()).ok()?;
        if !(1..=12).contains(&hour) {
            return None;
        }
        let hour = match (&caps[3], hour) {
            ("am", 12) => 0,
            ("am", h) => h,
            ("pm", 12) => 12,
            (_, h) => h + 12,
        };
        return NaiveTime::from_hms_opt(hour, minute, 0);
    }

    let caps = CLOCK_24H.captures(&lower)?;
    let hour: u32 = caps[1].parse().ok()?;
    let minute: u32 = caps.get(2).map_or(Ok(0), |m| m.as_str().parse()).ok()?;
    NaiveTime::from_hms_opt(hour, minute, 0)
}

/// `2:00 PM`
pub fn format_time(at: NaiveDateTime) -> String {
    at.format("%-I:%M %p").to_string()
}

/// `Wednesday, June 18`
pub fn format_day(date: NaiveDate) -> String {
    date.format("%A, %B %-d").to_string()
}

/// `Wednesday, June 18 at 2:00 PM`
pub fn format_slot(slot: &AvailableSlot) -> String {
    format!("{} at {}", format_day(slot.start_time.date()), format_time(slot.start_time))
}

/// Exact comparison first on the canonical `h:mm am` text, then on the parsed
/// hour and minute.
pub fn slot_matches_time(slot: &AvailableSlot, requested: &str) -> bool {
    let canonical = format_time(slot.start_time).to_lowercase();
    if canonical == requested.trim().to_lowercase() {
        return true;
    }
    resolve_time(requested)
        .map(|t| t == slot.start_time.time())
        .unwrap_or(false)
}

/// Up to five distinct human-readable times from the head of `slots`.
pub fn suggested_times(slots: &[AvailableSlot]) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for slot in slots.iter().take(SUGGESTION_POOL) {
        let label = format_slot(slot);
        if !out.contains(&label) {
            out.push(label);
        }
        if out.len() == MAX_SUGGESTIONS {
            break;
        }
    }
    out
}

pub fn confirmation_message(slot: &AvailableSlot) -> String {
    format!(
        "Perfect! I've booked your {} appointment for {} at {}. You'll receive a confirmation shortly! 💆‍♀️✨",
        slot.service_name,
        format_day(slot.start_time.date()),
        format_time(slot.start_time)
    )
}

/// Availability checks and appointment writes for the SMS flow.
pub struct BookingService {
    storage: Arc<dyn Storage>,
    engine: SlotAvailabilityEngine,
    clock: Arc<dyn Clock>,
    business_phone: String,
}

impl BookingService {
    pub fn new(
        storage: Arc<dyn Storage>,
        clock: Arc<dyn Clock>,
        fallback_slots: bool,
        business_phone: &str,
    ) -> Self {
        Self {
            engine: SlotAvailabilityEngine::new(storage.clone(), clock.clone(), fallback_slots),
            storage,
            clock,
            business_phone: business_phone.to_string(),
        }
    }

    pub fn engine(&self) -> &SlotAvailabilityEngine {
        &self.engine
    }

    pub fn now(&self) -> NaiveDateTime {
        self.clock.now()
    }

    pub fn today(&self) -> NaiveDate {
        self.now().date()
    }

    pub fn resolve_date(&self, text: &str) -> Option<NaiveDate> {
        resolve_date(text, self.today())
    }

    pub async fn check_availability(&self, service: &str, date: &str, time: &str) -> AvailabilityCheck {
        self.check_availability_for(service, date, time, None).await
    }

    async fn check_availability_for(
        &self,
        service: &str,
        date: &str,
        time: &str,
        moving: Option<i64>,
    ) -> AvailabilityCheck {
        let (Some(day), Some(at)) = (self.resolve_date(date), resolve_time(time)) else {
            return AvailabilityCheck {
                available: false,
                slot: None,
                message: BookingError::UnreadableDateTime.to_string(),
                suggested_times: Vec::new(),
            };
        };
        let target = day.and_time(at);
        let slots = self
            .engine
            .find_available_slots_excluding(Some(service), moving)
            .await;

        let nearest = slots
            .iter()
            .filter(|s| (s.start_time - target).num_minutes().abs() < MATCH_TOLERANCE_MINUTES)
            .min_by_key(|s| (s.start_time - target).num_minutes().abs());

        if let Some(slot) = nearest {
            return AvailabilityCheck {
                available: true,
                slot: Some(slot.clone()),
                message: format!(
                    "Great news! {} is available on {}.",
                    slot.service_name,
                    format_slot(slot)
                ),
                suggested_times: Vec::new(),
            };
        }

        let same_day: Vec<AvailableSlot> = slots
            .iter()
            .filter(|s| s.start_time.date() == day)
            .cloned()
            .collect();
        let pool = if same_day.is_empty() { &slots } else { &same_day };
        let suggestions = suggested_times(pool);

        let message = if suggestions.is_empty() {
            format!(
                "I'm sorry, I couldn't find any openings for {service} in the next week. Please call us at {} and we'll find a time for you! 📞",
                self.business_phone
            )
        } else {
            format!(
                "I'm sorry, but {} on {} is not available for {service}. Here are some available times:\n{}",
                format_time(target),
                format_day(day),
                suggestions
                    .iter()
                    .map(|s| format!("• {s}"))
                    .collect::<Vec<_>>()
                    .join("\n")
            )
        };

        AvailabilityCheck {
            available: false,
            slot: None,
            message,
            suggested_times: suggestions,
        }
    }

    pub async fn find_or_create_client(&self, phone: &str, name: Option<&str>) -> anyhow::Result<User> {
        if let Some(user) = self.storage.get_user_by_phone(phone).await? {
            return Ok(user);
        }
        let user = self
            .storage
            .create_user(NewUser {
                username: format!("sms_{}", uuid::Uuid::new_v4().simple()),
                first_name: Some(name.unwrap_or(SMS_CLIENT_NAME).to_string()),
                last_name: None,
                phone: Some(phone.to_string()),
                role: "client".to_string(),
            })
            .await?;
        tracing::info!(phone = %phone, user_id = user.id, "created SMS client");
        Ok(user)
    }

    pub async fn book_slot(
        &self,
        client_phone: &str,
        client_name: Option<&str>,
        slot: &AvailableSlot,
    ) -> Result<Appointment, BookingError> {
        let client = self
            .find_or_create_client(client_phone, client_name)
            .await
            .map_err(|source| self.storage_error(source))?;

        let appointment = self
            .storage
            .create_appointment(NewAppointment {
                client_id: client.id,
                service_id: slot.service_id,
                staff_id: slot.staff_id,
                start_time: slot.start_time,
                end_time: slot.end_time,
                status: AppointmentStatus::Confirmed,
                total_amount: Some(slot.service_price),
                notes: Some(format!("Booked via SMS - {client_phone}")),
                booking_method: "sms".to_string(),
            })
            .await
            .map_err(|source| self.storage_error(source))?;

        tracing::info!(
            appointment_id = appointment.id,
            phone = %client_phone,
            service = %slot.service_name,
            start = %slot.start_time,
            "appointment booked via SMS"
        );
        Ok(appointment)
    }

    /// Loads an appointment and checks it belongs to `caller_phone`.
    async fn owned_appointment(&self, id: i64, caller_phone: &str) -> Result<Appointment, BookingError> {
        let appointment = self
            .storage
            .get_appointment_by_id(id)
            .await
            .map_err(|source| self.storage_error(source))?
            .ok_or(BookingError::NotFound)?;

        let client = self
            .storage
            .get_user(appointment.client_id)
            .await
            .map_err(|source| self.storage_error(source))?;
        let client_phone = client.and_then(|c| c.phone).unwrap_or_default();

        if !same_number(&phone_digits(&client_phone), &phone_digits(caller_phone)) {
            tracing::warn!(appointment_id = id, caller = %caller_phone, "appointment phone mismatch");
            return Err(BookingError::PhoneMismatch);
        }
        Ok(appointment)
    }

    pub async fn cancel_appointment(&self, id: i64, caller_phone: &str) -> Result<Appointment, BookingError> {
        let appointment = self.owned_appointment(id, caller_phone).await?;
        if appointment.status == AppointmentStatus::Cancelled {
            return Err(BookingError::AlreadyCancelled);
        }

        self.storage
            .cancel_appointment(id)
            .await
            .map_err(|source| self.storage_error(source))?;

        tracing::info!(appointment_id = id, phone = %caller_phone, "appointment cancelled via SMS");
        Ok(Appointment {
            status: AppointmentStatus::Cancelled,
            ..appointment
        })
    }

    pub async fn reschedule_appointment(
        &self,
        id: i64,
        caller_phone: &str,
        new_date: &str,
        new_time: &str,
    ) -> Result<Appointment, BookingError> {
        let appointment = self.owned_appointment(id, caller_phone).await?;

        let services = self
            .storage
            .get_all_services()
            .await
            .map_err(|source| self.storage_error(source))?;
        let service = services
            .into_iter()
            .find(|s| s.id == appointment.service_id)
            .ok_or(BookingError::NotFound)?;

        let check = self
            .check_availability_for(&service.name, new_date, new_time, Some(appointment.id))
            .await;
        let slot = match check.slot {
            Some(slot) if check.available => slot,
            _ => return Err(BookingError::Unavailable(check.message)),
        };

        let updated = self
            .storage
            .update_appointment(
                id,
                AppointmentPatch {
                    staff_id: Some(slot.staff_id),
                    start_time: Some(slot.start_time),
                    end_time: Some(slot.start_time + Duration::minutes(service.duration)),
                    ..Default::default()
                },
            )
            .await
            .map_err(|source| self.storage_error(source))?
            .ok_or(BookingError::NotFound)?;

        tracing::info!(appointment_id = id, start = %updated.start_time, "appointment rescheduled via SMS");
        Ok(updated)
    }

    fn storage_error(&self, source: anyhow::Error) -> BookingError {
        BookingError::Storage {
            phone: self.business_phone.clone(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::db::SqliteStorage;
    use crate::models::{NewService, NewStaffSchedule};

    fn dt(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M").unwrap()
    }

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    // Tuesday
    const TODAY: &str = "2025-06-17";
    const PHONE: &str = "+15550001111";

    fn service_fixture() -> (BookingService, Arc<SqliteStorage>) {
        let storage = Arc::new(SqliteStorage::open(":memory:").unwrap());
        let service = storage
            .create_service(&NewService {
                name: "Signature Head Spa".to_string(),
                description: None,
                duration: 60,
                price: 99.0,
            })
            .unwrap();
        let staff = storage.create_staff("Head Spa Specialist").unwrap();
        storage.assign_service(staff.id, service.id).unwrap();
        for day in ["Wednesday", "Thursday"] {
            storage
                .add_staff_schedule(&NewStaffSchedule {
                    staff_id: staff.id,
                    day_of_week: day.to_string(),
                    start_time: "10:00".to_string(),
                    end_time: "20:00".to_string(),
                    is_blocked: false,
                })
                .unwrap();
        }
        let clock = Arc::new(FixedClock::new(dt("2025-06-17 09:00")));
        (
            BookingService::new(storage.clone(), clock, false, "918-932-5396"),
            storage,
        )
    }

    #[test]
    fn test_resolve_relative_dates() {
        let today = d(TODAY);
        assert_eq!(resolve_date("today", today), Some(today));
        assert_eq!(resolve_date("Tomorrow", today), Some(d("2025-06-18")));
        assert_eq!(resolve_date("next week", today), Some(d("2025-06-24")));
    }

    #[test]
    fn test_resolve_weekdays_include_today() {
        let today = d(TODAY);
        assert_eq!(resolve_date("tuesday", today), Some(today));
        assert_eq!(resolve_date("friday", today), Some(d("2025-06-20")));
        assert_eq!(resolve_date("monday", today), Some(d("2025-06-23")));
    }

    #[test]
    fn test_resolve_calendar_dates() {
        let today = d(TODAY);
        assert_eq!(resolve_date("june 20th", today), Some(d("2025-06-20")));
        assert_eq!(resolve_date("friday june 20", today), Some(d("2025-06-20")));
        assert_eq!(resolve_date("20 june", today), Some(d("2025-06-20")));
        assert_eq!(resolve_date("6/20", today), Some(d("2025-06-20")));
        assert_eq!(resolve_date("1-5", today), Some(d("2026-01-05")));
        assert_eq!(resolve_date("2025-07-01", today), Some(d("2025-07-01")));
        assert_eq!(resolve_date("someday", today), None);
    }

    #[test]
    fn test_resolve_time() {
        let t = |h, m| NaiveTime::from_hms_opt(h, m, 0);
        assert_eq!(resolve_time("2:00 pm"), t(14, 0));
        assert_eq!(resolve_time("10:30 AM"), t(10, 30));
        assert_eq!(resolve_time("12 pm"), t(12, 0));
        assert_eq!(resolve_time("12:15 am"), t(0, 15));
        assert_eq!(resolve_time("14:00"), t(14, 0));
        assert_eq!(resolve_time("afternoon"), t(14, 0));
        assert_eq!(resolve_time("13 pm"), None);
    }

    #[test]
    fn test_formatting() {
        let slot = AvailableSlot {
            start_time: dt("2025-06-18 14:00"),
            end_time: dt("2025-06-18 15:00"),
            staff_id: 1,
            staff_name: "Staff".to_string(),
            service_id: 1,
            service_name: "Signature Head Spa".to_string(),
            service_duration: 60,
            service_price: 99.0,
        };
        assert_eq!(format_slot(&slot), "Wednesday, June 18 at 2:00 PM");
        assert!(slot_matches_time(&slot, "2:00 pm"));
        assert!(slot_matches_time(&slot, "2pm"));
        assert!(!slot_matches_time(&slot, "2:30 pm"));
        assert_eq!(
            confirmation_message(&slot),
            "Perfect! I've booked your Signature Head Spa appointment for Wednesday, June 18 at 2:00 PM. You'll receive a confirmation shortly! 💆‍♀️✨"
        );
    }

    #[tokio::test]
    async fn test_check_availability_hit_within_tolerance() {
        let (svc, _) = service_fixture();
        let check = svc.check_availability("signature", "wednesday", "2:10 pm").await;
        assert!(check.available);
        assert_eq!(check.slot.unwrap().start_time, dt("2025-06-18 14:00"));
    }

    #[tokio::test]
    async fn test_slot_half_an_hour_away_is_not_a_match() {
        let (svc, _) = service_fixture();
        let mut slot = svc
            .check_availability("signature", "wednesday", "12:00 pm")
            .await
            .slot
            .unwrap();
        slot.start_time = dt("2025-06-18 12:10");
        slot.end_time = dt("2025-06-18 12:20");
        svc.book_slot(PHONE, None, &slot).await.unwrap();

        // 11:30 and 12:00 collide; 12:30 is free but exactly 30 minutes off
        let check = svc.check_availability("signature", "wednesday", "12:00 pm").await;
        assert!(!check.available);
        assert!(check.slot.is_none());
        assert!(!check.suggested_times.is_empty());
        assert!(check
            .suggested_times
            .contains(&"Wednesday, June 18 at 12:30 PM".to_string()));
    }

    #[tokio::test]
    async fn test_check_availability_miss_suggests_same_day() {
        let (svc, _) = service_fixture();
        let check = svc.check_availability("signature", "wednesday", "8:00 am").await;
        assert!(!check.available);
        assert_eq!(check.suggested_times.len(), 5);
        assert_eq!(check.suggested_times[0], "Wednesday, June 18 at 10:00 AM");
        assert!(check.message.contains("Here are some available times"));
    }

    #[tokio::test]
    async fn test_book_then_cancel_checks_phone() {
        let (svc, storage) = service_fixture();
        let check = svc.check_availability("signature", "tomorrow", "2:00 pm").await;
        let slot = check.slot.unwrap();

        let appt = svc.book_slot(PHONE, None, &slot).await.unwrap();
        assert_eq!(appt.status, AppointmentStatus::Confirmed);
        assert_eq!(appt.total_amount, Some(99.0));
        assert_eq!(appt.notes.as_deref(), Some("Booked via SMS - +15550001111"));
        assert_eq!(appt.booking_method, "sms");

        let client = storage.get_user_by_phone(PHONE).await.unwrap().unwrap();
        assert_eq!(client.first_name.as_deref(), Some(SMS_CLIENT_NAME));

        let err = svc.cancel_appointment(appt.id, "+15559999999").await.unwrap_err();
        assert!(matches!(err, BookingError::PhoneMismatch));

        svc.cancel_appointment(appt.id, "5550001111").await.unwrap();
        let err = svc.cancel_appointment(appt.id, PHONE).await.unwrap_err();
        assert!(matches!(err, BookingError::AlreadyCancelled));

        let err = svc.cancel_appointment(4242, PHONE).await.unwrap_err();
        assert!(matches!(err, BookingError::NotFound));
    }

    #[tokio::test]
    async fn test_reschedule_moves_appointment() {
        let (svc, _) = service_fixture();
        let slot = svc
            .check_availability("signature", "wednesday", "11:00 am")
            .await
            .slot
            .unwrap();
        let appt = svc.book_slot(PHONE, None, &slot).await.unwrap();

        let moved = svc
            .reschedule_appointment(appt.id, PHONE, "thursday", "3:00 pm")
            .await
            .unwrap();
        assert_eq!(moved.start_time, dt("2025-06-19 15:00"));
        assert_eq!(moved.end_time, dt("2025-06-19 16:00"));
    }

    #[tokio::test]
    async fn test_reschedule_within_own_slot() {
        let (svc, _) = service_fixture();
        let slot = svc
            .check_availability("signature", "wednesday", "2:00 pm")
            .await
            .slot
            .unwrap();
        let appt = svc.book_slot(PHONE, None, &slot).await.unwrap();

        let moved = svc
            .reschedule_appointment(appt.id, PHONE, "wednesday", "2:30 pm")
            .await
            .unwrap();
        assert_eq!(moved.id, appt.id);
        assert_eq!(moved.start_time, dt("2025-06-18 14:30"));

        // others are still blocked by it
        let check = svc.check_availability("signature", "wednesday", "2:30 pm").await;
        assert!(!check.available);
    }
}
