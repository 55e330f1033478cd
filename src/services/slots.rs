use std::collections::HashSet;
use std::sync::Arc;

use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};

use crate::clock::Clock;
use crate::db::Storage;
use crate::models::{Appointment, AppointmentStatus, AvailableSlot, Service, Staff};

/// Days covered by a lookup, starting today.
pub const WINDOW_DAYS: i64 = 7;
/// Spacing between candidate start times.
pub const SLOT_STEP_MINUTES: i64 = 30;

const FALLBACK_DAYS: i64 = 3;
const FALLBACK_HOURS: std::ops::Range<u32> = 9..17;

/// Computes bookable slots from staff schedules, service durations and
/// existing appointments. Nothing is cached between lookups.
pub struct SlotAvailabilityEngine {
    storage: Arc<dyn Storage>,
    clock: Arc<dyn Clock>,
    fallback_enabled: bool,
}

impl SlotAvailabilityEngine {
    pub fn new(storage: Arc<dyn Storage>, clock: Arc<dyn Clock>, fallback_enabled: bool) -> Self {
        Self {
            storage,
            clock,
            fallback_enabled,
        }
    }

    /// All open slots over the rolling window, sorted by start time. Storage
    /// failures yield an empty list.
    pub async fn find_available_slots(&self, service_name: Option<&str>) -> Vec<AvailableSlot> {
        self.find_available_slots_excluding(service_name, None).await
    }

    /// Like [`find_available_slots`](Self::find_available_slots), but the
    /// appointment `ignore` does not block anything. Used when moving an
    /// existing appointment.
    pub async fn find_available_slots_excluding(
        &self,
        service_name: Option<&str>,
        ignore: Option<i64>,
    ) -> Vec<AvailableSlot> {
        match self.compute(service_name, ignore).await {
            Ok(slots) => slots,
            Err(e) => {
                tracing::error!(error = %e, service = ?service_name, "slot lookup failed");
                Vec::new()
            }
        }
    }

    /// Open slots starting on `date`.
    pub async fn slots_on(&self, service_name: Option<&str>, date: NaiveDate) -> Vec<AvailableSlot> {
        self.find_available_slots(service_name)
            .await
            .into_iter()
            .filter(|slot| slot.start_time.date() == date)
            .collect()
    }

    async fn compute(
        &self,
        service_name: Option<&str>,
        ignore: Option<i64>,
    ) -> anyhow::Result<Vec<AvailableSlot>> {
        let services = candidate_services(self.storage.get_all_services().await?, service_name);
        let staff = self.storage.get_all_staff().await?;
        let appointments = self.storage.get_all_appointments().await?;
        let now = self.clock.now();
        let today = now.date();

        let mut slots = Vec::new();
        for member in staff.iter().filter(|s| s.is_active) {
            let schedules = self.storage.get_staff_schedules_by_staff_id(member.id).await?;
            let assigned: HashSet<i64> = self
                .storage
                .get_staff_services(member.id)
                .await?
                .into_iter()
                .map(|link| link.service_id)
                .collect();
            let offered: Vec<&Service> = services
                .iter()
                .filter(|s| assigned.contains(&s.id))
                .collect();
            if offered.is_empty() {
                continue;
            }

            let booked: Vec<&Appointment> = appointments
                .iter()
                .filter(|a| {
                    a.staff_id == member.id
                        && a.status != AppointmentStatus::Cancelled
                        && Some(a.id) != ignore
                })
                .collect();

            for offset in 0..WINDOW_DAYS {
                let day = today + Duration::days(offset);
                let weekday = day.format("%A").to_string();

                for schedule in schedules
                    .iter()
                    .filter(|s| !s.is_blocked && s.day_of_week.eq_ignore_ascii_case(&weekday))
                {
                    let (Some(open), Some(close)) =
                        (parse_clock(&schedule.start_time), parse_clock(&schedule.end_time))
                    else {
                        tracing::warn!(
                            staff_id = member.id,
                            start = %schedule.start_time,
                            end = %schedule.end_time,
                            "skipping unparseable schedule row"
                        );
                        continue;
                    };

                    for service in &offered {
                        slots.extend(
                            day_slots(day.and_time(open), day.and_time(close), member, service)
                                .filter(|slot| slot.start_time > now)
                                .filter(|slot| !booked.iter().any(|a| overlaps(slot, a))),
                        );
                    }
                }
            }
        }

        if slots.is_empty() && self.fallback_enabled {
            if let (Some(service), Some(member)) = (services.first(), staff.first()) {
                tracing::warn!(
                    service = %service.name,
                    staff_id = member.id,
                    "no scheduled slots found, offering fallback hours"
                );
                return Ok(fallback_slots(today, member, service));
            }
        }

        slots.sort_by_key(|slot| slot.start_time);
        Ok(slots)
    }
}

/// Case-insensitive substring match on the service name; all active services
/// when no name is given.
pub fn candidate_services(services: Vec<Service>, service_name: Option<&str>) -> Vec<Service> {
    let query = service_name.map(|q| q.trim().to_lowercase()).filter(|q| !q.is_empty());
    services
        .into_iter()
        .filter(|s| s.is_active)
        .filter(|s| match &query {
            Some(q) => s.name.to_lowercase().contains(q.as_str()),
            None => true,
        })
        .collect()
}

fn day_slots<'a>(
    open: NaiveDateTime,
    close: NaiveDateTime,
    member: &'a Staff,
    service: &'a Service,
) -> impl Iterator<Item = AvailableSlot> + 'a {
    let length = Duration::minutes(service.duration);
    std::iter::successors(Some(open), |start| Some(*start + Duration::minutes(SLOT_STEP_MINUTES)))
        .take_while(move |start| *start + length <= close)
        .map(move |start| make_slot(start, member, service))
}

fn fallback_slots(today: NaiveDate, member: &Staff, service: &Service) -> Vec<AvailableSlot> {
    (1..=FALLBACK_DAYS)
        .flat_map(|offset| {
            let day = today + Duration::days(offset);
            FALLBACK_HOURS.filter_map(move |hour| day.and_hms_opt(hour, 0, 0))
        })
        .map(|start| make_slot(start, member, service))
        .collect()
}

fn make_slot(start: NaiveDateTime, member: &Staff, service: &Service) -> AvailableSlot {
    AvailableSlot {
        start_time: start,
        end_time: start + Duration::minutes(service.duration),
        staff_id: member.id,
        staff_name: staff_name(member),
        service_id: service.id,
        service_name: service.name.clone(),
        service_duration: service.duration,
        service_price: service.price,
    }
}

fn staff_name(member: &Staff) -> String {
    if member.title.trim().is_empty() {
        "Staff".to_string()
    } else {
        member.title.clone()
    }
}

/// Inclusive on both ends: a slot touching an appointment boundary counts as
/// a collision.
pub fn overlaps(slot: &AvailableSlot, appointment: &Appointment) -> bool {
    let (a_start, a_end) = (appointment.start_time, appointment.end_time);
    (slot.start_time >= a_start && slot.start_time <= a_end)
        || (slot.end_time >= a_start && slot.end_time <= a_end)
        || (a_start >= slot.start_time && a_start <= slot.end_time)
}

/// `HH:MM` or `HH:MM:SS`.
fn parse_clock(value: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(value, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(value, "%H:%M:%S"))
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::db::SqliteStorage;
    use crate::models::{NewAppointment, NewService, NewStaffSchedule, NewUser};

    fn dt(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M").unwrap()
    }

    // 2025-06-17 is a Tuesday
    const NOW: &str = "2025-06-17 08:00";

    struct Fixture {
        storage: Arc<SqliteStorage>,
        engine: SlotAvailabilityEngine,
        staff_id: i64,
        service_id: i64,
    }

    fn fixture(fallback: bool) -> Fixture {
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
        storage
            .add_staff_schedule(&NewStaffSchedule {
                staff_id: staff.id,
                day_of_week: "Wednesday".to_string(),
                start_time: "10:00".to_string(),
                end_time: "13:00".to_string(),
                is_blocked: false,
            })
            .unwrap();

        let clock = Arc::new(FixedClock::new(dt(NOW)));
        let engine = SlotAvailabilityEngine::new(storage.clone(), clock, fallback);
        Fixture {
            storage,
            engine,
            staff_id: staff.id,
            service_id: service.id,
        }
    }

    async fn book(fx: &Fixture, start: &str, end: &str, status: AppointmentStatus) {
        let user = fx
            .storage
            .create_user(NewUser {
                username: format!("client_{start}"),
                first_name: None,
                last_name: None,
                phone: None,
                role: "client".to_string(),
            })
            .await
            .unwrap();
        fx.storage
            .create_appointment(NewAppointment {
                client_id: user.id,
                service_id: fx.service_id,
                staff_id: fx.staff_id,
                start_time: dt(start),
                end_time: dt(end),
                status,
                total_amount: None,
                notes: None,
                booking_method: "sms".to_string(),
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_slots_follow_schedule_and_duration() {
        let fx = fixture(true);
        let slots = fx.engine.find_available_slots(Some("signature")).await;

        let starts: Vec<_> = slots.iter().map(|s| s.start_time).collect();
        assert_eq!(
            starts,
            vec![
                dt("2025-06-18 10:00"),
                dt("2025-06-18 10:30"),
                dt("2025-06-18 11:00"),
                dt("2025-06-18 11:30"),
                dt("2025-06-18 12:00"),
            ]
        );
        for slot in &slots {
            assert_eq!(slot.end_time - slot.start_time, Duration::minutes(60));
            assert_eq!(slot.staff_name, "Head Spa Specialist");
        }
    }

    #[tokio::test]
    async fn test_booked_slots_are_excluded() {
        let fx = fixture(false);
        book(&fx, "2025-06-18 10:00", "2025-06-18 10:30", AppointmentStatus::Confirmed).await;

        let slots = fx.engine.slots_on(None, dt("2025-06-18 00:00").date()).await;
        let appointments = fx.storage.get_all_appointments().await.unwrap();
        for slot in &slots {
            assert!(!appointments.iter().any(|a| overlaps(slot, a)));
        }
        // 10:30 starts on the appointment's end and is excluded too
        let starts: Vec<_> = slots.iter().map(|s| s.start_time).collect();
        assert_eq!(
            starts,
            vec![dt("2025-06-18 11:00"), dt("2025-06-18 11:30"), dt("2025-06-18 12:00")]
        );
    }

    #[tokio::test]
    async fn test_cancelled_appointments_do_not_block() {
        let fx = fixture(true);
        book(&fx, "2025-06-18 10:00", "2025-06-18 11:00", AppointmentStatus::Cancelled).await;

        let slots = fx.engine.find_available_slots(None).await;
        assert_eq!(slots.first().map(|s| s.start_time), Some(dt("2025-06-18 10:00")));
    }

    #[tokio::test]
    async fn test_ignored_appointment_does_not_block() {
        let fx = fixture(false);
        book(&fx, "2025-06-18 11:00", "2025-06-18 12:00", AppointmentStatus::Confirmed).await;
        let id = fx.storage.get_all_appointments().await.unwrap()[0].id;

        let blocked = fx.engine.find_available_slots(None).await;
        assert!(blocked.is_empty());

        let slots = fx.engine.find_available_slots_excluding(None, Some(id)).await;
        assert_eq!(slots.len(), 5);
        assert_eq!(slots[2].start_time, dt("2025-06-18 11:00"));
    }

    #[tokio::test]
    async fn test_unknown_service_yields_nothing() {
        let fx = fixture(true);
        assert!(fx.engine.find_available_slots(Some("massage")).await.is_empty());
    }

    #[tokio::test]
    async fn test_fallback_when_schedule_is_full() {
        let fx = fixture(true);
        book(&fx, "2025-06-18 09:00", "2025-06-18 14:00", AppointmentStatus::Confirmed).await;

        let slots = fx.engine.find_available_slots(None).await;
        assert_eq!(slots.len(), 24);
        assert_eq!(slots[0].start_time, dt("2025-06-18 09:00"));
        assert_eq!(slots[7].start_time, dt("2025-06-18 16:00"));
        assert_eq!(slots[23].start_time, dt("2025-06-20 16:00"));
        assert!(slots.iter().all(|s| s.service_id == fx.service_id && s.staff_id == fx.staff_id));
    }

    #[tokio::test]
    async fn test_fallback_can_be_disabled() {
        let fx = fixture(false);
        book(&fx, "2025-06-18 09:00", "2025-06-18 14:00", AppointmentStatus::Confirmed).await;
        assert!(fx.engine.find_available_slots(None).await.is_empty());
    }

    #[test]
    fn test_overlap_is_inclusive() {
        let slot = AvailableSlot {
            start_time: dt("2025-06-18 10:00"),
            end_time: dt("2025-06-18 11:00"),
            staff_id: 1,
            staff_name: "Staff".to_string(),
            service_id: 1,
            service_name: "Signature Head Spa".to_string(),
            service_duration: 60,
            service_price: 99.0,
        };
        let appt = |start: &str, end: &str| Appointment {
            id: 1,
            client_id: 1,
            service_id: 1,
            staff_id: 1,
            start_time: dt(start),
            end_time: dt(end),
            status: AppointmentStatus::Confirmed,
            payment_status: crate::models::PaymentStatus::Unpaid,
            total_amount: None,
            notes: None,
            booking_method: "sms".to_string(),
            created_at: dt(NOW),
        };

        assert!(overlaps(&slot, &appt("2025-06-18 11:00", "2025-06-18 12:00")));
        assert!(overlaps(&slot, &appt("2025-06-18 10:15", "2025-06-18 10:45")));
        assert!(!overlaps(&slot, &appt("2025-06-18 11:30", "2025-06-18 12:00")));
    }
}
