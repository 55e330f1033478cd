pub mod migrations;
pub mod queries;

use std::sync::{Arc, Mutex};

use anyhow::Context;
use async_trait::async_trait;
use rusqlite::Connection;

use crate::models::{
    Appointment, AppointmentPatch, NewAppointment, NewService, NewStaffSchedule, NewUser, Service,
    Staff, StaffSchedule, StaffService, User,
};

pub fn init_db(path: &str) -> anyhow::Result<Connection> {
    let conn = Connection::open(path).context("failed to open database")?;

    conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")
        .context("failed to set database pragmas")?;

    migrations::run_migrations(&conn)?;

    Ok(conn)
}

/// Persistence consumed by the booking flow. Plain records in, plain records
/// out; no transactions span calls.
#[async_trait]
pub trait Storage: Send + Sync {
    async fn get_all_services(&self) -> anyhow::Result<Vec<Service>>;
    async fn get_all_staff(&self) -> anyhow::Result<Vec<Staff>>;
    async fn get_staff_schedules_by_staff_id(&self, staff_id: i64) -> anyhow::Result<Vec<StaffSchedule>>;
    async fn get_staff_services(&self, staff_id: i64) -> anyhow::Result<Vec<StaffService>>;
    async fn get_all_appointments(&self) -> anyhow::Result<Vec<Appointment>>;
    async fn create_appointment(&self, appointment: NewAppointment) -> anyhow::Result<Appointment>;
    async fn get_appointment_by_id(&self, id: i64) -> anyhow::Result<Option<Appointment>>;
    async fn cancel_appointment(&self, id: i64) -> anyhow::Result<bool>;
    async fn update_appointment(
        &self,
        id: i64,
        patch: AppointmentPatch,
    ) -> anyhow::Result<Option<Appointment>>;
    async fn get_user(&self, id: i64) -> anyhow::Result<Option<User>>;
    async fn get_user_by_phone(&self, phone: &str) -> anyhow::Result<Option<User>>;
    async fn create_user(&self, user: NewUser) -> anyhow::Result<User>;
    async fn set_sms_opt_out(&self, phone: &str, opted_out: bool) -> anyhow::Result<()>;
    async fn is_sms_opted_out(&self, phone: &str) -> anyhow::Result<bool>;
}

pub struct SqliteStorage {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStorage {
    pub fn new(conn: Connection) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
        }
    }

    pub fn open(path: &str) -> anyhow::Result<Self> {
        Ok(Self::new(init_db(path)?))
    }

    fn with_conn<T>(&self, f: impl FnOnce(&Connection) -> anyhow::Result<T>) -> anyhow::Result<T> {
        let conn = self
            .conn
            .lock()
            .map_err(|_| anyhow::anyhow!("database mutex poisoned"))?;
        f(&conn)
    }

    pub fn create_service(&self, service: &NewService) -> anyhow::Result<Service> {
        self.with_conn(|conn| queries::create_service(conn, service))
    }

    pub fn create_staff(&self, title: &str) -> anyhow::Result<Staff> {
        self.with_conn(|conn| queries::create_staff(conn, title, None))
    }

    pub fn add_staff_schedule(&self, schedule: &NewStaffSchedule) -> anyhow::Result<StaffSchedule> {
        self.with_conn(|conn| queries::create_staff_schedule(conn, schedule))
    }

    pub fn assign_service(&self, staff_id: i64, service_id: i64) -> anyhow::Result<StaffService> {
        self.with_conn(|conn| queries::assign_service(conn, staff_id, service_id))
    }

    /// Seeds the head-spa menu and one stylist working Wednesday to Saturday,
    /// 10 AM to 8 PM. Does nothing when services already exist.
    pub fn seed_demo_data(&self) -> anyhow::Result<()> {
        self.with_conn(|conn| {
            if !queries::get_all_services(conn)?.is_empty() {
                return Ok(());
            }

            let menu = [
                ("Signature Head Spa", 60, 99.0),
                ("Deluxe Head Spa", 90, 160.0),
                ("Platinum Head Spa", 120, 220.0),
            ];
            let staff = queries::create_staff(conn, "Head Spa Specialist", None)?;
            for (name, duration, price) in menu {
                let service = queries::create_service(
                    conn,
                    &NewService {
                        name: name.to_string(),
                        description: None,
                        duration,
                        price,
                    },
                )?;
                queries::assign_service(conn, staff.id, service.id)?;
            }
            for day in ["Wednesday", "Thursday", "Friday", "Saturday"] {
                queries::create_staff_schedule(
                    conn,
                    &NewStaffSchedule {
                        staff_id: staff.id,
                        day_of_week: day.to_string(),
                        start_time: "10:00".to_string(),
                        end_time: "20:00".to_string(),
                        is_blocked: false,
                    },
                )?;
            }

            tracing::info!("seeded demo services and schedule");
            Ok(())
        })
    }
}

#[async_trait]
impl Storage for SqliteStorage {
    async fn get_all_services(&self) -> anyhow::Result<Vec<Service>> {
        self.with_conn(queries::get_all_services)
    }

    async fn get_all_staff(&self) -> anyhow::Result<Vec<Staff>> {
        self.with_conn(queries::get_all_staff)
    }

    async fn get_staff_schedules_by_staff_id(&self, staff_id: i64) -> anyhow::Result<Vec<StaffSchedule>> {
        self.with_conn(|conn| queries::get_staff_schedules(conn, staff_id))
    }

    async fn get_staff_services(&self, staff_id: i64) -> anyhow::Result<Vec<StaffService>> {
        self.with_conn(|conn| queries::get_staff_services(conn, staff_id))
    }

    async fn get_all_appointments(&self) -> anyhow::Result<Vec<Appointment>> {
        self.with_conn(queries::get_all_appointments)
    }

    async fn create_appointment(&self, appointment: NewAppointment) -> anyhow::Result<Appointment> {
        self.with_conn(|conn| queries::create_appointment(conn, &appointment))
    }

    async fn get_appointment_by_id(&self, id: i64) -> anyhow::Result<Option<Appointment>> {
        self.with_conn(|conn| queries::get_appointment_by_id(conn, id))
    }

    async fn cancel_appointment(&self, id: i64) -> anyhow::Result<bool> {
        self.with_conn(|conn| queries::cancel_appointment(conn, id))
    }

    async fn update_appointment(
        &self,
        id: i64,
        patch: AppointmentPatch,
    ) -> anyhow::Result<Option<Appointment>> {
        self.with_conn(|conn| queries::update_appointment(conn, id, &patch))
    }

    async fn get_user(&self, id: i64) -> anyhow::Result<Option<User>> {
        self.with_conn(|conn| queries::get_user(conn, id))
    }

    async fn get_user_by_phone(&self, phone: &str) -> anyhow::Result<Option<User>> {
        self.with_conn(|conn| queries::get_user_by_phone(conn, phone))
    }

    async fn create_user(&self, user: NewUser) -> anyhow::Result<User> {
        self.with_conn(|conn| queries::create_user(conn, &user))
    }

    async fn set_sms_opt_out(&self, phone: &str, opted_out: bool) -> anyhow::Result<()> {
        self.with_conn(|conn| queries::set_sms_opt_out(conn, phone, opted_out))
    }

    async fn is_sms_opted_out(&self, phone: &str) -> anyhow::Result<bool> {
        self.with_conn(|conn| queries::is_sms_opted_out(conn, phone))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::AppointmentStatus;
    use chrono::NaiveDateTime;

    fn storage() -> SqliteStorage {
        SqliteStorage::open(":memory:").unwrap()
    }

    fn dt(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M").unwrap()
    }

    #[tokio::test]
    async fn test_user_lookup_by_phone_digits() {
        let storage = storage();
        storage
            .create_user(NewUser {
                username: "sms_1".to_string(),
                first_name: Some("Ana".to_string()),
                last_name: None,
                phone: Some("9185550100".to_string()),
                role: "client".to_string(),
            })
            .await
            .unwrap();

        let found = storage.get_user_by_phone("+1 (918) 555-0100").await.unwrap();
        assert_eq!(found.unwrap().first_name.as_deref(), Some("Ana"));
        assert!(storage.get_user_by_phone("+19185550199").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_appointment_lifecycle() {
        let storage = storage();
        let service = storage
            .create_service(&NewService {
                name: "Signature Head Spa".to_string(),
                description: None,
                duration: 60,
                price: 99.0,
            })
            .unwrap();
        let staff = storage.create_staff("Stylist").unwrap();
        let user = storage
            .create_user(NewUser {
                username: "sms_2".to_string(),
                first_name: None,
                last_name: None,
                phone: Some("+15550000001".to_string()),
                role: "client".to_string(),
            })
            .await
            .unwrap();

        let created = storage
            .create_appointment(NewAppointment {
                client_id: user.id,
                service_id: service.id,
                staff_id: staff.id,
                start_time: dt("2025-06-18 10:00"),
                end_time: dt("2025-06-18 11:00"),
                status: AppointmentStatus::Confirmed,
                total_amount: Some(99.0),
                notes: None,
                booking_method: "sms".to_string(),
            })
            .await
            .unwrap();

        let updated = storage
            .update_appointment(
                created.id,
                AppointmentPatch {
                    start_time: Some(dt("2025-06-18 13:00")),
                    end_time: Some(dt("2025-06-18 14:00")),
                    ..Default::default()
                },
            )
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.start_time, dt("2025-06-18 13:00"));

        assert!(storage.cancel_appointment(created.id).await.unwrap());
        let fetched = storage.get_appointment_by_id(created.id).await.unwrap().unwrap();
        assert_eq!(fetched.status, AppointmentStatus::Cancelled);
        assert!(storage.get_appointment_by_id(9999).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_opt_out_round_trip() {
        let storage = storage();
        storage.set_sms_opt_out("+15551112222", true).await.unwrap();
        assert!(storage.is_sms_opted_out("15551112222").await.unwrap());
        storage.set_sms_opt_out("+15551112222", false).await.unwrap();
        assert!(!storage.is_sms_opted_out("+15551112222").await.unwrap());
    }

    #[test]
    fn test_seed_demo_data_once() {
        let storage = storage();
        storage.seed_demo_data().unwrap();
        storage.seed_demo_data().unwrap();
        let services = storage.with_conn(queries::get_all_services).unwrap();
        assert_eq!(services.len(), 3);
    }
}
