use chrono::{Local, NaiveDateTime};
use rusqlite::{params, Connection, OptionalExtension};

use crate::models::sms::{phone_digits, same_number};
use crate::models::{
    Appointment, AppointmentPatch, AppointmentStatus, NewAppointment, NewService,
    NewStaffSchedule, NewUser, PaymentStatus, Service, Staff, StaffSchedule, StaffService, User,
};

const TS_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

fn format_ts(dt: &NaiveDateTime) -> String {
    dt.format(TS_FORMAT).to_string()
}

fn parse_ts(s: &str) -> NaiveDateTime {
    NaiveDateTime::parse_from_str(s, TS_FORMAT).unwrap_or_else(|_| Local::now().naive_local())
}

// ── Services ──

pub fn get_all_services(conn: &Connection) -> anyhow::Result<Vec<Service>> {
    let mut stmt = conn.prepare(
        "SELECT id, name, description, duration, price, is_active FROM services
         WHERE is_active = 1 ORDER BY id ASC",
    )?;
    let rows = stmt.query_map([], |row| {
        Ok(Service {
            id: row.get(0)?,
            name: row.get(1)?,
            description: row.get(2)?,
            duration: row.get(3)?,
            price: row.get(4)?,
            is_active: row.get(5)?,
        })
    })?;

    let mut services = vec![];
    for row in rows {
        services.push(row?);
    }
    Ok(services)
}

pub fn create_service(conn: &Connection, service: &NewService) -> anyhow::Result<Service> {
    conn.execute(
        "INSERT INTO services (name, description, duration, price) VALUES (?1, ?2, ?3, ?4)",
        params![service.name, service.description, service.duration, service.price],
    )?;
    Ok(Service {
        id: conn.last_insert_rowid(),
        name: service.name.clone(),
        description: service.description.clone(),
        duration: service.duration,
        price: service.price,
        is_active: true,
    })
}

// ── Staff ──

pub fn get_all_staff(conn: &Connection) -> anyhow::Result<Vec<Staff>> {
    let mut stmt = conn.prepare(
        "SELECT id, user_id, title, bio, is_active FROM staff WHERE is_active = 1 ORDER BY id ASC",
    )?;
    let rows = stmt.query_map([], |row| {
        Ok(Staff {
            id: row.get(0)?,
            user_id: row.get(1)?,
            title: row.get(2)?,
            bio: row.get(3)?,
            is_active: row.get(4)?,
        })
    })?;

    let mut staff = vec![];
    for row in rows {
        staff.push(row?);
    }
    Ok(staff)
}

pub fn create_staff(conn: &Connection, title: &str, user_id: Option<i64>) -> anyhow::Result<Staff> {
    conn.execute(
        "INSERT INTO staff (user_id, title) VALUES (?1, ?2)",
        params![user_id, title],
    )?;
    Ok(Staff {
        id: conn.last_insert_rowid(),
        user_id,
        title: title.to_string(),
        bio: None,
        is_active: true,
    })
}

pub fn get_staff_schedules(conn: &Connection, staff_id: i64) -> anyhow::Result<Vec<StaffSchedule>> {
    let mut stmt = conn.prepare(
        "SELECT id, staff_id, day_of_week, start_time, end_time, is_blocked
         FROM staff_schedules WHERE staff_id = ?1 ORDER BY id ASC",
    )?;
    let rows = stmt.query_map(params![staff_id], |row| {
        Ok(StaffSchedule {
            id: row.get(0)?,
            staff_id: row.get(1)?,
            day_of_week: row.get(2)?,
            start_time: row.get(3)?,
            end_time: row.get(4)?,
            is_blocked: row.get(5)?,
        })
    })?;

    let mut schedules = vec![];
    for row in rows {
        schedules.push(row?);
    }
    Ok(schedules)
}

pub fn create_staff_schedule(
    conn: &Connection,
    schedule: &NewStaffSchedule,
) -> anyhow::Result<StaffSchedule> {
    conn.execute(
        "INSERT INTO staff_schedules (staff_id, day_of_week, start_time, end_time, is_blocked)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            schedule.staff_id,
            schedule.day_of_week,
            schedule.start_time,
            schedule.end_time,
            schedule.is_blocked,
        ],
    )?;
    Ok(StaffSchedule {
        id: conn.last_insert_rowid(),
        staff_id: schedule.staff_id,
        day_of_week: schedule.day_of_week.clone(),
        start_time: schedule.start_time.clone(),
        end_time: schedule.end_time.clone(),
        is_blocked: schedule.is_blocked,
    })
}

pub fn get_staff_services(conn: &Connection, staff_id: i64) -> anyhow::Result<Vec<StaffService>> {
    let mut stmt = conn.prepare(
        "SELECT id, staff_id, service_id FROM staff_services WHERE staff_id = ?1 ORDER BY id ASC",
    )?;
    let rows = stmt.query_map(params![staff_id], |row| {
        Ok(StaffService {
            id: row.get(0)?,
            staff_id: row.get(1)?,
            service_id: row.get(2)?,
        })
    })?;

    let mut links = vec![];
    for row in rows {
        links.push(row?);
    }
    Ok(links)
}

pub fn assign_service(conn: &Connection, staff_id: i64, service_id: i64) -> anyhow::Result<StaffService> {
    conn.execute(
        "INSERT INTO staff_services (staff_id, service_id) VALUES (?1, ?2)",
        params![staff_id, service_id],
    )?;
    Ok(StaffService {
        id: conn.last_insert_rowid(),
        staff_id,
        service_id,
    })
}

// ── Appointments ──

const APPOINTMENT_COLUMNS: &str = "id, client_id, service_id, staff_id, start_time, end_time, status, \
     payment_status, total_amount, notes, booking_method, created_at";

pub fn get_all_appointments(conn: &Connection) -> anyhow::Result<Vec<Appointment>> {
    let sql = format!("SELECT {APPOINTMENT_COLUMNS} FROM appointments ORDER BY start_time ASC");
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map([], |row| Ok(parse_appointment_row(row)))?;

    let mut appointments = vec![];
    for row in rows {
        appointments.push(row??);
    }
    Ok(appointments)
}

pub fn get_appointment_by_id(conn: &Connection, id: i64) -> anyhow::Result<Option<Appointment>> {
    let sql = format!("SELECT {APPOINTMENT_COLUMNS} FROM appointments WHERE id = ?1");
    let result = conn.query_row(&sql, params![id], |row| Ok(parse_appointment_row(row)));

    match result {
        Ok(appointment) => Ok(Some(appointment?)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

pub fn create_appointment(conn: &Connection, new: &NewAppointment) -> anyhow::Result<Appointment> {
    let created_at = Local::now().naive_local();
    conn.execute(
        "INSERT INTO appointments (client_id, service_id, staff_id, start_time, end_time, status,
            payment_status, total_amount, notes, booking_method, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
        params![
            new.client_id,
            new.service_id,
            new.staff_id,
            format_ts(&new.start_time),
            format_ts(&new.end_time),
            new.status.as_str(),
            PaymentStatus::Unpaid.as_str(),
            new.total_amount,
            new.notes,
            new.booking_method,
            format_ts(&created_at),
        ],
    )?;

    Ok(Appointment {
        id: conn.last_insert_rowid(),
        client_id: new.client_id,
        service_id: new.service_id,
        staff_id: new.staff_id,
        start_time: new.start_time,
        end_time: new.end_time,
        status: new.status,
        payment_status: PaymentStatus::Unpaid,
        total_amount: new.total_amount,
        notes: new.notes.clone(),
        booking_method: new.booking_method.clone(),
        created_at,
    })
}

pub fn cancel_appointment(conn: &Connection, id: i64) -> anyhow::Result<bool> {
    let count = conn.execute(
        "UPDATE appointments SET status = ?1 WHERE id = ?2",
        params![AppointmentStatus::Cancelled.as_str(), id],
    )?;
    Ok(count > 0)
}

pub fn update_appointment(
    conn: &Connection,
    id: i64,
    patch: &AppointmentPatch,
) -> anyhow::Result<Option<Appointment>> {
    let Some(mut appointment) = get_appointment_by_id(conn, id)? else {
        return Ok(None);
    };

    if let Some(staff_id) = patch.staff_id {
        appointment.staff_id = staff_id;
    }
    if let Some(start) = patch.start_time {
        appointment.start_time = start;
    }
    if let Some(end) = patch.end_time {
        appointment.end_time = end;
    }
    if let Some(status) = patch.status {
        appointment.status = status;
    }
    if let Some(ref notes) = patch.notes {
        appointment.notes = Some(notes.clone());
    }

    conn.execute(
        "UPDATE appointments SET staff_id = ?1, start_time = ?2, end_time = ?3, status = ?4, notes = ?5
         WHERE id = ?6",
        params![
            appointment.staff_id,
            format_ts(&appointment.start_time),
            format_ts(&appointment.end_time),
            appointment.status.as_str(),
            appointment.notes,
            id,
        ],
    )?;
    Ok(Some(appointment))
}

fn parse_appointment_row(row: &rusqlite::Row) -> anyhow::Result<Appointment> {
    let start_str: String = row.get(4)?;
    let end_str: String = row.get(5)?;
    let status_str: String = row.get(6)?;
    let payment_str: String = row.get(7)?;
    let created_at_str: String = row.get(11)?;

    Ok(Appointment {
        id: row.get(0)?,
        client_id: row.get(1)?,
        service_id: row.get(2)?,
        staff_id: row.get(3)?,
        start_time: parse_ts(&start_str),
        end_time: parse_ts(&end_str),
        status: AppointmentStatus::parse(&status_str),
        payment_status: PaymentStatus::parse(&payment_str),
        total_amount: row.get(8)?,
        notes: row.get(9)?,
        booking_method: row.get(10)?,
        created_at: parse_ts(&created_at_str),
    })
}

// ── Users ──

fn parse_user_row(row: &rusqlite::Row) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        username: row.get(1)?,
        first_name: row.get(2)?,
        last_name: row.get(3)?,
        phone: row.get(4)?,
        role: row.get(5)?,
    })
}

pub fn get_user(conn: &Connection, id: i64) -> anyhow::Result<Option<User>> {
    let user = conn
        .query_row(
            "SELECT id, username, first_name, last_name, phone, role FROM users WHERE id = ?1",
            params![id],
            parse_user_row,
        )
        .optional()?;
    Ok(user)
}

/// Exact match first, then a digits-only comparison so `+1 (918) 555-0100`
/// finds a client saved as `9185550100`.
pub fn get_user_by_phone(conn: &Connection, phone: &str) -> anyhow::Result<Option<User>> {
    let exact = conn
        .query_row(
            "SELECT id, username, first_name, last_name, phone, role FROM users
             WHERE phone = ?1 ORDER BY id ASC LIMIT 1",
            params![phone],
            parse_user_row,
        )
        .optional()?;
    if exact.is_some() {
        return Ok(exact);
    }

    let digits = phone_digits(phone);
    let mut stmt = conn.prepare(
        "SELECT id, username, first_name, last_name, phone, role FROM users
         WHERE phone IS NOT NULL ORDER BY id ASC",
    )?;
    let rows = stmt.query_map([], parse_user_row)?;
    for row in rows {
        let user = row?;
        if let Some(ref p) = user.phone {
            if same_number(&phone_digits(p), &digits) {
                return Ok(Some(user));
            }
        }
    }
    Ok(None)
}

pub fn create_user(conn: &Connection, user: &NewUser) -> anyhow::Result<User> {
    conn.execute(
        "INSERT INTO users (username, first_name, last_name, phone, role) VALUES (?1, ?2, ?3, ?4, ?5)",
        params![user.username, user.first_name, user.last_name, user.phone, user.role],
    )?;
    Ok(User {
        id: conn.last_insert_rowid(),
        username: user.username.clone(),
        first_name: user.first_name.clone(),
        last_name: user.last_name.clone(),
        phone: user.phone.clone(),
        role: user.role.clone(),
    })
}

// ── SMS opt-out ──

pub fn set_sms_opt_out(conn: &Connection, phone: &str, opted_out: bool) -> anyhow::Result<()> {
    let key = phone_digits(phone);
    if opted_out {
        conn.execute(
            "INSERT OR REPLACE INTO sms_opt_outs (phone, opted_out_at) VALUES (?1, datetime('now'))",
            params![key],
        )?;
    } else {
        conn.execute("DELETE FROM sms_opt_outs WHERE phone = ?1", params![key])?;
    }
    Ok(())
}

pub fn is_sms_opted_out(conn: &Connection, phone: &str) -> anyhow::Result<bool> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM sms_opt_outs WHERE phone = ?1",
        params![phone_digits(phone)],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}
