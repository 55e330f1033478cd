pub mod appointment;
pub mod auto_respond;
pub mod booking;
pub mod conversation;
pub mod intent;
pub mod service;
pub mod sms;
pub mod user;

pub use appointment::{Appointment, AppointmentPatch, AppointmentStatus, NewAppointment, PaymentStatus};
pub use auto_respond::{AutoRespondConfig, AutoRespondConfigPatch, BusinessHours};
pub use booking::{AvailabilityCheck, AvailableSlot, BookingRequest};
pub use conversation::{ConversationState, ConversationStep, StatePatch};
pub use intent::MessageIntent;
pub use service::{NewService, NewStaffSchedule, Service, Staff, StaffSchedule, StaffService};
pub use sms::{AutoRespondResult, IncomingSms};
pub use user::{NewUser, User};
