// models/src/medical/mod.rs

pub mod appointment;
pub mod doctor;
pub mod medical_record;
pub mod patient;
pub mod registration;
pub mod user;

pub use appointment::{
    Appointment, AppointmentRequest, AppointmentStatus, AppointmentView, NewAppointment, UNKNOWN_PATIENT,
};
pub use doctor::Doctor;
pub use medical_record::{MedicalRecord, NewMedicalRecord};
pub use patient::{AgeInput, NewPatient, Patient, PatientStatus};
pub use registration::{BookingDetails, BookingRequest, MIN_PASSWORD_LEN};
pub use user::{normalize_email, Caller, IdentityAccount, Role};
