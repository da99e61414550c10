// models/src/lib.rs
//! Domain types shared by the clinic portal crates: directory rows, identity
//! values, booking payloads, and the error taxonomy.

pub mod errors;
pub mod medical;
pub mod stats;
pub mod timestamps;

pub use errors::{BookingStage, ErrorKind, PortalError, PortalResult, ValidationError, ValidationResult};
pub use medical::{
    normalize_email, AgeInput, Appointment, AppointmentRequest, AppointmentStatus, AppointmentView,
    BookingDetails, BookingRequest, Caller, Doctor, IdentityAccount, MedicalRecord, NewAppointment,
    NewMedicalRecord, NewPatient, Patient, PatientStatus, Role, UNKNOWN_PATIENT,
};
pub use stats::DashboardStats;
