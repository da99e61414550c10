// models/src/medical/appointment.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::ValidationResult;
use crate::medical::patient::{required, Patient};
use crate::medical::user::normalize_email;
use crate::timestamps::{parse_timestamp, Zone};

/// Display name used when an appointment's patient no longer resolves.
pub const UNKNOWN_PATIENT: &str = "Unknown";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AppointmentStatus {
    #[default]
    Scheduled,
    Completed,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Appointment {
    pub id: Uuid,
    pub patient_id: Uuid,
    /// Snapshot of the doctor's name at booking time; not a foreign key.
    pub doctor_name: String,
    pub doctor_specialty: Option<String>,
    pub appointment_date: DateTime<Utc>,
    pub reason: String,
    pub status: AppointmentStatus,
    pub created_at: DateTime<Utc>,
}

/// Validated appointment payload ready for the directory store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewAppointment {
    pub patient_id: Uuid,
    pub doctor_name: String,
    pub doctor_specialty: Option<String>,
    pub appointment_date: DateTime<Utc>,
    pub reason: String,
}

impl Appointment {
    pub fn from_new(new_appointment: NewAppointment) -> Self {
        Appointment {
            id: Uuid::new_v4(),
            patient_id: new_appointment.patient_id,
            doctor_name: new_appointment.doctor_name,
            doctor_specialty: new_appointment.doctor_specialty,
            appointment_date: new_appointment.appointment_date,
            reason: new_appointment.reason,
            status: AppointmentStatus::Scheduled,
            created_at: Utc::now(),
        }
    }
}

/// Staff booking body for `POST /api/appointments`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppointmentRequest {
    pub patient_id: Uuid,
    pub doctor_name: String,
    pub appointment_date: String,
    pub reason: String,
    #[serde(default)]
    pub patient_email: Option<String>,
}

impl AppointmentRequest {
    /// Validates the body; local timestamps without an offset are read in `zone`.
    pub fn to_new_appointment(&self, zone: Zone) -> ValidationResult<NewAppointment> {
        let doctor_name = required("doctor_name", &self.doctor_name)?;
        let appointment_date = parse_timestamp("appointment_date", &self.appointment_date, zone)?;
        let reason = required("reason", &self.reason)?;
        Ok(NewAppointment {
            patient_id: self.patient_id,
            doctor_name,
            doctor_specialty: None,
            appointment_date,
            reason,
        })
    }

    pub fn notification_email(&self) -> Option<String> {
        self.patient_email
            .as_deref()
            .map(normalize_email)
            .filter(|e| !e.is_empty())
    }
}

/// An appointment joined with its patient for display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppointmentView {
    #[serde(flatten)]
    pub appointment: Appointment,
    pub patient_name: String,
    pub patient_email: Option<String>,
}

impl AppointmentView {
    pub fn join(appointment: Appointment, patient: Option<&Patient>) -> Self {
        match patient {
            Some(p) => AppointmentView {
                appointment,
                patient_name: p.name.clone(),
                patient_email: p.email.clone(),
            },
            None => AppointmentView {
                appointment,
                patient_name: UNKNOWN_PATIENT.to_string(),
                patient_email: None,
            },
        }
    }
}
