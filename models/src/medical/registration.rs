// models/src/medical/registration.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::{ValidationError, ValidationResult};
use crate::medical::patient::{required, AgeInput, NewPatient, PatientStatus};
use crate::medical::user::normalize_email;
use crate::timestamps::{parse_timestamp, Zone};

pub const MIN_PASSWORD_LEN: usize = 6;

/// Public self-registration + booking form. Client-side copies of the
/// doctor's name or specialty are ignored; the server resolves `doctor_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingRequest {
    pub name: String,
    pub email: String,
    pub contact_number: String,
    pub age: AgeInput,
    pub condition: String,
    pub doctor_id: String,
    pub appointment_date: String,
    pub reason: String,
    pub password: String,
    #[serde(rename = "confirmPassword", alias = "confirm_password")]
    pub confirm_password: String,
}

/// The text fields of a booking after [`BookingRequest::check_fields`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookingDetails {
    pub patient: NewPatient,
    pub email: String,
    pub appointment_date: DateTime<Utc>,
    pub reason: String,
}

impl BookingRequest {
    /// Rules 1 and 2: password strength, then confirmation.
    pub fn check_credentials(&self) -> ValidationResult<()> {
        if self.password.chars().count() < MIN_PASSWORD_LEN {
            return Err(ValidationError::WeakCredential);
        }
        if self.password != self.confirm_password {
            return Err(ValidationError::CredentialMismatch);
        }
        Ok(())
    }

    /// Rule 4: required fields, in form order.
    pub fn check_fields(&self, zone: Zone) -> ValidationResult<BookingDetails> {
        let name = required("name", &self.name)?;
        let email = normalize_email(&required("email", &self.email)?);
        if !email.contains('@') {
            return Err(ValidationError::invalid("email", format!("'{}' is not an email address", email)));
        }
        let contact_number = required("contact_number", &self.contact_number)?;
        self.age.parse()?;
        let condition = required("condition", &self.condition)?;
        let appointment_date = parse_timestamp("appointment_date", &self.appointment_date, zone)?;
        let reason = required("reason", &self.reason)?;

        Ok(BookingDetails {
            patient: NewPatient {
                name,
                age: self.age.clone(),
                condition,
                status: PatientStatus::Outpatient,
                contact_number,
                email: Some(email.clone()),
            },
            email,
            appointment_date,
            reason,
        })
    }
}
