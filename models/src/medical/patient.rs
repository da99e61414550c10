// models/src/medical/patient.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::{ValidationError, ValidationResult};
use crate::medical::user::normalize_email;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PatientStatus {
    #[default]
    Outpatient,
    Admitted,
    Discharged,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Patient {
    pub id: Uuid,
    pub name: String,
    pub age: u32,
    pub condition: String,
    pub status: PatientStatus,
    pub contact_number: String,
    pub email: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Age as submitted by a form: a JSON number from the admin screen, a string
/// from the public booking form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AgeInput {
    Number(i64),
    Text(String),
}

impl AgeInput {
    pub fn parse(&self) -> ValidationResult<u32> {
        let value = match self {
            AgeInput::Number(n) => *n,
            AgeInput::Text(s) if s.trim().is_empty() => {
                return Err(ValidationError::MissingField("age"));
            }
            AgeInput::Text(s) => s
                .trim()
                .parse::<i64>()
                .map_err(|_| ValidationError::invalid("age", format!("'{}' is not a number", s)))?,
        };
        if value <= 0 || value > u32::MAX as i64 {
            return Err(ValidationError::invalid("age", "must be greater than zero"));
        }
        Ok(value as u32)
    }
}

impl From<i64> for AgeInput {
    fn from(value: i64) -> Self {
        AgeInput::Number(value)
    }
}

/// Patient payload from the admin form or from a public booking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewPatient {
    pub name: String,
    pub age: AgeInput,
    pub condition: String,
    #[serde(default)]
    pub status: PatientStatus,
    pub contact_number: String,
    #[serde(default)]
    pub email: Option<String>,
}

impl NewPatient {
    /// Checks required fields and returns a normalized copy: trimmed text and
    /// a lower-cased email, with a blank email treated as absent.
    pub fn validate(&self) -> ValidationResult<NewPatient> {
        let name = required("name", &self.name)?;
        self.age.parse()?;
        let condition = required("condition", &self.condition)?;
        let contact_number = required("contact_number", &self.contact_number)?;
        let email = match self.email.as_deref().map(normalize_email) {
            Some(e) if e.is_empty() => None,
            Some(e) if !e.contains('@') => {
                return Err(ValidationError::invalid("email", format!("'{}' is not an email address", e)));
            }
            other => other,
        };
        Ok(NewPatient {
            name,
            age: self.age.clone(),
            condition,
            status: self.status,
            contact_number,
            email,
        })
    }
}

impl Patient {
    pub fn from_new(new_patient: NewPatient) -> ValidationResult<Self> {
        let checked = new_patient.validate()?;
        Ok(Patient {
            id: Uuid::new_v4(),
            age: checked.age.parse()?,
            name: checked.name,
            condition: checked.condition,
            status: checked.status,
            contact_number: checked.contact_number,
            email: checked.email,
            created_at: Utc::now(),
        })
    }

    /// Refreshes demographic fields from a later submission, keeping the
    /// row's identity and admission status.
    pub fn refresh_from(&mut self, update: &NewPatient) -> ValidationResult<()> {
        let checked = update.validate()?;
        self.age = checked.age.parse()?;
        self.name = checked.name;
        self.condition = checked.condition;
        self.contact_number = checked.contact_number;
        if checked.email.is_some() {
            self.email = checked.email;
        }
        Ok(())
    }
}

pub(crate) fn required(field: &'static str, value: &str) -> ValidationResult<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        Err(ValidationError::MissingField(field))
    } else {
        Ok(trimmed.to_string())
    }
}
