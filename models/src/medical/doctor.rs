// models/src/medical/doctor.rs
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::medical::user::normalize_email;

/// Directory entry for a practising doctor. Reference data: appointments copy
/// `name` and `specialty` at booking time rather than pointing here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Doctor {
    pub id: Uuid,
    pub name: String,
    pub specialty: String,
    pub email: String,
}

impl Doctor {
    pub fn new(name: impl Into<String>, specialty: impl Into<String>, email: &str) -> Self {
        Doctor {
            id: Uuid::new_v4(),
            name: name.into(),
            specialty: specialty.into(),
            email: normalize_email(email),
        }
    }
}
