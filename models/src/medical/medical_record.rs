// models/src/medical/medical_record.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// An uploaded artifact attached to a patient by email. Append-only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MedicalRecord {
    pub id: Uuid,
    pub patient_email: String,
    pub doctor_name: String,
    pub record_type: String,
    pub record_url: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMedicalRecord {
    pub patient_email: String,
    pub doctor_name: String,
    pub record_type: String,
    pub record_url: String,
}

impl MedicalRecord {
    pub fn from_new(new_record: NewMedicalRecord) -> Self {
        MedicalRecord {
            id: Uuid::new_v4(),
            patient_email: new_record.patient_email,
            doctor_name: new_record.doctor_name,
            record_type: new_record.record_type,
            record_url: new_record.record_url,
            created_at: Utc::now(),
        }
    }
}
