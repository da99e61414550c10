// lib/src/storage_engine/inmemory_storage.rs
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use models::errors::{PortalError, PortalResult, ValidationError};
use models::medical::{normalize_email, Appointment, Doctor, MedicalRecord, NewPatient, Patient};

use super::directory_store::DirectoryStore;

#[derive(Debug, Default)]
struct Tables {
    doctors: HashMap<Uuid, Doctor>,
    patients: HashMap<Uuid, Patient>,
    patient_emails: HashMap<String, Uuid>,
    appointments: HashMap<Uuid, Appointment>,
    records: Vec<MedicalRecord>,
}

/// Directory held in process memory. One lock guards all tables so the
/// patient email index never drifts from the rows.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStorage {
    tables: Arc<RwLock<Tables>>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DirectoryStore for InMemoryStorage {
    fn get_type(&self) -> &'static str {
        "InMemory"
    }

    async fn insert_doctor(&self, doctor: Doctor) -> PortalResult<Doctor> {
        let mut tables = self.tables.write().await;
        tables.doctors.insert(doctor.id, doctor.clone());
        Ok(doctor)
    }

    async fn list_doctors(&self) -> PortalResult<Vec<Doctor>> {
        let tables = self.tables.read().await;
        let mut doctors: Vec<Doctor> = tables.doctors.values().cloned().collect();
        doctors.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(doctors)
    }

    async fn get_doctor(&self, id: &Uuid) -> PortalResult<Option<Doctor>> {
        Ok(self.tables.read().await.doctors.get(id).cloned())
    }

    async fn find_doctor_by_email(&self, email: &str) -> PortalResult<Option<Doctor>> {
        let email = normalize_email(email);
        let tables = self.tables.read().await;
        Ok(tables.doctors.values().find(|d| d.email == email).cloned())
    }

    async fn count_doctors(&self) -> PortalResult<u64> {
        Ok(self.tables.read().await.doctors.len() as u64)
    }

    async fn insert_patient(&self, patient: Patient) -> PortalResult<Patient> {
        let mut tables = self.tables.write().await;
        if let Some(email) = patient.email.clone() {
            if tables.patient_emails.contains_key(&email) {
                return Err(PortalError::PatientEmailExists(email));
            }
            tables.patient_emails.insert(email, patient.id);
        }
        tables.patients.insert(patient.id, patient.clone());
        Ok(patient)
    }

    async fn upsert_patient_by_email(&self, email: &str, submitted: NewPatient) -> PortalResult<Patient> {
        let email = normalize_email(email);
        let submitted = NewPatient {
            email: Some(email.clone()),
            ..submitted
        };
        let mut tables = self.tables.write().await;
        let existing = tables.patient_emails.get(&email).copied();
        if let Some(patient) = existing.and_then(|id| tables.patients.get_mut(&id)) {
            patient.refresh_from(&submitted)?;
            return Ok(patient.clone());
        }
        let patient = Patient::from_new(submitted)?;
        tables.patient_emails.insert(email, patient.id);
        tables.patients.insert(patient.id, patient.clone());
        Ok(patient)
    }

    async fn list_patients(&self) -> PortalResult<Vec<Patient>> {
        let tables = self.tables.read().await;
        let mut patients: Vec<Patient> = tables.patients.values().cloned().collect();
        patients.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(patients)
    }

    async fn get_patient(&self, id: &Uuid) -> PortalResult<Option<Patient>> {
        Ok(self.tables.read().await.patients.get(id).cloned())
    }

    async fn find_patient_by_email(&self, email: &str) -> PortalResult<Option<Patient>> {
        let email = normalize_email(email);
        let tables = self.tables.read().await;
        Ok(tables
            .patient_emails
            .get(&email)
            .and_then(|id| tables.patients.get(id))
            .cloned())
    }

    async fn count_patients(&self) -> PortalResult<u64> {
        Ok(self.tables.read().await.patients.len() as u64)
    }

    async fn insert_appointment(&self, appointment: Appointment) -> PortalResult<Appointment> {
        let mut tables = self.tables.write().await;
        if !tables.patients.contains_key(&appointment.patient_id) {
            return Err(ValidationError::UnknownPatient(appointment.patient_id.to_string()).into());
        }
        tables.appointments.insert(appointment.id, appointment.clone());
        Ok(appointment)
    }

    async fn list_appointments(&self) -> PortalResult<Vec<Appointment>> {
        let tables = self.tables.read().await;
        let mut appointments: Vec<Appointment> = tables.appointments.values().cloned().collect();
        appointments.sort_by(|a, b| a.appointment_date.cmp(&b.appointment_date));
        Ok(appointments)
    }

    async fn appointments_for_patient(&self, patient_id: &Uuid) -> PortalResult<Vec<Appointment>> {
        let tables = self.tables.read().await;
        let mut appointments: Vec<Appointment> = tables
            .appointments
            .values()
            .filter(|a| a.patient_id == *patient_id)
            .cloned()
            .collect();
        appointments.sort_by(|a, b| a.appointment_date.cmp(&b.appointment_date));
        Ok(appointments)
    }

    async fn count_appointments(&self) -> PortalResult<u64> {
        Ok(self.tables.read().await.appointments.len() as u64)
    }

    async fn count_appointments_between(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> PortalResult<u64> {
        let tables = self.tables.read().await;
        Ok(tables
            .appointments
            .values()
            .filter(|a| a.appointment_date >= start && a.appointment_date < end)
            .count() as u64)
    }

    async fn insert_record(&self, mut record: MedicalRecord) -> PortalResult<MedicalRecord> {
        record.patient_email = normalize_email(&record.patient_email);
        self.tables.write().await.records.push(record.clone());
        Ok(record)
    }

    async fn records_for_email(&self, email: &str) -> PortalResult<Vec<MedicalRecord>> {
        let email = normalize_email(email);
        let tables = self.tables.read().await;
        let mut records: Vec<MedicalRecord> = tables
            .records
            .iter()
            .filter(|r| r.patient_email == email)
            .cloned()
            .collect();
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(records)
    }
}
