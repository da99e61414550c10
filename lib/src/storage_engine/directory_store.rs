// lib/src/storage_engine/directory_store.rs
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use models::errors::PortalResult;
use models::medical::{Appointment, Doctor, MedicalRecord, NewPatient, Patient};

/// The clinic's directory: doctors, patients, appointments and record
/// metadata. Every engine keeps patient emails unique and stores them in
/// normalized (trimmed, lowercased) form.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DirectoryStore: Send + Sync + 'static {
    fn get_type(&self) -> &'static str;

    async fn insert_doctor(&self, doctor: Doctor) -> PortalResult<Doctor>;
    async fn list_doctors(&self) -> PortalResult<Vec<Doctor>>;
    async fn get_doctor(&self, id: &Uuid) -> PortalResult<Option<Doctor>>;
    async fn find_doctor_by_email(&self, email: &str) -> PortalResult<Option<Doctor>>;
    async fn count_doctors(&self) -> PortalResult<u64>;

    /// Inserts a patient, failing with `PatientEmailExists` when another
    /// patient already holds the email.
    async fn insert_patient(&self, patient: Patient) -> PortalResult<Patient>;
    /// Updates the patient holding `email` with the submitted fields, or
    /// inserts a new one. Either way exactly one patient holds the email
    /// afterwards.
    async fn upsert_patient_by_email(&self, email: &str, submitted: NewPatient) -> PortalResult<Patient>;
    async fn list_patients(&self) -> PortalResult<Vec<Patient>>;
    async fn get_patient(&self, id: &Uuid) -> PortalResult<Option<Patient>>;
    async fn find_patient_by_email(&self, email: &str) -> PortalResult<Option<Patient>>;
    async fn count_patients(&self) -> PortalResult<u64>;

    /// Fails with `UnknownPatient` when `patient_id` is not in the directory.
    async fn insert_appointment(&self, appointment: Appointment) -> PortalResult<Appointment>;
    async fn list_appointments(&self) -> PortalResult<Vec<Appointment>>;
    /// Appointments of one patient, earliest first.
    async fn appointments_for_patient(&self, patient_id: &Uuid) -> PortalResult<Vec<Appointment>>;
    async fn count_appointments(&self) -> PortalResult<u64>;
    /// Appointments with `start <= appointment_date < end`.
    async fn count_appointments_between(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> PortalResult<u64>;

    async fn insert_record(&self, record: MedicalRecord) -> PortalResult<MedicalRecord>;
    /// Records attached to `email`, newest first.
    async fn records_for_email(&self, email: &str) -> PortalResult<Vec<MedicalRecord>>;
}
