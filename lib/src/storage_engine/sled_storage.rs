// lib/src/storage_engine/sled_storage.rs
use async_trait::async_trait;
use bincode::{
    config::{self, BigEndian, Configuration, Fixint},
    serde::{decode_from_slice, encode_to_vec},
};
use chrono::{DateTime, Utc};
use log::{debug, info};
use serde::{de::DeserializeOwned, Serialize};
use sled::{Db, Tree};
use std::path::Path;
use uuid::Uuid;

use models::errors::{PortalError, PortalResult, ValidationError};
use models::medical::{normalize_email, Appointment, Doctor, MedicalRecord, NewPatient, Patient};

use super::directory_store::DirectoryStore;

/// Opens (creating if needed) the sled database under `path`.
pub fn open_sled_db(path: impl AsRef<Path>) -> PortalResult<Db> {
    let path = path.as_ref();
    std::fs::create_dir_all(path)?;
    info!("Opening sled directory store at {:?}", path);
    Ok(sled::open(path)?)
}

/// Sled-backed directory. Each table is its own tree; `patient_emails` maps a
/// normalized email to the patient id and is only ever written with
/// compare-and-swap.
pub struct SledStorage {
    doctors: Tree,
    patients: Tree,
    patient_emails: Tree,
    appointments: Tree,
    records: Tree,
    config: Configuration<BigEndian, Fixint>,
}

impl SledStorage {
    pub fn new(db: &Db) -> PortalResult<Self> {
        Ok(Self {
            doctors: db.open_tree("doctors")?,
            patients: db.open_tree("patients")?,
            patient_emails: db.open_tree("patient_emails")?,
            appointments: db.open_tree("appointments")?,
            records: db.open_tree("medical_records")?,
            config: bincode_config(),
        })
    }

    fn encode<T: Serialize>(&self, value: &T) -> PortalResult<Vec<u8>> {
        Ok(encode_to_vec(value, self.config)?)
    }

    fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> PortalResult<T> {
        let (value, _): (T, usize) = decode_from_slice(bytes, self.config)?;
        Ok(value)
    }

    fn get<T: DeserializeOwned>(&self, tree: &Tree, key: &[u8]) -> PortalResult<Option<T>> {
        tree.get(key)?.map(|bytes| self.decode(&bytes)).transpose()
    }

    fn scan<T: DeserializeOwned>(&self, tree: &Tree) -> PortalResult<Vec<T>> {
        tree.iter()
            .values()
            .map(|bytes| self.decode(&bytes?))
            .collect()
    }

    fn patient_id_for(&self, email: &str) -> PortalResult<Option<Uuid>> {
        match self.patient_emails.get(email.as_bytes())? {
            Some(bytes) => Uuid::from_slice(&bytes)
                .map(Some)
                .map_err(|e| PortalError::Storage(format!("corrupt patient email index: {}", e))),
            None => Ok(None),
        }
    }

    /// Claims `email` for `id`. Returns false when another patient holds it.
    fn claim_email(&self, email: &str, id: Uuid) -> PortalResult<bool> {
        let swapped = self.patient_emails.compare_and_swap(
            email.as_bytes(),
            None as Option<&[u8]>,
            Some(id.as_bytes().to_vec()),
        )?;
        Ok(swapped.is_ok())
    }

    fn put_patient(&self, patient: &Patient) -> PortalResult<()> {
        self.patients.insert(patient.id.as_bytes(), self.encode(patient)?)?;
        Ok(())
    }
}

/// Provides a standard bincode configuration.
fn bincode_config() -> Configuration<BigEndian, Fixint> {
    config::standard().with_big_endian().with_fixed_int_encoding()
}

/// `email 0x00 created_at-millis uuid`, so a prefix scan yields one patient's
/// records in upload order.
fn record_key(record: &MedicalRecord) -> Vec<u8> {
    let mut key = record_prefix(&record.patient_email);
    key.extend_from_slice(&record.created_at.timestamp_millis().to_be_bytes());
    key.extend_from_slice(record.id.as_bytes());
    key
}

fn record_prefix(email: &str) -> Vec<u8> {
    let mut prefix = email.as_bytes().to_vec();
    prefix.push(0);
    prefix
}

#[async_trait]
impl DirectoryStore for SledStorage {
    fn get_type(&self) -> &'static str {
        "Sled"
    }

    async fn insert_doctor(&self, doctor: Doctor) -> PortalResult<Doctor> {
        self.doctors.insert(doctor.id.as_bytes(), self.encode(&doctor)?)?;
        self.doctors.flush_async().await?;
        Ok(doctor)
    }

    async fn list_doctors(&self) -> PortalResult<Vec<Doctor>> {
        let mut doctors: Vec<Doctor> = self.scan(&self.doctors)?;
        doctors.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(doctors)
    }

    async fn get_doctor(&self, id: &Uuid) -> PortalResult<Option<Doctor>> {
        self.get(&self.doctors, id.as_bytes())
    }

    async fn find_doctor_by_email(&self, email: &str) -> PortalResult<Option<Doctor>> {
        let email = normalize_email(email);
        let doctors: Vec<Doctor> = self.scan(&self.doctors)?;
        Ok(doctors.into_iter().find(|d| d.email == email))
    }

    async fn count_doctors(&self) -> PortalResult<u64> {
        Ok(self.doctors.len() as u64)
    }

    async fn insert_patient(&self, patient: Patient) -> PortalResult<Patient> {
        if let Some(email) = patient.email.as_deref() {
            if !self.claim_email(email, patient.id)? {
                return Err(PortalError::PatientEmailExists(email.to_string()));
            }
        }
        self.put_patient(&patient)?;
        self.patients.flush_async().await?;
        Ok(patient)
    }

    async fn upsert_patient_by_email(&self, email: &str, submitted: NewPatient) -> PortalResult<Patient> {
        let email = normalize_email(email);
        let submitted = NewPatient {
            email: Some(email.clone()),
            ..submitted
        };
        // Two passes at most: a lost claim means another writer created the
        // patient in between, and the second pass updates that row.
        for _ in 0..2 {
            if let Some(id) = self.patient_id_for(&email)? {
                let mut patient: Patient = self
                    .get(&self.patients, id.as_bytes())?
                    .ok_or_else(|| PortalError::Storage(format!("patient {} missing for indexed email", id)))?;
                patient.refresh_from(&submitted)?;
                self.put_patient(&patient)?;
                self.patients.flush_async().await?;
                debug!("Refreshed patient {} from booking", patient.id);
                return Ok(patient);
            }
            let patient = Patient::from_new(submitted.clone())?;
            if self.claim_email(&email, patient.id)? {
                self.put_patient(&patient)?;
                self.patients.flush_async().await?;
                return Ok(patient);
            }
        }
        Err(PortalError::Storage(format!("could not settle patient row for {}", email)))
    }

    async fn list_patients(&self) -> PortalResult<Vec<Patient>> {
        let mut patients: Vec<Patient> = self.scan(&self.patients)?;
        patients.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(patients)
    }

    async fn get_patient(&self, id: &Uuid) -> PortalResult<Option<Patient>> {
        self.get(&self.patients, id.as_bytes())
    }

    async fn find_patient_by_email(&self, email: &str) -> PortalResult<Option<Patient>> {
        match self.patient_id_for(&normalize_email(email))? {
            Some(id) => self.get(&self.patients, id.as_bytes()),
            None => Ok(None),
        }
    }

    async fn count_patients(&self) -> PortalResult<u64> {
        Ok(self.patients.len() as u64)
    }

    async fn insert_appointment(&self, appointment: Appointment) -> PortalResult<Appointment> {
        if !self.patients.contains_key(appointment.patient_id.as_bytes())? {
            return Err(ValidationError::UnknownPatient(appointment.patient_id.to_string()).into());
        }
        self.appointments
            .insert(appointment.id.as_bytes(), self.encode(&appointment)?)?;
        self.appointments.flush_async().await?;
        Ok(appointment)
    }

    async fn list_appointments(&self) -> PortalResult<Vec<Appointment>> {
        let mut appointments: Vec<Appointment> = self.scan(&self.appointments)?;
        appointments.sort_by(|a, b| a.appointment_date.cmp(&b.appointment_date));
        Ok(appointments)
    }

    async fn appointments_for_patient(&self, patient_id: &Uuid) -> PortalResult<Vec<Appointment>> {
        let mut appointments: Vec<Appointment> = self
            .scan::<Appointment>(&self.appointments)?
            .into_iter()
            .filter(|a| a.patient_id == *patient_id)
            .collect();
        appointments.sort_by(|a, b| a.appointment_date.cmp(&b.appointment_date));
        Ok(appointments)
    }

    async fn count_appointments(&self) -> PortalResult<u64> {
        Ok(self.appointments.len() as u64)
    }

    async fn count_appointments_between(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> PortalResult<u64> {
        let appointments: Vec<Appointment> = self.scan(&self.appointments)?;
        Ok(appointments
            .iter()
            .filter(|a| a.appointment_date >= start && a.appointment_date < end)
            .count() as u64)
    }

    async fn insert_record(&self, mut record: MedicalRecord) -> PortalResult<MedicalRecord> {
        record.patient_email = normalize_email(&record.patient_email);
        self.records.insert(record_key(&record), self.encode(&record)?)?;
        self.records.flush_async().await?;
        Ok(record)
    }

    async fn records_for_email(&self, email: &str) -> PortalResult<Vec<MedicalRecord>> {
        let prefix = record_prefix(&normalize_email(email));
        self.records
            .scan_prefix(prefix)
            .values()
            .rev()
            .map(|bytes| self.decode(&bytes?))
            .collect()
    }
}
