// lib/src/directory.rs
use log::{debug, info};
use serde::Deserialize;
use std::sync::Arc;

use models::errors::PortalResult;
use models::medical::{Caller, Doctor, NewPatient, Patient};
use security::{Permission, RolesConfig};

use crate::storage_engine::DirectoryStore;
use crate::util::CallLimits;

/// A doctor listed in configuration and loaded at startup.
#[derive(Debug, Clone, Deserialize)]
pub struct DoctorSeed {
    pub name: String,
    pub specialty: String,
    pub email: String,
}

/// Staff-facing directory screens: the doctor list and patient admin.
#[derive(Clone)]
pub struct StaffDirectory {
    store: Arc<dyn DirectoryStore>,
    roles: Arc<RolesConfig>,
    limits: CallLimits,
}

impl StaffDirectory {
    pub fn new(store: Arc<dyn DirectoryStore>, roles: Arc<RolesConfig>, limits: CallLimits) -> Self {
        StaffDirectory { store, roles, limits }
    }

    /// Public: the booking form needs it before anyone signs in.
    pub async fn list_doctors(&self) -> PortalResult<Vec<Doctor>> {
        self.limits.run("doctor listing", self.store.list_doctors()).await
    }

    pub async fn list_patients(&self, caller: &Caller) -> PortalResult<Vec<Patient>> {
        self.roles.require(caller, Permission::PatientsRead)?;
        self.limits.run("patient listing", self.store.list_patients()).await
    }

    /// Fails with `PatientEmailExists` when the email already belongs to a
    /// patient.
    pub async fn create_patient(&self, caller: &Caller, submitted: NewPatient) -> PortalResult<Patient> {
        self.roles.require(caller, Permission::PatientsWrite)?;
        let patient = Patient::from_new(submitted)?;
        let patient = self
            .limits
            .run("patient insert", self.store.insert_patient(patient))
            .await?;
        info!("{} registered patient {}", caller.email, patient.id);
        Ok(patient)
    }

    /// Adds each seed whose email is not yet in the directory.
    pub async fn seed_doctors(&self, seeds: &[DoctorSeed]) -> PortalResult<usize> {
        let mut added = 0;
        for seed in seeds {
            if self.store.find_doctor_by_email(&seed.email).await?.is_some() {
                debug!("Doctor {} already present", seed.email);
                continue;
            }
            self.store
                .insert_doctor(Doctor::new(seed.name.trim(), seed.specialty.trim(), &seed.email))
                .await?;
            added += 1;
        }
        if added > 0 {
            info!("Seeded {} doctor(s)", added);
        }
        Ok(added)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage_engine::InMemoryStorage;
    use models::errors::{ErrorKind, PortalError, ValidationError};
    use models::medical::{AgeInput, PatientStatus, Role};

    fn directory() -> StaffDirectory {
        StaffDirectory::new(
            Arc::new(InMemoryStorage::new()),
            Arc::new(RolesConfig::default()),
            CallLimits::default(),
        )
    }

    fn caller(role: Role) -> Caller {
        Caller {
            email: "staff@clinic.test".to_string(),
            role: Some(role),
            ..Caller::default()
        }
    }

    fn submitted(email: &str) -> NewPatient {
        NewPatient {
            name: "Grace Hopper".to_string(),
            age: AgeInput::Text("85".to_string()),
            condition: "Hypertension".to_string(),
            status: PatientStatus::Admitted,
            contact_number: "555-0102".to_string(),
            email: Some(email.to_string()),
        }
    }

    #[tokio::test]
    async fn seeding_is_idempotent() {
        let directory = directory();
        let seeds = vec![
            DoctorSeed {
                name: "Dr. Sarah Wilson".to_string(),
                specialty: "Cardiology".to_string(),
                email: "sarah@clinic.test".to_string(),
            },
            DoctorSeed {
                name: "Dr. James Lee".to_string(),
                specialty: "Neurology".to_string(),
                email: "james@clinic.test".to_string(),
            },
        ];
        assert_eq!(directory.seed_doctors(&seeds).await.unwrap(), 2);
        assert_eq!(directory.seed_doctors(&seeds).await.unwrap(), 0);
        let doctors = directory.list_doctors().await.unwrap();
        assert_eq!(doctors.len(), 2);
        assert_eq!(doctors[0].name, "Dr. James Lee");
    }

    #[tokio::test]
    async fn staff_create_patient_enforces_unique_email() {
        let directory = directory();
        let admin = caller(Role::Admin);
        let created = directory.create_patient(&admin, submitted("Grace@x.com")).await.unwrap();
        assert_eq!(created.email.as_deref(), Some("grace@x.com"));
        assert_eq!(created.age, 85);

        let err = directory.create_patient(&admin, submitted("grace@x.com")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
        assert_eq!(directory.list_patients(&admin).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn patient_screens_are_staff_only() {
        let directory = directory();
        let err = directory.list_patients(&caller(Role::Patient)).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Authorization);

        let mut invalid = submitted("grace@x.com");
        invalid.age = AgeInput::Number(0);
        let err = directory.create_patient(&caller(Role::Doctor), invalid).await.unwrap_err();
        assert!(matches!(
            err,
            PortalError::Validation(ValidationError::InvalidField { field: "age", .. })
        ));
    }
}
