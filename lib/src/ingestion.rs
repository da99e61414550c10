// lib/src/ingestion.rs
use chrono::{DateTime, Utc};
use log::{error, info};
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::Path;
use std::sync::Arc;
use uuid::Uuid;

use models::errors::{PortalError, PortalResult, ValidationError};
use models::medical::{Caller, MedicalRecord, NewMedicalRecord};
use security::{Permission, RolesConfig};

use crate::access::resolve_display_name;
use crate::blob_store::BlobStore;
use crate::storage_engine::DirectoryStore;
use crate::util::{non_blank, CallLimits};

/// Doctor name recorded when neither the request nor the caller supplies one.
pub const DEFAULT_DOCTOR_NAME: &str = "Dr. Admin";
const DEFAULT_EXTENSION: &str = "bin";
const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

static EXTENSION: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z0-9]{1,10}$").expect("valid extension pattern"));

/// A file as received from the client.
#[derive(Debug, Clone)]
pub struct Upload {
    pub file_name: String,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct IngestRequest {
    pub patient_id: Uuid,
    pub upload: Upload,
    pub record_type: String,
    pub doctor_name: Option<String>,
}

/// `<unix-millis>_<patient_id>.<ext>`, with the extension taken from the
/// uploaded file name when it is plain alphanumerics.
pub fn blob_path(now: DateTime<Utc>, patient_id: Uuid, file_name: &str) -> String {
    let ext = Path::new(file_name.trim())
        .extension()
        .and_then(|e| e.to_str())
        .filter(|e| EXTENSION.is_match(e))
        .map(str::to_ascii_lowercase)
        .unwrap_or_else(|| DEFAULT_EXTENSION.to_string());
    format!("{}_{}.{}", now.timestamp_millis(), patient_id, ext)
}

/// Uploads record files and files their metadata under the patient's email.
#[derive(Clone)]
pub struct RecordIngestion {
    store: Arc<dyn DirectoryStore>,
    blobs: Arc<dyn BlobStore>,
    roles: Arc<RolesConfig>,
    limits: CallLimits,
}

impl RecordIngestion {
    pub fn new(
        store: Arc<dyn DirectoryStore>,
        blobs: Arc<dyn BlobStore>,
        roles: Arc<RolesConfig>,
        limits: CallLimits,
    ) -> Self {
        RecordIngestion {
            store,
            blobs,
            roles,
            limits,
        }
    }

    /// Nothing is uploaded unless the patient exists and has an email. If
    /// the metadata insert fails after the upload, the blob stays where it
    /// is and the error carries its URL.
    pub async fn ingest(&self, caller: &Caller, request: IngestRequest) -> PortalResult<MedicalRecord> {
        self.roles.require(caller, Permission::RecordsIngest)?;

        let patient = self
            .limits
            .run("patient lookup", self.store.get_patient(&request.patient_id))
            .await?
            .ok_or_else(|| ValidationError::UnknownPatient(request.patient_id.to_string()))?;
        let patient_email = non_blank(patient.email.as_deref()).ok_or(ValidationError::PatientHasNoEmail)?;
        let record_type = non_blank(Some(&request.record_type)).ok_or(ValidationError::MissingField("record_type"))?;
        if request.upload.bytes.is_empty() {
            return Err(ValidationError::MissingField("file").into());
        }

        let doctor_name = match non_blank(request.doctor_name.as_deref()) {
            Some(name) => name,
            None => resolve_display_name(self.store.as_ref(), &self.limits, caller)
                .await
                .unwrap_or_else(|| DEFAULT_DOCTOR_NAME.to_string()),
        };

        let path = blob_path(Utc::now(), patient.id, &request.upload.file_name);
        let content_type = non_blank(request.upload.content_type.as_deref())
            .unwrap_or_else(|| DEFAULT_CONTENT_TYPE.to_string());
        let blob = self
            .limits
            .run(
                "blob upload",
                self.blobs.upload(&path, request.upload.bytes, &content_type),
            )
            .await?;

        let record = MedicalRecord::from_new(NewMedicalRecord {
            patient_email,
            doctor_name,
            record_type,
            record_url: blob.public_url.clone(),
        });
        match self
            .limits
            .run("record metadata insert", self.store.insert_record(record))
            .await
        {
            Ok(record) => {
                info!("Filed {} record {} for {}", record.record_type, record.id, record.patient_email);
                Ok(record)
            }
            Err(e) => {
                error!(
                    "Record metadata insert failed; blob {} at {} is orphaned: {}",
                    blob.path, blob.public_url, e
                );
                Err(PortalError::MetadataInsertFailed {
                    record_url: blob.public_url,
                    reason: e.to_string(),
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blob_store::{InMemoryBlobStore, MockBlobStore};
    use crate::storage_engine::{InMemoryStorage, MockDirectoryStore};
    use models::errors::ErrorKind;
    use models::medical::{AgeInput, Doctor, NewPatient, Patient, PatientStatus, Role};

    fn patient(email: Option<&str>) -> Patient {
        Patient::from_new(NewPatient {
            name: "Ada".to_string(),
            age: AgeInput::Number(36),
            condition: "Palpitations".to_string(),
            status: PatientStatus::Outpatient,
            contact_number: "555-0100".to_string(),
            email: email.map(str::to_string),
        })
        .unwrap()
    }

    fn doctor_caller() -> Caller {
        Caller {
            user_id: Some(Uuid::new_v4()),
            email: "sarah@clinic.test".to_string(),
            role: Some(Role::Doctor),
            display_name: None,
        }
    }

    fn request(patient_id: Uuid) -> IngestRequest {
        IngestRequest {
            patient_id,
            upload: Upload {
                file_name: "scan.PDF".to_string(),
                content_type: Some("application/pdf".to_string()),
                bytes: b"%PDF-1.7".to_vec(),
            },
            record_type: "Lab Result".to_string(),
            doctor_name: None,
        }
    }

    #[test]
    fn blob_path_keeps_safe_extension_only() {
        let now: DateTime<Utc> = "2026-01-01T00:00:00Z".parse().unwrap();
        let id = Uuid::nil();
        assert_eq!(
            blob_path(now, id, "scan.PDF"),
            format!("{}_{}.pdf", now.timestamp_millis(), id)
        );
        assert!(blob_path(now, id, "README").ends_with(".bin"));
        assert!(blob_path(now, id, "evil.p$p").ends_with(".bin"));
    }

    #[tokio::test]
    async fn ingested_record_is_visible_with_unchanged_url() {
        let store = Arc::new(InMemoryStorage::new());
        store
            .insert_doctor(Doctor::new("Dr. Sarah Wilson", "Cardiology", "sarah@clinic.test"))
            .await
            .unwrap();
        let patient = store.insert_patient(patient(Some("ada@x.com"))).await.unwrap();
        let blobs = Arc::new(InMemoryBlobStore::new("https://blobs.test"));
        let ingestion = RecordIngestion::new(
            store.clone(),
            blobs.clone(),
            Arc::new(RolesConfig::default()),
            CallLimits::default(),
        );

        let record = ingestion.ingest(&doctor_caller(), request(patient.id)).await.unwrap();
        assert_eq!(record.patient_email, "ada@x.com");
        assert_eq!(record.doctor_name, "Dr. Sarah Wilson");
        assert!(record.record_url.starts_with("https://blobs.test/"));
        assert_eq!(blobs.len().await, 1);

        let listed = store.records_for_email("ada@x.com").await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].record_url, record.record_url);
    }

    #[tokio::test]
    async fn unnamed_caller_defaults_doctor_name() {
        let store = Arc::new(InMemoryStorage::new());
        let patient = store.insert_patient(patient(Some("ada@x.com"))).await.unwrap();
        let ingestion = RecordIngestion::new(
            store,
            Arc::new(InMemoryBlobStore::new("https://blobs.test")),
            Arc::new(RolesConfig::default()),
            CallLimits::default(),
        );
        let admin = Caller {
            role: Some(Role::Admin),
            email: "root@clinic.test".to_string(),
            ..Caller::default()
        };
        let record = ingestion.ingest(&admin, request(patient.id)).await.unwrap();
        assert_eq!(record.doctor_name, DEFAULT_DOCTOR_NAME);
    }

    #[tokio::test]
    async fn patient_without_email_uploads_nothing() {
        let store = Arc::new(InMemoryStorage::new());
        let patient = store.insert_patient(patient(None)).await.unwrap();
        let mut blobs = MockBlobStore::new();
        blobs.expect_upload().never();
        let ingestion = RecordIngestion::new(
            store,
            Arc::new(blobs),
            Arc::new(RolesConfig::default()),
            CallLimits::default(),
        );
        let err = ingestion.ingest(&doctor_caller(), request(patient.id)).await.unwrap_err();
        assert!(matches!(err, PortalError::Validation(ValidationError::PatientHasNoEmail)));
    }

    #[tokio::test]
    async fn patients_may_not_ingest() {
        let store = Arc::new(InMemoryStorage::new());
        let patient = store.insert_patient(patient(Some("ada@x.com"))).await.unwrap();
        let ingestion = RecordIngestion::new(
            store,
            Arc::new(InMemoryBlobStore::new("https://blobs.test")),
            Arc::new(RolesConfig::default()),
            CallLimits::default(),
        );
        let self_service = Caller {
            role: Some(Role::Patient),
            email: "ada@x.com".to_string(),
            ..Caller::default()
        };
        let err = ingestion.ingest(&self_service, request(patient.id)).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Authorization);
        let err = ingestion.ingest(&Caller::anonymous(), request(patient.id)).await.unwrap_err();
        assert!(matches!(err, PortalError::Unauthenticated(_)));
    }

    #[tokio::test]
    async fn metadata_failure_keeps_blob_and_reports_url() {
        let row = patient(Some("ada@x.com"));
        let patient_id = row.id;
        let mut store = MockDirectoryStore::new();
        store.expect_get_patient().returning(move |_| Ok(Some(row.clone())));
        store.expect_find_doctor_by_email().returning(|_| Ok(None));
        store
            .expect_insert_record()
            .returning(|_| Err(PortalError::Storage("connection reset".to_string())));
        let blobs = Arc::new(InMemoryBlobStore::new("https://blobs.test"));
        let ingestion = RecordIngestion::new(
            Arc::new(store),
            blobs.clone(),
            Arc::new(RolesConfig::default()),
            CallLimits::default(),
        );

        let err = ingestion.ingest(&doctor_caller(), request(patient_id)).await.unwrap_err();
        let PortalError::MetadataInsertFailed { record_url, .. } = &err else {
            panic!("unexpected error: {err:?}");
        };
        assert!(record_url.starts_with("https://blobs.test/"));
        assert!(record_url.ends_with(&format!("_{}.pdf", patient_id)));
        assert_eq!(blobs.len().await, 1);
        assert_eq!(err.kind(), ErrorKind::PartialFailure);
    }
}
