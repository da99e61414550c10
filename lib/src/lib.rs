// lib/src/lib.rs
//! The clinic portal core: booking, access scoping, record ingestion and the
//! dashboard, running against a [`storage_engine::DirectoryStore`].

pub mod access;
pub mod blob_store;
pub mod booking;
pub mod dashboard;
pub mod directory;
pub mod ingestion;
pub mod notifications;
pub mod storage_engine;
pub mod util;

use models::timestamps::Zone;
use std::sync::Arc;

use security::{IdentityOracle, RolesConfig};

pub use access::{resolve_display_name, AccessScoper};
pub use blob_store::{BlobStore, BlobStoreConfig, FsBlobStore, HttpBlobStore, InMemoryBlobStore, StoredBlob};
pub use booking::{BookingEngine, BookingOutcome};
pub use dashboard::DashboardAggregator;
pub use directory::{DoctorSeed, StaffDirectory};
pub use ingestion::{blob_path, IngestRequest, RecordIngestion, Upload, DEFAULT_DOCTOR_NAME};
pub use notifications::{
    LogNotificationSink, Notification, NotificationConfig, NotificationSink, Notifier, WebhookNotificationSink,
};
pub use storage_engine::{create_storage, DirectoryStore, InMemoryStorage, SledStorage, StorageConfig, StorageEngineType};
pub use util::CallLimits;

/// The collaborators every service is built from.
#[derive(Clone)]
pub struct ClinicDeps {
    pub store: Arc<dyn DirectoryStore>,
    pub identity: Arc<dyn IdentityOracle>,
    pub blobs: Arc<dyn BlobStore>,
    pub notifications: Arc<dyn NotificationSink>,
    pub roles: Arc<RolesConfig>,
    pub limits: CallLimits,
    pub server_zone: Zone,
}

#[derive(Clone)]
pub struct ClinicServices {
    pub booking: BookingEngine,
    pub access: AccessScoper,
    pub ingestion: RecordIngestion,
    pub dashboard: DashboardAggregator,
    pub directory: StaffDirectory,
}

impl ClinicServices {
    pub fn new(deps: ClinicDeps) -> Self {
        let notifier = Notifier::new(deps.notifications.clone(), deps.limits);
        ClinicServices {
            booking: BookingEngine::new(
                deps.store.clone(),
                deps.identity.clone(),
                notifier,
                deps.roles.clone(),
                deps.limits,
                deps.server_zone,
            ),
            access: AccessScoper::new(deps.store.clone(), deps.limits),
            ingestion: RecordIngestion::new(deps.store.clone(), deps.blobs.clone(), deps.roles.clone(), deps.limits),
            dashboard: DashboardAggregator::new(deps.store.clone(), deps.limits, deps.server_zone),
            directory: StaffDirectory::new(deps.store, deps.roles, deps.limits),
        }
    }
}
