// lib/src/storage_engine/mod.rs

pub mod directory_store;
pub mod inmemory_storage;
pub mod sled_storage;

pub use directory_store::DirectoryStore;
#[cfg(test)]
pub use directory_store::MockDirectoryStore;
pub use inmemory_storage::InMemoryStorage;
pub use sled_storage::{open_sled_db, SledStorage};

use log::{info, warn};
use serde::Deserialize;
use std::path::PathBuf;
use std::sync::Arc;

use models::errors::PortalResult;

pub const DEFAULT_DATA_DIRECTORY: &str = "./data/clinic_portal";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageEngineType {
    #[serde(alias = "inmemory", alias = "in_memory")]
    Memory,
    #[default]
    Sled,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub engine: StorageEngineType,
    #[serde(default = "default_data_directory")]
    pub data_directory: PathBuf,
}

fn default_data_directory() -> PathBuf {
    PathBuf::from(DEFAULT_DATA_DIRECTORY)
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig {
            engine: StorageEngineType::default(),
            data_directory: default_data_directory(),
        }
    }
}

/// Handles for everything that persists: the directory plus, for sled, the
/// open database so the account store can share it.
pub struct OpenedStorage {
    pub directory: Arc<dyn DirectoryStore>,
    pub sled_db: Option<sled::Db>,
}

/// Creates the directory store named by `config`. Sled is the default engine;
/// the in-memory engine is for tests and throwaway runs.
pub fn create_storage(config: &StorageConfig) -> PortalResult<OpenedStorage> {
    let opened = match config.engine {
        StorageEngineType::Sled => {
            let db = open_sled_db(&config.data_directory)?;
            let directory = Arc::new(SledStorage::new(&db)?) as Arc<dyn DirectoryStore>;
            OpenedStorage {
                directory,
                sled_db: Some(db),
            }
        }
        StorageEngineType::Memory => {
            warn!("Using in-memory directory store; data is lost on exit");
            OpenedStorage {
                directory: Arc::new(InMemoryStorage::new()),
                sled_db: None,
            }
        }
    };
    info!("Opened {} directory store", opened.directory.get_type());
    Ok(opened)
}
