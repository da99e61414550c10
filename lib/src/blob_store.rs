// lib/src/blob_store.rs
//! Where uploaded medical record files go. The store hands back a public URL
//! that is recorded as-is in the record metadata.

use async_trait::async_trait;
use log::{debug, error};
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::RwLock;

use models::errors::{PortalError, PortalResult};

/// A stored upload: the path inside the store and the durable URL clients
/// fetch it from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredBlob {
    pub path: String,
    pub public_url: String,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BlobStore: Send + Sync + 'static {
    async fn upload(&self, path: &str, bytes: Vec<u8>, content_type: &str) -> PortalResult<StoredBlob>;
    fn public_url(&self, path: &str) -> String;
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum BlobStoreConfig {
    Filesystem {
        root: PathBuf,
        public_base_url: String,
    },
    Http {
        upload_url: String,
        public_base_url: String,
        #[serde(default)]
        api_key: Option<String>,
    },
    Memory {
        public_base_url: String,
    },
}

impl Default for BlobStoreConfig {
    fn default() -> Self {
        BlobStoreConfig::Filesystem {
            root: PathBuf::from("./data/medical-records"),
            public_base_url: "http://localhost:8082/files".to_string(),
        }
    }
}

impl BlobStoreConfig {
    pub fn build(&self) -> Arc<dyn BlobStore> {
        match self {
            BlobStoreConfig::Filesystem { root, public_base_url } => {
                Arc::new(FsBlobStore::new(root.clone(), public_base_url))
            }
            BlobStoreConfig::Http {
                upload_url,
                public_base_url,
                api_key,
            } => Arc::new(HttpBlobStore::new(upload_url, public_base_url, api_key.clone())),
            BlobStoreConfig::Memory { public_base_url } => Arc::new(InMemoryBlobStore::new(public_base_url)),
        }
    }
}

fn join_url(base: &str, path: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/'))
}

fn stored<S: BlobStore + ?Sized>(store: &S, path: &str) -> StoredBlob {
    StoredBlob {
        path: path.to_string(),
        public_url: store.public_url(path),
    }
}

/// Writes files under a local directory that a static file server exposes.
pub struct FsBlobStore {
    root: PathBuf,
    public_base_url: String,
}

impl FsBlobStore {
    pub fn new(root: PathBuf, public_base_url: &str) -> Self {
        FsBlobStore {
            root,
            public_base_url: public_base_url.to_string(),
        }
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn upload(&self, path: &str, bytes: Vec<u8>, _content_type: &str) -> PortalResult<StoredBlob> {
        tokio::fs::create_dir_all(&self.root).await?;
        let target = self.root.join(path);
        tokio::fs::write(&target, bytes).await.map_err(|e| {
            error!("Failed to write blob {:?}: {}", target, e);
            PortalError::upstream("blob upload", e.to_string())
        })?;
        debug!("Stored blob at {:?}", target);
        Ok(stored(self, path))
    }

    fn public_url(&self, path: &str) -> String {
        join_url(&self.public_base_url, path)
    }
}

/// PUTs files to an object storage endpoint.
pub struct HttpBlobStore {
    http_client: Client,
    upload_url: String,
    public_base_url: String,
    api_key: Option<String>,
}

impl HttpBlobStore {
    pub fn new(upload_url: &str, public_base_url: &str, api_key: Option<String>) -> Self {
        HttpBlobStore {
            http_client: Client::new(),
            upload_url: upload_url.to_string(),
            public_base_url: public_base_url.to_string(),
            api_key,
        }
    }
}

#[async_trait]
impl BlobStore for HttpBlobStore {
    async fn upload(&self, path: &str, bytes: Vec<u8>, content_type: &str) -> PortalResult<StoredBlob> {
        let mut request = self
            .http_client
            .put(join_url(&self.upload_url, path))
            .header("Content-Type", content_type)
            .body(bytes);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }
        let response = request
            .send()
            .await
            .map_err(|e| PortalError::upstream("blob upload", e.to_string()))?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            error!("Blob upload of {} failed with {}: {}", path, status, body);
            return Err(PortalError::upstream("blob upload", format!("HTTP {}", status)));
        }
        Ok(stored(self, path))
    }

    fn public_url(&self, path: &str) -> String {
        join_url(&self.public_base_url, path)
    }
}

/// Keeps uploads in memory, for tests and throwaway runs.
pub struct InMemoryBlobStore {
    public_base_url: String,
    blobs: RwLock<HashMap<String, (Vec<u8>, String)>>,
}

impl InMemoryBlobStore {
    pub fn new(public_base_url: &str) -> Self {
        InMemoryBlobStore {
            public_base_url: public_base_url.to_string(),
            blobs: RwLock::new(HashMap::new()),
        }
    }

    pub async fn get(&self, path: &str) -> Option<(Vec<u8>, String)> {
        self.blobs.read().await.get(path).cloned()
    }

    pub async fn len(&self) -> usize {
        self.blobs.read().await.len()
    }
}

#[async_trait]
impl BlobStore for InMemoryBlobStore {
    async fn upload(&self, path: &str, bytes: Vec<u8>, content_type: &str) -> PortalResult<StoredBlob> {
        self.blobs
            .write()
            .await
            .insert(path.to_string(), (bytes, content_type.to_string()));
        Ok(stored(self, path))
    }

    fn public_url(&self, path: &str) -> String {
        join_url(&self.public_base_url, path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn filesystem_store_writes_under_root() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsBlobStore::new(dir.path().to_path_buf(), "https://files.test/records/");
        let blob = store
            .upload("1700000000000_abc.pdf", b"%PDF".to_vec(), "application/pdf")
            .await
            .unwrap();
        assert_eq!(blob.path, "1700000000000_abc.pdf");
        assert_eq!(blob.public_url, "https://files.test/records/1700000000000_abc.pdf");
        let written = std::fs::read(dir.path().join("1700000000000_abc.pdf")).unwrap();
        assert_eq!(written, b"%PDF");
    }

    #[test]
    fn config_selects_store_kind() {
        let config: BlobStoreConfig = serde_json::from_value(serde_json::json!({
            "kind": "memory",
            "public_base_url": "https://blobs.test"
        }))
        .unwrap();
        let store = config.build();
        assert_eq!(store.public_url("a.png"), "https://blobs.test/a.png");
    }
}
