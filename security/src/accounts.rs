// security/src/accounts.rs
use async_trait::async_trait;
use bincode::{
    config::{self, BigEndian, Configuration, Fixint},
    serde::{decode_from_slice, encode_to_vec},
};
use serde::{Deserialize, Serialize};
use sled::{Db, Tree};
use std::collections::HashMap;
use tokio::sync::RwLock;

use models::medical::IdentityAccount;

use crate::AuthError;

/// An account row together with its password hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredAccount {
    pub account: IdentityAccount,
    pub password_hash: String,
}

/// Persistence for identity accounts, keyed by normalized email.
#[async_trait]
pub trait AccountStore: Send + Sync + 'static {
    /// Inserts an account unless one already exists for its email. The check
    /// and the write are a single atomic step: of two concurrent inserts for
    /// the same email exactly one succeeds.
    async fn insert_new(&self, account: StoredAccount) -> Result<(), AuthError>;
    async fn get_by_email(&self, email: &str) -> Result<Option<StoredAccount>, AuthError>;
}

#[derive(Debug, Default)]
pub struct InMemoryAccountStore {
    accounts: RwLock<HashMap<String, StoredAccount>>,
}

#[async_trait]
impl AccountStore for InMemoryAccountStore {
    async fn insert_new(&self, account: StoredAccount) -> Result<(), AuthError> {
        let mut accounts = self.accounts.write().await;
        let email = account.account.email.clone();
        if accounts.contains_key(&email) {
            return Err(AuthError::AccountExists(email));
        }
        accounts.insert(email, account);
        Ok(())
    }

    async fn get_by_email(&self, email: &str) -> Result<Option<StoredAccount>, AuthError> {
        Ok(self.accounts.read().await.get(email).cloned())
    }
}

/// Sled-backed implementation of the `AccountStore` trait.
pub struct SledAccountStore {
    tree: Tree,
    config: Configuration<BigEndian, Fixint>,
}

impl SledAccountStore {
    /// Opens the "accounts" tree of `db`.
    pub fn new(db: &Db) -> Result<Self, AuthError> {
        let tree = db
            .open_tree("accounts")
            .map_err(|e| AuthError::StorageError(format!("Failed to open accounts tree: {}", e)))?;
        Ok(Self {
            tree,
            config: bincode_config(),
        })
    }
}

/// Provides a standard bincode configuration.
fn bincode_config() -> Configuration<BigEndian, Fixint> {
    config::standard().with_big_endian().with_fixed_int_encoding()
}

#[async_trait]
impl AccountStore for SledAccountStore {
    async fn insert_new(&self, account: StoredAccount) -> Result<(), AuthError> {
        let email = account.account.email.clone();
        let bytes = encode_to_vec(&account, self.config)
            .map_err(|e| AuthError::StorageError(format!("Failed to encode account: {}", e)))?;
        let swapped = self
            .tree
            .compare_and_swap(email.as_bytes(), None as Option<&[u8]>, Some(bytes))
            .map_err(|e| AuthError::StorageError(e.to_string()))?;
        if swapped.is_err() {
            return Err(AuthError::AccountExists(email));
        }
        self.tree
            .flush_async()
            .await
            .map_err(|e| AuthError::StorageError(e.to_string()))?;
        Ok(())
    }

    async fn get_by_email(&self, email: &str) -> Result<Option<StoredAccount>, AuthError> {
        match self
            .tree
            .get(email.as_bytes())
            .map_err(|e| AuthError::StorageError(e.to_string()))?
        {
            Some(bytes) => {
                let (stored, _): (StoredAccount, usize) = decode_from_slice(&bytes, self.config)
                    .map_err(|e| AuthError::StorageError(format!("Failed to decode account: {}", e)))?;
                Ok(Some(stored))
            }
            None => Ok(None),
        }
    }
}
