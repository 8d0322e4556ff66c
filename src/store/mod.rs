pub mod keys;
pub mod migrate;
pub mod operations;
pub mod trees;

use serde::de::DeserializeOwned;
use serde::Serialize;
use sled::Db;
use thiserror::Error;

/// Document store for the marketplace. Each collection lives in its own sled tree
/// and documents are stored as camelCase JSON.
#[derive(Debug)]
pub struct Store {
    db: Db,
    pub users: sled::Tree,
    pub listings: sled::Tree,
    pub reviews: sled::Tree,
    pub payments: sled::Tree,
    pub subjects: sled::Tree,
    pub meta: sled::Tree,
    // Secondary index trees
    pub listings_by_owner: sled::Tree,
    pub reviews_by_payment: sled::Tree,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sled error: {0}")]
    Sled(#[from] sled::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("not found: entity={entity}, key={key}")]
    NotFound { entity: String, key: String },
    #[error("conflict: entity={entity}, key={key}")]
    Conflict { entity: String, key: String },
    #[error("validation error: {0}")]
    Validation(String),
    #[error("migration error at version {version}: {message}")]
    Migration { version: u32, message: String },
}

impl StoreError {
    pub fn not_found(entity: &str, key: &str) -> Self {
        Self::NotFound {
            entity: entity.to_string(),
            key: key.to_string(),
        }
    }
}

impl Store {
    pub fn open(sled_path: &str) -> Result<Self, StoreError> {
        let db = sled::open(sled_path)?;
        let users = db.open_tree(trees::USERS)?;
        let listings = db.open_tree(trees::LISTINGS)?;
        let reviews = db.open_tree(trees::REVIEWS)?;
        let payments = db.open_tree(trees::PAYMENTS)?;
        let subjects = db.open_tree(trees::SUBJECTS)?;
        let meta = db.open_tree(trees::META)?;
        let listings_by_owner = db.open_tree(trees::LISTINGS_BY_OWNER)?;
        let reviews_by_payment = db.open_tree(trees::REVIEWS_BY_PAYMENT)?;

        Ok(Self {
            db,
            users,
            listings,
            reviews,
            payments,
            subjects,
            meta,
            listings_by_owner,
            reviews_by_payment,
        })
    }

    pub fn run_migrations(&self) -> Result<(), StoreError> {
        migrate::run(self)
    }

    pub fn flush(&self) -> Result<(), StoreError> {
        self.db.flush()?;
        Ok(())
    }

    pub fn raw_db(&self) -> &Db {
        &self.db
    }

    pub(crate) fn serialize<T: Serialize>(value: &T) -> Result<Vec<u8>, StoreError> {
        Ok(serde_json::to_vec(value)?)
    }

    pub(crate) fn deserialize<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, StoreError> {
        Ok(serde_json::from_slice(bytes)?)
    }

    pub(crate) fn get_doc<T: DeserializeOwned>(
        tree: &sled::Tree,
        key: &str,
    ) -> Result<Option<T>, StoreError> {
        match tree.get(key.as_bytes())? {
            Some(raw) => Ok(Some(Self::deserialize(&raw)?)),
            None => Ok(None),
        }
    }

    pub(crate) fn put_doc<T: Serialize>(
        tree: &sled::Tree,
        key: &str,
        value: &T,
    ) -> Result<(), StoreError> {
        tree.insert(key.as_bytes(), Self::serialize(value)?)?;
        Ok(())
    }
}
