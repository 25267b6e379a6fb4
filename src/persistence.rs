//! Persisted fixable values, keyed by stream name
//!
//! Values are stored as JSON under one sled key per stream. Stores are only
//! touched by explicit persist/restore requests.

use async_trait::async_trait;
use std::path::Path;
use tracing::{debug, info};

use crate::error::PersistenceError;
use crate::fixable::{FixableId, FixableValue};

/// Stored values of one stream
pub type StoredValues = Vec<(FixableId, FixableValue)>;

/// Key-value store for last-known values
#[async_trait]
pub trait ValueStore: Send + Sync {
    async fn store(&self, stream_name: &str, values: StoredValues) -> Result<(), PersistenceError>;

    /// Stored values, empty if nothing was stored for this stream
    async fn load(&self, stream_name: &str) -> Result<StoredValues, PersistenceError>;
}

/// sled-backed value store
#[derive(Clone)]
pub struct SledValueStore {
    db: sled::Db,
}

impl SledValueStore {
    /// Open (or create) the database at `path`
    pub fn open(path: impl AsRef<Path>) -> Result<Self, PersistenceError> {
        let path = path.as_ref();
        let db = sled::open(path)?;
        info!("Value store opened at: {}", path.display());
        Ok(Self { db })
    }

    fn key(stream_name: &str) -> Vec<u8> {
        format!("values/{}", stream_name).into_bytes()
    }
}

#[async_trait]
impl ValueStore for SledValueStore {
    async fn store(&self, stream_name: &str, values: StoredValues) -> Result<(), PersistenceError> {
        let json = serde_json::to_vec(&values)?;
        let db = self.db.clone();
        let key = Self::key(stream_name);
        let count = values.len();

        tokio::task::spawn_blocking(move || {
            db.insert(key, json)?;
            db.flush()?;
            Ok::<_, sled::Error>(())
        })
        .await
        .map_err(|e| PersistenceError::Task(e.to_string()))??;

        debug!("Stored {} values for stream '{}'", count, stream_name);
        Ok(())
    }

    async fn load(&self, stream_name: &str) -> Result<StoredValues, PersistenceError> {
        let db = self.db.clone();
        let key = Self::key(stream_name);

        let data = tokio::task::spawn_blocking(move || db.get(key))
            .await
            .map_err(|e| PersistenceError::Task(e.to_string()))??;

        match data {
            Some(bytes) => {
                let values: StoredValues = serde_json::from_slice(&bytes)?;
                debug!("Loaded {} values for stream '{}'", values.len(), stream_name);
                Ok(values)
            }
            None => {
                debug!("No stored values for stream '{}'", stream_name);
                Ok(Vec::new())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_load_missing_stream_is_empty() {
        let temp = tempdir().unwrap();
        let store = SledValueStore::open(temp.path().join("values.sled")).unwrap();

        assert!(store.load("envelope").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_store_and_load_per_stream() {
        let temp = tempdir().unwrap();
        let store = SledValueStore::open(temp.path().join("values.sled")).unwrap();

        let values = vec![
            (FixableId::new("size"), FixableValue::Float(42.0)),
            (FixableId::new("open"), FixableValue::Bool(true)),
        ];
        store.store("envelope", values.clone()).await.unwrap();

        assert_eq!(store.load("envelope").await.unwrap(), values);
        assert!(store.load("other").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_store_overwrites() {
        let temp = tempdir().unwrap();
        let store = SledValueStore::open(temp.path().join("values.sled")).unwrap();

        store
            .store("s", vec![(FixableId::new("a"), FixableValue::Float(1.0))])
            .await
            .unwrap();
        store
            .store("s", vec![(FixableId::new("a"), FixableValue::Float(2.0))])
            .await
            .unwrap();

        assert_eq!(
            store.load("s").await.unwrap(),
            vec![(FixableId::new("a"), FixableValue::Float(2.0))]
        );
    }
}
