use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::Mutex;

/// Collection holding the authoritative student records.
pub const STUDENTS: &str = "students";

#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct StoreError(pub String);

#[derive(Debug, Clone)]
pub struct StoredDoc {
    pub id: String,
    pub data: Value,
}

/// Interface over the backing document database. Collections are addressed
/// by name; hierarchical paths are expressed as slash-joined collection
/// names. Only field-equality queries are used by this core.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn get_doc(&self, collection: &str, id: &str) -> Result<Option<Value>, StoreError>;

    async fn query_eq(
        &self,
        collection: &str,
        field: &str,
        value: &str,
    ) -> Result<Vec<StoredDoc>, StoreError>;

    /// With `merge` set, fields absent from `data` survive on the stored
    /// document; otherwise the document is replaced.
    async fn set_doc(
        &self,
        collection: &str,
        id: &str,
        data: &Value,
        merge: bool,
    ) -> Result<(), StoreError>;

    async fn add_doc(&self, collection: &str, data: &Value) -> Result<String, StoreError>;

    /// Opaque timestamp token resolved by the store to a point in time.
    async fn server_timestamp(&self) -> Result<Value, StoreError>;
}

/// In-memory adapter used by the test suite and offline demos.
#[derive(Default)]
pub struct MemoryStore {
    collections: Mutex<HashMap<String, BTreeMap<String, Value>>>,
    next_id: std::sync::atomic::AtomicU64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn doc_count(&self, collection: &str) -> usize {
        self.collections
            .lock()
            .await
            .get(collection)
            .map_or(0, BTreeMap::len)
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn get_doc(&self, collection: &str, id: &str) -> Result<Option<Value>, StoreError> {
        Ok(self
            .collections
            .lock()
            .await
            .get(collection)
            .and_then(|docs| docs.get(id))
            .cloned())
    }

    async fn query_eq(
        &self,
        collection: &str,
        field: &str,
        value: &str,
    ) -> Result<Vec<StoredDoc>, StoreError> {
        let collections = self.collections.lock().await;
        let Some(docs) = collections.get(collection) else {
            return Ok(Vec::new());
        };
        Ok(docs
            .iter()
            .filter(|(_, data)| data.get(field).and_then(Value::as_str) == Some(value))
            .map(|(id, data)| StoredDoc {
                id: id.clone(),
                data: data.clone(),
            })
            .collect())
    }

    async fn set_doc(
        &self,
        collection: &str,
        id: &str,
        data: &Value,
        merge: bool,
    ) -> Result<(), StoreError> {
        let mut collections = self.collections.lock().await;
        let docs = collections.entry(collection.to_string()).or_default();
        match docs.get_mut(id) {
            Some(existing) if merge => {
                if let (Some(target), Some(incoming)) = (existing.as_object_mut(), data.as_object())
                {
                    for (key, value) in incoming {
                        target.insert(key.clone(), value.clone());
                    }
                } else {
                    *existing = data.clone();
                }
            }
            _ => {
                docs.insert(id.to_string(), data.clone());
            }
        }
        Ok(())
    }

    async fn add_doc(&self, collection: &str, data: &Value) -> Result<String, StoreError> {
        let n = self
            .next_id
            .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        let id = format!("mem-{n}");
        self.set_doc(collection, &id, data, false).await?;
        Ok(id)
    }

    async fn server_timestamp(&self) -> Result<Value, StoreError> {
        Ok(Value::String(Utc::now().to_rfc3339()))
    }
}
