//! Document store collaborator
//!
//! Keyed records by collection/id with upsert-merge semantics. No
//! transactions, no schema enforcement; aggregates serialize to JSON
//! documents and back.

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;
use sqlx::PgPool;
use std::collections::{BTreeMap, HashMap};
use uuid::Uuid;
use crate::{Result, SnazzError};

#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn get_collection(&self, collection: &str) -> Result<Vec<Value>>;
    async fn get_document(&self, collection: &str, id: &str) -> Result<Option<Value>>;
    /// Upsert with shallow merge: object fields in `document` overwrite the
    /// stored fields, everything else in the stored document survives.
    /// Returns the document id (generated when `id` is `None`).
    async fn save_document(&self, collection: &str, document: Value, id: Option<&str>) -> Result<String>;
    async fn delete_document(&self, collection: &str, id: &str) -> Result<()>;
}

// =============================================================================
// Postgres implementation
// =============================================================================

/// Single-table JSONB document store. `data || excluded.data` gives the
/// shallow-merge upsert the interface promises.
#[derive(Clone)]
pub struct PgDocumentStore {
    pool: PgPool,
}

impl PgDocumentStore {
    pub fn new(pool: PgPool) -> Self { Self { pool } }
}

fn storage_err(e: sqlx::Error) -> SnazzError { SnazzError::Storage(e.to_string()) }

#[async_trait]
impl DocumentStore for PgDocumentStore {
    async fn get_collection(&self, collection: &str) -> Result<Vec<Value>> {
        sqlx::query_scalar::<_, Value>(
            "SELECT data FROM documents WHERE collection = $1 ORDER BY created_at DESC",
        )
        .bind(collection)
        .fetch_all(&self.pool)
        .await
        .map_err(storage_err)
    }

    async fn get_document(&self, collection: &str, id: &str) -> Result<Option<Value>> {
        sqlx::query_scalar::<_, Value>("SELECT data FROM documents WHERE collection = $1 AND id = $2")
            .bind(collection)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage_err)
    }

    async fn save_document(&self, collection: &str, document: Value, id: Option<&str>) -> Result<String> {
        let id = id.map(str::to_string).unwrap_or_else(|| Uuid::now_v7().to_string());
        sqlx::query(
            "INSERT INTO documents (collection, id, data) VALUES ($1, $2, $3) \
             ON CONFLICT (collection, id) DO UPDATE SET data = documents.data || EXCLUDED.data, updated_at = NOW()",
        )
        .bind(collection)
        .bind(&id)
        .bind(&document)
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;
        Ok(id)
    }

    async fn delete_document(&self, collection: &str, id: &str) -> Result<()> {
        sqlx::query("DELETE FROM documents WHERE collection = $1 AND id = $2")
            .bind(collection)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(storage_err)?;
        Ok(())
    }
}

// =============================================================================
// In-memory implementation
// =============================================================================

/// Map-backed store for tests and local development. Mirrors the Postgres
/// merge semantics.
#[derive(Default)]
pub struct MemoryDocumentStore {
    collections: RwLock<HashMap<String, BTreeMap<String, Value>>>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self { Self::default() }
}

fn merge_shallow(stored: &mut Value, incoming: Value) {
    match (stored, incoming) {
        (Value::Object(stored), Value::Object(incoming)) => {
            for (k, v) in incoming {
                stored.insert(k, v);
            }
        }
        (stored, incoming) => *stored = incoming,
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn get_collection(&self, collection: &str) -> Result<Vec<Value>> {
        Ok(self
            .collections
            .read()
            .get(collection)
            .map(|docs| docs.values().cloned().collect())
            .unwrap_or_default())
    }

    async fn get_document(&self, collection: &str, id: &str) -> Result<Option<Value>> {
        Ok(self
            .collections
            .read()
            .get(collection)
            .and_then(|docs| docs.get(id).cloned()))
    }

    async fn save_document(&self, collection: &str, document: Value, id: Option<&str>) -> Result<String> {
        let id = id.map(str::to_string).unwrap_or_else(|| Uuid::now_v7().to_string());
        let mut collections = self.collections.write();
        let docs = collections.entry(collection.to_string()).or_default();
        match docs.get_mut(&id) {
            Some(stored) => merge_shallow(stored, document),
            None => {
                docs.insert(id.clone(), document);
            }
        }
        Ok(id)
    }

    async fn delete_document(&self, collection: &str, id: &str) -> Result<()> {
        if let Some(docs) = self.collections.write().get_mut(collection) {
            docs.remove(id);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_save_and_get() {
        let store = MemoryDocumentStore::new();
        let id = store
            .save_document("orders", json!({"customerName": "Asha"}), None)
            .await
            .unwrap();
        let doc = store.get_document("orders", &id).await.unwrap().unwrap();
        assert_eq!(doc["customerName"], "Asha");
        assert!(store.get_document("orders", "missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_upsert_merges_shallowly() {
        let store = MemoryDocumentStore::new();
        store
            .save_document("orders", json!({"customerName": "Asha", "isRead": false}), Some("o1"))
            .await
            .unwrap();
        store
            .save_document("orders", json!({"isRead": true}), Some("o1"))
            .await
            .unwrap();
        let doc = store.get_document("orders", "o1").await.unwrap().unwrap();
        assert_eq!(doc["customerName"], "Asha");
        assert_eq!(doc["isRead"], true);
    }

    #[tokio::test]
    async fn test_delete() {
        let store = MemoryDocumentStore::new();
        store.save_document("leads", json!({"a": 1}), Some("l1")).await.unwrap();
        store.delete_document("leads", "l1").await.unwrap();
        assert!(store.get_document("leads", "l1").await.unwrap().is_none());
        assert!(store.get_collection("leads").await.unwrap().is_empty());
    }
}
