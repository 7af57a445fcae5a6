//! Document store capability trait and in-memory implementation.
//!
//! The persistent store is an external collaborator: the core only needs
//! point CRUD against a local document collection. [`DocumentStore`] is
//! that seam. Production wires a real driver behind it; tests and
//! standalone mode use [`InMemoryStore`].
//!
//! Two handles onto the same logical collection exist per entity kind: an
//! authoritative one (primary, always current) and a follower-preferred
//! one (may lag). The trait does not distinguish them - routing between
//! handles is the [`ReadRouter`](crate::router::ReadRouter)'s job.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use thiserror::Error;
use tokio::sync::RwLock;

/// Result type for store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Errors from the document store.
#[derive(Error, Debug, Clone)]
pub enum StoreError {
    /// An insert conflicted with an existing record for the same id.
    ///
    /// On the replica apply path this means another writer got there
    /// first and convergence is already achieved; the consumer collapses
    /// it into success.
    #[error("duplicate key: record '{id}' already exists")]
    DuplicateKey { id: String },

    /// The store is temporarily unreachable. Retryable.
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    /// Check if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::DuplicateKey { .. } => false,
            Self::Unavailable(_) => true,
        }
    }
}

/// A storable catalog entity: anything with a stable string id.
pub trait Document: Clone + Send + Sync + 'static {
    fn id(&self) -> &str;
}

impl Document for crate::model::Category {
    fn id(&self) -> &str {
        &self.id
    }
}

impl Document for crate::model::Product {
    fn id(&self) -> &str {
        &self.id
    }
}

/// Point CRUD against one local document collection.
///
/// Implementations must be safe for concurrent use; every method is a
/// suspension point and nothing else in the core blocks.
#[async_trait]
pub trait DocumentStore<T: Document>: Send + Sync {
    /// Point lookup by id.
    async fn get(&self, id: &str) -> StoreResult<Option<T>>;

    /// Full scan of the collection.
    async fn list(&self) -> StoreResult<Vec<T>>;

    /// Insert a new record. Fails with [`StoreError::DuplicateKey`] if a
    /// record with the same id already exists.
    async fn insert(&self, doc: T) -> StoreResult<()>;

    /// Replace an existing record. Returns `false` if no record with
    /// that id existed (nothing written).
    async fn replace(&self, doc: T) -> StoreResult<bool>;

    /// Insert-or-overwrite, unconditional.
    async fn upsert(&self, doc: T) -> StoreResult<()>;

    /// Delete by id. Returns `false` if the record was already absent.
    async fn delete(&self, id: &str) -> StoreResult<bool>;

    /// Whether any record matches the predicate. Used for the dependent-
    /// products check guarding category deletes.
    async fn any_match(
        &self,
        predicate: &(dyn for<'a> Fn(&'a T) -> bool + Send + Sync),
    ) -> StoreResult<bool>;
}

/// In-memory document store for tests and standalone mode.
///
/// Supports fault injection: [`fail_next`](Self::fail_next) makes the
/// next N operations fail with [`StoreError::Unavailable`], for
/// exercising retry and rollback paths.
pub struct InMemoryStore<T> {
    records: RwLock<HashMap<String, T>>,
    fail_next: AtomicUsize,
}

impl<T> InMemoryStore<T> {
    pub fn new() -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
            fail_next: AtomicUsize::new(0),
        }
    }

    /// Make the next `n` operations fail with `Unavailable`.
    pub fn fail_next(&self, n: usize) {
        self.fail_next.store(n, Ordering::SeqCst);
    }

    fn check_fault(&self) -> StoreResult<()> {
        let remaining = self.fail_next.load(Ordering::SeqCst);
        if remaining > 0
            && self
                .fail_next
                .compare_exchange(remaining, remaining - 1, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
        {
            return Err(StoreError::Unavailable("injected fault".into()));
        }
        Ok(())
    }

    /// Number of records currently held.
    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

impl<T> Default for InMemoryStore<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<T: Document> DocumentStore<T> for InMemoryStore<T> {
    async fn get(&self, id: &str) -> StoreResult<Option<T>> {
        self.check_fault()?;
        Ok(self.records.read().await.get(id).cloned())
    }

    async fn list(&self) -> StoreResult<Vec<T>> {
        self.check_fault()?;
        Ok(self.records.read().await.values().cloned().collect())
    }

    async fn insert(&self, doc: T) -> StoreResult<()> {
        self.check_fault()?;
        let mut records = self.records.write().await;
        let id = doc.id().to_string();
        if records.contains_key(&id) {
            return Err(StoreError::DuplicateKey { id });
        }
        records.insert(id, doc);
        Ok(())
    }

    async fn replace(&self, doc: T) -> StoreResult<bool> {
        self.check_fault()?;
        let mut records = self.records.write().await;
        let id = doc.id().to_string();
        if !records.contains_key(&id) {
            return Ok(false);
        }
        records.insert(id, doc);
        Ok(true)
    }

    async fn upsert(&self, doc: T) -> StoreResult<()> {
        self.check_fault()?;
        let mut records = self.records.write().await;
        records.insert(doc.id().to_string(), doc);
        Ok(())
    }

    async fn delete(&self, id: &str) -> StoreResult<bool> {
        self.check_fault()?;
        Ok(self.records.write().await.remove(id).is_some())
    }

    async fn any_match(
        &self,
        predicate: &(dyn for<'a> Fn(&'a T) -> bool + Send + Sync),
    ) -> StoreResult<bool> {
        self.check_fault()?;
        let records = self.records.read().await;
        Ok(records.values().any(|d| predicate(d)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Category;

    fn category(id: &str, name: &str) -> Category {
        Category {
            id: id.into(),
            name: name.into(),
            description: None,
            last_changed: chrono::Utc::now(),
        }
    }

    #[tokio::test]
    async fn insert_then_get() {
        let store = InMemoryStore::new();
        store.insert(category("c1", "Laptops")).await.unwrap();

        let found = store.get("c1").await.unwrap().unwrap();
        assert_eq!(found.name, "Laptops");
        assert!(store.get("c2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn insert_conflict_reports_duplicate_key() {
        let store = InMemoryStore::new();
        store.insert(category("c1", "Laptops")).await.unwrap();

        let err = store.insert(category("c1", "Desktops")).await.unwrap_err();
        assert!(matches!(err, StoreError::DuplicateKey { ref id } if id == "c1"));
        assert!(!err.is_retryable());

        // The original record is untouched
        assert_eq!(store.get("c1").await.unwrap().unwrap().name, "Laptops");
    }

    #[tokio::test]
    async fn replace_missing_is_noop() {
        let store = InMemoryStore::new();
        assert!(!store.replace(category("c1", "Laptops")).await.unwrap());
        assert!(store.get("c1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn upsert_inserts_then_overwrites() {
        let store = InMemoryStore::new();
        store.upsert(category("c1", "Laptops")).await.unwrap();
        store.upsert(category("c1", "Desktops")).await.unwrap();

        assert_eq!(store.get("c1").await.unwrap().unwrap().name, "Desktops");
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let store = InMemoryStore::new();
        store.insert(category("c1", "Laptops")).await.unwrap();

        assert!(store.delete("c1").await.unwrap());
        assert!(!store.delete("c1").await.unwrap());
    }

    #[tokio::test]
    async fn any_match_predicate() {
        let store = InMemoryStore::new();
        store.insert(category("c1", "Laptops")).await.unwrap();
        store.insert(category("c2", "Desktops")).await.unwrap();

        assert!(store.any_match(&|c: &Category| c.name == "Laptops").await.unwrap());
        assert!(!store.any_match(&|c: &Category| c.name == "Phones").await.unwrap());
    }

    #[tokio::test]
    async fn fault_injection_fails_then_recovers() {
        let store = InMemoryStore::new();
        store.fail_next(2);

        assert!(matches!(
            store.insert(category("c1", "Laptops")).await,
            Err(StoreError::Unavailable(_))
        ));
        assert!(store.get("c1").await.is_err());

        // Third operation succeeds
        store.insert(category("c1", "Laptops")).await.unwrap();
    }
}
