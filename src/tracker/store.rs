//! Storage seam for endorsement histories
//!
//! The tracker talks to a `HistoryStore` rather than MongoDB directly:
//! the production implementation wraps a typed Mongo collection, and an
//! in-memory implementation backs dev mode and the service tests.

use async_trait::async_trait;
use bson::{doc, DateTime};
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::db::schemas::{EndorsementHistoryDoc, Metadata};
use crate::db::MongoCollection;
use crate::types::{Result, TrackerError};

/// Async access to endorsement history documents
///
/// Writes are compare-and-swap: `replace` only lands when the stored
/// revision still equals `expected_revision`, closing the lost-update
/// window between read and write. Losing a race is a `Conflict`; there is
/// no automatic retry.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// Fetch a history by its composite key
    async fn get(&self, history_id: &str) -> Result<Option<EndorsementHistoryDoc>>;

    /// All histories belonging to a user
    async fn list_for_user(&self, user_id: &str) -> Result<Vec<EndorsementHistoryDoc>>;

    /// Insert a fresh history
    ///
    /// A purged history keeps its composite key as a tombstone; inserting
    /// over one reclaims the key. Conflicts only if a live history already
    /// holds it.
    async fn insert(&self, doc: EndorsementHistoryDoc) -> Result<()>;

    /// Replace a history if its stored revision matches
    ///
    /// `doc` carries the incremented revision; `expected_revision` is the
    /// revision the caller read.
    async fn replace(&self, doc: EndorsementHistoryDoc, expected_revision: i64) -> Result<()>;

    /// Soft-delete every history of a user (account deletion), returning
    /// the number of records affected
    async fn purge_user(&self, user_id: &str) -> Result<u64>;
}

/// MongoDB-backed store
pub struct MongoHistoryStore {
    collection: MongoCollection<EndorsementHistoryDoc>,
}

impl MongoHistoryStore {
    pub fn new(collection: MongoCollection<EndorsementHistoryDoc>) -> Self {
        Self { collection }
    }

    /// Take over the key of a purged history
    ///
    /// A purged document keeps its composite `_id`, so a plain insert after
    /// re-endorsement hits a duplicate key. The fresh document replaces the
    /// tombstone and continues its revision sequence, so writers still
    /// holding a pre-purge copy fail their compare-and-swap.
    async fn reclaim_tombstone(&self, mut doc: EndorsementHistoryDoc) -> Result<()> {
        let id = doc.id();

        let tombstone = self
            .collection
            .inner()
            .find_one(doc! { "_id": &id, "metadata.is_deleted": true })
            .await
            .map_err(|e| TrackerError::Database(format!("Find failed: {}", e)))?;

        let Some(tombstone) = tombstone else {
            // A live document owns the key
            return Err(TrackerError::Conflict(format!("Duplicate key: {}", id)));
        };

        doc.revision = tombstone.revision + 1;
        doc.metadata = Metadata::new();

        let replaced = self
            .collection
            .inner()
            .find_one_and_replace(
                doc! {
                    "_id": &id,
                    "revision": tombstone.revision,
                    "metadata.is_deleted": true,
                },
                doc,
            )
            .await
            .map_err(|e| TrackerError::Database(format!("Replace failed: {}", e)))?;

        match replaced {
            Some(_) => Ok(()),
            None => Err(TrackerError::Conflict(format!("Duplicate key: {}", id))),
        }
    }
}

#[async_trait]
impl HistoryStore for MongoHistoryStore {
    async fn get(&self, history_id: &str) -> Result<Option<EndorsementHistoryDoc>> {
        self.collection.find_one(doc! { "_id": history_id }).await
    }

    async fn list_for_user(&self, user_id: &str) -> Result<Vec<EndorsementHistoryDoc>> {
        self.collection.find_many(doc! { "user_id": user_id }).await
    }

    async fn insert(&self, doc: EndorsementHistoryDoc) -> Result<()> {
        match self.collection.insert_one(doc.clone()).await {
            Err(TrackerError::Conflict(_)) => self.reclaim_tombstone(doc).await,
            other => other,
        }
    }

    async fn replace(&self, doc: EndorsementHistoryDoc, expected_revision: i64) -> Result<()> {
        let id = doc.id();
        let previous = self
            .collection
            .replace_one(doc! { "_id": &id, "revision": expected_revision }, doc)
            .await?;

        match previous {
            Some(_) => Ok(()),
            None => Err(TrackerError::Conflict(format!(
                "History {} changed concurrently (expected revision {})",
                id, expected_revision
            ))),
        }
    }

    async fn purge_user(&self, user_id: &str) -> Result<u64> {
        self.collection
            .soft_delete_many(doc! { "user_id": user_id })
            .await
    }
}

/// In-memory store for dev mode and tests
///
/// Mirrors the Mongo store's soft-delete behavior: purged documents stay
/// as tombstones, hidden from reads, and re-inserting over one reclaims
/// the key while continuing the revision sequence.
#[derive(Default)]
pub struct MemoryHistoryStore {
    docs: RwLock<HashMap<String, EndorsementHistoryDoc>>,
}

impl MemoryHistoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl HistoryStore for MemoryHistoryStore {
    async fn get(&self, history_id: &str) -> Result<Option<EndorsementHistoryDoc>> {
        Ok(self
            .docs
            .read()
            .await
            .get(history_id)
            .filter(|d| !d.metadata.is_deleted)
            .cloned())
    }

    async fn list_for_user(&self, user_id: &str) -> Result<Vec<EndorsementHistoryDoc>> {
        Ok(self
            .docs
            .read()
            .await
            .values()
            .filter(|d| d.user_id == user_id && !d.metadata.is_deleted)
            .cloned()
            .collect())
    }

    async fn insert(&self, mut doc: EndorsementHistoryDoc) -> Result<()> {
        let id = doc.id();
        let mut docs = self.docs.write().await;
        match docs.get(&id) {
            Some(stored) if !stored.metadata.is_deleted => {
                return Err(TrackerError::Conflict(format!("Duplicate key: {}", id)));
            }
            Some(tombstone) => {
                // Reclaim a purged key; the revision carries on past the
                // tombstone's so pre-purge writers fail their swap
                doc.revision = tombstone.revision + 1;
                doc.metadata = Metadata::new();
            }
            None => {}
        }
        docs.insert(id, doc);
        Ok(())
    }

    async fn replace(&self, doc: EndorsementHistoryDoc, expected_revision: i64) -> Result<()> {
        let id = doc.id();
        let mut docs = self.docs.write().await;

        // Missing, purged, or rewritten are indistinguishable to the
        // compare-and-swap filter; all of them are lost races
        let matches = matches!(
            docs.get(&id),
            Some(stored) if !stored.metadata.is_deleted && stored.revision == expected_revision
        );
        if !matches {
            return Err(TrackerError::Conflict(format!(
                "History {} changed concurrently (expected revision {})",
                id, expected_revision
            )));
        }

        docs.insert(id, doc);
        Ok(())
    }

    async fn purge_user(&self, user_id: &str) -> Result<u64> {
        let mut docs = self.docs.write().await;
        let mut purged = 0u64;
        for d in docs.values_mut() {
            if d.user_id == user_id && !d.metadata.is_deleted {
                d.metadata.is_deleted = true;
                d.metadata.deleted_at = Some(DateTime::now());
                d.metadata.updated_at = Some(DateTime::now());
                d.revision += 1;
                purged += 1;
            }
        }
        Ok(purged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::schemas::EntityType;

    fn doc(user: &str, entity: &str) -> EndorsementHistoryDoc {
        EndorsementHistoryDoc::new(user, EntityType::Brand, entity, entity)
    }

    #[tokio::test]
    async fn test_insert_and_get() {
        let store = MemoryHistoryStore::new();
        store.insert(doc("u1", "acme")).await.unwrap();

        let fetched = store.get("u1_brand_acme").await.unwrap().unwrap();
        assert_eq!(fetched.entity_id, "acme");
        assert!(store.get("u1_brand_other").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_insert_conflicts() {
        let store = MemoryHistoryStore::new();
        store.insert(doc("u1", "acme")).await.unwrap();
        let result = store.insert(doc("u1", "acme")).await;
        assert!(matches!(result, Err(TrackerError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_replace_checks_revision() {
        let store = MemoryHistoryStore::new();
        store.insert(doc("u1", "acme")).await.unwrap();

        let mut updated = store.get("u1_brand_acme").await.unwrap().unwrap();
        updated.revision += 1;
        updated.total_days_endorsed = 5;
        store.replace(updated.clone(), 0).await.unwrap();

        // Stale writer loses
        let mut stale = doc("u1", "acme");
        stale.revision = 1;
        let result = store.replace(stale, 0).await;
        assert!(matches!(result, Err(TrackerError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_list_and_purge_user() {
        let store = MemoryHistoryStore::new();
        store.insert(doc("u1", "acme")).await.unwrap();
        store.insert(doc("u1", "globex")).await.unwrap();
        store.insert(doc("u2", "acme")).await.unwrap();

        assert_eq!(store.list_for_user("u1").await.unwrap().len(), 2);
        assert_eq!(store.purge_user("u1").await.unwrap(), 2);
        assert!(store.list_for_user("u1").await.unwrap().is_empty());
        assert_eq!(store.list_for_user("u2").await.unwrap().len(), 1);

        // Tombstones are not purged twice
        assert_eq!(store.purge_user("u1").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_purged_key_can_be_reinserted() {
        let store = MemoryHistoryStore::new();
        store.insert(doc("u1", "acme")).await.unwrap();
        assert_eq!(store.purge_user("u1").await.unwrap(), 1);
        assert!(store.get("u1_brand_acme").await.unwrap().is_none());

        store.insert(doc("u1", "acme")).await.unwrap();
        let revived = store.get("u1_brand_acme").await.unwrap().unwrap();
        assert!(!revived.metadata.is_deleted);
        // Revision continues past the tombstone's (0 at insert, 1 after
        // purge, 2 on reclaim)
        assert_eq!(revived.revision, 2);
    }

    #[tokio::test]
    async fn test_stale_replace_after_purge_conflicts() {
        let store = MemoryHistoryStore::new();
        store.insert(doc("u1", "acme")).await.unwrap();
        let stale = store.get("u1_brand_acme").await.unwrap().unwrap();

        store.purge_user("u1").await.unwrap();

        // A writer that read before the purge must not resurrect the record
        let mut update = stale.clone();
        update.revision += 1;
        update.total_days_endorsed = 99;
        let result = store.replace(update, stale.revision).await;
        assert!(matches!(result, Err(TrackerError::Conflict(_))));
        assert!(store.get("u1_brand_acme").await.unwrap().is_none());
    }
}
