use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::broadcast;

use super::{
    apply_fields, collection_of, is_descendant, ChangeEvent, DocumentSnapshot, DocumentStore,
    Query, StoreError, StoreResult, WriteBatch, WriteOp,
};

/// In-process document store. Used by the test suite and for local runs
/// without Postgres.
pub struct MemoryDocumentStore {
    docs: Mutex<BTreeMap<String, Value>>,
    events: broadcast::Sender<ChangeEvent>,
    fail_countdown: AtomicUsize,
}

impl Default for MemoryDocumentStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            docs: Mutex::new(BTreeMap::new()),
            events,
            fail_countdown: AtomicUsize::new(0),
        }
    }

    /// Makes the next `commit` fail as if the backend dropped the connection
    /// before the transaction was applied.
    pub fn fail_next_commit(&self) {
        self.fail_nth_commit(1);
    }

    /// Lets `n - 1` commits through, then fails the `n`th.
    pub fn fail_nth_commit(&self, n: usize) {
        self.fail_countdown.store(n, Ordering::SeqCst);
    }

    /// All stored paths, sorted.
    pub fn paths(&self) -> Vec<String> {
        self.lock().keys().cloned().collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, Value>> {
        // A poisoned map still holds the last fully applied state.
        self.docs.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn apply(docs: &mut BTreeMap<String, Value>, op: WriteOp) -> StoreResult<()> {
    match op {
        WriteOp::Set { path, data } => {
            docs.insert(path, data);
        }
        WriteOp::Create { path, data } => {
            if docs.contains_key(&path) {
                return Err(StoreError::AlreadyExists(path));
            }
            docs.insert(path, data);
        }
        WriteOp::Update { path, fields } => {
            let doc = docs
                .get_mut(&path)
                .ok_or_else(|| StoreError::NotFound(path.clone()))?;
            apply_fields(&path, doc, &fields)?;
        }
        WriteOp::Delete { path } => {
            docs.remove(&path);
        }
        WriteOp::DeleteTree { path } => {
            docs.retain(|p, _| p != &path && !is_descendant(p, &path));
        }
    }
    Ok(())
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn get(&self, path: &str) -> StoreResult<Option<Value>> {
        collection_of(path)?;
        Ok(self.lock().get(path).cloned())
    }

    async fn query(&self, query: &Query) -> StoreResult<Vec<DocumentSnapshot>> {
        let mut docs: Vec<DocumentSnapshot> = self
            .lock()
            .iter()
            .filter(|(path, data)| {
                collection_of(path).is_ok_and(|c| c == query.collection) && query.matches(data)
            })
            .map(|(path, data)| DocumentSnapshot {
                path: path.clone(),
                data: data.clone(),
            })
            .collect();
        query.sort(&mut docs);
        Ok(docs)
    }

    async fn commit(&self, batch: WriteBatch) -> StoreResult<()> {
        let collections = batch.touched_collections()?;
        let countdown = self
            .fail_countdown
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        if countdown == Ok(1) {
            return Err(StoreError::Unavailable("connection reset during commit".into()));
        }
        {
            let mut docs = self.lock();
            let mut staged = docs.clone();
            for op in batch.into_ops() {
                apply(&mut staged, op)?;
            }
            *docs = staged;
        }
        if !collections.is_empty() {
            // No receivers is fine.
            let _ = self.events.send(ChangeEvent { collections });
        }
        Ok(())
    }

    fn changes(&self) -> broadcast::Receiver<ChangeEvent> {
        self.events.subscribe()
    }

    async fn ping(&self) -> StoreResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Direction;
    use serde_json::json;

    #[tokio::test]
    async fn failed_op_rolls_back_whole_batch() {
        let store = MemoryDocumentStore::new();
        let mut batch = WriteBatch::new();
        batch
            .set("schools/A", json!({ "name": "A" }))
            .update("schools/missing", vec![("name".into(), json!("x"))]);

        let err = store.commit(batch).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
        assert!(store.paths().is_empty());
    }

    #[tokio::test]
    async fn injected_failure_leaves_store_untouched() {
        let store = MemoryDocumentStore::new();
        store.fail_next_commit();
        assert!(store.set("schools/A", json!({})).await.is_err());
        assert!(store.get("schools/A").await.unwrap().is_none());
        // Only the next commit fails.
        store.set("schools/A", json!({})).await.unwrap();
        assert!(store.get("schools/A").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn create_refuses_existing_document() {
        let store = MemoryDocumentStore::new();
        store.set("schools/A", json!({ "v": 1 })).await.unwrap();
        let mut batch = WriteBatch::new();
        batch.create("schools/A", json!({ "v": 2 }));
        assert!(matches!(
            store.commit(batch).await,
            Err(StoreError::AlreadyExists(_))
        ));
        assert_eq!(store.get("schools/A").await.unwrap(), Some(json!({ "v": 1 })));
    }

    #[tokio::test]
    async fn query_lists_direct_children_only() {
        let store = MemoryDocumentStore::new();
        store.set("schools/A", json!({ "n": 1 })).await.unwrap();
        store.set("schools/B", json!({ "n": 2 })).await.unwrap();
        store
            .set("schools/A/students/_placeholder", json!({}))
            .await
            .unwrap();

        let docs = store
            .query(&Query::collection("schools").order_by("n", Direction::Descending))
            .await
            .unwrap();
        let ids: Vec<&str> = docs.iter().map(|d| d.id()).collect();
        assert_eq!(ids, vec!["B", "A"]);
    }

    #[tokio::test]
    async fn delete_tree_removes_descendants() {
        let store = MemoryDocumentStore::new();
        store.set("schools/A", json!({})).await.unwrap();
        store.set("schools/A/classes/_placeholder", json!({})).await.unwrap();
        store.set("schools/AB", json!({})).await.unwrap();

        let mut batch = WriteBatch::new();
        batch.delete_tree("schools/A");
        store.commit(batch).await.unwrap();
        assert_eq!(store.paths(), vec!["schools/AB".to_string()]);
    }

    #[tokio::test]
    async fn commit_publishes_one_event_per_batch() {
        let store = MemoryDocumentStore::new();
        let mut rx = store.changes();
        let mut batch = WriteBatch::new();
        batch
            .set("schools/A", json!({}))
            .set("schools/A/teachers/_placeholder", json!({}));
        store.commit(batch).await.unwrap();

        let event = rx.recv().await.unwrap();
        assert!(event.touches("schools"));
        assert!(event.touches("schools/A/teachers"));
        assert!(rx.try_recv().is_err());
    }
}
