//! In-process document store.
//!
//! Holds every collection in memory and pushes a fresh snapshot to each
//! matching subscriber inside the committing write's critical section, so
//! subscribers observe snapshots in commit order. Used in development mode
//! (no remote store configured) and throughout the test suites.
//!
//! Failures can be injected with [`MemoryStore::fail_next`] and
//! [`MemoryStore::interrupt`] to exercise transport-error paths.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_stream::stream;
use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, trace};
use uuid::Uuid;

use super::{
    CollectionPath, CreateOutcome, Document, DocumentStore, Fields, Query, SnapshotStream,
    StoreError,
};

type SnapshotSender = mpsc::UnboundedSender<Result<Vec<Document>, StoreError>>;

/// In-memory [`DocumentStore`]. Cloning yields another handle to the same data.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<State>>,
}

#[derive(Default)]
struct State {
    collections: HashMap<CollectionPath, BTreeMap<String, StoredDocument>>,
    subscribers: HashMap<u64, Subscriber>,
    failures: VecDeque<StoreError>,
    path_failures: HashMap<CollectionPath, VecDeque<StoreError>>,
    next_seq: u64,
    next_subscriber: u64,
}

struct StoredDocument {
    seq: u64,
    fields: Fields,
}

struct Subscriber {
    query: Query,
    tx: SnapshotSender,
}

impl State {
    fn take_failure(&mut self, path: &CollectionPath) -> Result<(), StoreError> {
        if let Some(error) = self.failures.pop_front() {
            return Err(error);
        }
        self.path_failures
            .get_mut(path)
            .and_then(VecDeque::pop_front)
            .map_or(Ok(()), Err)
    }

    fn next_seq(&mut self) -> u64 {
        self.next_seq += 1;
        self.next_seq
    }

    fn snapshot(&self, query: &Query) -> Vec<Document> {
        let Some(collection) = self.collections.get(&query.path) else {
            return Vec::new();
        };

        let mut stored: Vec<(&String, &StoredDocument)> = collection.iter().collect();
        // Latest write first so equal timestamps keep newest-insert-first order.
        stored.sort_by(|a, b| b.1.seq.cmp(&a.1.seq));

        let mut documents: Vec<Document> = stored
            .into_iter()
            .map(|(id, doc)| Document::new(id.clone(), doc.fields.clone()))
            .filter(|doc| query.matches(doc))
            .collect();
        query.sort(&mut documents);
        documents
    }

    fn publish(&self, path: &CollectionPath) {
        for (id, subscriber) in &self.subscribers {
            if &subscriber.query.path != path {
                continue;
            }
            let snapshot = self.snapshot(&subscriber.query);
            trace!(subscriber = id, collection = %path, count = snapshot.len(), "push snapshot");
            // A closed receiver is removed by its guard; nothing to do here.
            let _ = subscriber.tx.send(Ok(snapshot));
        }
    }
}

/// Removes its subscriber when the snapshot stream is dropped.
struct SubscriberGuard {
    inner: Arc<Mutex<State>>,
    id: u64,
}

impl Drop for SubscriberGuard {
    fn drop(&mut self) {
        let mut state = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        state.subscribers.remove(&self.id);
        debug!(subscriber = self.id, "unsubscribed");
    }
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Make the next store operation fail with `error`.
    ///
    /// Queued failures are consumed one per operation, in order.
    pub fn fail_next(&self, error: StoreError) {
        self.state().failures.push_back(error);
    }

    /// Make the next operation on `path` fail with `error`.
    pub fn fail_next_on(&self, path: &CollectionPath, error: StoreError) {
        self.state()
            .path_failures
            .entry(path.clone())
            .or_default()
            .push_back(error);
    }

    /// Deliver a push-channel error to every subscriber of `path`.
    pub fn interrupt(&self, path: &CollectionPath, message: &str) {
        let state = self.state();
        for subscriber in state.subscribers.values() {
            if &subscriber.query.path == path {
                let _ = subscriber
                    .tx
                    .send(Err(StoreError::Unavailable(message.to_string())));
            }
        }
    }

    /// Number of documents in a collection.
    #[must_use]
    pub fn len(&self, path: &CollectionPath) -> usize {
        self.state().collections.get(path).map_or(0, BTreeMap::len)
    }

    /// Ids of the documents in a collection, in id order.
    #[must_use]
    pub fn ids(&self, path: &CollectionPath) -> Vec<String> {
        self.state()
            .collections
            .get(path)
            .map(|collection| collection.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Whether a collection holds no documents.
    #[must_use]
    pub fn is_empty(&self, path: &CollectionPath) -> bool {
        self.len(path) == 0
    }

    /// Number of open subscriptions.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.state().subscribers.len()
    }
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state();
        f.debug_struct("MemoryStore")
            .field("collections", &state.collections.len())
            .field("subscribers", &state.subscribers.len())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn get(&self, path: &CollectionPath, id: &str) -> Result<Option<Document>, StoreError> {
        let mut state = self.state();
        state.take_failure(path)?;
        Ok(state
            .collections
            .get(path)
            .and_then(|collection| collection.get(id))
            .map(|doc| Document::new(id.to_string(), doc.fields.clone())))
    }

    async fn create_only(
        &self,
        path: &CollectionPath,
        id: &str,
        fields: Fields,
    ) -> Result<CreateOutcome, StoreError> {
        let mut state = self.state();
        state.take_failure(path)?;
        let exists = state
            .collections
            .get(path)
            .is_some_and(|collection| collection.contains_key(id));
        if exists {
            debug!(collection = %path, id, "create-only rejected: document exists");
            return Ok(CreateOutcome::AlreadyExists);
        }

        let seq = state.next_seq();
        state
            .collections
            .entry(path.clone())
            .or_default()
            .insert(id.to_string(), StoredDocument { seq, fields });
        state.publish(path);
        Ok(CreateOutcome::Created)
    }

    async fn create(&self, path: &CollectionPath, fields: Fields) -> Result<String, StoreError> {
        let mut state = self.state();
        state.take_failure(path)?;
        let id = Uuid::new_v4().simple().to_string();
        let seq = state.next_seq();
        state
            .collections
            .entry(path.clone())
            .or_default()
            .insert(id.clone(), StoredDocument { seq, fields });
        state.publish(path);
        Ok(id)
    }

    async fn update(
        &self,
        path: &CollectionPath,
        id: &str,
        fields: Fields,
    ) -> Result<(), StoreError> {
        let mut state = self.state();
        state.take_failure(path)?;
        let document = state
            .collections
            .get_mut(path)
            .and_then(|collection| collection.get_mut(id))
            .ok_or_else(|| StoreError::NotFound {
                collection: path.to_string(),
                id: id.to_string(),
            })?;
        document.fields.extend(fields);
        state.publish(path);
        Ok(())
    }

    async fn append(
        &self,
        path: &CollectionPath,
        id: &str,
        field: &str,
        values: Vec<Value>,
    ) -> Result<(), StoreError> {
        let mut state = self.state();
        state.take_failure(path)?;
        let document = state
            .collections
            .get_mut(path)
            .and_then(|collection| collection.get_mut(id))
            .ok_or_else(|| StoreError::NotFound {
                collection: path.to_string(),
                id: id.to_string(),
            })?;

        match document.fields.get_mut(field) {
            Some(Value::Array(items)) => items.extend(values),
            None | Some(Value::Null) => {
                document
                    .fields
                    .insert(field.to_string(), Value::Array(values));
            }
            Some(_) => {
                return Err(StoreError::InvalidArgument(format!(
                    "field {field} of {path}/{id} is not an array"
                )));
            }
        }
        state.publish(path);
        Ok(())
    }

    async fn delete(&self, path: &CollectionPath, id: &str) -> Result<(), StoreError> {
        let mut state = self.state();
        state.take_failure(path)?;
        let removed = state
            .collections
            .get_mut(path)
            .and_then(|collection| collection.remove(id))
            .is_some();
        if removed {
            state.publish(path);
        }
        Ok(())
    }

    async fn subscribe(&self, query: Query) -> Result<SnapshotStream, StoreError> {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let id = {
            let mut state = self.state();
            state.take_failure(&query.path)?;
            state.next_subscriber += 1;
            let id = state.next_subscriber;
            // Initial snapshot is queued before any later commit can publish.
            let _ = tx.send(Ok(state.snapshot(&query)));
            debug!(subscriber = id, collection = %query.path, "subscribed");
            state.subscribers.insert(id, Subscriber { query, tx });
            id
        };

        let guard = SubscriberGuard {
            inner: Arc::clone(&self.inner),
            id,
        };
        Ok(Box::pin(stream! {
            let _guard = guard;
            while let Some(item) = rx.recv().await {
                yield item;
            }
        }))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use futures::StreamExt;
    use serde_json::json;

    use super::super::to_fields;
    use super::*;

    fn fields(value: Value) -> Fields {
        to_fields(&value).unwrap()
    }

    #[tokio::test]
    async fn test_create_only_claims_once() {
        let store = MemoryStore::new();
        let codes = CollectionPath::codes();

        let first = store
            .create_only(&codes, "123456", fields(json!({"reserved": true})))
            .await
            .unwrap();
        let second = store
            .create_only(&codes, "123456", fields(json!({"reserved": false})))
            .await
            .unwrap();

        assert_eq!(first, CreateOutcome::Created);
        assert_eq!(second, CreateOutcome::AlreadyExists);
        let stored = store.get(&codes, "123456").await.unwrap().unwrap();
        assert_eq!(stored.get("reserved"), Some(&json!(true)));
    }

    #[tokio::test]
    async fn test_update_merges_and_requires_existing() {
        let store = MemoryStore::new();
        let path = CollectionPath::clients();
        let id = store
            .create(&path, fields(json!({"name": "a", "phone": "1"})))
            .await
            .unwrap();

        store
            .update(&path, &id, fields(json!({"phone": "2"})))
            .await
            .unwrap();
        let doc = store.get(&path, &id).await.unwrap().unwrap();
        assert_eq!(doc.get("name"), Some(&json!("a")));
        assert_eq!(doc.get("phone"), Some(&json!("2")));

        let missing = store.update(&path, "nope", Fields::new()).await;
        assert!(matches!(missing, Err(StoreError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_append_extends_without_dedup() {
        let store = MemoryStore::new();
        let path = CollectionPath::clients();
        let id = store.create(&path, fields(json!({"n": 1}))).await.unwrap();

        store
            .append(&path, &id, "links", vec![json!("x")])
            .await
            .unwrap();
        store
            .append(&path, &id, "links", vec![json!("x")])
            .await
            .unwrap();

        let doc = store.get(&path, &id).await.unwrap().unwrap();
        assert_eq!(doc.get("links"), Some(&json!(["x", "x"])));

        let err = store.append(&path, &id, "n", vec![json!(2)]).await;
        assert!(matches!(err, Err(StoreError::InvalidArgument(_))));
    }

    #[tokio::test]
    async fn test_delete_missing_is_ok() {
        let store = MemoryStore::new();
        store
            .delete(&CollectionPath::clients(), "missing")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_fail_next_is_consumed_once() {
        let store = MemoryStore::new();
        store.fail_next(StoreError::Unavailable("offline".into()));

        let path = CollectionPath::codes();
        assert!(matches!(
            store.get(&path, "1").await,
            Err(StoreError::Unavailable(_))
        ));
        assert!(store.get(&path, "1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_subscribe_pushes_initial_and_commits() {
        let store = MemoryStore::new();
        let path = CollectionPath::clients();
        let query = Query::collection(path.clone()).where_eq("ownerIdentity", "a");
        let mut stream = store.subscribe(query).await.unwrap();

        assert!(stream.next().await.unwrap().unwrap().is_empty());

        store
            .create(
                &path,
                fields(json!({"ownerIdentity": "b", "createdAt": "2026-01-01T00:00:00Z"})),
            )
            .await
            .unwrap();
        let id = store
            .create(
                &path,
                fields(json!({"ownerIdentity": "a", "createdAt": "2026-01-02T00:00:00Z"})),
            )
            .await
            .unwrap();

        // The commit for owner b still pushes a (filtered, empty) snapshot.
        assert!(stream.next().await.unwrap().unwrap().is_empty());
        let snapshot = stream.next().await.unwrap().unwrap();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].id, id);
    }

    #[tokio::test]
    async fn test_dropping_stream_unsubscribes() {
        let store = MemoryStore::new();
        let stream = store
            .subscribe(Query::collection(CollectionPath::clients()))
            .await
            .unwrap();
        assert_eq!(store.subscriber_count(), 1);
        drop(stream);
        assert_eq!(store.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_interrupt_delivers_error() {
        let store = MemoryStore::new();
        let path = CollectionPath::clients();
        let mut stream = store
            .subscribe(Query::collection(path.clone()))
            .await
            .unwrap();
        let _ = stream.next().await;

        store.interrupt(&path, "connection reset");
        assert!(matches!(
            stream.next().await.unwrap(),
            Err(StoreError::Unavailable(_))
        ));
    }
}
