//! Integration tests for Atelier.
//!
//! # Running Tests
//!
//! ```bash
//! # In-memory suites
//! cargo test -p atelier-integration-tests
//!
//! # PostgreSQL suite (needs ATELIER_TEST_DATABASE_URL)
//! cargo test -p atelier-integration-tests --test postgres_store -- --ignored
//! ```
//!
//! # Test Categories
//!
//! - `allocation` - code format, reservations and the claim race
//! - `client_lookup` - resolving shareable codes
//! - `live_mirror` - view contents, teardown and owner switches
//! - `client_links` - link appends
//! - `repository` - owner-scoped writes
//! - `postgres_store` - the `PostgreSQL` backend
//!
//! This library holds the fixtures those suites share: a studio over a
//! fresh in-memory store, a scripted code source, and two store wrappers
//! that pause specific operations so interleavings can be forced.

#![allow(clippy::unwrap_used)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::{Barrier, Notify, Semaphore};

use atelier_core::{ClientCode, OwnerId};
use atelier_data::store::{
    CollectionPath, CreateOutcome, Document, Fields, Query, SnapshotStream,
};
use atelier_data::{CodeSource, DocumentStore, MemoryStore, SharedStore, StoreError, Studio};

/// How long to wait for a push before declaring a test stuck.
pub const PUSH_TIMEOUT: Duration = Duration::from_secs(5);

/// Parse an owner id.
#[must_use]
pub fn owner(id: &str) -> OwnerId {
    OwnerId::parse(id).unwrap()
}

/// A studio over a fresh in-memory store.
pub struct TestContext {
    /// Direct handle to the store behind the studio.
    pub store: MemoryStore,
    /// The studio under test.
    pub studio: Studio,
}

impl TestContext {
    /// Signed-out studio.
    #[must_use]
    pub fn new() -> Self {
        let store = MemoryStore::new();
        let studio = Studio::new(Arc::new(store.clone()));
        Self { store, studio }
    }

    /// Studio signed in as `id`.
    #[must_use]
    pub fn signed_in(id: &str) -> Self {
        let ctx = Self::new();
        ctx.studio.session().sign_in(owner(id));
        ctx
    }

    /// Another studio, with its own session, over the same store.
    #[must_use]
    pub fn second_session(&self, id: &str) -> Studio {
        let studio = Studio::new(Arc::new(self.store.clone()));
        studio.session().sign_in(owner(id));
        studio
    }
}

impl Default for TestContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Await `future`, failing the test if it takes longer than [`PUSH_TIMEOUT`].
pub async fn within<F: std::future::Future>(future: F) -> F::Output {
    tokio::time::timeout(PUSH_TIMEOUT, future)
        .await
        .expect("timed out waiting for the store")
}

/// Code source returning a fixed sequence of candidates.
#[derive(Debug)]
pub struct ScriptedCodes(Mutex<VecDeque<u32>>);

impl ScriptedCodes {
    /// Source yielding `codes` in order. Panics when exhausted.
    #[must_use]
    pub fn new(codes: &[u32]) -> Arc<Self> {
        Arc::new(Self(Mutex::new(codes.iter().copied().collect())))
    }

    /// Candidates not yet drawn.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.0.lock().unwrap().len()
    }
}

impl CodeSource for ScriptedCodes {
    fn next_code(&self) -> ClientCode {
        let next = self
            .0
            .lock()
            .unwrap()
            .pop_front()
            .expect("scripted code source exhausted");
        ClientCode::from_number(next).unwrap()
    }
}

/// Store whose first `parties` reads of the `codes` collection wait for each
/// other, so that every allocator sees a candidate as free before any of
/// them claims it.
#[derive(Debug)]
pub struct RendezvousStore {
    inner: MemoryStore,
    barrier: Barrier,
    held: AtomicUsize,
    rejected_claims: AtomicUsize,
}

impl RendezvousStore {
    /// Hold the first `parties` code reads until all of them arrive.
    #[must_use]
    pub fn new(inner: MemoryStore, parties: usize) -> Arc<Self> {
        Arc::new(Self {
            inner,
            barrier: Barrier::new(parties),
            held: AtomicUsize::new(parties),
            rejected_claims: AtomicUsize::new(0),
        })
    }

    /// Create-only writes on `codes` that found the code already taken.
    #[must_use]
    pub fn rejected_claims(&self) -> usize {
        self.rejected_claims.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DocumentStore for RendezvousStore {
    async fn get(&self, path: &CollectionPath, id: &str) -> Result<Option<Document>, StoreError> {
        let hold = path.as_str() == CollectionPath::CODES
            && self
                .held
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
        let document = self.inner.get(path, id).await;
        if hold {
            self.barrier.wait().await;
        }
        document
    }

    async fn create_only(
        &self,
        path: &CollectionPath,
        id: &str,
        fields: Fields,
    ) -> Result<CreateOutcome, StoreError> {
        let outcome = self.inner.create_only(path, id, fields).await?;
        if outcome == CreateOutcome::AlreadyExists && path.as_str() == CollectionPath::CODES {
            self.rejected_claims.fetch_add(1, Ordering::SeqCst);
        }
        Ok(outcome)
    }

    async fn create(&self, path: &CollectionPath, fields: Fields) -> Result<String, StoreError> {
        self.inner.create(path, fields).await
    }

    async fn update(
        &self,
        path: &CollectionPath,
        id: &str,
        fields: Fields,
    ) -> Result<(), StoreError> {
        self.inner.update(path, id, fields).await
    }

    async fn append(
        &self,
        path: &CollectionPath,
        id: &str,
        field: &str,
        values: Vec<Value>,
    ) -> Result<(), StoreError> {
        self.inner.append(path, id, field, values).await
    }

    async fn delete(&self, path: &CollectionPath, id: &str) -> Result<(), StoreError> {
        self.inner.delete(path, id).await
    }

    async fn subscribe(&self, query: Query) -> Result<SnapshotStream, StoreError> {
        self.inner.subscribe(query).await
    }
}

/// Store that parks every update to the `codes` collection until released,
/// leaving a window where a client exists but its code is not yet bound.
#[derive(Debug)]
pub struct HeldBindStore {
    inner: MemoryStore,
    reached: Notify,
    release: Semaphore,
}

impl HeldBindStore {
    /// Wrap `inner`, holding code binds.
    #[must_use]
    pub fn new(inner: MemoryStore) -> Arc<Self> {
        Arc::new(Self {
            inner,
            reached: Notify::new(),
            release: Semaphore::new(0),
        })
    }

    /// Wait until a bind is parked.
    pub async fn bind_reached(&self) {
        self.reached.notified().await;
    }

    /// Let one parked bind through.
    pub fn release_bind(&self) {
        self.release.add_permits(1);
    }

    /// As a shared store handle.
    #[must_use]
    pub fn shared(self: &Arc<Self>) -> SharedStore {
        Arc::clone(self) as SharedStore
    }
}

#[async_trait]
impl DocumentStore for HeldBindStore {
    async fn get(&self, path: &CollectionPath, id: &str) -> Result<Option<Document>, StoreError> {
        self.inner.get(path, id).await
    }

    async fn create_only(
        &self,
        path: &CollectionPath,
        id: &str,
        fields: Fields,
    ) -> Result<CreateOutcome, StoreError> {
        self.inner.create_only(path, id, fields).await
    }

    async fn create(&self, path: &CollectionPath, fields: Fields) -> Result<String, StoreError> {
        self.inner.create(path, fields).await
    }

    async fn update(
        &self,
        path: &CollectionPath,
        id: &str,
        fields: Fields,
    ) -> Result<(), StoreError> {
        if path.as_str() == CollectionPath::CODES {
            self.reached.notify_one();
            self.release
                .acquire()
                .await
                .map_err(|e| StoreError::Unavailable(e.to_string()))?
                .forget();
        }
        self.inner.update(path, id, fields).await
    }

    async fn append(
        &self,
        path: &CollectionPath,
        id: &str,
        field: &str,
        values: Vec<Value>,
    ) -> Result<(), StoreError> {
        self.inner.append(path, id, field, values).await
    }

    async fn delete(&self, path: &CollectionPath, id: &str) -> Result<(), StoreError> {
        self.inner.delete(path, id).await
    }

    async fn subscribe(&self, query: Query) -> Result<SnapshotStream, StoreError> {
        self.inner.subscribe(query).await
    }
}
