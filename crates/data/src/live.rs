//! Live collection views.
//!
//! A [`LiveView`] is a read-only handle on the latest [`Snapshot`] of one
//! collection. Snapshots are replaced wholesale on every push; they are
//! never patched and never merged with local writes.

use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::watch;
use tokio::task::AbortHandle;

use atelier_core::OwnerId;

use crate::store::StoreError;

/// One delivered state of a collection view.
pub struct Snapshot<E> {
    owner: Option<OwnerId>,
    records: Arc<[E]>,
    loaded: bool,
    error: Option<Arc<StoreError>>,
}

impl<E> Clone for Snapshot<E> {
    fn clone(&self) -> Self {
        Self {
            owner: self.owner.clone(),
            records: Arc::clone(&self.records),
            loaded: self.loaded,
            error: self.error.clone(),
        }
    }
}

impl<E> Default for Snapshot<E> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<E: std::fmt::Debug> std::fmt::Debug for Snapshot<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Snapshot")
            .field("owner", &self.owner)
            .field("records", &self.records)
            .field("loaded", &self.loaded)
            .field("error", &self.error)
            .finish()
    }
}

impl<E> Snapshot<E> {
    /// No owner, no records.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            owner: None,
            records: Arc::from(Vec::new()),
            loaded: false,
            error: None,
        }
    }

    /// Subscribed for `owner`, first push not yet received.
    #[must_use]
    pub fn pending(owner: OwnerId) -> Self {
        Self {
            owner: Some(owner),
            ..Self::empty()
        }
    }

    /// Pending for `owner`, or empty when there is none.
    #[must_use]
    pub fn for_owner(owner: Option<OwnerId>) -> Self {
        owner.map_or_else(Self::empty, Self::pending)
    }

    /// A pushed snapshot for `owner`.
    #[must_use]
    pub fn loaded(owner: OwnerId, records: Vec<E>) -> Self {
        Self {
            owner: Some(owner),
            records: Arc::from(records),
            loaded: true,
            error: None,
        }
    }

    /// Keep the records, record a push-channel error.
    #[must_use]
    pub fn with_error(mut self, error: StoreError) -> Self {
        self.error = Some(Arc::new(error));
        self
    }

    /// Owner the records belong to.
    #[must_use]
    pub const fn owner(&self) -> Option<&OwnerId> {
        self.owner.as_ref()
    }

    /// Records, newest first.
    #[must_use]
    pub fn records(&self) -> &[E] {
        &self.records
    }

    /// Shared handle to the records.
    #[must_use]
    pub fn shared_records(&self) -> Arc<[E]> {
        Arc::clone(&self.records)
    }

    /// Whether at least one push has been applied.
    #[must_use]
    pub const fn is_loaded(&self) -> bool {
        self.loaded
    }

    /// Last push-channel error since the last successful push.
    #[must_use]
    pub fn error(&self) -> Option<&StoreError> {
        self.error.as_deref()
    }

    /// Number of records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether there are no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Read-only handle on a continuously updated collection view.
pub struct LiveView<E> {
    rx: watch::Receiver<Snapshot<E>>,
}

impl<E> Clone for LiveView<E> {
    fn clone(&self) -> Self {
        Self {
            rx: self.rx.clone(),
        }
    }
}

impl<E> LiveView<E> {
    pub(crate) const fn new(rx: watch::Receiver<Snapshot<E>>) -> Self {
        Self { rx }
    }

    /// The latest snapshot.
    #[must_use]
    pub fn current(&self) -> Snapshot<E> {
        self.rx.borrow().clone()
    }

    /// The latest records.
    #[must_use]
    pub fn records(&self) -> Arc<[E]> {
        self.rx.borrow().shared_records()
    }

    /// Wait for the next snapshot.
    ///
    /// Returns `false` once the view can no longer change (its subscription
    /// was torn down and its source dropped).
    pub async fn changed(&mut self) -> bool {
        self.rx.changed().await.is_ok()
    }

    /// Wait until a snapshot satisfies `predicate` and return it.
    ///
    /// Checks the current snapshot first. Returns `None` if the view closes
    /// before the predicate holds.
    pub async fn wait_for(
        &mut self,
        predicate: impl FnMut(&Snapshot<E>) -> bool,
    ) -> Option<Snapshot<E>> {
        self.rx.wait_for(predicate).await.ok().map(|s| s.clone())
    }
}

/// Handle that stops a subscription.
///
/// Cancelling is synchronous: once [`cancel`](Self::cancel) returns, the
/// view receives no further snapshots from this subscription. Cancelling
/// twice is a no-op, and dropping the handle cancels.
#[derive(Debug)]
pub struct Teardown {
    gate: Arc<Mutex<bool>>,
    task: AbortHandle,
}

impl Teardown {
    pub(crate) const fn new(gate: Arc<Mutex<bool>>, task: AbortHandle) -> Self {
        Self { gate, task }
    }

    /// Stop delivering snapshots.
    pub fn cancel(&self) {
        // Publishing holds the gate, so no delivery can straddle this write.
        *self.gate.lock().unwrap_or_else(PoisonError::into_inner) = false;
        self.task.abort();
    }

    /// Whether the subscription still delivers snapshots.
    #[must_use]
    pub fn is_active(&self) -> bool {
        *self.gate.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for Teardown {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Apply `update` to `sink` only while `gate` is open.
///
/// Returns `false` once the gate has been closed by [`Teardown::cancel`].
pub(crate) fn publish<E>(
    gate: &Mutex<bool>,
    sink: &watch::Sender<Snapshot<E>>,
    update: impl FnOnce(&mut Snapshot<E>),
) -> bool {
    let open = gate.lock().unwrap_or_else(PoisonError::into_inner);
    if !*open {
        return false;
    }
    sink.send_modify(update);
    true
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_states() {
        let owner = OwnerId::parse("a").unwrap();
        let empty: Snapshot<u32> = Snapshot::empty();
        assert!(empty.owner().is_none());
        assert!(!empty.is_loaded());

        let pending: Snapshot<u32> = Snapshot::pending(owner.clone());
        assert_eq!(pending.owner(), Some(&owner));
        assert!(pending.is_empty());

        let loaded = Snapshot::loaded(owner, vec![3, 2, 1]);
        assert!(loaded.is_loaded());
        assert_eq!(loaded.records(), &[3, 2, 1]);

        let failed = loaded.with_error(StoreError::Unavailable("x".into()));
        assert_eq!(failed.len(), 3);
        assert!(failed.error().is_some());
    }

    #[test]
    fn test_snapshot_for_owner() {
        let owner = OwnerId::parse("a").unwrap();
        let pending: Snapshot<String> = Snapshot::for_owner(Some(owner.clone()));
        assert_eq!(pending.owner(), Some(&owner));
        assert!(!pending.is_loaded());

        let detached: Snapshot<String> = Snapshot::for_owner(None);
        assert!(detached.owner().is_none());
        assert!(detached.is_empty());
    }

    #[tokio::test]
    async fn test_publish_respects_closed_gate() {
        let (tx, rx) = watch::channel(Snapshot::<u32>::empty());
        let view = LiveView::new(rx);
        let gate = Mutex::new(true);
        let owner = OwnerId::parse("a").unwrap();

        assert!(publish(&gate, &tx, |s| *s = Snapshot::loaded(owner.clone(), vec![1])));
        assert_eq!(view.records().len(), 1);

        *gate.lock().unwrap() = false;
        assert!(!publish(&gate, &tx, |s| *s = Snapshot::loaded(owner, vec![1, 2])));
        assert_eq!(view.records().len(), 1);
    }

    #[tokio::test]
    async fn test_teardown_is_idempotent() {
        let task = tokio::spawn(std::future::pending::<()>());
        let gate = Arc::new(Mutex::new(true));
        let teardown = Teardown::new(Arc::clone(&gate), task.abort_handle());

        assert!(teardown.is_active());
        teardown.cancel();
        teardown.cancel();
        assert!(!teardown.is_active());
        assert!(task.await.unwrap_err().is_cancelled());
    }
}
