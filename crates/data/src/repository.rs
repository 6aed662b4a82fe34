//! Generic entity repository.
//!
//! One [`Repository`] per entity kind issues owner-scoped writes against the
//! store and opens push subscriptions that feed [`LiveView`]s.

use std::marker::PhantomData;
use std::sync::{Arc, Mutex};

use chrono::{SecondsFormat, Utc};
use futures::StreamExt;
use serde_json::Value;
use tokio::sync::watch;
use tracing::{debug, info, instrument, warn};

use atelier_core::OwnerId;

use crate::entity::{CREATED_AT_FIELD, Entity, OWNER_FIELD, UPDATED_AT_FIELD};
use crate::error::DataError;
use crate::live::{LiveView, Snapshot, Teardown, publish};
use crate::session::Session;
use crate::store::{CollectionPath, Document, SharedStore, to_fields};

/// Current time in the RFC 3339 form stored in timestamp fields.
pub(crate) fn timestamp_now() -> Value {
    Value::String(Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true))
}

/// Owner-scoped writes and subscriptions for one entity kind.
pub struct Repository<E> {
    store: SharedStore,
    session: Session,
    _entity: PhantomData<fn() -> E>,
}

impl<E> Clone for Repository<E> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            session: self.session.clone(),
            _entity: PhantomData,
        }
    }
}

impl<E: Entity> std::fmt::Debug for Repository<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Repository")
            .field("kind", &E::KIND)
            .field("owner", &self.session.owner())
            .finish_non_exhaustive()
    }
}

impl<E: Entity> Repository<E> {
    /// Create a repository writing as the session's owner.
    #[must_use]
    pub const fn new(store: SharedStore, session: Session) -> Self {
        Self {
            store,
            session,
            _entity: PhantomData,
        }
    }

    /// The session writes are scoped to.
    #[must_use]
    pub const fn session(&self) -> &Session {
        &self.session
    }

    /// Collection for the current owner.
    ///
    /// # Errors
    ///
    /// Returns `DataError::NotAuthenticated` when no owner is signed in.
    pub fn path(&self) -> Result<CollectionPath, DataError> {
        Ok(E::KIND.path(&self.session.require_owner()?))
    }

    /// Create a record and return its store-assigned id.
    ///
    /// Stamps `createdAt` and `updatedAt`, plus `ownerIdentity` on globally
    /// stored kinds.
    ///
    /// # Errors
    ///
    /// Returns `DataError::NotAuthenticated` when no owner is signed in,
    /// `DataError::Store` if the write fails.
    pub async fn create(&self, draft: &E::Draft) -> Result<E::Id, DataError> {
        let owner = self.session.require_owner()?;
        self.create_as(&owner, draft).await
    }

    /// Create a record for an owner already resolved by the caller, so a
    /// multi-step write stays with one owner even if the session changes.
    #[instrument(skip(self, draft), fields(kind = %E::KIND, owner = %owner))]
    pub(crate) async fn create_as(
        &self,
        owner: &OwnerId,
        draft: &E::Draft,
    ) -> Result<E::Id, DataError> {
        let mut fields = to_fields(draft)?;
        let now = timestamp_now();
        fields.insert(CREATED_AT_FIELD.to_string(), now.clone());
        fields.insert(UPDATED_AT_FIELD.to_string(), now);
        if E::KIND.is_global() {
            fields.insert(OWNER_FIELD.to_string(), Value::String(owner.to_string()));
        }

        let id = self.store.create(&E::KIND.path(owner), fields).await?;
        info!(kind = %E::KIND, id = %id, "record created");
        Ok(E::Id::from(id))
    }

    /// Merge the fields present in `patch` into a record and refresh
    /// `updatedAt`. Fields absent from the patch are left untouched.
    ///
    /// # Errors
    ///
    /// Returns `DataError::NotAuthenticated` when no owner is signed in,
    /// `DataError::NotFound` if the record does not exist for this owner,
    /// `DataError::Store` if the write fails.
    #[instrument(skip(self, patch), fields(kind = %E::KIND, id = %id))]
    pub async fn update(&self, id: &E::Id, patch: &E::Patch) -> Result<E::Id, DataError> {
        let owner = self.session.require_owner()?;
        let mut fields = to_fields(patch)?;
        fields.insert(UPDATED_AT_FIELD.to_string(), timestamp_now());

        let path = E::KIND.path(&owner);
        if E::KIND.is_global() && self.owned_document(&path, &owner, id).await?.is_none() {
            return Err(DataError::NotFound(format!("{} {id}", E::KIND)));
        }

        self.store.update(&path, id.as_ref(), fields).await?;
        debug!(kind = %E::KIND, id = %id, "record updated");
        Ok(id.clone())
    }

    /// Delete a record. The live view changes only once the push arrives.
    ///
    /// # Errors
    ///
    /// Returns `DataError::NotAuthenticated` when no owner is signed in,
    /// `DataError::Store` if the delete fails.
    #[instrument(skip(self), fields(kind = %E::KIND, id = %id))]
    pub async fn delete(&self, id: &E::Id) -> Result<(), DataError> {
        let owner = self.session.require_owner()?;
        let path = E::KIND.path(&owner);
        if E::KIND.is_global() && self.owned_document(&path, &owner, id).await?.is_none() {
            debug!(kind = %E::KIND, id = %id, "nothing to delete");
            return Ok(());
        }

        self.store.delete(&path, id.as_ref()).await?;
        info!(kind = %E::KIND, id = %id, "record deleted");
        Ok(())
    }

    /// Read one of the current owner's records.
    ///
    /// # Errors
    ///
    /// Returns `DataError::NotAuthenticated` when no owner is signed in,
    /// `DataError::DataCorruption` if the stored document does not decode,
    /// `DataError::Store` if the read fails.
    #[instrument(skip(self), fields(kind = %E::KIND, id = %id))]
    pub async fn get(&self, id: &E::Id) -> Result<Option<E>, DataError> {
        let owner = self.session.require_owner()?;
        let path = E::KIND.path(&owner);
        self.owned_document(&path, &owner, id)
            .await?
            .map(|document| {
                document
                    .decode()
                    .map_err(|e| DataError::DataCorruption(format!("{} {id}: {e}", E::KIND)))
            })
            .transpose()
    }

    /// Open a live view of `owner`'s records, newest first.
    ///
    /// # Errors
    ///
    /// Returns `DataError::Store` if the push channel cannot be opened.
    pub async fn subscribe(&self, owner: OwnerId) -> Result<(LiveView<E>, Teardown), DataError> {
        let (tx, rx) = watch::channel(Snapshot::pending(owner.clone()));
        let teardown = self.subscribe_into(owner, Arc::new(tx)).await?;
        Ok((LiveView::new(rx), teardown))
    }

    /// Feed `owner`'s records into an existing view sink.
    ///
    /// Every pushed snapshot replaces the sink's contents. Documents that do
    /// not decode are skipped. A push-channel error keeps the last records
    /// and is recorded on the snapshot.
    ///
    /// # Errors
    ///
    /// Returns `DataError::Store` if the push channel cannot be opened.
    #[instrument(skip(self, sink), fields(kind = %E::KIND, owner = %owner))]
    pub async fn subscribe_into(
        &self,
        owner: OwnerId,
        sink: Arc<watch::Sender<Snapshot<E>>>,
    ) -> Result<Teardown, DataError> {
        let mut stream = self.store.subscribe(E::KIND.query(&owner)).await?;
        let gate = Arc::new(Mutex::new(true));
        let task_gate = Arc::clone(&gate);

        let task = tokio::spawn(async move {
            while let Some(item) = stream.next().await {
                let delivered = match item {
                    Ok(documents) => {
                        let records = decode_all::<E>(documents);
                        let owner = owner.clone();
                        publish(&task_gate, &sink, move |snapshot| {
                            *snapshot = Snapshot::loaded(owner, records);
                        })
                    }
                    Err(e) => {
                        warn!(kind = %E::KIND, owner = %owner, error = %e, "push channel error");
                        publish(&task_gate, &sink, move |snapshot| {
                            *snapshot = std::mem::take(snapshot).with_error(e);
                        })
                    }
                };
                if !delivered {
                    break;
                }
            }
            debug!(kind = %E::KIND, owner = %owner, "subscription ended");
        });

        debug!(kind = %E::KIND, "subscription opened");
        Ok(Teardown::new(gate, task.abort_handle()))
    }

    /// Read a document, hiding records of other owners in global collections.
    async fn owned_document(
        &self,
        path: &CollectionPath,
        owner: &OwnerId,
        id: &E::Id,
    ) -> Result<Option<Document>, DataError> {
        let document = self.store.get(path, id.as_ref()).await?;
        Ok(document.filter(|d| {
            !E::KIND.is_global() || d.get(OWNER_FIELD).and_then(Value::as_str) == Some(owner.as_str())
        }))
    }
}

fn decode_all<E: Entity>(documents: Vec<Document>) -> Vec<E> {
    documents
        .into_iter()
        .filter_map(|document| {
            let id = document.id.clone();
            match document.decode::<E>() {
                Ok(record) => Some(record),
                Err(e) => {
                    warn!(kind = %E::KIND, id = %id, error = %e, "skipping undecodable document");
                    None
                }
            }
        })
        .collect()
}
