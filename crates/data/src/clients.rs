//! Client repository.
//!
//! Wraps the generic [`Repository`] so that every client is created with a
//! freshly allocated code and pin.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::watch;
use tracing::{info, instrument, warn};

use atelier_core::{
    Client, ClientCode, ClientId, ClientLink, ClientPatch, NewClient, OwnerId, PinCode,
};

use crate::allocator::{CodeAllocator, generate_pin};
use crate::error::DataError;
use crate::live::{LiveView, Snapshot, Teardown};
use crate::repository::Repository;
use crate::session::Session;
use crate::store::SharedStore;

/// Fields written when a client is created.
///
/// Only [`ClientRepository`] can build one, so codes always come from the
/// allocator.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientDocument {
    #[serde(flatten)]
    client: NewClient,
    pin_code: PinCode,
    code: ClientCode,
    client_links: Vec<ClientLink>,
}

/// Repository for client records.
#[derive(Clone, Debug)]
pub struct ClientRepository {
    records: Repository<Client>,
    allocator: CodeAllocator,
}

impl ClientRepository {
    /// Client repository allocating random codes.
    #[must_use]
    pub fn new(store: SharedStore, session: Session) -> Self {
        let allocator = CodeAllocator::new(Arc::clone(&store));
        Self::with_allocator(store, session, allocator)
    }

    /// Client repository using a specific allocator.
    #[must_use]
    pub const fn with_allocator(
        store: SharedStore,
        session: Session,
        allocator: CodeAllocator,
    ) -> Self {
        Self {
            records: Repository::new(store, session),
            allocator,
        }
    }

    /// The generic repository underneath.
    #[must_use]
    pub const fn records(&self) -> &Repository<Client> {
        &self.records
    }

    /// The code allocator.
    #[must_use]
    pub const fn allocator(&self) -> &CodeAllocator {
        &self.allocator
    }

    /// Create a client with a newly allocated code and pin.
    ///
    /// The code is reserved first, then the client is written, then the
    /// reservation is bound to the new id. If the client write fails the
    /// reservation is released.
    ///
    /// # Errors
    ///
    /// Returns `DataError::NotAuthenticated` when no owner is signed in,
    /// `DataError::Store` if any store operation fails. A failure while
    /// binding leaves the client written but not yet resolvable by code.
    #[instrument(skip(self, client))]
    pub async fn create(&self, client: NewClient) -> Result<ClientId, DataError> {
        let owner = self.records.session().require_owner()?;
        let code = self.allocator.allocate(&owner).await?;

        let document = ClientDocument {
            client,
            pin_code: generate_pin(),
            code: code.clone(),
            client_links: Vec::new(),
        };
        let id = match self.records.create_as(&owner, &document).await {
            Ok(id) => id,
            Err(e) => {
                if let Err(release_error) = self.allocator.release(&code).await {
                    warn!(code = %code, error = %release_error, "failed to release code");
                }
                return Err(e);
            }
        };

        self.allocator.bind(&code, &id).await?;
        info!(client_id = %id, code = %code, "client created");
        Ok(id)
    }

    /// Merge `patch` into a client. Code and pin cannot be changed.
    ///
    /// # Errors
    ///
    /// See [`Repository::update`].
    pub async fn update(&self, id: &ClientId, patch: &ClientPatch) -> Result<ClientId, DataError> {
        self.records.update(id, patch).await
    }

    /// Delete a client.
    ///
    /// The code index entry is kept, so the code is never handed to another
    /// client and lookups of it resolve to nothing.
    ///
    /// # Errors
    ///
    /// Returns `DataError::NotAuthenticated` when no owner is signed in,
    /// `DataError::Store` if the delete fails.
    pub async fn delete(&self, id: &ClientId) -> Result<(), DataError> {
        self.records.delete(id).await
    }

    /// Read one of the current owner's clients.
    ///
    /// # Errors
    ///
    /// See [`Repository::get`].
    pub async fn get(&self, id: &ClientId) -> Result<Option<Client>, DataError> {
        self.records.get(id).await
    }

    /// Open a live view of `owner`'s clients.
    ///
    /// # Errors
    ///
    /// See [`Repository::subscribe`].
    pub async fn subscribe(
        &self,
        owner: OwnerId,
    ) -> Result<(LiveView<Client>, Teardown), DataError> {
        self.records.subscribe(owner).await
    }

    /// Feed `owner`'s clients into an existing view sink.
    ///
    /// # Errors
    ///
    /// See [`Repository::subscribe_into`].
    pub async fn subscribe_into(
        &self,
        owner: OwnerId,
        sink: Arc<watch::Sender<Snapshot<Client>>>,
    ) -> Result<Teardown, DataError> {
        self.records.subscribe_into(owner, sink).await
    }
}
