//! Client code allocation.
//!
//! Codes are claimed with a reserve-then-confirm protocol against the
//! `codes` collection:
//!
//! 1. Draw a candidate and read `codes/{candidate}`. If it exists, draw again.
//! 2. Claim it with a create-only write of
//!    `{reserved: true, ownerIdentity, createdAt}`. If another allocator got
//!    there first the write reports `AlreadyExists` and we draw again.
//! 3. Once the client record exists, [`CodeAllocator::bind`] turns the
//!    reservation into the permanent `{reserved: false, clientId}` index
//!    entry used by code lookup.
//!
//! A code is taken the instant its reservation exists.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, instrument};

use atelier_core::{ClientCode, ClientId, OwnerId, PinCode};

use crate::error::DataError;
use crate::store::{CollectionPath, CreateOutcome, SharedStore, to_fields};

/// Source of candidate codes.
pub trait CodeSource: Send + Sync {
    /// Next candidate.
    fn next_code(&self) -> ClientCode;
}

/// Uniformly random candidates in 100000..=999999.
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomCodes;

impl CodeSource for RandomCodes {
    fn next_code(&self) -> ClientCode {
        ClientCode::from_offset(rand::rng().random_range(0..ClientCode::SPAN))
    }
}

/// Generate a 6-digit pin code. Pins are not unique.
#[must_use]
pub fn generate_pin() -> PinCode {
    PinCode::from_offset(rand::rng().random_range(0..PinCode::SPAN))
}

/// Document stored at `codes/{code}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CodeReservation {
    /// True until the client record has been written.
    pub reserved: bool,
    /// Owner that claimed the code.
    pub owner_identity: OwnerId,
    /// Claim time.
    pub created_at: DateTime<Utc>,
    /// Client the code resolves to, once bound.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<ClientId>,
}

/// Allocates globally unique client codes.
#[derive(Clone)]
pub struct CodeAllocator {
    store: SharedStore,
    source: Arc<dyn CodeSource>,
    codes: CollectionPath,
}

impl std::fmt::Debug for CodeAllocator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CodeAllocator")
            .field("codes", &self.codes)
            .finish_non_exhaustive()
    }
}

impl CodeAllocator {
    /// Allocator drawing random candidates.
    #[must_use]
    pub fn new(store: SharedStore) -> Self {
        Self::with_source(store, Arc::new(RandomCodes))
    }

    /// Allocator drawing candidates from `source`.
    #[must_use]
    pub fn with_source(store: SharedStore, source: Arc<dyn CodeSource>) -> Self {
        Self {
            store,
            source,
            codes: CollectionPath::codes(),
        }
    }

    /// Claim a fresh code for `owner`.
    ///
    /// Collisions are retried until a claim succeeds.
    ///
    /// # Errors
    ///
    /// Returns `DataError::Store` on the first store failure; store errors
    /// are not retried.
    #[instrument(skip(self), fields(owner = %owner))]
    pub async fn allocate(&self, owner: &OwnerId) -> Result<ClientCode, DataError> {
        let mut attempts: u32 = 0;
        loop {
            attempts += 1;
            let candidate = self.source.next_code();

            if self.store.get(&self.codes, candidate.as_str()).await?.is_some() {
                debug!(code = %candidate, attempts, "code taken, retrying");
                continue;
            }

            let reservation = CodeReservation {
                reserved: true,
                owner_identity: owner.clone(),
                created_at: Utc::now(),
                client_id: None,
            };
            match self
                .store
                .create_only(&self.codes, candidate.as_str(), to_fields(&reservation)?)
                .await?
            {
                CreateOutcome::Created => {
                    info!(code = %candidate, attempts, "code reserved");
                    return Ok(candidate);
                }
                CreateOutcome::AlreadyExists => {
                    debug!(code = %candidate, attempts, "lost claim race, retrying");
                }
            }
        }
    }

    /// Point a reserved code at the client that now owns it.
    ///
    /// # Errors
    ///
    /// Returns `DataError::Store` if the reservation is missing or the write fails.
    #[instrument(skip(self), fields(code = %code, client_id = %client_id))]
    pub async fn bind(&self, code: &ClientCode, client_id: &ClientId) -> Result<(), DataError> {
        let mut fields = serde_json::Map::new();
        fields.insert("reserved".to_string(), Value::Bool(false));
        fields.insert(
            "clientId".to_string(),
            Value::String(client_id.to_string()),
        );
        self.store.update(&self.codes, code.as_str(), fields).await?;
        debug!("code bound");
        Ok(())
    }

    /// Return a code to the pool.
    ///
    /// # Errors
    ///
    /// Returns `DataError::Store` if the delete fails.
    #[instrument(skip(self), fields(code = %code))]
    pub async fn release(&self, code: &ClientCode) -> Result<(), DataError> {
        self.store.delete(&self.codes, code.as_str()).await?;
        info!("code released");
        Ok(())
    }

    /// Read the reservation for `code`.
    ///
    /// # Errors
    ///
    /// Returns `DataError::DataCorruption` if the entry does not decode,
    /// `DataError::Store` if the read fails.
    pub async fn reservation(&self, code: &ClientCode) -> Result<Option<CodeReservation>, DataError> {
        let Some(document) = self.store.get(&self.codes, code.as_str()).await? else {
            return Ok(None);
        };
        serde_json::from_value(Value::Object(document.fields))
            .map(Some)
            .map_err(|e| DataError::DataCorruption(format!("code {code}: {e}")))
    }

    /// Client a code is bound to. Unbound reservations resolve to `None`.
    ///
    /// # Errors
    ///
    /// Same as [`reservation`](Self::reservation).
    pub async fn resolve(&self, code: &ClientCode) -> Result<Option<ClientId>, DataError> {
        Ok(self.reservation(code).await?.and_then(|r| r.client_id))
    }
}
