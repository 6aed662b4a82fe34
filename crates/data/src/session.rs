//! Owner identity for the current session.
//!
//! A [`Session`] is passed explicitly into every repository and the live
//! mirror instead of living in ambient global state. Writes read the owner
//! from it; the mirror watches it to re-subscribe on sign-in, owner change
//! and sign-out.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::info;

use atelier_core::OwnerId;

use crate::error::DataError;

/// Cheaply clonable handle to the signed-in owner.
#[derive(Debug, Clone)]
pub struct Session {
    owner: Arc<watch::Sender<Option<OwnerId>>>,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    /// Create a signed-out session.
    #[must_use]
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self { owner: Arc::new(tx) }
    }

    /// Create a session already signed in as `owner`.
    #[must_use]
    pub fn signed_in(owner: OwnerId) -> Self {
        let session = Self::new();
        session.sign_in(owner);
        session
    }

    /// Sign in as `owner`. Signing in as the current owner is a no-op.
    pub fn sign_in(&self, owner: OwnerId) {
        let changed = self.owner.send_if_modified(|current| {
            if current.as_ref() == Some(&owner) {
                return false;
            }
            *current = Some(owner.clone());
            true
        });
        if changed {
            info!(owner = %owner, "session signed in");
        }
    }

    /// Clear the owner identity.
    pub fn sign_out(&self) {
        let changed = self.owner.send_if_modified(|current| current.take().is_some());
        if changed {
            info!("session signed out");
        }
    }

    /// The signed-in owner, if any.
    #[must_use]
    pub fn owner(&self) -> Option<OwnerId> {
        self.owner.borrow().clone()
    }

    /// The signed-in owner.
    ///
    /// # Errors
    ///
    /// Returns `DataError::NotAuthenticated` when signed out.
    pub fn require_owner(&self) -> Result<OwnerId, DataError> {
        self.owner().ok_or(DataError::NotAuthenticated)
    }

    /// Watch owner changes.
    #[must_use]
    pub fn watch(&self) -> watch::Receiver<Option<OwnerId>> {
        self.owner.subscribe()
    }
}
