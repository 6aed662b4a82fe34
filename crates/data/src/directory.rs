//! Client lookup by shareable code.
//!
//! Used by external actors holding a client's code (e.g. from a shared
//! link), so it needs no signed-in owner and never fails: every missing
//! link in the `codes/{code}` -> `clients/{id}` chain reads as "absent".

use std::sync::Arc;

use tracing::{debug, instrument, warn};

use atelier_core::{Client, ClientCode};

use crate::allocator::CodeAllocator;
use crate::store::{CollectionPath, SharedStore};

/// Resolves shareable codes to clients.
#[derive(Debug, Clone)]
pub struct ClientDirectory {
    store: SharedStore,
    codes: CodeAllocator,
}

impl ClientDirectory {
    /// Create a directory reading from `store`.
    #[must_use]
    pub fn new(store: SharedStore) -> Self {
        Self {
            codes: CodeAllocator::new(Arc::clone(&store)),
            store,
        }
    }

    /// Find the client a code belongs to.
    ///
    /// Returns `None` for malformed codes, unreserved codes, reservations
    /// not yet bound to a client, dangling index entries, and store errors.
    #[instrument(skip(self))]
    pub async fn get_client_by_code(&self, code: &str) -> Option<Client> {
        let code = match ClientCode::parse(code) {
            Ok(code) => code,
            Err(e) => {
                debug!(error = %e, "malformed client code");
                return None;
            }
        };

        let client_id = match self.codes.resolve(&code).await {
            Ok(Some(id)) => id,
            Ok(None) => {
                debug!(code = %code, "code not bound to a client");
                return None;
            }
            Err(e) => {
                warn!(code = %code, error = %e, "code lookup failed");
                return None;
            }
        };

        let document = match self
            .store
            .get(&CollectionPath::clients(), client_id.as_str())
            .await
        {
            Ok(Some(document)) => document,
            Ok(None) => {
                debug!(code = %code, client_id = %client_id, "dangling code index entry");
                return None;
            }
            Err(e) => {
                warn!(code = %code, error = %e, "client lookup failed");
                return None;
            }
        };

        match document.decode::<Client>() {
            Ok(client) if client.code == code => Some(client),
            Ok(client) => {
                warn!(code = %code, client_id = %client.id, "code index points at another client");
                None
            }
            Err(e) => {
                warn!(code = %code, client_id = %client_id, error = %e, "undecodable client");
                None
            }
        }
    }
}
