//! Named links embedded in client records.

use tracing::{debug, instrument};

use atelier_core::{Client, ClientLink, ClientPatch};

use crate::error::DataError;
use crate::repository::Repository;
use crate::store::{CollectionPath, SharedStore};

/// Field holding the link list on a client document.
pub const CLIENT_LINKS_FIELD: &str = "clientLinks";

/// Adds links to clients through the store's atomic array append, so
/// concurrent additions from different sessions are all kept.
#[derive(Debug, Clone)]
pub struct ClientLinks {
    store: SharedStore,
    clients: Repository<Client>,
}

impl ClientLinks {
    /// Create the link helper over the client repository.
    #[must_use]
    pub const fn new(store: SharedStore, clients: Repository<Client>) -> Self {
        Self { store, clients }
    }

    /// Append `link` to the client's links and return the updated client.
    ///
    /// Links are not de-duplicated: adding the same link twice yields two
    /// entries.
    ///
    /// # Errors
    ///
    /// Returns `DataError::NotAuthenticated` when no owner is signed in,
    /// `DataError::NotFound` if the client does not exist for this owner,
    /// `DataError::Store` if a store operation fails.
    #[instrument(skip(self, client, link), fields(client_id = %client.id))]
    pub async fn add_link(&self, client: &Client, link: ClientLink) -> Result<Client, DataError> {
        let not_found = || DataError::NotFound(format!("client {}", client.id));

        if self.clients.get(&client.id).await?.is_none() {
            return Err(not_found());
        }

        let value = serde_json::to_value(&link)?;
        self.store
            .append(
                &CollectionPath::clients(),
                client.id.as_str(),
                CLIENT_LINKS_FIELD,
                vec![value],
            )
            .await?;
        // Empty patch: only refreshes updatedAt.
        self.clients.update(&client.id, &ClientPatch::default()).await?;
        debug!(name = %link.name, "client link added");

        self.clients.get(&client.id).await?.ok_or_else(not_found)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use atelier_core::{NewClient, OwnerId};

    use super::*;
    use crate::clients::ClientRepository;
    use crate::session::Session;
    use crate::store::MemoryStore;

    async fn setup(owner: &str) -> (ClientRepository, ClientLinks, Client) {
        let store: SharedStore = Arc::new(MemoryStore::new());
        let session = Session::signed_in(OwnerId::parse(owner).unwrap());
        let clients = ClientRepository::new(Arc::clone(&store), session);
        let links = ClientLinks::new(store, clients.records().clone());
        let id = clients.create(NewClient::new("Ada", "+100")).await.unwrap();
        let client = clients.get(&id).await.unwrap().unwrap();
        (clients, links, client)
    }

    #[tokio::test]
    async fn test_add_link_appends() {
        let (_, links, client) = setup("a").await;
        tokio::time::sleep(Duration::from_millis(2)).await;

        let updated = links
            .add_link(&client, ClientLink::new("Gallery", "https://example.com/g"))
            .await
            .unwrap();
        assert_eq!(updated.client_links.len(), 1);
        assert_eq!(updated.client_links[0].name, "Gallery");
        assert!(updated.updated_at > client.updated_at);
        assert_eq!(updated.code, client.code);
    }

    #[tokio::test]
    async fn test_same_link_twice_gives_two_entries() {
        let (_, links, client) = setup("a").await;
        let link = ClientLink::new("Chat", "https://example.com/c");

        links.add_link(&client, link.clone()).await.unwrap();
        let updated = links.add_link(&client, link.clone()).await.unwrap();
        assert_eq!(updated.client_links, vec![link.clone(), link]);
    }

    #[tokio::test]
    async fn test_add_link_to_unknown_client() {
        let (_, _, client) = setup("a").await;
        let (_, other_links, _) = setup("b").await;

        let err = other_links
            .add_link(&client, ClientLink::new("x", "y"))
            .await
            .unwrap_err();
        assert!(matches!(err, DataError::NotFound(_)));
    }
}
