//! Integration tests for resolving shareable client codes.
//!
//! Lookup walks `codes/{code}` to the client record and must report
//! "absent" for every broken link in that chain, including the window
//! between the client write and the code bind.

use std::sync::Arc;

use atelier_core::{ClientPatch, NewClient};
use atelier_data::store::CollectionPath;
use atelier_data::{
    ClientDirectory, ClientRepository, CodeAllocator, MemoryStore, Session, SharedStore,
    StoreError, Studio,
};
use atelier_integration_tests::{HeldBindStore, ScriptedCodes, TestContext, owner, within};

#[tokio::test]
async fn test_lookup_is_absent_until_bind_then_resolves() {
    let memory = MemoryStore::new();
    let store = HeldBindStore::new(memory.clone());
    let studio = Studio::new(store.shared());
    studio.session().sign_in(owner("studio-a"));

    let creator = studio.clone();
    let create = tokio::spawn(async move {
        creator
            .clients()
            .create(NewClient::new("Ada", "+100"))
            .await
    });

    // Client written, reservation not yet pointing at it.
    within(store.bind_reached()).await;
    assert_eq!(memory.len(&CollectionPath::clients()), 1);
    let reserved = memory.ids(&CollectionPath::codes()).pop().unwrap();
    assert!(studio.directory().get_client_by_code(&reserved).await.is_none());

    store.release_bind();
    let id = within(create).await.unwrap().unwrap();

    let found = studio.directory().get_client_by_code(&reserved).await.unwrap();
    assert_eq!(found.id, id);
    assert_eq!(found.code.as_str(), reserved);
}

#[tokio::test]
async fn test_lookup_needs_no_session() {
    let ctx = TestContext::signed_in("studio-a");
    let id = ctx
        .studio
        .clients()
        .create(NewClient::new("Ada", "+100"))
        .await
        .unwrap();
    let client = ctx.studio.clients().get(&id).await.unwrap().unwrap();

    let anonymous = ClientDirectory::new(Arc::new(ctx.store.clone()));
    let found = anonymous.get_client_by_code(client.code.as_str()).await;
    assert_eq!(found.map(|c| c.id), Some(id));
}

#[tokio::test]
async fn test_lookup_reflects_updates() {
    let ctx = TestContext::signed_in("studio-a");
    let clients = ctx.studio.clients();
    let id = clients.create(NewClient::new("Ada", "+100")).await.unwrap();
    let client = clients.get(&id).await.unwrap().unwrap();

    let patch = ClientPatch {
        name: Some("Ada Lovelace".to_string()),
        ..ClientPatch::default()
    };
    clients.update(&id, &patch).await.unwrap();

    let found = ctx
        .studio
        .directory()
        .get_client_by_code(client.code.as_str())
        .await
        .unwrap();
    assert_eq!(found.name, "Ada Lovelace");
    assert_eq!(found.code, client.code);
    assert_eq!(found.pin_code, client.pin_code);
}

#[tokio::test]
async fn test_deleted_client_is_no_longer_found() {
    let ctx = TestContext::signed_in("studio-a");
    let clients = ctx.studio.clients();
    let id = clients.create(NewClient::new("Ada", "+100")).await.unwrap();
    let client = clients.get(&id).await.unwrap().unwrap();

    clients.delete(&id).await.unwrap();

    assert!(
        ctx.studio
            .directory()
            .get_client_by_code(client.code.as_str())
            .await
            .is_none()
    );
    // The entry stays behind, pointing at nothing.
    assert_eq!(ctx.store.len(&CollectionPath::codes()), 1);
}

#[tokio::test]
async fn test_deleted_clients_code_is_never_reissued() {
    let store = MemoryStore::new();
    let shared: SharedStore = Arc::new(store.clone());

    let first = ClientRepository::with_allocator(
        Arc::clone(&shared),
        Session::signed_in(owner("studio-a")),
        CodeAllocator::with_source(Arc::clone(&shared), ScriptedCodes::new(&[424_242])),
    );
    let id = first.create(NewClient::new("Ada", "+100")).await.unwrap();
    first.delete(&id).await.unwrap();

    let second = ClientRepository::with_allocator(
        Arc::clone(&shared),
        Session::signed_in(owner("studio-b")),
        CodeAllocator::with_source(
            Arc::clone(&shared),
            ScriptedCodes::new(&[424_242, 515_151]),
        ),
    );
    let other = second
        .create(NewClient::new("Mallory", "+200"))
        .await
        .unwrap();
    let other = second.get(&other).await.unwrap().unwrap();
    assert_eq!(other.code.as_str(), "515151");

    let directory = ClientDirectory::new(shared);
    assert!(directory.get_client_by_code("424242").await.is_none());
}

#[tokio::test]
async fn test_lookup_swallows_store_errors() {
    let ctx = TestContext::signed_in("studio-a");
    let id = ctx
        .studio
        .clients()
        .create(NewClient::new("Ada", "+100"))
        .await
        .unwrap();
    let client = ctx.studio.clients().get(&id).await.unwrap().unwrap();

    ctx.store.fail_next_on(
        &CollectionPath::clients(),
        StoreError::PermissionDenied("clients".into()),
    );
    assert!(
        ctx.studio
            .directory()
            .get_client_by_code(client.code.as_str())
            .await
            .is_none()
    );
    // The failure was transient; the next lookup succeeds.
    assert!(
        ctx.studio
            .directory()
            .get_client_by_code(client.code.as_str())
            .await
            .is_some()
    );
}

#[tokio::test]
async fn test_malformed_codes_are_absent() {
    let ctx = TestContext::new();
    let directory = ctx.studio.directory();

    for code in ["", "12345", "1234567", "012345", "12a456", " 123456"] {
        assert!(directory.get_client_by_code(code).await.is_none(), "{code:?}");
    }
}
