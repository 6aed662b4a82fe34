//! Integration tests for client code allocation.
//!
//! These tests verify that allocated codes are well formed, reserved the
//! moment they are returned, and never handed out twice, including when two
//! allocators race on the same candidate.

use std::collections::HashSet;
use std::sync::Arc;

use atelier_core::{ClientCode, NewClient};
use atelier_data::store::CollectionPath;
use atelier_data::{CodeAllocator, DataError, MemoryStore, SharedStore, StoreError};
use atelier_integration_tests::{RendezvousStore, ScriptedCodes, TestContext, owner};

// =============================================================================
// Format and Reservation Tests
// =============================================================================

#[tokio::test]
async fn test_allocated_codes_are_six_digits_and_reserved() {
    let store = MemoryStore::new();
    let allocator = CodeAllocator::new(Arc::new(store.clone()));
    let mut seen = HashSet::new();

    for _ in 0..200 {
        let code = allocator.allocate(&owner("studio-a")).await.unwrap();
        let raw = code.as_str();
        assert_eq!(raw.len(), 6);
        assert!(raw.bytes().all(|b| b.is_ascii_digit()));
        assert!(ClientCode::parse(raw).is_ok());

        let reservation = allocator.reservation(&code).await.unwrap().unwrap();
        assert!(reservation.reserved);
        assert_eq!(reservation.owner_identity, owner("studio-a"));

        assert!(seen.insert(code), "code handed out twice");
    }
    assert_eq!(store.len(&CollectionPath::codes()), 200);
}

#[tokio::test]
async fn test_collisions_are_invisible_to_the_caller() {
    let store = MemoryStore::new();
    let shared: SharedStore = Arc::new(store.clone());
    let taken = CodeAllocator::with_source(Arc::clone(&shared), ScriptedCodes::new(&[500_000]));
    taken.allocate(&owner("a")).await.unwrap();

    let source = ScriptedCodes::new(&[500_000, 500_000, 500_001]);
    let allocator = CodeAllocator::with_source(shared, Arc::clone(&source) as _);
    let code = allocator.allocate(&owner("b")).await.unwrap();

    assert_eq!(code.as_str(), "500001");
    assert_eq!(source.remaining(), 0);
}

#[tokio::test]
async fn test_client_creation_binds_reservation() {
    let ctx = TestContext::signed_in("studio-a");
    let clients = ctx.studio.clients();

    let id = clients.create(NewClient::new("Ada", "+100")).await.unwrap();
    let client = clients.get(&id).await.unwrap().unwrap();

    let reservation = clients
        .allocator()
        .reservation(&client.code)
        .await
        .unwrap()
        .unwrap();
    assert!(!reservation.reserved);
    assert_eq!(reservation.client_id, Some(id));
}

// =============================================================================
// Race Tests
// =============================================================================

#[tokio::test]
async fn test_racing_allocators_never_share_a_code() {
    let store = RendezvousStore::new(MemoryStore::new(), 2);
    let shared: SharedStore = Arc::clone(&store) as _;
    let first = CodeAllocator::with_source(
        Arc::clone(&shared),
        ScriptedCodes::new(&[123_456, 111_111]),
    );
    let second = CodeAllocator::with_source(shared, ScriptedCodes::new(&[123_456, 222_222]));

    // Both read 123456 as free before either claims it.
    let (owner_a, owner_b) = (owner("studio-a"), owner("studio-b"));
    let (a, b) = tokio::join!(first.allocate(&owner_a), second.allocate(&owner_b));
    let (a, b) = (a.unwrap(), b.unwrap());

    assert_ne!(a, b);
    assert_eq!(store.rejected_claims(), 1);
    assert!(a.as_str() == "123456" || b.as_str() == "123456");
    let loser = if a.as_str() == "123456" { &b } else { &a };
    assert!(["111111", "222222"].contains(&loser.as_str()));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_client_creation_yields_distinct_codes() {
    let ctx = TestContext::signed_in("studio-a");
    let mut tasks = Vec::new();
    for i in 0..32 {
        let clients = ctx.studio.clients().clone();
        tasks.push(tokio::spawn(async move {
            clients
                .create(NewClient::new(format!("Client {i}"), "+100"))
                .await
        }));
    }

    let mut codes = HashSet::new();
    for task in tasks {
        let id = task.await.unwrap().unwrap();
        let client = ctx.studio.clients().get(&id).await.unwrap().unwrap();
        assert!(codes.insert(client.code));
    }
    assert_eq!(ctx.store.len(&CollectionPath::codes()), 32);
}

// =============================================================================
// Failure Tests
// =============================================================================

#[tokio::test]
async fn test_transport_errors_surface_without_retry() {
    let store = MemoryStore::new();
    let source = ScriptedCodes::new(&[123_456, 654_321]);
    let allocator = CodeAllocator::with_source(Arc::new(store.clone()), Arc::clone(&source) as _);
    store.fail_next(StoreError::Unavailable("connection refused".into()));

    let err = allocator.allocate(&owner("a")).await.unwrap_err();
    assert!(err.is_transient());
    assert!(matches!(err, DataError::Store(StoreError::Unavailable(_))));
    // Only the first candidate was drawn.
    assert_eq!(source.remaining(), 1);
}
