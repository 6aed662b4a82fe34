//! Integration tests for owner-scoped repositories.

use std::time::Duration;

use atelier_core::{
    ClientPatch, NewClient, NewEmployee, NewOrder, NewTemplate, OrderPatch, OrderStatus,
};
use atelier_data::store::CollectionPath;
use atelier_data::{DataError, EntityKind, Snapshot};
use atelier_integration_tests::{TestContext, owner, within};

// =============================================================================
// Session Tests
// =============================================================================

#[tokio::test]
async fn test_signed_out_writes_leave_store_untouched() {
    let ctx = TestContext::new();
    let studio = &ctx.studio;

    let err = studio
        .clients()
        .create(NewClient::new("Ada", "+100"))
        .await
        .unwrap_err();
    assert!(matches!(err, DataError::NotAuthenticated));

    let err = studio
        .orders()
        .create(&NewOrder::new("c1".into(), "Hem"))
        .await
        .unwrap_err();
    assert!(matches!(err, DataError::NotAuthenticated));

    let err = studio.templates().delete(&"t1".into()).await.unwrap_err();
    assert!(matches!(err, DataError::NotAuthenticated));

    // No code was reserved either.
    assert!(ctx.store.is_empty(&CollectionPath::clients()));
    assert!(ctx.store.is_empty(&CollectionPath::codes()));
}

#[tokio::test]
async fn test_writes_follow_the_signed_in_owner() {
    let ctx = TestContext::signed_in("studio-a");
    let studio = &ctx.studio;
    studio
        .orders()
        .create(&NewOrder::new("c1".into(), "Hem"))
        .await
        .unwrap();

    studio.session().sign_in(owner("studio-b"));
    studio
        .orders()
        .create(&NewOrder::new("c1".into(), "Zip"))
        .await
        .unwrap();

    let a_orders = EntityKind::Orders.path(&owner("studio-a"));
    let b_orders = EntityKind::Orders.path(&owner("studio-b"));
    assert_eq!(ctx.store.len(&a_orders), 1);
    assert_eq!(ctx.store.len(&b_orders), 1);
}

// =============================================================================
// Update Tests
// =============================================================================

#[tokio::test]
async fn test_update_merges_and_refreshes_updated_at() {
    let ctx = TestContext::signed_in("studio-a");
    let orders = ctx.studio.orders();
    let mut draft = NewOrder::new("c1".into(), "Hem");
    draft.description = Some("Trousers, 2cm".to_string());
    let id = orders.create(&draft).await.unwrap();
    let before = orders.get(&id).await.unwrap().unwrap();

    tokio::time::sleep(Duration::from_millis(2)).await;
    let patch = OrderPatch {
        status: Some(OrderStatus::Ready),
        ..OrderPatch::default()
    };
    orders.update(&id, &patch).await.unwrap();

    let after = orders.get(&id).await.unwrap().unwrap();
    assert_eq!(after.status, OrderStatus::Ready);
    assert_eq!(after.title, "Hem");
    assert_eq!(after.description.as_deref(), Some("Trousers, 2cm"));
    assert_eq!(after.created_at, before.created_at);
    assert!(after.updated_at > before.updated_at);
}

#[tokio::test]
async fn test_client_update_keeps_code_and_pin() {
    let ctx = TestContext::signed_in("studio-a");
    let clients = ctx.studio.clients();
    let id = clients.create(NewClient::new("Ada", "+100")).await.unwrap();
    let before = clients.get(&id).await.unwrap().unwrap();

    let patch = ClientPatch {
        phone: Some("+200".to_string()),
        ..ClientPatch::default()
    };
    clients.update(&id, &patch).await.unwrap();

    let after = clients.get(&id).await.unwrap().unwrap();
    assert_eq!(after.phone, "+200");
    assert_eq!(after.code, before.code);
    assert_eq!(after.pin_code, before.pin_code);
    assert_eq!(after.owner_identity, owner("studio-a"));
}

#[tokio::test]
async fn test_foreign_client_is_invisible() {
    let ctx = TestContext::signed_in("studio-a");
    let id = ctx
        .studio
        .clients()
        .create(NewClient::new("Ada", "+100"))
        .await
        .unwrap();
    let other = ctx.second_session("studio-b");

    assert!(other.clients().get(&id).await.unwrap().is_none());
    let err = other
        .clients()
        .update(&id, &ClientPatch::default())
        .await
        .unwrap_err();
    assert!(matches!(err, DataError::NotFound(_)));

    // Deleting someone else's client does nothing.
    other.clients().delete(&id).await.unwrap();
    assert!(ctx.studio.clients().get(&id).await.unwrap().is_some());
    assert_eq!(ctx.store.len(&CollectionPath::codes()), 1);
}

#[tokio::test]
async fn test_delete_keeps_client_code_taken() {
    let ctx = TestContext::signed_in("studio-a");
    let clients = ctx.studio.clients();
    let id = clients.create(NewClient::new("Ada", "+100")).await.unwrap();
    let client = clients.get(&id).await.unwrap().unwrap();

    clients.delete(&id).await.unwrap();

    assert!(clients.get(&id).await.unwrap().is_none());
    let reservation = clients
        .allocator()
        .reservation(&client.code)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(reservation.owner_identity, owner("studio-a"));
}

// =============================================================================
// Subscription Tests
// =============================================================================

#[tokio::test]
async fn test_per_owner_collections_are_isolated() {
    let ctx = TestContext::signed_in("studio-a");
    ctx.studio
        .templates()
        .create(&NewTemplate::new("Ready", "for a"))
        .await
        .unwrap();
    let other = ctx.second_session("studio-b");
    other
        .employees()
        .create(&NewEmployee {
            name: "Marta".to_string(),
            ..NewEmployee::default()
        })
        .await
        .unwrap();

    let (mut templates, _t) = other.templates().subscribe(owner("studio-b")).await.unwrap();
    let (mut employees, _e) = other.employees().subscribe(owner("studio-a")).await.unwrap();

    let templates = within(templates.wait_for(Snapshot::is_loaded)).await.unwrap();
    let employees = within(employees.wait_for(Snapshot::is_loaded)).await.unwrap();
    assert!(templates.is_empty());
    assert!(employees.is_empty());
}

#[tokio::test]
async fn test_push_error_keeps_last_records() {
    let ctx = TestContext::signed_in("studio-a");
    let templates = ctx.studio.templates();
    templates
        .create(&NewTemplate::new("Ready", "Your order is ready"))
        .await
        .unwrap();
    let (mut view, _teardown) = templates.subscribe(owner("studio-a")).await.unwrap();
    within(view.wait_for(|s| s.len() == 1)).await.unwrap();

    ctx.store.interrupt(
        &EntityKind::Templates.path(&owner("studio-a")),
        "connection reset",
    );
    let snapshot = within(view.wait_for(|s| s.error().is_some())).await.unwrap();
    assert_eq!(snapshot.len(), 1);

    // The next successful push clears the error.
    templates
        .create(&NewTemplate::new("Late", "Running late"))
        .await
        .unwrap();
    let snapshot = within(view.wait_for(|s| s.len() == 2)).await.unwrap();
    assert!(snapshot.error().is_none());
}
