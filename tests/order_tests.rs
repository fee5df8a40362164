mod common;

use common::*;
use storefront_engine::db::orders;
use storefront_engine::domain::aggregates::{OrderAction, OrderStatus};
use storefront_engine::domain::value_objects::{IdempotencyKey, OrderOwner};
use storefront_engine::provider::MockMode;
use storefront_engine::services::TransitionRequest;
use storefront_engine::CommerceError;
use uuid::Uuid;

#[tokio::test]
async fn order_snapshots_cart_and_consumes_it() {
    let Some(pool) = test_pool().await else { return };
    let h = Harness::new(&pool, MockMode::Succeeded);
    let user = Uuid::now_v7();
    let mug = seed_variant(&pool, 1250, "EUR", 10).await;
    let tee = seed_variant(&pool, 300, "EUR", 10).await;
    let cart = seed_cart(&pool, Some(user), &[(mug, 2), (tee, 3)]).await;

    let mut req = checkout_request(cart, user);
    req.shipping_cents = 500;
    req.tax_cents = 100;
    req.discount_cents = 400;
    let res = h.orders.create_from_cart(req).await.unwrap();
    assert!(!res.idempotent);

    let order = orders::get_order(&pool, res.order_id).await.unwrap().unwrap();
    let items = orders::list_items(&pool, order.id).await.unwrap();
    assert_eq!(order.status, OrderStatus::Created);
    assert_eq!(order.subtotal_cents, 3400);
    assert_eq!(items.iter().map(|i| i.line_total_cents).sum::<i64>(), order.subtotal_cents);
    assert_eq!(order.total_cents, 3400 + 500 + 100 - 400);
    assert_eq!(order.refunded_cents, 0);
    assert_eq!(stock_of(&pool, mug).await, 8);
    assert_eq!(stock_of(&pool, tee).await, 7);

    let again = h.orders.create_from_cart(checkout_request(cart, user)).await;
    assert!(matches!(again, Err(CommerceError::CartEmpty)));
}

#[tokio::test]
async fn idempotency_key_returns_first_order() {
    let Some(pool) = test_pool().await else { return };
    let h = Harness::new(&pool, MockMode::Succeeded);
    let user = Uuid::now_v7();
    let variant = seed_variant(&pool, 1000, "EUR", 10).await;
    let cart = seed_cart(&pool, Some(user), &[(variant, 1)]).await;

    let mut req = checkout_request(cart, user);
    req.idempotency_key = Some(IdempotencyKey::new("checkout-1").unwrap());
    let first = h.orders.create_from_cart(req.clone()).await.unwrap();
    let second = h.orders.create_from_cart(req).await.unwrap();
    assert_eq!(first.order_id, second.order_id);
    assert!(second.idempotent);
    assert_eq!(stock_of(&pool, variant).await, 9);
}

#[tokio::test]
async fn overlapping_same_key_checkouts_share_one_order() {
    let Some(pool) = test_pool().await else { return };
    let h = Harness::new(&pool, MockMode::Succeeded);
    let user = Uuid::now_v7();
    let variant = seed_variant(&pool, 1000, "EUR", 10).await;
    let cart = seed_cart(&pool, Some(user), &[(variant, 2)]).await;

    let mut req = checkout_request(cart, user);
    req.idempotency_key = Some(IdempotencyKey::new("double-click").unwrap());
    let (a, b) = tokio::join!(h.orders.create_from_cart(req.clone()), h.orders.create_from_cart(req));
    let (a, b) = (a.unwrap(), b.unwrap());
    assert_eq!(a.order_id, b.order_id);
    assert_eq!([a.idempotent, b.idempotent].iter().filter(|replayed| !**replayed).count(), 1);
    assert_eq!(stock_of(&pool, variant).await, 8);
}

#[tokio::test]
async fn discount_covering_whole_order_is_rejected() {
    let Some(pool) = test_pool().await else { return };
    let h = Harness::new(&pool, MockMode::Succeeded);
    let user = Uuid::now_v7();
    let variant = seed_variant(&pool, 1000, "EUR", 10).await;
    let cart = seed_cart(&pool, Some(user), &[(variant, 1)]).await;

    let mut req = checkout_request(cart, user);
    req.shipping_cents = 200;
    req.discount_cents = 1200;
    let res = h.orders.create_from_cart(req.clone()).await;
    assert!(matches!(res, Err(CommerceError::Validation(_))));
    assert_eq!(stock_of(&pool, variant).await, 10);

    req.discount_cents = 1199;
    let res = h.orders.create_from_cart(req).await.unwrap();
    assert_eq!(res.total_cents, 1);
}

#[tokio::test]
async fn guest_idempotency_is_scoped_by_email() {
    let Some(pool) = test_pool().await else { return };
    let h = Harness::new(&pool, MockMode::Succeeded);
    let variant = seed_variant(&pool, 1000, "EUR", 10).await;
    let email = format!("guest-{}@shop.test", Uuid::now_v7().simple());
    let cart = seed_cart(&pool, None, &[(variant, 1)]).await;

    let mut req = checkout_request(cart, Uuid::nil());
    req.owner = OrderOwner::guest(&email);
    req.contact_email = None;
    req.idempotency_key = Some(IdempotencyKey::new("guest-checkout").unwrap());
    let first = h.orders.create_from_cart(req.clone()).await.unwrap();

    req.owner = OrderOwner::guest(&email.to_uppercase());
    let second = h.orders.create_from_cart(req).await.unwrap();
    assert_eq!(first.order_id, second.order_id);
    assert!(second.idempotent);

    let order = orders::get_order(&pool, first.order_id).await.unwrap().unwrap();
    assert_eq!(order.user_id, None);
    assert_eq!(order.guest_email.as_deref(), Some(email.as_str()));
    assert_eq!(order.contact_email.as_deref(), Some(email.as_str()));
}

#[tokio::test]
async fn mixed_currency_and_inactive_products_are_rejected() {
    let Some(pool) = test_pool().await else { return };
    let h = Harness::new(&pool, MockMode::Succeeded);
    let user = Uuid::now_v7();
    let eur = seed_variant(&pool, 1000, "EUR", 10).await;
    let usd = seed_variant(&pool, 1000, "USD", 10).await;
    let cart = seed_cart(&pool, Some(user), &[(eur, 1), (usd, 1)]).await;
    let res = h.orders.create_from_cart(checkout_request(cart, user)).await;
    assert!(matches!(res, Err(CommerceError::CurrencyMismatch)));
    assert_eq!(stock_of(&pool, eur).await, 10);

    let archived = seed_variant(&pool, 1000, "EUR", 10).await;
    sqlx::query("UPDATE products SET status = 'archived' WHERE id = (SELECT product_id FROM product_variants WHERE id = $1)")
        .bind(archived).execute(&pool).await.unwrap();
    let cart = seed_cart(&pool, Some(user), &[(archived, 1)]).await;
    let res = h.orders.create_from_cart(checkout_request(cart, user)).await;
    assert!(matches!(res, Err(CommerceError::ProductUnavailable)));
}

#[tokio::test]
async fn foreign_cart_is_forbidden() {
    let Some(pool) = test_pool().await else { return };
    let h = Harness::new(&pool, MockMode::Succeeded);
    let variant = seed_variant(&pool, 1000, "EUR", 10).await;
    let cart = seed_cart(&pool, Some(Uuid::now_v7()), &[(variant, 1)]).await;
    let res = h.orders.create_from_cart(checkout_request(cart, Uuid::now_v7())).await;
    assert!(matches!(res, Err(CommerceError::Forbidden)));
}

#[tokio::test]
async fn ship_from_created_is_rejected_without_event() {
    let Some(pool) = test_pool().await else { return };
    let h = Harness::new(&pool, MockMode::Succeeded);
    let user = Uuid::now_v7();
    let order_id = created_order(&h, user, 5000).await;

    let res = h.admin.transition(TransitionRequest {
        order_id, actor_user_id: Some(Uuid::now_v7()), action: OrderAction::Ship, note: None,
    }).await;
    assert!(matches!(res, Err(CommerceError::InvalidTransition)));
    let order = orders::get_order(&pool, order_id).await.unwrap().unwrap();
    assert_eq!(order.status, OrderStatus::Created);
    assert!(orders::list_events(&pool, order_id).await.unwrap().is_empty());
}

#[tokio::test]
async fn admin_transitions_are_audited() {
    let Some(pool) = test_pool().await else { return };
    let user = Uuid::now_v7();
    let admin = Uuid::now_v7();
    let order_id = paid_order(&pool, user, 5000).await;
    let h = Harness::new(&pool, MockMode::Succeeded);

    for action in [OrderAction::Ship, OrderAction::Deliver] {
        h.admin.transition(TransitionRequest {
            order_id, actor_user_id: Some(admin), action, note: Some("  via courier ".into()),
        }).await.unwrap();
    }
    let order = orders::get_order(&pool, order_id).await.unwrap().unwrap();
    assert_eq!(order.status, OrderStatus::Delivered);

    let events = orders::list_events(&pool, order_id).await.unwrap();
    let admin_events: Vec<_> = events.iter().filter(|e| e.actor_user_id == Some(admin)).collect();
    assert_eq!(admin_events.len(), 2);
    assert_eq!((admin_events[0].from_status.as_str(), admin_events[0].to_status.as_str()), ("paid", "shipped"));
    assert_eq!(admin_events[1].action, "deliver");
    assert_eq!(admin_events[1].note.as_deref(), Some("via courier"));

    let cancel = h.admin.transition(TransitionRequest {
        order_id, actor_user_id: Some(admin), action: OrderAction::Cancel, note: None,
    }).await;
    assert!(matches!(cancel, Err(CommerceError::InvalidTransition)));
}

#[tokio::test]
async fn transition_without_actor_is_not_actionable() {
    let Some(pool) = test_pool().await else { return };
    let h = Harness::new(&pool, MockMode::Succeeded);
    let order_id = created_order(&h, Uuid::now_v7(), 1000).await;
    let res = h.admin.transition(TransitionRequest { order_id, actor_user_id: None, action: OrderAction::Cancel, note: None }).await;
    assert!(matches!(res, Err(CommerceError::NotActionable)));
}

#[tokio::test]
async fn owner_view_hides_foreign_orders() {
    let Some(pool) = test_pool().await else { return };
    let h = Harness::new(&pool, MockMode::Succeeded);
    let owner = Uuid::now_v7();
    let order_id = created_order(&h, owner, 10_000).await;

    let view = h.orders.view_for_owner(order_id, Some(owner), Some(("usd".into(), rust_decimal::Decimal::new(11, 1)))).await.unwrap();
    assert_eq!(view.items.len(), 1);
    let display = view.display_total.unwrap();
    assert_eq!(display.currency, "USD");
    assert_eq!(display.amount_cents, 11_000);

    let foreign = h.orders.view_for_owner(order_id, Some(Uuid::now_v7()), None).await;
    assert!(matches!(foreign, Err(CommerceError::Forbidden)));
    let missing = h.orders.view_for_owner(Uuid::now_v7(), Some(owner), None).await;
    assert!(matches!(missing, Err(CommerceError::Forbidden)));
}
