//! Order placement, stock and updates over the in-memory store.

use std::sync::Arc;

use tokio::task::JoinSet;

use orchard_api::models::Principal;
use orchard_api::services::{CatalogError, MailMessage, OrderError};
use orchard_core::{NotificationKind, OrderStatus, Quantity, UserRole};
use orchard_integration_tests::{TestShop, address, line, price};

fn principal(user: &orchard_api::models::User) -> Principal {
    Principal {
        user_id: user.id,
        role: user.role,
    }
}

#[tokio::test]
async fn test_order_total_and_stock_decrement() {
    let shop = TestShop::new();
    let jane = shop.customer("Jane");
    let mango = shop.product("Mango", "2.50", 10);

    let order = shop
        .state
        .orders()
        .place_order(jane.id, &[line(mango.id, 4)], address())
        .await
        .unwrap();

    assert_eq!(order.total_amount, price("10.00"));
    assert_eq!(order.status, OrderStatus::Processing);
    assert_eq!(order.items.len(), 1);
    assert_eq!(order.items[0].unit_price, price("2.50"));
    assert_eq!(shop.stock(mango.id), 6);
}

#[tokio::test]
async fn test_insufficient_stock_persists_nothing() {
    let shop = TestShop::new();
    let jane = shop.customer("Jane");
    let mango = shop.product("Mango", "2.50", 10);
    let kiwi = shop.product("Kiwi", "0.40", 1);

    let err = shop
        .state
        .orders()
        .place_order(jane.id, &[line(mango.id, 2), line(kiwi.id, 5)], address())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        OrderError::InsufficientStock { ref product, available: 1 } if product == "Kiwi"
    ));
    assert_eq!(shop.store.order_count(), 0);
    assert_eq!(shop.store.order_item_count(), 0);
    assert_eq!(shop.stock(mango.id), 10);
    assert_eq!(shop.stock(kiwi.id), 1);
}

#[tokio::test]
async fn test_shortfall_message_names_available_units() {
    let shop = TestShop::new();
    let jane = shop.customer("Jane");
    for i in 1..=6 {
        shop.product(&format!("Filler {i}"), "1.00", 50);
    }
    let papaya = shop.product("Papaya", "3.00", 3);
    assert_eq!(papaya.id.as_i64(), 7);

    let err = shop
        .state
        .orders()
        .place_order(jane.id, &[line(papaya.id, 5)], address())
        .await
        .unwrap_err();

    assert_eq!(err.to_string(), "Not enough stock for Papaya. Available: 3");
    assert_eq!(shop.stock(papaya.id), 3);
}

#[tokio::test]
async fn test_unknown_product_is_rejected() {
    let shop = TestShop::new();
    let jane = shop.customer("Jane");
    let mango = shop.product("Mango", "2.50", 10);

    let err = shop
        .state
        .orders()
        .place_order(
            jane.id,
            &[line(mango.id, 1), line(orchard_core::ProductId::new(99), 1)],
            address(),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, OrderError::ProductNotFound(id) if id.as_i64() == 99));
    assert_eq!(shop.stock(mango.id), 10);
}

#[tokio::test]
async fn test_duplicate_lines_are_merged() {
    let shop = TestShop::new();
    let jane = shop.customer("Jane");
    let mango = shop.product("Mango", "2.50", 10);

    let order = shop
        .state
        .orders()
        .place_order(jane.id, &[line(mango.id, 2), line(mango.id, 3)], address())
        .await
        .unwrap();

    assert_eq!(order.items.len(), 1);
    assert_eq!(order.quantity_of(mango.id), Quantity::new(5).ok());
    assert_eq!(shop.stock(mango.id), 5);
}

#[tokio::test]
async fn test_empty_order_and_blank_address_are_rejected() {
    let shop = TestShop::new();
    let jane = shop.customer("Jane");
    let mango = shop.product("Mango", "2.50", 10);

    let err = shop
        .state
        .orders()
        .place_order(jane.id, &[], address())
        .await
        .unwrap_err();
    assert!(matches!(err, OrderError::EmptyOrder));

    let mut blank = address();
    blank.city = String::new();
    let err = shop
        .state
        .orders()
        .place_order(jane.id, &[line(mango.id, 1)], blank)
        .await
        .unwrap_err();
    assert!(matches!(err, OrderError::Address(_)));
    assert_eq!(shop.store.order_count(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_orders_for_last_unit() {
    let shop = TestShop::new();
    let mango = shop.product("Mango", "2.50", 1);
    let buyers: Vec<_> = (0..8).map(|i| shop.customer(&format!("Buyer{i}"))).collect();
    let orders = Arc::new(shop.state.orders().clone());

    let mut set = JoinSet::new();
    for buyer in buyers {
        let orders = orders.clone();
        let mango_id = mango.id;
        set.spawn(async move {
            orders
                .place_order(buyer.id, &[line(mango_id, 1)], address())
                .await
        });
    }

    let mut placed = 0;
    let mut refused = 0;
    while let Some(result) = set.join_next().await {
        match result.unwrap() {
            Ok(_) => placed += 1,
            Err(OrderError::InsufficientStock { available: 0, .. }) => refused += 1,
            Err(other) => panic!("unexpected error: {other}"),
        }
    }

    assert_eq!(placed, 1);
    assert_eq!(refused, 7);
    assert_eq!(shop.stock(mango.id), 0);
    assert_eq!(shop.store.order_count(), 1);
}

#[tokio::test]
async fn test_stock_taken_after_check_fails_the_order() {
    let shop = TestShop::new();
    let jane = shop.customer("Jane");
    let mango = shop.product("Mango", "2.50", 5);
    let kiwi = shop.product("Kiwi", "0.40", 5);

    shop.store
        .steal_stock_before_next_commit(mango.id, Quantity::new(4).unwrap());

    let err = shop
        .state
        .orders()
        .place_order(jane.id, &[line(kiwi.id, 2), line(mango.id, 3)], address())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        OrderError::InsufficientStock { ref product, available: 1 } if product == "Mango"
    ));
    assert_eq!(shop.store.order_count(), 0);
    assert_eq!(shop.stock(kiwi.id), 5);
    assert_eq!(shop.stock(mango.id), 1);
}

#[tokio::test]
async fn test_status_update_notifies_owner_even_when_unchanged() {
    let shop = TestShop::new();
    let jane = shop.customer("Jane");
    let mango = shop.product("Mango", "2.50", 10);
    let order = shop
        .state
        .orders()
        .place_order(jane.id, &[line(mango.id, 1)], address())
        .await
        .unwrap();

    shop.state
        .orders()
        .update_status(order.id, OrderStatus::Shipped)
        .await
        .unwrap();
    shop.state
        .orders()
        .update_status(order.id, OrderStatus::Shipped)
        .await
        .unwrap();

    let inbox = shop.state.inbox().list(jane.id).await.unwrap();
    assert_eq!(inbox.len(), 2);
    assert!(inbox.iter().all(|n| n.kind == NotificationKind::StatusUpdate));
    assert_eq!(
        inbox[0].message,
        format!("Your order #{} status has been updated to shipped.", order.id)
    );

    let sent = shop.mailer.sent();
    assert_eq!(sent.len(), 2);
    assert!(matches!(
        &sent[0].1,
        MailMessage::StatusChanged { order: mailed, .. } if mailed.status == OrderStatus::Shipped
    ));
}

#[tokio::test]
async fn test_status_update_for_owner_without_email_still_succeeds() {
    let shop = TestShop::new();
    let kai = shop.customer_without_email("Kai");
    let mango = shop.product("Mango", "2.50", 10);
    let order = shop
        .state
        .orders()
        .place_order(kai.id, &[line(mango.id, 1)], address())
        .await
        .unwrap();

    let updated = shop
        .state
        .orders()
        .update_status(order.id, OrderStatus::Delivered)
        .await
        .unwrap();

    assert_eq!(updated.status, OrderStatus::Delivered);
    assert!(shop.state.inbox().list(kai.id).await.unwrap().is_empty());
    assert!(shop.mailer.sent().is_empty());
}

#[tokio::test]
async fn test_status_update_survives_mail_failure() {
    let shop = TestShop::new();
    let jane = shop.customer("Jane");
    let mango = shop.product("Mango", "2.50", 10);
    let order = shop
        .state
        .orders()
        .place_order(jane.id, &[line(mango.id, 1)], address())
        .await
        .unwrap();
    shop.mailer.fail_next(1);

    let updated = shop
        .state
        .orders()
        .update_status(order.id, OrderStatus::Cancelled)
        .await
        .unwrap();

    assert_eq!(updated.status, OrderStatus::Cancelled);
    assert_eq!(shop.mailer.attempts(), 1);
}

#[tokio::test]
async fn test_status_update_of_missing_order() {
    let shop = TestShop::new();
    let err = shop
        .state
        .orders()
        .update_status(orchard_core::OrderId::new(404), OrderStatus::Shipped)
        .await
        .unwrap_err();
    assert!(matches!(err, OrderError::NotFound(_)));
}

#[tokio::test]
async fn test_full_update_moves_stock_by_difference() {
    let shop = TestShop::new();
    let jane = shop.customer("Jane");
    let mango = shop.product("Mango", "2.50", 10);
    let kiwi = shop.product("Kiwi", "0.40", 10);
    let lime = shop.product("Lime", "0.30", 10);
    let order = shop
        .state
        .orders()
        .place_order(jane.id, &[line(mango.id, 4), line(kiwi.id, 2)], address())
        .await
        .unwrap();
    assert_eq!(shop.stock(mango.id), 6);
    assert_eq!(shop.stock(kiwi.id), 8);

    let updated = shop
        .state
        .orders()
        .update_order(
            &principal(&jane),
            order.id,
            &[line(mango.id, 1), line(lime.id, 3)],
            address(),
            OrderStatus::Processing,
        )
        .await
        .unwrap();

    // Mango gave back 3, kiwi was removed entirely, lime is new
    assert_eq!(shop.stock(mango.id), 9);
    assert_eq!(shop.stock(kiwi.id), 10);
    assert_eq!(shop.stock(lime.id), 7);
    assert_eq!(updated.items.len(), 2);
    assert_eq!(updated.total_amount, price("3.40"));

    // Status unchanged, so no notice
    assert!(shop.mailer.sent().is_empty());
}

#[tokio::test]
async fn test_full_update_keeps_price_snapshot_and_notifies_on_status_change() {
    let shop = TestShop::new();
    let jane = shop.customer("Jane");
    let mango = shop.product("Mango", "2.50", 10);
    let order = shop
        .state
        .orders()
        .place_order(jane.id, &[line(mango.id, 2)], address())
        .await
        .unwrap();

    shop.state
        .catalog()
        .update(
            mango.id,
            orchard_api::models::ProductChanges {
                price: Some(price("9.99")),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let updated = shop
        .state
        .orders()
        .update_order(
            &principal(&jane),
            order.id,
            &[line(mango.id, 3)],
            address(),
            OrderStatus::Shipped,
        )
        .await
        .unwrap();

    assert_eq!(updated.items[0].unit_price, price("2.50"));
    assert_eq!(updated.total_amount, price("7.50"));
    assert_eq!(shop.stock(mango.id), 7);
    assert_eq!(shop.mailer.sent().len(), 1);
}

#[tokio::test]
async fn test_full_update_beyond_stock_changes_nothing() {
    let shop = TestShop::new();
    let jane = shop.customer("Jane");
    let mango = shop.product("Mango", "2.50", 5);
    let order = shop
        .state
        .orders()
        .place_order(jane.id, &[line(mango.id, 2)], address())
        .await
        .unwrap();

    let err = shop
        .state
        .orders()
        .update_order(
            &principal(&jane),
            order.id,
            &[line(mango.id, 9)],
            address(),
            OrderStatus::Processing,
        )
        .await
        .unwrap_err();

    assert!(matches!(err, OrderError::InsufficientStock { available: 3, .. }));
    assert_eq!(shop.stock(mango.id), 3);
    let unchanged = shop
        .state
        .orders()
        .get(&principal(&jane), order.id)
        .await
        .unwrap();
    assert_eq!(unchanged.quantity_of(mango.id), Quantity::new(2).ok());
}

#[tokio::test]
async fn test_orders_are_private_to_their_owner() {
    let shop = TestShop::new();
    let jane = shop.customer("Jane");
    let sam = shop.customer("Sam");
    let admin = shop.admin();
    let mango = shop.product("Mango", "2.50", 10);
    let order = shop
        .state
        .orders()
        .place_order(jane.id, &[line(mango.id, 1)], address())
        .await
        .unwrap();
    shop.state
        .orders()
        .place_order(sam.id, &[line(mango.id, 1)], address())
        .await
        .unwrap();

    let err = shop
        .state
        .orders()
        .get(&principal(&sam), order.id)
        .await
        .unwrap_err();
    assert!(matches!(err, OrderError::Forbidden));

    let err = shop
        .state
        .orders()
        .update_order(
            &principal(&sam),
            order.id,
            &[line(mango.id, 1)],
            address(),
            OrderStatus::Processing,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, OrderError::Forbidden));

    assert_eq!(shop.state.orders().list(&principal(&jane)).await.unwrap().len(), 1);
    assert_eq!(admin.role, UserRole::Admin);
    assert_eq!(shop.state.orders().list(&principal(&admin)).await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_product_on_an_order_cannot_be_deleted() {
    let shop = TestShop::new();
    let jane = shop.customer("Jane");
    let mango = shop.product("Mango", "2.50", 10);
    let kiwi = shop.product("Kiwi", "0.40", 10);
    shop.state
        .orders()
        .place_order(jane.id, &[line(mango.id, 1)], address())
        .await
        .unwrap();

    let err = shop.state.catalog().delete(mango.id).await.unwrap_err();
    assert!(matches!(err, CatalogError::InUse(_)));

    shop.state.catalog().delete(kiwi.id).await.unwrap();
    assert!(matches!(
        shop.state.catalog().get(kiwi.id).await,
        Err(CatalogError::NotFound(_))
    ));
}
