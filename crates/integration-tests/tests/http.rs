//! The JSON API end to end, driven through the router with `oneshot`.

use axum::body::{Body, to_bytes};
use axum::http::{Method, Request, StatusCode};
use serde_json::{Value, json};
use tower::ServiceExt;

use orchard_api::models::User;
use orchard_api::services::queue::{QueueName, Task};
use orchard_integration_tests::TestShop;

async fn send(
    shop: &TestShop,
    method: Method,
    uri: &str,
    user: Option<&User>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut request = Request::builder().method(method).uri(uri);
    if let Some(user) = user {
        request = request
            .header("x-user-id", user.id.to_string())
            .header("x-user-role", user.role.to_string());
    }
    let request = match body {
        Some(body) => request
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => request.body(Body::empty()).unwrap(),
    };

    let response = shop.router().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

#[tokio::test]
async fn test_health_endpoints() {
    let shop = TestShop::new();
    let response = shop
        .router()
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key("x-request-id"));

    let response = shop
        .router()
        .oneshot(Request::get("/health/ready").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_request_id_is_echoed() {
    let shop = TestShop::new();
    let response = shop
        .router()
        .oneshot(
            Request::get("/health")
                .header("x-request-id", "req-123")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.headers()["x-request-id"], "req-123");
}

#[tokio::test]
async fn test_product_listing_pages_filters_and_sorts() {
    let shop = TestShop::new();
    for i in 0..10 {
        shop.product(&format!("Apple {i}"), &format!("{}.00", i + 1), 5);
    }
    let lime = shop.store.add_product(orchard_api::models::NewProduct {
        category: "Citrus".to_owned(),
        ..new_product_body("Key Lime")
    });

    let (status, body) = send(&shop, Method::GET, "/api/products?page=2", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], true);
    assert_eq!(body["data"]["current_page"], 2);
    assert_eq!(body["data"]["per_page"], 8);
    assert_eq!(body["data"]["last_page"], 2);
    assert_eq!(body["data"]["total"], 11);
    assert_eq!(body["data"]["data"].as_array().unwrap().len(), 3);

    let (_, body) = send(
        &shop,
        Method::GET,
        "/api/products?category=Citrus",
        None,
        None,
    )
    .await;
    let data = body["data"]["data"].as_array().unwrap();
    assert_eq!(data.len(), 1);
    assert_eq!(data[0]["id"], lime.id.as_i64());

    let (_, body) = send(
        &shop,
        Method::GET,
        "/api/products?search=apple%209&sortBy=price-high",
        None,
        None,
    )
    .await;
    assert_eq!(body["data"]["data"][0]["name"], "Apple 9");

    let (_, body) = send(
        &shop,
        Method::GET,
        "/api/products?sortBy=price-high",
        None,
        None,
    )
    .await;
    assert_eq!(body["data"]["data"][0]["name"], "Apple 9");

    let (_, body) = send(&shop, Method::GET, "/api/products/categories", None, None).await;
    assert_eq!(body["data"], json!(["Citrus", "Tropical"]));
}

fn new_product_body(name: &str) -> orchard_api::models::NewProduct {
    orchard_api::models::NewProduct {
        name: name.to_owned(),
        price: orchard_integration_tests::price("0.30"),
        stock: orchard_core::StockLevel::new(40),
        category: "Tropical".to_owned(),
        image_url: None,
        description: None,
    }
}

#[tokio::test]
async fn test_unknown_product_is_404() {
    let shop = TestShop::new();
    let (status, body) = send(&shop, Method::GET, "/api/products/42", None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["status"], false);
    assert!(body["data"].is_null());
}

#[tokio::test]
async fn test_writes_need_a_principal() {
    let shop = TestShop::new();
    let payload = json!({"name": "Mango", "price": "2.50", "stock": 10, "category": "Tropical"});

    let (status, body) = send(&shop, Method::POST, "/api/products", None, Some(payload)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["status"], false);
    assert_eq!(body["message"], "Authentication required");

    let (status, _) = send(&shop, Method::GET, "/api/orders", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_create_product_queues_fan_out() {
    let shop = TestShop::new();
    let admin = shop.admin();
    let payload = json!({
        "name": "Mango",
        "price": "2.50",
        "stock": 10,
        "category": "Tropical",
        "description": "Sweet"
    });

    let (status, body) = send(
        &shop,
        Method::POST,
        "/api/products",
        Some(&admin),
        Some(payload),
    )
    .await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["message"], "Insert successful");
    assert_eq!(body["data"]["name"], "Mango");
    let scheduled = shop.queue.scheduled_on(QueueName::Notifications);
    assert_eq!(scheduled.len(), 1);
    assert!(matches!(scheduled[0].task, Task::NewProductFanOut { .. }));
}

#[tokio::test]
async fn test_invalid_product_is_422() {
    let shop = TestShop::new();
    let admin = shop.admin();

    let (status, body) = send(
        &shop,
        Method::POST,
        "/api/products",
        Some(&admin),
        Some(json!({"name": "Mango", "price": "-1", "stock": 10, "category": "Tropical"})),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["status"], false);

    let (status, _) = send(
        &shop,
        Method::POST,
        "/api/products",
        Some(&admin),
        Some(json!({"name": " ", "price": "1.00", "stock": 10, "category": "Tropical"})),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    let (status, _) = send(
        &shop,
        Method::POST,
        "/api/products",
        Some(&admin),
        Some(json!({"name": "Mango"})),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(shop.queue.scheduled().is_empty());
}

#[tokio::test]
async fn test_place_order_over_http() {
    let shop = TestShop::new();
    let jane = shop.customer("Jane");
    let mango = shop.product("Mango", "2.50", 10);

    let (status, body) = send(
        &shop,
        Method::POST,
        "/api/orders",
        Some(&jane),
        Some(json!({
            "items": [{"product_id": mango.id, "quantity": 4}],
            "delivery_address": {"street": "1 Orchard Lane", "city": "Appleton", "postal_code": "AP1 2PL"}
        })),
    )
    .await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["message"], "Order placed successfully");
    assert_eq!(body["data"]["total_amount"], "10.00");
    assert_eq!(body["data"]["status"], "processing");
    assert_eq!(body["data"]["items"][0]["product"]["name"], "Mango");
    assert_eq!(shop.stock(mango.id), 6);

    let (status, body) = send(&shop, Method::GET, "/api/orders", Some(&jane), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Your orders retrieved successfully");
    assert_eq!(body["data"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_insufficient_stock_is_400_with_message() {
    let shop = TestShop::new();
    let jane = shop.customer("Jane");
    let papaya = shop.product("Papaya", "3.00", 3);

    let (status, body) = send(
        &shop,
        Method::POST,
        "/api/orders",
        Some(&jane),
        Some(json!({
            "items": [{"fruit_id": papaya.id, "quantity": 5}],
            "delivery_address": {"street": "1 Orchard Lane", "city": "Appleton", "postal_code": "AP1 2PL"}
        })),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["status"], false);
    assert_eq!(body["message"], "Not enough stock for Papaya. Available: 3");
    assert_eq!(shop.store.order_count(), 0);
}

#[tokio::test]
async fn test_order_validation_errors_are_422() {
    let shop = TestShop::new();
    let jane = shop.customer("Jane");
    let mango = shop.product("Mango", "2.50", 10);

    for payload in [
        json!({"items": [], "delivery_address": {"street": "a", "city": "b", "postal_code": "c"}}),
        json!({"items": [{"product_id": mango.id, "quantity": 0}], "delivery_address": {"street": "a", "city": "b", "postal_code": "c"}}),
        json!({"items": [{"product_id": mango.id, "quantity": 1}], "delivery_address": {"street": "", "city": "b", "postal_code": "c"}}),
    ] {
        let (status, body) = send(
            &shop,
            Method::POST,
            "/api/orders",
            Some(&jane),
            Some(payload),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY, "{body}");
    }
    assert_eq!(shop.stock(mango.id), 10);
}

#[tokio::test]
async fn test_order_update_routes() {
    let shop = TestShop::new();
    let jane = shop.customer("Jane");
    let sam = shop.customer("Sam");
    let mango = shop.product("Mango", "2.50", 10);
    let order = shop
        .state
        .orders()
        .place_order(
            jane.id,
            &[orchard_integration_tests::line(mango.id, 2)],
            orchard_integration_tests::address(),
        )
        .await
        .unwrap();
    let uri = format!("/api/orders/{}", order.id);

    let (status, body) = send(&shop, Method::GET, &uri, Some(&sam), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["status"], false);

    let (status, body) = send(
        &shop,
        Method::PUT,
        &uri,
        Some(&jane),
        Some(json!({"status": "shipped"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Order status updated successfully");
    assert_eq!(body["data"]["status"], "shipped");

    let (status, _) = send(
        &shop,
        Method::PUT,
        &uri,
        Some(&jane),
        Some(json!({"status": "shipped", "items": [{"product_id": mango.id, "quantity": 1}]})),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    let (status, body) = send(
        &shop,
        Method::PUT,
        &uri,
        Some(&jane),
        Some(json!({
            "status": "shipped",
            "items": [{"product_id": mango.id, "quantity": 5}],
            "delivery_address": {"street": "2 Pear Road", "city": "Appleton", "postal_code": "AP1 3PR"}
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Order updated successfully");
    assert_eq!(body["data"]["delivery_address"]["street"], "2 Pear Road");
    assert_eq!(shop.stock(mango.id), 5);

    let (status, _) = send(&shop, Method::GET, "/api/orders/9999", Some(&jane), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_notification_routes() {
    let shop = TestShop::new();
    let fan = shop.subscriber("Fan");
    shop.state
        .catalog()
        .create(new_product_body("Mango"))
        .await
        .unwrap();
    shop.drain().await;

    let (status, body) = send(
        &shop,
        Method::GET,
        "/api/notifications/unread-count",
        Some(&fan),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["count"], 1);

    let (_, body) = send(&shop, Method::GET, "/api/notifications", Some(&fan), None).await;
    let notification = &body["data"][0];
    assert_eq!(notification["type"], "new_product");
    let id = notification["id"].as_i64().unwrap();

    let (status, body) = send(
        &shop,
        Method::POST,
        &format!("/api/notifications/{id}/read"),
        Some(&fan),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Notification marked as read");

    let (_, body) = send(
        &shop,
        Method::GET,
        "/api/notifications/unread-count",
        Some(&fan),
        None,
    )
    .await;
    assert_eq!(body["data"]["count"], 0);

    let stranger = shop.customer("Stranger");
    let (status, _) = send(
        &shop,
        Method::POST,
        &format!("/api/notifications/{id}/read"),
        Some(&stranger),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_settings_routes() {
    let shop = TestShop::new();
    let jane = shop.customer("Jane");

    let (status, body) = send(
        &shop,
        Method::GET,
        "/api/notifications/settings",
        Some(&jane),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body["data"],
        json!([
            {"id": 1, "title": "Order Updates", "description": "Get notified about your order status", "enabled": true},
            {"id": 2, "title": "New Products", "description": "Be the first to know about new arrivals", "enabled": true}
        ])
    );

    let (status, body) = send(
        &shop,
        Method::PUT,
        "/api/notifications/settings",
        Some(&jane),
        Some(json!({"notificationSettings": [{"id": 2, "enabled": false}]})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Notification settings updated successfully");
    assert_eq!(body["data"][1]["enabled"], false);
    assert_eq!(body["data"][0]["enabled"], true);

    let (status, _) = send(
        &shop,
        Method::PUT,
        "/api/notifications/settings",
        Some(&jane),
        Some(json!({"notificationSettings": [{"id": 7, "enabled": false}]})),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn test_password_routes() {
    let shop = TestShop::new();
    shop.customer("Jane");

    let (status, body) = send(
        &shop,
        Method::POST,
        "/api/auth/password/forgot",
        None,
        Some(json!({"email": "nobody@orchard.test"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], true);
    assert!(shop.mailer.sent().is_empty());

    let (status, _) = send(
        &shop,
        Method::POST,
        "/api/auth/password/forgot",
        None,
        Some(json!({"email": "Jane@Orchard.test"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(shop.mailer.sent().len(), 1);

    let (status, _) = send(
        &shop,
        Method::POST,
        "/api/auth/password/reset",
        None,
        Some(json!({
            "email": "jane@orchard.test",
            "token": "not-the-token",
            "password": "correct horse battery",
            "password_confirmation": "correct horse battery"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(
        &shop,
        Method::POST,
        "/api/auth/password/reset",
        None,
        Some(json!({
            "email": "jane@orchard.test",
            "token": "whatever",
            "password": "correct horse battery",
            "password_confirmation": "something else"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}
