//! In-app notification records.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Value, json};

use orchard_core::{NotificationId, NotificationKind, UserId};

use super::{Order, Product};

/// A notification in a user's inbox.
///
/// Only `read` and `read_at` change after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub id: NotificationId,
    pub user_id: UserId,
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    pub message: String,
    /// Event payload, shaped per `kind`.
    pub data: Value,
    pub read: bool,
    pub read_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// A notification about to be persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct NewNotification {
    pub user_id: UserId,
    pub kind: NotificationKind,
    pub message: String,
    pub data: Value,
}

impl NewNotification {
    /// "New product available" notice for `user_id`.
    #[must_use]
    pub fn new_product(user_id: UserId, product: &Product) -> Self {
        Self {
            user_id,
            kind: NotificationKind::NewProduct,
            message: format!("New product available: {}", product.name),
            data: json!({
                "product_id": product.id,
                "product_name": product.name,
                "product_price": product.price,
                "product_image": product.image_url,
            }),
        }
    }

    /// Order status notice for the order's owner.
    #[must_use]
    pub fn status_update(order: &Order) -> Self {
        Self {
            user_id: order.user_id,
            kind: NotificationKind::StatusUpdate,
            message: format!(
                "Your order #{} status has been updated to {}.",
                order.id, order.status
            ),
            data: json!({
                "order_id": order.id,
                "order_status": order.status,
                "total_amount": order.total_amount,
            }),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use orchard_core::{DeliveryAddress, OrderId, OrderStatus, Price, ProductId, StockLevel};
    use rust_decimal::Decimal;

    use super::*;

    #[test]
    fn test_new_product_payload() {
        let now = Utc::now();
        let product = Product {
            id: ProductId::new(7),
            name: "Blood Orange".to_owned(),
            price: Price::new(Decimal::new(250, 2)).unwrap(),
            stock: StockLevel::new(10),
            category: "citrus".to_owned(),
            image_url: Some("/img/blood-orange.jpg".to_owned()),
            description: None,
            created_at: now,
            updated_at: now,
        };

        let note = NewNotification::new_product(UserId::new(3), &product);
        assert_eq!(note.kind, NotificationKind::NewProduct);
        assert_eq!(note.message, "New product available: Blood Orange");
        assert_eq!(note.data["product_id"], 7);
        assert_eq!(note.data["product_price"], "2.50");
        assert_eq!(note.data["product_image"], "/img/blood-orange.jpg");
    }

    #[test]
    fn test_status_update_message() {
        let now = Utc::now();
        let order = Order {
            id: OrderId::new(42),
            user_id: UserId::new(3),
            items: Vec::new(),
            total_amount: Price::new(Decimal::new(1000, 2)).unwrap(),
            delivery_address: DeliveryAddress::new("1 Lane", "Town", "111").unwrap(),
            status: OrderStatus::Shipped,
            created_at: now,
            updated_at: now,
        };

        let note = NewNotification::status_update(&order);
        assert_eq!(note.user_id, UserId::new(3));
        assert_eq!(note.message, "Your order #42 status has been updated to shipped.");
        assert_eq!(note.data["order_status"], "shipped");
        assert_eq!(note.data["total_amount"], "10.00");
    }
}
