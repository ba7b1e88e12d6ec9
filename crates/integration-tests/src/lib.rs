//! Test harness for Orchard.
//!
//! [`TestShop`] wires the real services to the in-memory store, the
//! recording queue and the recording mailer, so tests can place orders,
//! drive the job runner and inspect what was written and sent.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p orchard-integration-tests
//!
//! # Postgres-backed tests (need DATABASE_URL)
//! cargo test -p orchard-integration-tests -- --ignored
//! ```

#![allow(clippy::unwrap_used, clippy::missing_panics_doc)]

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use rust_decimal::Decimal;

use orchard_api::models::{NewProduct, NotificationSettings, OrderLine, Product, User};
use orchard_api::services::email::RecordingMailer;
use orchard_api::services::queue::{JobRunner, RecordingQueue, TaskHandler};
use orchard_api::state::AppState;
use orchard_api::store::{MemoryStore, Stores};
use orchard_core::{DeliveryAddress, Email, Price, ProductId, Quantity, StockLevel, UserRole};

/// Front-end base used in emailed links.
pub const SHOP_URL: &str = "https://orchard.test";

/// The services of one shop, backed by memory.
pub struct TestShop {
    pub store: MemoryStore,
    pub queue: Arc<RecordingQueue>,
    pub mailer: Arc<RecordingMailer>,
    pub stores: Stores,
    pub state: AppState,
}

impl Default for TestShop {
    fn default() -> Self {
        Self::new()
    }
}

impl TestShop {
    #[must_use]
    pub fn new() -> Self {
        let store = MemoryStore::new();
        let queue = Arc::new(RecordingQueue::new());
        let mailer = Arc::new(RecordingMailer::new());
        let stores = Stores::memory(&store, queue.clone());
        let state = AppState::new(&stores, mailer.clone(), SHOP_URL, None);
        Self {
            store,
            queue,
            mailer,
            stores,
            state,
        }
    }

    /// A customer with an email and no settings record.
    pub fn customer(&self, first_name: &str) -> User {
        let email = email(&format!("{}@orchard.test", first_name.to_lowercase()));
        self.store
            .add_user(first_name, "Tester", Some(email), UserRole::Customer)
    }

    /// A customer without an email, as created by some OAuth sign-ups.
    pub fn customer_without_email(&self, first_name: &str) -> User {
        self.store
            .add_user(first_name, "Oauth", None, UserRole::Customer)
    }

    pub fn admin(&self) -> User {
        self.store
            .add_user("Ada", "Admin", Some(email("admin@orchard.test")), UserRole::Admin)
    }

    /// A customer with default settings, so subscribed to new products.
    pub fn subscriber(&self, first_name: &str) -> User {
        let user = self.customer(first_name);
        self.store.set_settings(NotificationSettings::defaults(user.id));
        user
    }

    /// Add a product straight to the store, without queueing a fan-out.
    pub fn product(&self, name: &str, amount: &str, stock: u32) -> Product {
        self.store.add_product(NewProduct {
            name: name.to_owned(),
            price: price(amount),
            stock: StockLevel::new(stock),
            category: "Tropical".to_owned(),
            image_url: None,
            description: None,
        })
    }

    #[must_use]
    pub fn stock(&self, product_id: ProductId) -> u32 {
        self.store.stock_of(product_id).map_or(0, StockLevel::units)
    }

    /// A runner pulling from the recording queue.
    #[must_use]
    pub fn runner(&self) -> JobRunner {
        JobRunner::new(
            self.queue.clone(),
            TaskHandler::from_stores(&self.stores, self.mailer.clone(), SHOP_URL),
            Duration::from_millis(5),
            100,
        )
    }

    /// Run jobs until the queue has nothing left to claim. Returns the
    /// number of attempts made.
    pub async fn drain(&self) -> usize {
        let runner = self.runner();
        let mut attempts = 0;
        for _ in 0..50 {
            let ran = runner.run_once().await.unwrap();
            if ran == 0 {
                break;
            }
            attempts += ran;
        }
        attempts
    }

    /// The HTTP application.
    #[must_use]
    pub fn router(&self) -> Router {
        orchard_api::app(self.state.clone())
    }
}

#[must_use]
pub fn price(amount: &str) -> Price {
    Price::new(Decimal::from_str(amount).unwrap()).unwrap()
}

#[must_use]
pub fn email(address: &str) -> Email {
    Email::parse(address).unwrap()
}

#[must_use]
pub fn line(product_id: ProductId, quantity: u32) -> OrderLine {
    OrderLine {
        product_id,
        quantity: Quantity::new(quantity).unwrap(),
    }
}

#[must_use]
pub fn address() -> DeliveryAddress {
    DeliveryAddress::new("1 Orchard Lane", "Appleton", "AP1 2PL").unwrap()
}
