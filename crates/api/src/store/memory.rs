//! In-memory implementation of every storage port, for tests.
//!
//! All state sits behind one mutex, so each port call is atomic in the same
//! way a Postgres transaction is: order placement and revision either apply
//! every stock movement and line change or none of them.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use orchard_core::{
    Email, NotificationId, NotificationKind, OrderId, OrderItemId, OrderStatus, ProductId,
    Quantity, StockError, StockLevel, UserId, UserRole,
};

use super::{
    DeleteOutcome, NotificationStore, OrderStore, ProductStore, ResetTokenStore, SettingsStore,
    StoreError, UserStore,
};
use crate::models::{
    NewNotification, NewOrder, NewProduct, Notification, NotificationSettings, Order, OrderItem,
    OrderRevision, Page, PasswordResetToken, PricedLine, Product, ProductChanges, ProductQuery,
    ProductSnapshot, SettingsPatch, StockAdjustment, User, plan_revision,
};

#[derive(Debug, Clone)]
struct StoredUser {
    user: User,
    password_hash: Option<String>,
}

#[derive(Debug, Default)]
struct Sequences {
    user: i64,
    product: i64,
    order: i64,
    item: i64,
    notification: i64,
}

impl Sequences {
    fn bump(counter: &mut i64) -> i64 {
        *counter += 1;
        *counter
    }
}

#[derive(Debug, Default)]
struct Inner {
    seq: Sequences,
    users: BTreeMap<UserId, StoredUser>,
    products: BTreeMap<ProductId, Product>,
    /// Orders as written; item snapshots are filled in on read.
    orders: BTreeMap<OrderId, Order>,
    notifications: Vec<Notification>,
    settings: HashMap<UserId, NotificationSettings>,
    reset_tokens: HashMap<Email, PasswordResetToken>,
    /// Units another writer takes just before the next order commit.
    pending_theft: Option<(ProductId, Quantity)>,
}

impl Inner {
    /// Run the queued competing write, if any.
    fn commit_theft(&mut self) {
        if let Some((product_id, quantity)) = self.pending_theft.take()
            && let Some(product) = self.products.get_mut(&product_id)
        {
            let units = product.stock.units().saturating_sub(quantity.get());
            product.stock = StockLevel::new(units);
        }
    }

    /// Compute the stock levels after `adjustments` without writing them.
    fn plan_stock(
        &self,
        adjustments: &[StockAdjustment],
    ) -> Result<Vec<(ProductId, StockLevel)>, StoreError> {
        let mut levels: BTreeMap<ProductId, StockLevel> = BTreeMap::new();
        for adjustment in adjustments {
            let product_id = adjustment.product_id();
            let mut level = match levels.get(&product_id) {
                Some(level) => *level,
                None => self
                    .products
                    .get(&product_id)
                    .map(|product| product.stock)
                    .ok_or(StockError::UnknownProduct(product_id))?,
            };
            match *adjustment {
                StockAdjustment::Reserve { quantity, .. } => {
                    level.reserve(product_id, quantity)?;
                }
                StockAdjustment::Release { quantity, .. } => {
                    level.release(quantity);
                }
            }
            levels.insert(product_id, level);
        }
        Ok(levels.into_iter().collect())
    }

    fn write_stock(&mut self, levels: Vec<(ProductId, StockLevel)>, at: DateTime<Utc>) {
        for (product_id, level) in levels {
            if let Some(product) = self.products.get_mut(&product_id) {
                product.stock = level;
                product.updated_at = at;
            }
        }
    }

    fn next_item_id(&mut self) -> OrderItemId {
        OrderItemId::new(Sequences::bump(&mut self.seq.item))
    }

    fn items_from(&mut self, lines: &[PricedLine], existing: &[OrderItem]) -> Vec<OrderItem> {
        lines
            .iter()
            .map(|line| {
                let id = existing
                    .iter()
                    .find(|item| item.product_id == line.product_id)
                    .map_or_else(|| self.next_item_id(), |item| item.id);
                OrderItem {
                    id,
                    product_id: line.product_id,
                    quantity: line.quantity,
                    unit_price: line.unit_price,
                    product: None,
                }
            })
            .collect()
    }

    /// `order` with each line's current product attached.
    fn with_snapshots(&self, order: &Order) -> Order {
        let mut order = order.clone();
        for item in &mut order.items {
            item.product = self.products.get(&item.product_id).map(|p| ProductSnapshot {
                id: p.id,
                name: p.name.clone(),
                category: p.category.clone(),
                image_url: p.image_url.clone(),
                price: p.price,
            });
        }
        order
    }
}

/// Shared in-memory backend. Clones see the same data.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a user. Users are created by the identity service in
    /// production, so the port has no insert.
    pub fn add_user(
        &self,
        first_name: &str,
        last_name: &str,
        email: Option<Email>,
        role: UserRole,
    ) -> User {
        let mut inner = self.lock();
        let id = UserId::new(Sequences::bump(&mut inner.seq.user));
        let user = User {
            id,
            first_name: first_name.to_owned(),
            last_name: last_name.to_owned(),
            email,
            role,
            created_at: Utc::now(),
        };
        inner.users.insert(
            id,
            StoredUser {
                user: user.clone(),
                password_hash: None,
            },
        );
        user
    }

    /// Insert a product without going through the catalog service.
    pub fn add_product(&self, product: NewProduct) -> Product {
        let mut inner = self.lock();
        insert_product(&mut inner, product)
    }

    /// Store `settings` as the user's record.
    pub fn set_settings(&self, settings: NotificationSettings) {
        self.lock().settings.insert(settings.user_id, settings);
    }

    /// Whether the user has a settings record.
    #[must_use]
    pub fn has_settings(&self, user_id: UserId) -> bool {
        self.lock().settings.contains_key(&user_id)
    }

    #[must_use]
    pub fn stock_of(&self, product_id: ProductId) -> Option<StockLevel> {
        self.lock().products.get(&product_id).map(|p| p.stock)
    }

    #[must_use]
    pub fn order_count(&self) -> usize {
        self.lock().orders.len()
    }

    /// Order lines across all orders.
    #[must_use]
    pub fn order_item_count(&self) -> usize {
        self.lock().orders.values().map(|o| o.items.len()).sum()
    }

    #[must_use]
    pub fn password_hash_of(&self, user_id: UserId) -> Option<String> {
        self.lock()
            .users
            .get(&user_id)
            .and_then(|stored| stored.password_hash.clone())
    }

    /// Have a competing writer take `quantity` units of `product_id` right
    /// before the next order creation or revision commits, after the caller
    /// has already checked stock.
    pub fn steal_stock_before_next_commit(&self, product_id: ProductId, quantity: Quantity) {
        self.lock().pending_theft = Some((product_id, quantity));
    }
}

fn insert_product(inner: &mut Inner, product: NewProduct) -> Product {
    let id = ProductId::new(Sequences::bump(&mut inner.seq.product));
    let now = Utc::now();
    let product = Product {
        id,
        name: product.name,
        price: product.price,
        stock: product.stock,
        category: product.category,
        image_url: product.image_url,
        description: product.description,
        created_at: now,
        updated_at: now,
    };
    inner.products.insert(id, product.clone());
    product
}

#[async_trait]
impl ProductStore for MemoryStore {
    async fn create(&self, product: NewProduct) -> Result<Product, StoreError> {
        let mut inner = self.lock();
        Ok(insert_product(&mut inner, product))
    }

    async fn find(&self, id: ProductId) -> Result<Option<Product>, StoreError> {
        Ok(self.lock().products.get(&id).cloned())
    }

    async fn find_many(&self, ids: &[ProductId]) -> Result<Vec<Product>, StoreError> {
        let inner = self.lock();
        Ok(inner
            .products
            .values()
            .filter(|p| ids.contains(&p.id))
            .cloned()
            .collect())
    }

    async fn list(&self, query: &ProductQuery) -> Result<Page<Product>, StoreError> {
        let inner = self.lock();
        let mut matching: Vec<&Product> = inner
            .products
            .values()
            .filter(|p| query.matches(p))
            .collect();
        matching.sort_by(|a, b| query.sort.compare(a, b));

        let total = u64::try_from(matching.len()).unwrap_or(u64::MAX);
        let offset = usize::try_from(query.offset()).unwrap_or(usize::MAX);
        let per_page = usize::try_from(ProductQuery::PER_PAGE).unwrap_or(usize::MAX);
        let data = matching
            .into_iter()
            .skip(offset)
            .take(per_page)
            .cloned()
            .collect();

        Ok(Page::new(
            data,
            query.page.max(1),
            ProductQuery::PER_PAGE,
            total,
        ))
    }

    async fn categories(&self) -> Result<Vec<String>, StoreError> {
        let inner = self.lock();
        let mut categories: Vec<String> = inner
            .products
            .values()
            .map(|p| p.category.clone())
            .collect();
        categories.sort();
        categories.dedup();
        Ok(categories)
    }

    async fn update(
        &self,
        id: ProductId,
        changes: ProductChanges,
    ) -> Result<Option<Product>, StoreError> {
        let mut inner = self.lock();
        let Some(product) = inner.products.get_mut(&id) else {
            return Ok(None);
        };
        changes.apply(product);
        product.updated_at = Utc::now();
        Ok(Some(product.clone()))
    }

    async fn delete(&self, id: ProductId) -> Result<DeleteOutcome, StoreError> {
        let mut inner = self.lock();
        if !inner.products.contains_key(&id) {
            return Ok(DeleteOutcome::NotFound);
        }
        let referenced = inner
            .orders
            .values()
            .any(|order| order.items.iter().any(|item| item.product_id == id));
        if referenced {
            return Ok(DeleteOutcome::InUse);
        }
        inner.products.remove(&id);
        Ok(DeleteOutcome::Deleted)
    }
}

#[async_trait]
impl OrderStore for MemoryStore {
    async fn create(&self, order: NewOrder) -> Result<OrderId, StoreError> {
        let mut inner = self.lock();
        inner.commit_theft();

        let levels = inner.plan_stock(&order.reservations())?;
        let now = Utc::now();
        inner.write_stock(levels, now);

        let id = OrderId::new(Sequences::bump(&mut inner.seq.order));
        let items = inner.items_from(&order.lines, &[]);
        let total_amount = order.total();
        inner.orders.insert(
            id,
            Order {
                id,
                user_id: order.user_id,
                items,
                total_amount,
                delivery_address: order.delivery_address,
                status: order.status,
                created_at: now,
                updated_at: now,
            },
        );
        Ok(id)
    }

    async fn revise(&self, revision: &OrderRevision) -> Result<OrderStatus, StoreError> {
        let mut inner = self.lock();
        let current = inner
            .orders
            .get(&revision.order_id)
            .cloned()
            .ok_or(StoreError::OrderNotFound(revision.order_id))?;
        let previous = current.status;
        inner.commit_theft();

        let plan = plan_revision(&current.priced_lines(), &revision.lines);
        let levels = inner.plan_stock(&plan.adjustments)?;
        let now = Utc::now();
        inner.write_stock(levels, now);

        let items = inner.items_from(&plan.lines, &current.items);
        let order = Order {
            items,
            total_amount: plan.total,
            delivery_address: revision.delivery_address.clone(),
            status: revision.status,
            updated_at: now,
            ..current
        };
        inner.orders.insert(order.id, order);
        Ok(previous)
    }

    async fn set_status(&self, id: OrderId, status: OrderStatus) -> Result<bool, StoreError> {
        let mut inner = self.lock();
        let Some(order) = inner.orders.get_mut(&id) else {
            return Ok(false);
        };
        order.status = status;
        order.updated_at = Utc::now();
        Ok(true)
    }

    async fn find(&self, id: OrderId) -> Result<Option<Order>, StoreError> {
        let inner = self.lock();
        Ok(inner.orders.get(&id).map(|order| inner.with_snapshots(order)))
    }

    async fn list(&self, owner: Option<UserId>) -> Result<Vec<Order>, StoreError> {
        let inner = self.lock();
        let mut orders: Vec<Order> = inner
            .orders
            .values()
            .filter(|order| owner.is_none_or(|owner| order.user_id == owner))
            .map(|order| inner.with_snapshots(order))
            .collect();
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(orders)
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn find(&self, id: UserId) -> Result<Option<User>, StoreError> {
        Ok(self.lock().users.get(&id).map(|stored| stored.user.clone()))
    }

    async fn find_by_email(&self, email: &Email) -> Result<Option<User>, StoreError> {
        Ok(self
            .lock()
            .users
            .values()
            .find(|stored| stored.user.email.as_ref() == Some(email))
            .map(|stored| stored.user.clone()))
    }

    async fn new_product_subscribers(&self) -> Result<Vec<User>, StoreError> {
        let inner = self.lock();
        Ok(inner
            .users
            .values()
            .filter(|stored| stored.user.email.is_some())
            .filter(|stored| {
                inner
                    .settings
                    .get(&stored.user.id)
                    .is_some_and(|s| s.new_products_enabled)
            })
            .map(|stored| stored.user.clone())
            .collect())
    }

    async fn set_password_hash(
        &self,
        id: UserId,
        password_hash: &str,
    ) -> Result<bool, StoreError> {
        let mut inner = self.lock();
        let Some(stored) = inner.users.get_mut(&id) else {
            return Ok(false);
        };
        stored.password_hash = Some(password_hash.to_owned());
        Ok(true)
    }
}

#[async_trait]
impl NotificationStore for MemoryStore {
    async fn create(&self, notification: NewNotification) -> Result<Notification, StoreError> {
        let mut inner = self.lock();
        let id = NotificationId::new(Sequences::bump(&mut inner.seq.notification));
        let stored = Notification {
            id,
            user_id: notification.user_id,
            kind: notification.kind,
            message: notification.message,
            data: notification.data,
            read: false,
            read_at: None,
            created_at: Utc::now(),
        };
        inner.notifications.push(stored.clone());
        Ok(stored)
    }

    async fn list_for(&self, user_id: UserId) -> Result<Vec<Notification>, StoreError> {
        let inner = self.lock();
        let mut list: Vec<Notification> = inner
            .notifications
            .iter()
            .filter(|n| n.user_id == user_id)
            .cloned()
            .collect();
        list.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(list)
    }

    async fn has_new_product_notice(
        &self,
        user_id: UserId,
        product_id: ProductId,
    ) -> Result<bool, StoreError> {
        let product_id = serde_json::json!(product_id);
        Ok(self.lock().notifications.iter().any(|n| {
            n.user_id == user_id
                && n.kind == NotificationKind::NewProduct
                && n.data.get("product_id") == Some(&product_id)
        }))
    }

    async fn unread_count(&self, user_id: UserId) -> Result<u64, StoreError> {
        let inner = self.lock();
        let unread = inner
            .notifications
            .iter()
            .filter(|n| n.user_id == user_id && !n.read)
            .count();
        Ok(u64::try_from(unread).unwrap_or(u64::MAX))
    }

    async fn mark_read(
        &self,
        user_id: UserId,
        id: NotificationId,
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let mut inner = self.lock();
        let Some(notification) = inner
            .notifications
            .iter_mut()
            .find(|n| n.id == id && n.user_id == user_id)
        else {
            return Ok(false);
        };
        notification.read = true;
        notification.read_at.get_or_insert(at);
        Ok(true)
    }
}

#[async_trait]
impl SettingsStore for MemoryStore {
    async fn get_or_create(&self, user_id: UserId) -> Result<NotificationSettings, StoreError> {
        Ok(*self
            .lock()
            .settings
            .entry(user_id)
            .or_insert_with(|| NotificationSettings::defaults(user_id)))
    }

    async fn update(
        &self,
        user_id: UserId,
        patch: &SettingsPatch,
    ) -> Result<NotificationSettings, StoreError> {
        let mut inner = self.lock();
        let settings = inner
            .settings
            .entry(user_id)
            .or_insert_with(|| NotificationSettings::defaults(user_id));
        *settings = settings.patched(patch);
        Ok(*settings)
    }
}

#[async_trait]
impl ResetTokenStore for MemoryStore {
    async fn put(&self, token: &PasswordResetToken) -> Result<(), StoreError> {
        self.lock()
            .reset_tokens
            .insert(token.email.clone(), token.clone());
        Ok(())
    }

    async fn find(&self, email: &Email) -> Result<Option<PasswordResetToken>, StoreError> {
        Ok(self.lock().reset_tokens.get(email).cloned())
    }

    async fn consume(
        &self,
        email: &Email,
        token_hash: &str,
    ) -> Result<Option<PasswordResetToken>, StoreError> {
        let mut inner = self.lock();
        let matches = inner
            .reset_tokens
            .get(email)
            .is_some_and(|stored| stored.token_hash == token_hash);
        Ok(if matches {
            inner.reset_tokens.remove(email)
        } else {
            None
        })
    }

    async fn delete(&self, email: &Email) -> Result<(), StoreError> {
        self.lock().reset_tokens.remove(email);
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use orchard_core::{DeliveryAddress, Price};
    use rust_decimal::Decimal;

    use super::*;
    use crate::models::RevisedLine;

    fn product(store: &MemoryStore, name: &str, cents: i64, stock: u32) -> Product {
        store.add_product(NewProduct {
            name: name.to_owned(),
            price: Price::new(Decimal::new(cents, 2)).unwrap(),
            stock: StockLevel::new(stock),
            category: "fruit".to_owned(),
            image_url: None,
            description: None,
        })
    }

    fn line(p: &Product, n: u32) -> PricedLine {
        PricedLine {
            product_id: p.id,
            quantity: Quantity::new(n).unwrap(),
            unit_price: p.price,
        }
    }

    fn address() -> DeliveryAddress {
        DeliveryAddress::new("1 Orchard Lane", "Appleton", "12345").unwrap()
    }

    #[tokio::test]
    async fn test_create_is_all_or_nothing() {
        let store = MemoryStore::new();
        let user = store.add_user("Ada", "Lovelace", None, UserRole::Customer);
        let apple = product(&store, "Apple", 100, 5);
        let pear = product(&store, "Pear", 200, 1);

        let result = OrderStore::create(
            &store,
            NewOrder {
                user_id: user.id,
                delivery_address: address(),
                status: OrderStatus::Processing,
                lines: vec![line(&apple, 2), line(&pear, 3)],
            },
        )
        .await;

        assert!(matches!(
            result,
            Err(StoreError::Stock(StockError::Insufficient { available: 1, .. }))
        ));
        assert_eq!(store.stock_of(apple.id), Some(StockLevel::new(5)));
        assert_eq!(store.stock_of(pear.id), Some(StockLevel::new(1)));
        assert_eq!(store.order_count(), 0);
    }

    #[tokio::test]
    async fn test_revise_moves_only_the_difference() {
        let store = MemoryStore::new();
        let user = store.add_user("Ada", "Lovelace", None, UserRole::Customer);
        let apple = product(&store, "Apple", 100, 10);
        let id = OrderStore::create(
            &store,
            NewOrder {
                user_id: user.id,
                delivery_address: address(),
                status: OrderStatus::Processing,
                lines: vec![line(&apple, 4)],
            },
        )
        .await
        .unwrap();
        assert_eq!(store.stock_of(apple.id), Some(StockLevel::new(6)));

        let previous = store
            .revise(&OrderRevision {
                order_id: id,
                delivery_address: address(),
                status: OrderStatus::Shipped,
                lines: vec![RevisedLine {
                    product_id: apple.id,
                    quantity: Quantity::new(1).unwrap(),
                    current_price: apple.price,
                }],
            })
            .await
            .unwrap();

        assert_eq!(previous, OrderStatus::Processing);
        assert_eq!(store.stock_of(apple.id), Some(StockLevel::new(9)));
        let order = OrderStore::find(&store, id).await.unwrap().unwrap();
        assert_eq!(order.status, OrderStatus::Shipped);
        assert_eq!(order.total_amount, order.lines_total());
        assert_eq!(order.items[0].product.as_ref().unwrap().name, "Apple");
    }

    #[tokio::test]
    async fn test_delete_refuses_ordered_product() {
        let store = MemoryStore::new();
        let user = store.add_user("Ada", "Lovelace", None, UserRole::Customer);
        let apple = product(&store, "Apple", 100, 10);
        let plum = product(&store, "Plum", 100, 10);
        OrderStore::create(
            &store,
            NewOrder {
                user_id: user.id,
                delivery_address: address(),
                status: OrderStatus::Processing,
                lines: vec![line(&apple, 1)],
            },
        )
        .await
        .unwrap();

        assert_eq!(ProductStore::delete(&store, apple.id).await.unwrap(), DeleteOutcome::InUse);
        assert_eq!(ProductStore::delete(&store, plum.id).await.unwrap(), DeleteOutcome::Deleted);
        assert_eq!(ProductStore::delete(&store, plum.id).await.unwrap(), DeleteOutcome::NotFound);
    }

    #[tokio::test]
    async fn test_subscribers_need_settings_row_and_email() {
        let store = MemoryStore::new();
        let with_email = store.add_user(
            "Ada",
            "Lovelace",
            Some(Email::parse("ada@example.com").unwrap()),
            UserRole::Customer,
        );
        let no_row = store.add_user(
            "Alan",
            "Turing",
            Some(Email::parse("alan@example.com").unwrap()),
            UserRole::Customer,
        );
        let no_email = store.add_user("Grace", "Hopper", None, UserRole::Customer);
        store.set_settings(NotificationSettings::defaults(with_email.id));
        store.set_settings(NotificationSettings::defaults(no_email.id));

        let subscribers = store.new_product_subscribers().await.unwrap();
        let ids: Vec<UserId> = subscribers.iter().map(|u| u.id).collect();
        assert_eq!(ids, vec![with_email.id]);
        assert!(!store.has_settings(no_row.id));
    }

    #[tokio::test]
    async fn test_mark_read_keeps_first_timestamp() {
        let store = MemoryStore::new();
        let user = store.add_user("Ada", "Lovelace", None, UserRole::Customer);
        let created = NotificationStore::create(
            &store,
            NewNotification {
                user_id: user.id,
                kind: NotificationKind::NewProduct,
                message: "hi".to_owned(),
                data: serde_json::json!({}),
            },
        )
        .await
        .unwrap();

        let first = Utc::now();
        assert!(store.mark_read(user.id, created.id, first).await.unwrap());
        let later = first + chrono::Duration::minutes(5);
        assert!(store.mark_read(user.id, created.id, later).await.unwrap());
        assert!(!store.mark_read(UserId::new(99), created.id, later).await.unwrap());

        let list = store.list_for(user.id).await.unwrap();
        assert_eq!(list[0].read_at, Some(first));
        assert_eq!(store.unread_count(user.id).await.unwrap(), 0);
    }
}
