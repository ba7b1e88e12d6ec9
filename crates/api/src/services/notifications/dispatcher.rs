//! New product fan-out.
//!
//! Runs as a queued task a few seconds after a product is created. Resolves
//! the subscriber set and schedules one delivery task per subscriber, in
//! chunks of [`CHUNK_SIZE`], each delivery delayed by its overall position
//! times [`STAGGER`] so the mail relay sees a steady trickle.

use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info, instrument, warn};

use orchard_core::{ProductId, UserId};

use crate::services::queue::{QueueName, Task, TaskQueue};
use crate::store::{ProductStore, StoreError, UserStore};

/// Subscribers per chunk.
pub const CHUNK_SIZE: usize = 25;

/// Delay added per subscriber position.
pub const STAGGER: Duration = Duration::from_secs(2);

/// The fan-out could not read its inputs; the task is retried.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// One delivery the fan-out will schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlannedDelivery {
    pub user_id: UserId,
    /// 0-based chunk index.
    pub chunk: usize,
    pub delay: Duration,
}

/// Every delivery for one product, in subscriber order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FanOutPlan {
    pub product_id: ProductId,
    pub deliveries: Vec<PlannedDelivery>,
}

impl FanOutPlan {
    /// Number of deliveries in each chunk.
    #[must_use]
    pub fn chunk_sizes(&self) -> Vec<usize> {
        let mut sizes: Vec<usize> = Vec::new();
        for delivery in &self.deliveries {
            match sizes.get_mut(delivery.chunk) {
                Some(size) => *size += 1,
                None => sizes.push(1),
            }
        }
        sizes
    }
}

/// Lay out deliveries for `subscribers`, keeping their order.
///
/// Subscriber `i` (0-based, across all chunks) lands in chunk `i / 25` with
/// a delay of `i × 2 s`.
#[must_use]
pub fn plan_fan_out(product_id: ProductId, subscribers: &[UserId]) -> FanOutPlan {
    let deliveries = subscribers
        .chunks(CHUNK_SIZE)
        .enumerate()
        .flat_map(|(chunk, users)| {
            users.iter().enumerate().map(move |(index, &user_id)| {
                let position = u32::try_from(chunk * CHUNK_SIZE + index).unwrap_or(u32::MAX);
                PlannedDelivery {
                    user_id,
                    chunk,
                    delay: STAGGER.saturating_mul(position),
                }
            })
        })
        .collect();

    FanOutPlan {
        product_id,
        deliveries,
    }
}

/// What a fan-out run did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FanOutReport {
    pub subscribers: usize,
    pub scheduled: usize,
    /// Deliveries the queue refused; logged and skipped.
    pub failed: usize,
    pub chunks: usize,
}

/// Schedules per-subscriber deliveries for a new product.
#[derive(Clone)]
pub struct FanOutDispatcher {
    products: Arc<dyn ProductStore>,
    users: Arc<dyn UserStore>,
    queue: Arc<dyn TaskQueue>,
}

impl FanOutDispatcher {
    #[must_use]
    pub fn new(
        products: Arc<dyn ProductStore>,
        users: Arc<dyn UserStore>,
        queue: Arc<dyn TaskQueue>,
    ) -> Self {
        Self {
            products,
            users,
            queue,
        }
    }

    /// Resolve subscribers for `product_id` and schedule their deliveries.
    ///
    /// A delivery the queue refuses is logged and counted; the rest still
    /// go out.
    ///
    /// # Errors
    ///
    /// Returns `DispatchError::Store` if the product or subscribers cannot be
    /// read; the task is then retried as a whole.
    #[instrument(skip(self), fields(product_id = %product_id))]
    pub async fn dispatch(&self, product_id: ProductId) -> Result<FanOutReport, DispatchError> {
        let Some(product) = self.products.find(product_id).await? else {
            warn!("Product no longer exists; nothing to announce");
            return Ok(FanOutReport::default());
        };
        info!(product_name = %product.name, "Starting new product fan-out");

        let subscribers: Vec<UserId> = self
            .users
            .new_product_subscribers()
            .await?
            .into_iter()
            .filter(|user| user.email.is_some())
            .map(|user| user.id)
            .collect();
        info!(count = subscribers.len(), "Users to notify");

        if subscribers.is_empty() {
            info!("No users to notify");
            return Ok(FanOutReport::default());
        }

        let plan = plan_fan_out(product_id, &subscribers);
        let mut report = FanOutReport {
            subscribers: subscribers.len(),
            chunks: plan.chunk_sizes().len(),
            ..FanOutReport::default()
        };

        for delivery in &plan.deliveries {
            let task = Task::NewProductDelivery {
                product_id,
                user_id: delivery.user_id,
            };
            match self.queue.schedule(task, QueueName::Emails, delivery.delay).await {
                Ok(_) => report.scheduled += 1,
                Err(e) => {
                    report.failed += 1;
                    error!(
                        user_id = %delivery.user_id,
                        error = %e,
                        "Failed to schedule delivery"
                    );
                }
            }
        }

        info!(
            scheduled = report.scheduled,
            failed = report.failed,
            chunks = report.chunks,
            "Finished dispatching deliveries"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn users(n: i64) -> Vec<UserId> {
        (1..=n).map(UserId::new).collect()
    }

    #[test]
    fn test_plan_sixty_subscribers() {
        let plan = plan_fan_out(ProductId::new(7), &users(60));
        assert_eq!(plan.deliveries.len(), 60);
        assert_eq!(plan.chunk_sizes(), vec![25, 25, 10]);
        for (i, delivery) in plan.deliveries.iter().enumerate() {
            assert_eq!(delivery.delay, Duration::from_secs(2 * i as u64));
            assert_eq!(delivery.chunk, i / 25);
        }
        assert_eq!(plan.deliveries[59].user_id, UserId::new(60));
        assert_eq!(plan.deliveries[25].delay, Duration::from_secs(50));
    }

    #[test]
    fn test_plan_empty() {
        let plan = plan_fan_out(ProductId::new(7), &[]);
        assert!(plan.deliveries.is_empty());
        assert!(plan.chunk_sizes().is_empty());
    }

    #[test]
    fn test_plan_exact_chunk() {
        let plan = plan_fan_out(ProductId::new(7), &users(25));
        assert_eq!(plan.chunk_sizes(), vec![25]);
        assert_eq!(plan.deliveries[24].delay, Duration::from_secs(48));
    }
}
