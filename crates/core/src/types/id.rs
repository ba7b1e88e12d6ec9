//! Typed keys for the shop's tables.
//!
//! Every table uses a `BIGSERIAL` key. Wrapping each in its own type keeps a
//! `ProductId` from being passed where a `UserId` is expected.

/// Declare `i64` key newtypes.
///
/// Each type is `Copy`, orders numerically, serializes as a bare number and,
/// with the `postgres` feature, binds and decodes as `BIGINT` (arrays
/// included, for `= ANY($1)` queries).
///
/// ```rust
/// orchard_core::define_id! {
///     /// A coupon.
///     pub struct CouponId;
/// }
///
/// let coupon = CouponId::new(3);
/// assert_eq!(coupon.as_i64(), 3);
/// assert_eq!(coupon.to_string(), "3");
/// ```
#[macro_export]
macro_rules! define_id {
    ($($(#[$meta:meta])* $vis:vis struct $name:ident;)+) => {$(
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash,
            ::serde::Serialize, ::serde::Deserialize,
        )]
        #[cfg_attr(feature = "postgres", derive(::sqlx::Type), sqlx(transparent))]
        #[serde(transparent)]
        $vis struct $name(i64);

        impl $name {
            #[must_use]
            pub const fn new(id: i64) -> Self {
                Self(id)
            }

            #[must_use]
            pub const fn as_i64(self) -> i64 {
                self.0
            }
        }

        impl ::core::fmt::Display for $name {
            fn fmt(&self, f: &mut ::core::fmt::Formatter<'_>) -> ::core::fmt::Result {
                ::core::fmt::Display::fmt(&self.0, f)
            }
        }
    )+};
}

define_id! {
    /// A shop user, customer or admin.
    pub struct UserId;
    /// A catalog product.
    pub struct ProductId;
    /// A placed order.
    pub struct OrderId;
    /// One line of an order.
    pub struct OrderItemId;
    /// An inbox entry.
    pub struct NotificationId;
    /// A row in the background job queue.
    pub struct JobId;
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_id_value_and_display() {
        let id = ProductId::new(7);
        assert_eq!(id.as_i64(), 7);
        assert_eq!(format!("#{id}"), "#7");
    }

    #[test]
    fn test_id_serde_is_transparent() {
        assert_eq!(serde_json::to_string(&OrderId::new(42)).unwrap(), "42");
        let parsed: OrderId = serde_json::from_str("42").unwrap();
        assert_eq!(parsed, OrderId::new(42));
    }

    #[test]
    fn test_ids_order_numerically() {
        let mut ids = vec![ProductId::new(9), ProductId::new(2), ProductId::new(5)];
        ids.sort();
        assert_eq!(ids, vec![ProductId::new(2), ProductId::new(5), ProductId::new(9)]);
    }
}
