//! Order route handlers.

use axum::{extract::State, http::StatusCode, response::IntoResponse};
use serde::Deserialize;

use orchard_core::{DeliveryAddress, OrderId, OrderStatus, ProductId, Quantity};

use super::{ApiJson, ApiPath, ApiResponse};
use crate::error::{AppError, Result};
use crate::middleware::RequireAuth;
use crate::models::{Order, OrderLine};
use crate::state::AppState;

/// One requested line.
#[derive(Debug, Deserialize)]
pub struct LineRequest {
    #[serde(alias = "fruit_id")]
    pub product_id: i64,
    pub quantity: i64,
}

/// Delivery address as sent by clients. Blank fields are rejected later.
#[derive(Debug, Deserialize)]
pub struct AddressRequest {
    #[serde(default)]
    pub street: String,
    #[serde(default)]
    pub city: String,
    #[serde(default)]
    pub postal_code: String,
}

/// Body of `POST /api/orders`.
#[derive(Debug, Deserialize)]
pub struct PlaceOrderRequest {
    #[serde(default)]
    pub items: Vec<LineRequest>,
    pub delivery_address: AddressRequest,
}

/// Body of `PUT /api/orders/{id}`.
///
/// A body carrying only `status` is a status update; anything else is a
/// full update and needs all three fields.
#[derive(Debug, Deserialize)]
pub struct UpdateOrderRequest {
    pub status: Option<OrderStatus>,
    pub items: Option<Vec<LineRequest>>,
    pub delivery_address: Option<AddressRequest>,
}

fn order_lines(items: &[LineRequest]) -> Result<Vec<OrderLine>> {
    items
        .iter()
        .map(|item| {
            let quantity = u32::try_from(item.quantity)
                .ok()
                .and_then(|q| Quantity::new(q).ok())
                .ok_or_else(|| {
                    AppError::Validation("Each item quantity must be at least 1".to_owned())
                })?;
            Ok(OrderLine {
                product_id: ProductId::new(item.product_id),
                quantity,
            })
        })
        .collect()
}

fn address(request: AddressRequest) -> DeliveryAddress {
    DeliveryAddress {
        street: request.street.trim().to_owned(),
        city: request.city.trim().to_owned(),
        postal_code: request.postal_code.trim().to_owned(),
    }
}

/// GET /api/orders
///
/// # Errors
///
/// Returns `AppError` if the orders cannot be read.
pub async fn index(
    State(state): State<AppState>,
    RequireAuth(principal): RequireAuth,
) -> Result<ApiResponse<Vec<Order>>> {
    let orders = state.orders().list(&principal).await?;
    let message = if principal.is_admin() {
        "Orders retrieved successfully"
    } else {
        "Your orders retrieved successfully"
    };
    Ok(ApiResponse::ok(message, orders))
}

/// POST /api/orders
///
/// # Errors
///
/// Returns 422 for invalid input, 404 for unknown products and 400 when
/// stock runs short.
pub async fn store(
    State(state): State<AppState>,
    RequireAuth(principal): RequireAuth,
    ApiJson(body): ApiJson<PlaceOrderRequest>,
) -> Result<impl IntoResponse> {
    let lines = order_lines(&body.items)?;
    let order = state
        .orders()
        .place_order(principal.user_id, &lines, address(body.delivery_address))
        .await?;

    Ok((
        StatusCode::CREATED,
        ApiResponse::ok("Order placed successfully", order),
    ))
}

/// GET /api/orders/{id}
///
/// # Errors
///
/// Returns 404 for an unknown order and 403 for someone else's.
pub async fn show(
    State(state): State<AppState>,
    RequireAuth(principal): RequireAuth,
    ApiPath(id): ApiPath<i64>,
) -> Result<ApiResponse<Order>> {
    let order = state.orders().get(&principal, OrderId::new(id)).await?;
    Ok(ApiResponse::ok("Order retrieved successfully", order))
}

/// PUT /api/orders/{id}
///
/// # Errors
///
/// Returns 422 when a full update is missing fields, otherwise the errors of
/// the status or full update.
pub async fn update(
    State(state): State<AppState>,
    RequireAuth(principal): RequireAuth,
    ApiPath(id): ApiPath<i64>,
    ApiJson(body): ApiJson<UpdateOrderRequest>,
) -> Result<ApiResponse<Order>> {
    let order_id = OrderId::new(id);

    match body {
        UpdateOrderRequest {
            status: Some(status),
            items: None,
            delivery_address: None,
        } => {
            let order = state.orders().update_status(order_id, status).await?;
            Ok(ApiResponse::ok("Order status updated successfully", order))
        }
        UpdateOrderRequest {
            status: Some(status),
            items: Some(items),
            delivery_address: Some(delivery_address),
        } => {
            let lines = order_lines(&items)?;
            let order = state
                .orders()
                .update_order(&principal, order_id, &lines, address(delivery_address), status)
                .await?;
            Ok(ApiResponse::ok("Order updated successfully", order))
        }
        _ => Err(AppError::Validation(
            "A full order update needs items, delivery_address and status".to_owned(),
        )),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_order_lines_rejects_non_positive_quantity() {
        let items = [LineRequest {
            product_id: 1,
            quantity: 0,
        }];
        assert!(matches!(order_lines(&items), Err(AppError::Validation(_))));

        let items = [LineRequest {
            product_id: 1,
            quantity: -2,
        }];
        assert!(order_lines(&items).is_err());
    }

    #[test]
    fn test_line_accepts_fruit_id_alias() {
        let line: LineRequest = serde_json::from_str(r#"{"fruit_id":7,"quantity":5}"#).unwrap();
        assert_eq!(line.product_id, 7);

        let lines = order_lines(&[line]).unwrap();
        assert_eq!(lines[0].quantity.get(), 5);
    }

    #[test]
    fn test_status_only_body() {
        let body: UpdateOrderRequest = serde_json::from_str(r#"{"status":"shipped"}"#).unwrap();
        assert_eq!(body.status, Some(OrderStatus::Shipped));
        assert!(body.items.is_none());
        assert!(body.delivery_address.is_none());
    }
}
