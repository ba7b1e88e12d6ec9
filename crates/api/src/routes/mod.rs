//! HTTP route handlers for the API.
//!
//! # Route Structure
//!
//! ```text
//! GET  /health                          - Liveness
//! GET  /health/ready                    - Database readiness
//!
//! # Products
//! GET    /api/products                  - Listing (?category&search&sortBy&page)
//! GET    /api/products/categories       - Distinct categories
//! GET    /api/products/{id}             - Product detail
//! POST   /api/products                  - Create (auth), queues the fan-out
//! PUT    /api/products/{id}             - Update (auth)
//! DELETE /api/products/{id}             - Delete (auth)
//!
//! # Orders (auth)
//! GET  /api/orders                      - Own orders, or all for admins
//! POST /api/orders                      - Place an order
//! GET  /api/orders/{id}                 - One order (owner)
//! PUT  /api/orders/{id}                 - Status update or full update
//!
//! # Notifications (auth)
//! GET  /api/notifications               - Inbox
//! GET  /api/notifications/unread-count  - Unread count
//! POST /api/notifications/{id}/read     - Mark as read
//! GET  /api/notifications/settings      - Opt-in flags
//! PUT  /api/notifications/settings      - Change opt-in flags
//!
//! # Password reset
//! POST /api/auth/password/forgot        - Email a reset link
//! POST /api/auth/password/reset         - Set a new password
//! ```
//!
//! Every JSON response uses the envelope `{"status", "message", "data"}`.

pub mod health;
pub mod notifications;
pub mod orders;
pub mod password;
pub mod products;

use axum::{
    Json, Router,
    extract::{
        FromRequest, FromRequestParts,
        rejection::{JsonRejection, PathRejection, QueryRejection},
    },
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::Serialize;

use crate::error::AppError;
use crate::state::AppState;

/// Success envelope.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub status: bool,
    pub message: String,
    pub data: T,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(message: impl Into<String>, data: T) -> Self {
        Self {
            status: true,
            message: message.into(),
            data,
        }
    }
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        Json(self).into_response()
    }
}

/// `Json` whose rejections use the error envelope.
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(AppError))]
pub struct ApiJson<T>(pub T);

/// `Query` whose rejections use the error envelope.
#[derive(FromRequestParts)]
#[from_request(via(axum::extract::Query), rejection(AppError))]
pub struct ApiQuery<T>(pub T);

/// `Path` whose rejections use the error envelope.
#[derive(FromRequestParts)]
#[from_request(via(axum::extract::Path), rejection(AppError))]
pub struct ApiPath<T>(pub T);

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        Self::Validation(rejection.body_text())
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        Self::Validation(rejection.body_text())
    }
}

impl From<PathRejection> for AppError {
    fn from(rejection: PathRejection) -> Self {
        Self::NotFound(rejection.body_text())
    }
}

/// Create the product routes router.
pub fn product_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(products::index).post(products::store))
        .route("/categories", get(products::categories))
        .route(
            "/{id}",
            get(products::show)
                .put(products::update)
                .delete(products::destroy),
        )
}

/// Create the order routes router.
pub fn order_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(orders::index).post(orders::store))
        .route("/{id}", get(orders::show).put(orders::update))
}

/// Create the notification routes router.
pub fn notification_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(notifications::index))
        .route("/unread-count", get(notifications::unread_count))
        .route("/{id}/read", post(notifications::mark_as_read))
        .route(
            "/settings",
            get(notifications::settings).put(notifications::update_settings),
        )
}

/// Create the password reset routes router.
pub fn password_routes() -> Router<AppState> {
    Router::new()
        .route("/forgot", post(password::forgot))
        .route("/reset", post(password::reset))
}

/// Create all routes for the API.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health::health))
        .route("/health/ready", get(health::readiness))
        .nest("/api/products", product_routes())
        .nest("/api/orders", order_routes())
        .nest("/api/notifications", notification_routes())
        .nest("/api/auth/password", password_routes())
}
