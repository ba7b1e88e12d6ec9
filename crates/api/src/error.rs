//! Unified error handling with Sentry integration.
//!
//! Provides a unified `AppError` type that captures errors to Sentry before
//! responding to the client. All route handlers should return `Result<T, AppError>`.
//!
//! Every error is rendered as the API envelope `{"status": false, "message":
//! ..., "data": null}`. Server errors never expose their details.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

use crate::services::notifications::{InboxError, SettingsError};
use crate::services::{CatalogError, OrderError, PasswordResetError};
use crate::store::StoreError;

/// Application-level error type for the API.
#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Order(#[from] OrderError),

    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error(transparent)]
    Settings(#[from] SettingsError),

    #[error(transparent)]
    Inbox(#[from] InboxError),

    #[error(transparent)]
    PasswordReset(#[from] PasswordResetError),

    #[error("Database error: {0}")]
    Store(#[from] StoreError),

    /// Request body or query failed validation.
    #[error("{0}")]
    Validation(String),

    /// Principal headers missing or malformed.
    #[error("{0}")]
    Unauthorized(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// HTTP status for this error.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::Order(err) => match err {
                OrderError::EmptyOrder | OrderError::Address(_) => {
                    StatusCode::UNPROCESSABLE_ENTITY
                }
                OrderError::InsufficientStock { .. } => StatusCode::BAD_REQUEST,
                OrderError::ProductNotFound(_) | OrderError::NotFound(_) => StatusCode::NOT_FOUND,
                OrderError::Forbidden => StatusCode::FORBIDDEN,
                OrderError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Self::Catalog(err) => match err {
                CatalogError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
                CatalogError::NotFound(_) => StatusCode::NOT_FOUND,
                CatalogError::InUse(_) => StatusCode::BAD_REQUEST,
                CatalogError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Self::Settings(err) => match err {
                SettingsError::UnknownSetting(_) => StatusCode::UNPROCESSABLE_ENTITY,
                SettingsError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Self::Inbox(err) => match err {
                InboxError::NotFound(_) => StatusCode::NOT_FOUND,
                InboxError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Self::PasswordReset(err) => match err {
                PasswordResetError::InvalidToken | PasswordResetError::ExpiredToken => {
                    StatusCode::BAD_REQUEST
                }
                PasswordResetError::WeakPassword => StatusCode::UNPROCESSABLE_ENTITY,
                PasswordResetError::PasswordHash
                | PasswordResetError::Email(_)
                | PasswordResetError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Self::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Store(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();

        // Capture server errors to Sentry
        let message = if status.is_server_error() {
            let event_id = sentry::capture_error(&self);
            tracing::error!(
                error = %self,
                sentry_event_id = %event_id,
                "Request error"
            );
            // Don't expose internal error details to clients
            "Internal server error".to_owned()
        } else {
            self.to_string()
        };

        (
            status,
            Json(json!({
                "status": false,
                "message": message,
                "data": null,
            })),
        )
            .into_response()
    }
}

/// Result type alias for `AppError`.
pub type Result<T> = std::result::Result<T, AppError>;

/// Set the Sentry user context for the current request.
pub fn set_sentry_user(user_id: &impl ToString) {
    sentry::configure_scope(|scope| {
        scope.set_user(Some(sentry::User {
            id: Some(user_id.to_string()),
            ..Default::default()
        }));
    });
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use axum::body::to_bytes;
    use orchard_core::{OrderId, ProductId};

    use super::*;
    use crate::db::RepositoryError;

    async fn body_of(err: AppError) -> (StatusCode, serde_json::Value) {
        let response = err.into_response();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[test]
    fn test_app_error_status_codes() {
        assert_eq!(
            AppError::Unauthorized("missing".to_owned()).status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            AppError::Order(OrderError::Forbidden).status(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            AppError::Order(OrderError::NotFound(OrderId::new(1))).status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            AppError::Order(OrderError::EmptyOrder).status(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            AppError::Catalog(CatalogError::InUse(ProductId::new(1))).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AppError::Settings(SettingsError::UnknownSetting(3)).status(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
    }

    #[tokio::test]
    async fn test_insufficient_stock_envelope() {
        let (status, body) = body_of(AppError::Order(OrderError::InsufficientStock {
            product: "Mango".to_owned(),
            available: 3,
        }))
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["status"], false);
        assert_eq!(body["message"], "Not enough stock for Mango. Available: 3");
        assert!(body["data"].is_null());
    }

    #[tokio::test]
    async fn test_server_errors_hide_details() {
        let err = AppError::Store(StoreError::Repository(RepositoryError::DataCorruption(
            "price".to_owned(),
        )));
        let (status, body) = body_of(err).await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["message"], "Internal server error");
    }
}
