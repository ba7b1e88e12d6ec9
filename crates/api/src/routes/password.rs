//! Password reset handlers.

use axum::extract::State;
use serde::Deserialize;

use orchard_core::Email;

use super::{ApiJson, ApiResponse};
use crate::error::{AppError, Result};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ForgotPasswordRequest {
    pub email: String,
}

#[derive(Debug, Deserialize)]
pub struct ResetPasswordRequest {
    pub email: String,
    pub token: String,
    pub password: String,
    pub password_confirmation: Option<String>,
}

fn email(value: &str) -> Result<Email> {
    Email::parse(value).map_err(|e| AppError::Validation(e.to_string()))
}

/// POST /api/auth/password/forgot
///
/// Answers the same way whether or not the address has an account.
///
/// # Errors
///
/// Returns 422 for a malformed email.
pub async fn forgot(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<ForgotPasswordRequest>,
) -> Result<ApiResponse<()>> {
    let email = email(&body.email)?;
    state.password_reset().request(&email).await?;
    Ok(ApiResponse::ok(
        "If that email has an account, a password reset link has been sent",
        (),
    ))
}

/// POST /api/auth/password/reset
///
/// # Errors
///
/// Returns 422 for a weak or unconfirmed password and 400 for a bad token.
pub async fn reset(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<ResetPasswordRequest>,
) -> Result<ApiResponse<()>> {
    let email = email(&body.email)?;
    if body
        .password_confirmation
        .as_deref()
        .is_some_and(|confirmation| confirmation != body.password)
    {
        return Err(AppError::Validation(
            "The password confirmation does not match".to_owned(),
        ));
    }

    state
        .password_reset()
        .reset(&email, &body.token, &body.password)
        .await?;
    Ok(ApiResponse::ok("Your password has been reset", ()))
}
