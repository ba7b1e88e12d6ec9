//! Principal extraction.
//!
//! Authentication happens in the gateway in front of this service, which
//! forwards the caller as `x-user-id` and `x-user-role` headers. Handlers
//! that need a caller take [`RequireAuth`].

use axum::{extract::FromRequestParts, http::request::Parts};

use orchard_core::{UserId, UserRole};

use crate::error::{AppError, set_sentry_user};
use crate::models::Principal;

/// Header carrying the authenticated user id.
pub const USER_ID_HEADER: &str = "x-user-id";

/// Header carrying the authenticated user's role. Absent means customer.
pub const USER_ROLE_HEADER: &str = "x-user-role";

/// Extractor that requires an authenticated principal.
///
/// Missing or malformed headers reject the request with 401.
///
/// # Example
///
/// ```rust,ignore
/// async fn protected_handler(RequireAuth(principal): RequireAuth) -> String {
///     format!("Hello, user {}!", principal.user_id)
/// }
/// ```
pub struct RequireAuth(pub Principal);

impl<S> FromRequestParts<S> for RequireAuth
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let principal = principal_from(parts)?;
        set_sentry_user(&principal.user_id);
        tracing::Span::current().record("user_id", principal.user_id.as_i64());
        Ok(Self(principal))
    }
}

fn principal_from(parts: &Parts) -> Result<Principal, AppError> {
    let header = |name: &str| {
        parts
            .headers
            .get(name)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
    };

    let user_id = header(USER_ID_HEADER)
        .ok_or_else(|| AppError::Unauthorized("Authentication required".to_owned()))?
        .parse::<i64>()
        .ok()
        .filter(|id| *id > 0)
        .map(UserId::new)
        .ok_or_else(|| AppError::Unauthorized("Invalid user id".to_owned()))?;

    let role = match header(USER_ROLE_HEADER) {
        None | Some("") => UserRole::Customer,
        Some(role) => role
            .parse::<UserRole>()
            .map_err(|_| AppError::Unauthorized("Invalid user role".to_owned()))?,
    };

    Ok(Principal { user_id, role })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use axum::http::Request;

    use super::*;

    fn parts(headers: &[(&str, &str)]) -> Parts {
        let mut builder = Request::builder().uri("/api/orders");
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        builder.body(()).unwrap().into_parts().0
    }

    #[test]
    fn test_principal_from_headers() {
        let principal =
            principal_from(&parts(&[(USER_ID_HEADER, "42"), (USER_ROLE_HEADER, "admin")]))
                .unwrap();
        assert_eq!(principal.user_id, UserId::new(42));
        assert!(principal.is_admin());

        let customer = principal_from(&parts(&[(USER_ID_HEADER, "7")])).unwrap();
        assert_eq!(customer.role, UserRole::Customer);
    }

    #[test]
    fn test_missing_or_malformed_principal_is_unauthorized() {
        for headers in [
            vec![],
            vec![(USER_ID_HEADER, "abc")],
            vec![(USER_ID_HEADER, "0")],
            vec![(USER_ID_HEADER, "5"), (USER_ROLE_HEADER, "root")],
        ] {
            assert!(matches!(
                principal_from(&parts(&headers)),
                Err(AppError::Unauthorized(_))
            ));
        }
    }
}
