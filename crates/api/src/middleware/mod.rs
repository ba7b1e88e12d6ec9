//! HTTP middleware stack for the API.
//!
//! # Middleware Order (outermost first)
//!
//! 1. Sentry layers (hub per request, HTTP transaction)
//! 2. `TraceLayer` (request span with method, uri, status, latency)
//! 3. Request ID (add unique ID to each request)
//!
//! Authentication is an extractor, [`RequireAuth`], rather than a layer, so
//! public and protected routes share one router.

pub mod auth;
pub mod request_id;

pub use auth::{RequireAuth, USER_ID_HEADER, USER_ROLE_HEADER};
pub use request_id::{REQUEST_ID_HEADER, RequestId, request_id_middleware};
