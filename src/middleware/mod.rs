//! HTTP middleware components.
//!
//! Middleware are functions that run before route handlers.
//! They can:
//! - Authenticate requests
//! - Enforce per-client request budgets
//! - Short-circuit requests (reject unauthorized or throttled callers)

/// Bearer authentication and admin allow-list
pub mod auth;
/// In-memory fixed-window rate limiting
pub mod rate_limit;
