//! HTTP request handlers (route handlers).
//!
//! Each handler is an async function that:
//! 1. Receives HTTP request data (JSON body, URL params, etc.)
//! 2. Performs business logic (database queries, upstream calls, validation)
//! 3. Returns HTTP response (JSON, status code)

/// Category and product endpoints
pub mod catalog;
/// PayPal checkout
pub mod checkout;
pub mod commissioners;
pub mod cron;
pub mod health;
/// Credential pool management
pub mod inventory;
pub mod leads;
/// Orders, approval and subscriptions
pub mod orders;
pub mod stats;
pub mod tickets;
/// Movie and series catalog proxy
pub mod tmdb;
pub mod trial;
