//! Data models representing database entities.
//!
//! This module contains all data structures that map to database tables,
//! plus the request/response bodies built around them.

/// Categories and products
pub mod catalog;
/// Affiliates, promo codes and commissions
pub mod commissioner;
/// CRM leads
pub mod lead;
/// Orders, inventory and subscriptions
pub mod order;
/// Support tickets
pub mod ticket;
/// Trial codes
pub mod trial;
