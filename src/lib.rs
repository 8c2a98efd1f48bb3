//! Subscription storefront backend.
//!
//! A REST API for selling streaming subscriptions: catalog, orders with
//! manual approval or PayPal checkout, a credential pool bound to orders by
//! database procedures, promo-code commissioners, trial codes, leads and
//! support tickets, and a cached TMDB proxy for the storefront pages.

pub mod app;
pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;
pub mod state;
