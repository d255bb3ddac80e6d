//! z402 Server - axum adapter for payment-gated routes
//!
//! - `require_payment` middleware for any axum route
//! - `PaywallServer` for a standalone single-route paywall

pub mod http_server;
pub mod middleware;

pub use http_server::PaywallServer;
pub use middleware::{require_payment, RouteGuard};
