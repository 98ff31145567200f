//! # Storefront server
//! The HTTP front end of the storefront checkout engine. It is responsible for:
//! * Opening hosted checkout sessions for authenticated shoppers.
//! * Receiving Square payment notifications and handing them to the payment reconciler.
//! * Cart, order and coupon endpoints for shoppers, and coupon administration for admins.
//!
//! ## Configuration
//! The server is configured via environment variables. See [config](config/index.html) for more information.
//!
//! ## Routes
//! * `/health`: A health check route that returns a 200 OK response.
//! * `/webhooks/square`: Square payment notifications. Authenticated by signature, not by token.
//! * `/api/...`: Everything else. Requires a bearer token; `/api/admin/...` also requires the admin role.
pub mod auth;
pub mod cli;
pub mod config;
pub mod data_objects;
pub mod errors;
pub mod helpers;
pub mod integrations;
pub mod middleware;
pub mod routes;
pub mod server;

#[cfg(test)]
mod endpoint_tests;
