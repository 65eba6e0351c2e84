//! # Duka server
//! This crate hosts the HTTP server for the Duka engine. It is responsible for:
//! * Taking checkouts from the storefront, reserving stock and starting M-Pesa STK pushes.
//! * Receiving M-Pesa STK callbacks and timeout notices, and handing them to the engine.
//! * Serving order, payment and stock queries, and accepting stock adjustments and order transitions.
//! * Running the reconciliation worker that settles payments whose callback never arrived.
//!
//! ## Configuration
//! The server is configured via environment variables. See [config](config/index.html) for more information.
//!
//! ## Routes
//! * `/health`: A health check route that returns a 200 OK response.
//! * `/api/...`: The storefront and back-office API. See [routes](routes/index.html).
//! * `/mpesa/callback` and `/mpesa/timeout`: M-Pesa notifications. These always receive the fixed acknowledgement.

pub mod cli;
pub mod config;
pub mod data_objects;
pub mod errors;
pub mod helpers;
pub mod integrations;
pub mod reconcile_worker;
pub mod routes;
pub mod server;

#[cfg(test)]
mod endpoint_tests;
