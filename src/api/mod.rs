//! HTTP API
//!
//! JSON surface over the game service: round queries, bet submission and
//! finalization, the event journal and Prometheus metrics.

pub mod errors;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod server;

pub use server::{build_app, ApiServer};
