//! Forum gateway: a per-client sliding window rate limiter in front of the
//! API, and a per-user notification hub that fans new notifications out to
//! live Server-Sent Events streams.

pub mod config;
pub mod error;
pub mod handlers;
pub mod hub;
pub mod identity;
pub mod logging;
pub mod metrics;
pub mod middleware;
pub mod models;
pub mod rate_limit;
pub mod server;
pub mod state;
pub mod store;
