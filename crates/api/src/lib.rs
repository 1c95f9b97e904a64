//! HTTP service for license entitlement and device activation.
//!
//! Exposed as a library so integration tests can build the same router
//! and engine the binary runs.

pub mod auth;
pub mod config;
pub mod engine;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod ratelimit;
pub mod routes;
pub mod state;
