//! Request extractors applied across handlers.

pub mod auth;
