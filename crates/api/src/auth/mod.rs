//! Authentication: JWT configuration, claims, and token validation.

pub mod jwt;
