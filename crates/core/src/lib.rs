//! Pure domain logic for the license entitlement engine.
//!
//! This crate has no I/O dependencies. Everything that talks to the
//! network or the database lives in `keyline-provider` and `keyline-db`;
//! this crate defines the types and decision rules they share.

pub mod decision;
pub mod error;
pub mod policy;
pub mod poll;
pub mod types;
pub mod validation;
