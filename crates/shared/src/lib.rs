//! Healio shared library — identifiers, store document shapes, and error types
//! shared between the crypto and messaging crates.

pub mod api;
pub mod constants;
pub mod error;
pub mod ids;
