//! Device shadow agent: library crate.
//!
//! Exposes configuration, the stock event handlers and the periodic
//! reporter so `ds-e2e-tests` can drive them against a mock channel.

pub mod config;
pub mod handlers;
pub mod reporter;
