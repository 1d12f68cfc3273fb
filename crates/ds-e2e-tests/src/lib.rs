//! End-to-end tests for the device shadow crates.
//!
//! The tests live under `tests/`; this library target is empty.
