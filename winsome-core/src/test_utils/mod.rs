//! Test utilities shared by unit tests
//!
//! Fixtures for a fully wired engine and timeout helpers for async tests.

pub mod async_helpers;
pub mod fixtures;

pub use async_helpers::*;
pub use fixtures::*;
