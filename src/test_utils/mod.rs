//! Shared helpers for the crate's unit tests.
mod common;

pub use common::*;
