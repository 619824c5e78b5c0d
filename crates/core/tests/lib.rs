//! Integration test suite entry point.
//!
//! A single integration test binary (rather than one file per scenario) so
//! `common` can be shared without `#[path]` hacks.

/// Shared test infrastructure: a synthetic byte-level encoder for the
/// fixed-layout instructions `isa::decode::fast` understands, plus a thin
/// `TestContext` + `Simulator` builder.
pub mod common;

/// End-to-end tests driving a full `Simulator` across both backends.
pub mod integration;
