//! Shared test utilities for linkmirror integration tests.
//!
//! `TestHarness` gives each test its own file-backed store, a tokio runtime
//! for host calls, and a registry of in-memory hosts.

pub mod harness;

pub use harness::TestHarness;
