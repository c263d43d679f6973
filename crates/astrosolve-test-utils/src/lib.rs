//! Testing utilities for astrosolve.
//!
//! Provides a mockall mock of the remote gateway for expectation-style unit
//! tests, and a scripted in-memory gateway for end-to-end workflow tests.

pub mod implementations;
pub mod mocks;

/// Re-export commonly used types for convenience
pub use mockall;

pub use implementations::{GatewayCall, InMemoryGateway};
pub use mocks::MockAstrometryGateway;
