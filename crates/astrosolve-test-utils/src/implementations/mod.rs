//! Test implementations (fakes) of astrosolve interfaces.
//!
//! Unlike the mocks these keep state across calls, which makes them a better
//! fit for driving a whole solve run.

pub mod in_memory_gateway;

pub use in_memory_gateway::*;
