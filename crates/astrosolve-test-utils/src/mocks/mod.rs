//! Mock implementations of astrosolve interfaces.

pub mod gateway;

pub use gateway::*;
