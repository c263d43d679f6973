//! Application services orchestrating the gateway

pub mod poll_policy;
pub mod solve_workflow;

pub use poll_policy::PollPolicy;
pub use solve_workflow::{SolveOutcome, SolveWorkflow};
