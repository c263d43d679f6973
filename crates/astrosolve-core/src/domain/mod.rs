//! Domain model of a solve run: session, status machine and results

pub mod session;
pub mod solution;
pub mod status;

pub use session::{Session, SessionStore};
pub use solution::{SolutionRecord, SubmissionHandle};
pub use status::{WorkflowState, WorkflowStatus};
