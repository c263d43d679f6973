//!
//! Astrosolve Core - submission lifecycle engine
//!
//! Authenticates against a plate-solving service, uploads an image, polls the
//! resulting submission and reports the sky coordinates of the solved field.
//! The remote service is reached through
//! [`astrosolve_interfaces::AstrometryGateway`], so this crate performs no I/O
//! of its own.

#![forbid(unsafe_code)]

/// Domain layer - session, workflow status and solution records
pub mod domain;

/// Application services - the solve workflow and its polling policy
pub mod application;

/// Error types
pub mod error;

pub use application::{PollPolicy, SolveOutcome, SolveWorkflow};
pub use domain::{Session, SessionStore, SolutionRecord, SubmissionHandle, WorkflowState, WorkflowStatus};
pub use error::{AuthError, SolveError};

/// Installs the global tracing subscriber
///
/// `RUST_LOG` wins when set; otherwise `default_filter` (for example `"info"`)
/// applies. Calling this twice is harmless.
pub fn init_tracing(default_filter: &str) {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    let _ = fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .try_init();
}
