use astrosolve_interfaces::{GatewayError, JobId};
use thiserror::Error;

use crate::domain::status::WorkflowStatus;

/// Authentication failure reported by the session store
///
/// The reason is shown to the user verbatim, so it carries no prefix.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{reason}")]
pub struct AuthError {
    pub reason: String,
}

impl AuthError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self { reason: reason.into() }
    }
}

/// Error type for a solve run
///
/// None of these escape [`crate::SolveWorkflow::run`]; each one is folded into
/// the workflow status and its diagnostic message.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SolveError {
    /// The service rejected the API key or the login call failed
    #[error(transparent)]
    Auth(#[from] AuthError),

    /// A gateway call failed at the remote service or below it
    #[error("{0}")]
    Transport(String),

    /// The caller cancelled the run
    #[error("solve canceled")]
    Canceled,

    /// The submission never produced a job
    #[error("no job produced after {attempts} polling attempts")]
    NoJob { attempts: u32 },

    /// The job was still running when polling gave up
    #[error("job {job_id} still solving after {attempts} polling attempts")]
    JobPending { job_id: JobId, attempts: u32 },

    /// The job finished without a solution
    #[error("job {0} finished without a solution")]
    JobFailed(JobId),

    /// The state machine refused a transition
    #[error("invalid status transition from {from} to {to}")]
    InvalidTransition {
        from: WorkflowStatus,
        to: WorkflowStatus,
    },
}

impl From<GatewayError> for SolveError {
    fn from(error: GatewayError) -> Self {
        SolveError::Transport(error.to_string())
    }
}

impl SolveError {
    /// Terminal status a run ends in when it stops on this error
    pub fn terminal_status(&self) -> WorkflowStatus {
        match self {
            SolveError::Canceled => WorkflowStatus::Canceled,
            SolveError::NoJob { .. } | SolveError::JobPending { .. } | SolveError::JobFailed(_) => {
                WorkflowStatus::Failure
            }
            SolveError::Auth(_) | SolveError::Transport(_) | SolveError::InvalidTransition { .. } => {
                WorkflowStatus::Error
            }
        }
    }
}
