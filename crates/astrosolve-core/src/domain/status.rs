use std::fmt;

use serde::{Deserialize, Serialize};

use crate::domain::solution::SubmissionHandle;
use crate::error::SolveError;

/// Solve workflow status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WorkflowStatus {
    /// No authenticated session yet
    NotConnected,

    /// Logged in, nothing uploaded
    Connected,

    /// The image was accepted and a submission exists
    ImageSent,

    /// Polling the submission for a finished job
    Solving,

    /// A job solved the image and its calibration was fetched
    Success,

    /// No job produced a solution
    Failure,

    /// A remote call failed while solving
    Error,

    /// The caller cancelled the run
    Canceled,
}

impl WorkflowStatus {
    /// No transition leaves a terminal status
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            WorkflowStatus::Success
                | WorkflowStatus::Failure
                | WorkflowStatus::Error
                | WorkflowStatus::Canceled
        )
    }

    /// Whether a submission has been created by the time this status is reached
    pub fn has_submission(self) -> bool {
        !matches!(self, WorkflowStatus::NotConnected | WorkflowStatus::Connected)
    }

    /// Whether the state machine allows moving from `self` to `next`
    pub fn can_transition_to(self, next: WorkflowStatus) -> bool {
        use WorkflowStatus::*;

        matches!(
            (self, next),
            (NotConnected, Connected)
                | (Connected, ImageSent)
                | (ImageSent, Solving)
                | (ImageSent, Canceled)
                | (Solving, Success)
                | (Solving, Failure)
                | (Solving, Error)
                | (Solving, Canceled)
        )
    }
}

impl fmt::Display for WorkflowStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            WorkflowStatus::NotConnected => "NOT_CONNECTED",
            WorkflowStatus::Connected => "CONNECTED",
            WorkflowStatus::ImageSent => "IMAGE_SENT",
            WorkflowStatus::Solving => "SOLVING",
            WorkflowStatus::Success => "SUCCESS",
            WorkflowStatus::Failure => "FAILURE",
            WorkflowStatus::Error => "ERROR",
            WorkflowStatus::Canceled => "CANCELED",
        };
        f.write_str(name)
    }
}

/// Current status of a workflow, its diagnostic message and submission
///
/// The message is replaced on every status change, so it always belongs to
/// the current status. The submission handle is present exactly when the
/// status is `ImageSent` or later.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkflowState {
    status: WorkflowStatus,
    message: Option<String>,
    submission: Option<SubmissionHandle>,
}

impl Default for WorkflowState {
    fn default() -> Self {
        Self::new()
    }
}

impl WorkflowState {
    pub fn new() -> Self {
        Self {
            status: WorkflowStatus::NotConnected,
            message: None,
            submission: None,
        }
    }

    pub fn status(&self) -> WorkflowStatus {
        self.status
    }

    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    pub fn submission(&self) -> Option<&SubmissionHandle> {
        self.submission.as_ref()
    }

    /// Starts a new run from `NotConnected`, dropping the previous run's submission
    pub fn begin_run(&mut self) {
        *self = Self::new();
    }

    /// Moves to `next`, replacing the diagnostic message
    ///
    /// `ImageSent` can only be entered through [`WorkflowState::record_upload`].
    pub fn advance(&mut self, next: WorkflowStatus, message: Option<String>) -> Result<(), SolveError> {
        if !self.status.can_transition_to(next) || next.has_submission() != self.submission.is_some() {
            return Err(SolveError::InvalidTransition {
                from: self.status,
                to: next,
            });
        }

        self.status = next;
        self.message = message;
        Ok(())
    }

    /// Records an accepted upload and moves to `ImageSent`
    pub fn record_upload(&mut self, handle: SubmissionHandle, message: String) -> Result<(), SolveError> {
        if !self.status.can_transition_to(WorkflowStatus::ImageSent) {
            return Err(SolveError::InvalidTransition {
                from: self.status,
                to: WorkflowStatus::ImageSent,
            });
        }

        self.submission = Some(handle);
        self.status = WorkflowStatus::ImageSent;
        self.message = Some(message);
        Ok(())
    }

    /// Records why a run halted without changing the status
    pub fn record_halt(&mut self, message: String) {
        self.message = Some(message);
    }
}
