use astrosolve_interfaces::{Calibration, SubmissionId};
use serde::{Deserialize, Serialize};

use crate::domain::status::WorkflowStatus;

/// Value object: the submission created by a run's upload
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubmissionHandle {
    pub submission_id: SubmissionId,
}

impl SubmissionHandle {
    pub fn new(submission_id: SubmissionId) -> Self {
        Self { submission_id }
    }
}

/// Result of a solve run that got past the upload
///
/// Coordinates are in degrees and only meaningful when `status` is `Success`;
/// every other record carries zeros.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SolutionRecord {
    pub right_ascension: f64,
    pub declination: f64,
    pub radius: f64,
    pub status: WorkflowStatus,
}

impl SolutionRecord {
    pub fn success(calibration: &Calibration) -> Self {
        Self {
            right_ascension: calibration.ra,
            declination: calibration.dec,
            radius: calibration.radius,
            status: WorkflowStatus::Success,
        }
    }

    /// A record without coordinates for a run that ended in `status`
    pub fn unsolved(status: WorkflowStatus) -> Self {
        Self {
            right_ascension: 0.0,
            declination: 0.0,
            radius: 0.0,
            status,
        }
    }

    pub fn failure() -> Self {
        Self::unsolved(WorkflowStatus::Failure)
    }

    pub fn error() -> Self {
        Self::unsolved(WorkflowStatus::Error)
    }

    pub fn canceled() -> Self {
        Self::unsolved(WorkflowStatus::Canceled)
    }

    pub fn is_success(&self) -> bool {
        self.status == WorkflowStatus::Success
    }
}
