//! Remote service gateway interfaces for astrosolve
//!
//! This module defines the operations the solve workflow performs against the
//! remote plate-solving service, together with the response shapes it relies on.
//! Transports (HTTP, in-process fakes) implement [`AstrometryGateway`].

use std::fmt;
use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Result type for gateway operations
pub type GatewayResult<T> = Result<T, GatewayError>;

/// Errors raised by a gateway when a call fails below the service contract
///
/// A service-level rejection (bad API key, refused upload) is not an error here:
/// it is reported through the `Error` variant of the corresponding response.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GatewayError {
    /// The service could not be reached or did not answer in time
    #[error("Communication error: {0}")]
    CommunicationError(String),

    /// The service answered with a non-success HTTP status
    #[error("Unexpected HTTP status {status}: {body}")]
    HttpStatus {
        /// HTTP status code
        status: u16,
        /// Response body, or a placeholder when it could not be read
        body: String,
    },

    /// The response body did not match the expected shape
    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    /// The image to upload could not be read
    #[error("Unable to read image: {0}")]
    ImageReadError(String),

    /// Invalid input parameters
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),
}

/// Session token handed out by the service after a successful login
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionToken(pub String);

/// Identifier of an uploaded submission
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubmissionId(pub String);

/// Identifier of an analysis job spawned for a submission
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub String);

impl SessionToken {
    /// Returns the raw token string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SubmissionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SubmissionId {
    fn from(value: &str) -> Self {
        SubmissionId(value.to_string())
    }
}

impl From<&str> for JobId {
    fn from(value: &str) -> Self {
        JobId(value.to_string())
    }
}

/// Outcome of a login request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginResponse {
    /// The API key was accepted
    Success {
        /// Token to attach to subsequent calls
        session: SessionToken,
        /// Informational message from the service, if any
        message: Option<String>,
    },
    /// The API key was rejected
    Error {
        /// Error text reported by the service
        message: String,
    },
}

/// Outcome of an image upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadResponse {
    /// The image was accepted and a submission was created
    Success {
        /// Identifier of the new submission
        submission_id: SubmissionId,
    },
    /// The upload was refused
    Error {
        /// Error text reported by the service
        message: String,
    },
}

/// Status of a submission
///
/// `jobs` only contains jobs the service has actually created. Placeholder
/// entries the service may report before a job exists are dropped by the
/// transport.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubmissionStatus {
    /// Jobs spawned for the submission, in service order
    pub jobs: Vec<JobId>,
}

impl SubmissionStatus {
    /// Creates a status listing the given jobs
    pub fn with_jobs<I, J>(jobs: I) -> Self
    where
        I: IntoIterator<Item = J>,
        J: Into<JobId>,
    {
        Self {
            jobs: jobs.into_iter().map(Into::into).collect(),
        }
    }

    /// The first job of the submission, the only one the workflow inspects
    pub fn first_job(&self) -> Option<&JobId> {
        self.jobs.first()
    }
}

/// Status of an analysis job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    /// The job is still running
    Solving,
    /// The job solved the image
    Success,
    /// The job finished without a solution
    Failure,
}

/// Astrometric calibration computed for a solved job
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Calibration {
    /// Right ascension of the field center, degrees
    pub ra: f64,

    /// Declination of the field center, degrees
    pub dec: f64,

    /// Field radius, degrees
    pub radius: f64,

    /// Field orientation, degrees east of north
    #[serde(default)]
    pub orientation: Option<f64>,

    /// Pixel scale, arcseconds per pixel
    #[serde(default)]
    pub pixscale: Option<f64>,

    /// Image parity
    #[serde(default)]
    pub parity: Option<f64>,
}

impl Calibration {
    /// Creates a calibration carrying only the field center and radius
    pub fn new(ra: f64, dec: f64, radius: f64) -> Self {
        Self {
            ra,
            dec,
            radius,
            orientation: None,
            pixscale: None,
            parity: None,
        }
    }
}

/// Contract for the remote plate-solving service
///
/// Every call may take a long time. The two polling calls receive the run's
/// cancellation token and must return promptly, without an error, once it is
/// cancelled; the value they return in that case is not inspected.
#[async_trait]
pub trait AstrometryGateway: Send + Sync {
    /// Contract: Exchanges an API key for a session token.
    /// - Returns `LoginResponse::Error` when the service rejects the key.
    /// - `Err` only when the call itself failed.
    async fn login(&self, api_key: &str) -> GatewayResult<LoginResponse>;

    /// Contract: Uploads the image at `file_path` under the given session.
    /// - Returns `UploadResponse::Error` when the service refuses the upload.
    async fn upload(&self, session: &SessionToken, file_path: &Path) -> GatewayResult<UploadResponse>;

    /// Contract: Fetches the jobs spawned so far for a submission.
    /// - An empty job list means the submission is not ready yet.
    async fn get_submission_status(
        &self,
        session: &SessionToken,
        submission_id: &SubmissionId,
        cancel: &CancellationToken,
    ) -> GatewayResult<SubmissionStatus>;

    /// Contract: Fetches the status of a single job.
    async fn get_job_status(
        &self,
        session: &SessionToken,
        job_id: &JobId,
        cancel: &CancellationToken,
    ) -> GatewayResult<JobStatus>;

    /// Contract: Fetches the calibration of a successfully solved job.
    async fn get_calibration(&self, session: &SessionToken, job_id: &JobId) -> GatewayResult<Calibration>;
}
