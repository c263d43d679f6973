//! Solve workflow
//!
//! Drives one image through the submission lifecycle:
//!
//! ```text
//! NotConnected -> Connected -> ImageSent -> Solving -> Success | Failure | Error | Canceled
//! ```
//!
//! Login and upload failures halt the run before a submission exists. Once the
//! image is accepted every run ends with a [`SolutionRecord`]. Cancellation is
//! cooperative: the token is checked after every gateway call and while
//! waiting between polling rounds, never by aborting a call in flight.

use std::path::Path;
use std::sync::Arc;

use astrosolve_interfaces::{AstrometryGateway, Calibration, JobId, JobStatus, SessionToken, UploadResponse};
use parking_lot::RwLock;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::application::poll_policy::PollPolicy;
use crate::domain::{SessionStore, SolutionRecord, SubmissionHandle, WorkflowState, WorkflowStatus};
use crate::error::SolveError;

/// How a solve run ended
#[derive(Debug, Clone, PartialEq)]
pub enum SolveOutcome {
    /// The run stopped before a submission existed (login or upload failed)
    Halted {
        status: WorkflowStatus,
        message: String,
    },

    /// The image was accepted and the run produced a record
    Completed(SolutionRecord),
}

impl SolveOutcome {
    pub fn status(&self) -> WorkflowStatus {
        match self {
            SolveOutcome::Halted { status, .. } => *status,
            SolveOutcome::Completed(record) => record.status,
        }
    }

    pub fn solution(&self) -> Option<&SolutionRecord> {
        match self {
            SolveOutcome::Completed(record) => Some(record),
            SolveOutcome::Halted { .. } => None,
        }
    }
}

/// Orchestrates login, upload, polling and calibration retrieval
///
/// Runs on one instance are serialized. To solve several images at once,
/// create one workflow per image and share the [`SessionStore`].
pub struct SolveWorkflow {
    gateway: Arc<dyn AstrometryGateway>,
    sessions: Arc<SessionStore>,
    api_key: String,
    policy: PollPolicy,
    state: RwLock<WorkflowState>,
    run_lock: Mutex<()>,
}

impl SolveWorkflow {
    pub fn new(
        gateway: Arc<dyn AstrometryGateway>,
        sessions: Arc<SessionStore>,
        api_key: impl Into<String>,
    ) -> Self {
        Self {
            gateway,
            sessions,
            api_key: api_key.into(),
            policy: PollPolicy::default(),
            state: RwLock::new(WorkflowState::new()),
            run_lock: Mutex::new(()),
        }
    }

    pub fn with_poll_policy(mut self, policy: PollPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Current status, readable while a run is in flight
    pub fn status(&self) -> WorkflowStatus {
        self.state.read().status()
    }

    /// Snapshot of the status, its diagnostic message and the submission
    pub fn state(&self) -> WorkflowState {
        self.state.read().clone()
    }

    /// Runs the whole lifecycle for the image at `file_path`
    ///
    /// `Canceled` only exists once a submission does, so a token that is
    /// already cancelled when the run starts still goes through login and
    /// upload; the run then ends `Canceled` without polling. Callers that do
    /// not want the upload should check the token before calling `run`.
    #[instrument(skip(self, file_path, cancel), fields(run_id = %Uuid::new_v4(), file = %file_path.display()))]
    pub async fn run(&self, file_path: &Path, cancel: &CancellationToken) -> SolveOutcome {
        let _run = self.run_lock.lock().await;
        self.state.write().begin_run();

        let token = match self.connect().await {
            Ok(token) => token,
            Err(halted) => return halted,
        };

        let handle = match self.send_image(&token, file_path).await {
            Ok(handle) => handle,
            Err(halted) => return halted,
        };

        // Honor a cancellation raised during the upload before any polling I/O
        let result = if cancel.is_cancelled() {
            Err(SolveError::Canceled)
        } else {
            match self.advance(WorkflowStatus::Solving, Some("Solving...".to_string())) {
                // A call that failed after cancellation was requested ends the run Canceled
                Ok(()) => self
                    .solve(&token, &handle, cancel)
                    .await
                    .map_err(|e| if cancel.is_cancelled() { SolveError::Canceled } else { e }),
                Err(e) => Err(e),
            }
        };

        SolveOutcome::Completed(self.finish(result))
    }

    /// Step 1: make sure the shared session is authenticated
    async fn connect(&self) -> Result<SessionToken, SolveOutcome> {
        let session = self
            .sessions
            .authenticate(&self.api_key)
            .await
            .map_err(|e| self.halt(e.to_string()))?;

        let token = session
            .token()
            .cloned()
            .ok_or_else(|| self.halt("authenticated session carries no token".to_string()))?;

        self.advance(WorkflowStatus::Connected, None)
            .map_err(|e| self.halt(e.to_string()))?;
        debug!("Connected");
        Ok(token)
    }

    /// Step 2: upload the image
    async fn send_image(&self, token: &SessionToken, file_path: &Path) -> Result<SubmissionHandle, SolveOutcome> {
        if self.status() != WorkflowStatus::Connected {
            let message = self
                .state
                .read()
                .message()
                .unwrap_or("not connected")
                .to_string();
            return Err(self.halt(message));
        }

        match self.gateway.upload(token, file_path).await {
            Ok(UploadResponse::Success { submission_id }) => {
                let handle = SubmissionHandle::new(submission_id);
                let recorded = self
                    .state
                    .write()
                    .record_upload(handle.clone(), file_path.display().to_string());
                recorded.map_err(|e| self.halt(e.to_string()))?;

                info!(submission_id = %handle.submission_id, "Image sent");
                Ok(handle)
            }
            Ok(UploadResponse::Error { message }) => Err(self.halt(message)),
            Err(e) => Err(self.halt(e.to_string())),
        }
    }

    /// Steps 4 and 5: poll for a solved job, then fetch its calibration
    async fn solve(
        &self,
        token: &SessionToken,
        handle: &SubmissionHandle,
        cancel: &CancellationToken,
    ) -> Result<Calibration, SolveError> {
        let job_id = self.poll_for_job(token, handle, cancel).await?;

        // Cancelled between job success and calibration: nothing more is fetched
        if cancel.is_cancelled() {
            return Err(SolveError::Canceled);
        }

        let calibration = self.gateway.get_calibration(token, &job_id).await?;
        Ok(calibration)
    }

    /// Polls the submission until its first job succeeds
    ///
    /// Only the first job of the submission is ever inspected.
    #[instrument(skip_all, fields(submission_id = %handle.submission_id))]
    async fn poll_for_job(
        &self,
        token: &SessionToken,
        handle: &SubmissionHandle,
        cancel: &CancellationToken,
    ) -> Result<JobId, SolveError> {
        let attempts = self.policy.attempts();
        let mut pending_job: Option<JobId> = None;

        for attempt in 1..=attempts {
            let submission = self
                .gateway
                .get_submission_status(token, &handle.submission_id, cancel)
                .await?;
            if cancel.is_cancelled() {
                return Err(SolveError::Canceled);
            }

            match submission.first_job() {
                None => debug!(attempt, "Submission has no job yet"),
                Some(job_id) => {
                    let job_status = self.gateway.get_job_status(token, job_id, cancel).await?;
                    if cancel.is_cancelled() {
                        return Err(SolveError::Canceled);
                    }

                    match job_status {
                        JobStatus::Success => {
                            info!(job_id = %job_id, attempt, "Job solved");
                            return Ok(job_id.clone());
                        }
                        JobStatus::Failure => return Err(SolveError::JobFailed(job_id.clone())),
                        JobStatus::Solving => {
                            debug!(job_id = %job_id, attempt, "Job still solving");
                            pending_job = Some(job_id.clone());
                        }
                    }
                }
            }

            if attempt < attempts {
                let delay = self.policy.delay_after(attempt);
                tokio::select! {
                    _ = cancel.cancelled() => return Err(SolveError::Canceled),
                    _ = tokio::time::sleep(delay) => {}
                }
            }
        }

        Err(match pending_job {
            Some(job_id) => SolveError::JobPending { job_id, attempts },
            None => SolveError::NoJob { attempts },
        })
    }

    /// Step 6: turn the run result into a record and the terminal status
    fn finish(&self, result: Result<Calibration, SolveError>) -> SolutionRecord {
        let (record, message) = match result {
            Ok(calibration) => (SolutionRecord::success(&calibration), None),
            Err(e) => (SolutionRecord::unsolved(e.terminal_status()), Some(e.to_string())),
        };

        match &message {
            None => info!(
                ra = record.right_ascension,
                dec = record.declination,
                radius = record.radius,
                "Solve succeeded"
            ),
            Some(message) => warn!(status = %record.status, "Solve ended: {}", message),
        }

        if let Err(e) = self.advance(record.status, message) {
            error!("Could not record terminal status: {}", e);
        }
        record
    }

    fn advance(&self, next: WorkflowStatus, message: Option<String>) -> Result<(), SolveError> {
        self.state.write().advance(next, message)
    }

    fn halt(&self, message: String) -> SolveOutcome {
        let mut state = self.state.write();
        state.record_halt(message.clone());
        warn!(status = %state.status(), "Solve halted: {}", message);

        SolveOutcome::Halted {
            status: state.status(),
            message,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use astrosolve_interfaces::{GatewayError, LoginResponse, SubmissionId, SubmissionStatus};
    use astrosolve_test_utils::mocks::{create_solving_gateway, MockAstrometryGateway};
    use pretty_assertions::assert_eq;

    fn expect_login_ok(gateway: &mut MockAstrometryGateway) {
        gateway.expect_login().times(1).returning(|_| {
            Ok(LoginResponse::Success {
                session: SessionToken("token-1".into()),
                message: None,
            })
        });
    }

    fn expect_upload_ok(gateway: &mut MockAstrometryGateway) {
        gateway
            .expect_upload()
            .withf(|token, path| token.as_str() == "token-1" && path == Path::new("img.fits"))
            .times(1)
            .returning(|_, _| {
                Ok(UploadResponse::Success {
                    submission_id: SubmissionId::from("S1"),
                })
            });
    }

    fn workflow(gateway: MockAstrometryGateway, policy: PollPolicy) -> SolveWorkflow {
        let gateway: Arc<dyn AstrometryGateway> = Arc::new(gateway);
        let sessions = Arc::new(SessionStore::new(gateway.clone()));
        SolveWorkflow::new(gateway, sessions, "valid").with_poll_policy(policy)
    }

    #[tokio::test]
    async fn test_successful_solve() {
        let mut gateway = MockAstrometryGateway::new();
        expect_login_ok(&mut gateway);
        expect_upload_ok(&mut gateway);
        gateway
            .expect_get_submission_status()
            .withf(|_, id, _| id == &SubmissionId::from("S1"))
            .times(1)
            .returning(|_, _, _| Ok(SubmissionStatus::with_jobs(["J1"])));
        gateway
            .expect_get_job_status()
            .withf(|_, id, _| id == &JobId::from("J1"))
            .times(1)
            .returning(|_, _, _| Ok(JobStatus::Success));
        gateway
            .expect_get_calibration()
            .times(1)
            .returning(|_, _| Ok(Calibration::new(10.5, 41.2, 1.0)));

        let workflow = workflow(gateway, PollPolicy::single_shot());
        let outcome = workflow.run(Path::new("img.fits"), &CancellationToken::new()).await;

        assert_eq!(
            outcome,
            SolveOutcome::Completed(SolutionRecord {
                right_ascension: 10.5,
                declination: 41.2,
                radius: 1.0,
                status: WorkflowStatus::Success,
            })
        );
        let state = workflow.state();
        assert_eq!(state.status(), WorkflowStatus::Success);
        assert_eq!(state.message(), None);
        assert_eq!(state.submission().unwrap().submission_id, SubmissionId::from("S1"));
    }

    #[tokio::test]
    async fn test_rejected_login_never_uploads() {
        let mut gateway = MockAstrometryGateway::new();
        gateway
            .expect_login()
            .returning(|_| Ok(LoginResponse::Error { message: "bad key".into() }));
        gateway.expect_upload().never();

        let workflow = workflow(gateway, PollPolicy::single_shot());
        let outcome = workflow.run(Path::new("img.fits"), &CancellationToken::new()).await;

        assert_eq!(
            outcome,
            SolveOutcome::Halted {
                status: WorkflowStatus::NotConnected,
                message: "bad key".into(),
            }
        );
        assert_eq!(workflow.state().message(), Some("bad key"));
    }

    #[tokio::test]
    async fn test_rejected_upload_stays_connected() {
        let mut gateway = MockAstrometryGateway::new();
        expect_login_ok(&mut gateway);
        gateway
            .expect_upload()
            .returning(|_, _| Ok(UploadResponse::Error { message: "file too large".into() }));
        gateway.expect_get_submission_status().never();

        let workflow = workflow(gateway, PollPolicy::single_shot());
        let outcome = workflow.run(Path::new("img.fits"), &CancellationToken::new()).await;

        assert_eq!(
            outcome,
            SolveOutcome::Halted {
                status: WorkflowStatus::Connected,
                message: "file too large".into(),
            }
        );
        assert!(workflow.state().submission().is_none());
    }

    #[tokio::test]
    async fn test_cancel_during_upload_skips_polling() {
        let cancel = CancellationToken::new();
        let upload_cancel = cancel.clone();

        let mut gateway = MockAstrometryGateway::new();
        expect_login_ok(&mut gateway);
        gateway.expect_upload().times(1).returning(move |_, _| {
            upload_cancel.cancel();
            Ok(UploadResponse::Success {
                submission_id: SubmissionId::from("S1"),
            })
        });
        gateway.expect_get_submission_status().never();
        gateway.expect_get_job_status().never();

        let workflow = workflow(gateway, PollPolicy::default());
        let outcome = workflow.run(Path::new("img.fits"), &cancel).await;

        assert_eq!(outcome, SolveOutcome::Completed(SolutionRecord::canceled()));
        assert_eq!(workflow.state().message(), Some("solve canceled"));
    }

    #[tokio::test]
    async fn test_empty_job_list_is_failure() {
        let mut gateway = MockAstrometryGateway::new();
        expect_login_ok(&mut gateway);
        expect_upload_ok(&mut gateway);
        gateway
            .expect_get_submission_status()
            .times(1)
            .returning(|_, _, _| Ok(SubmissionStatus::default()));
        gateway.expect_get_job_status().never();
        gateway.expect_get_calibration().never();

        let workflow = workflow(gateway, PollPolicy::single_shot());
        let outcome = workflow.run(Path::new("img.fits"), &CancellationToken::new()).await;

        assert_eq!(outcome, SolveOutcome::Completed(SolutionRecord::failure()));
        assert_eq!(workflow.state().message(), Some("no job produced after 1 polling attempts"));
    }

    #[tokio::test]
    async fn test_failed_job_is_failure_without_calibration() {
        let mut gateway = MockAstrometryGateway::new();
        expect_login_ok(&mut gateway);
        expect_upload_ok(&mut gateway);
        gateway
            .expect_get_submission_status()
            .returning(|_, _, _| Ok(SubmissionStatus::with_jobs(["J1"])));
        gateway
            .expect_get_job_status()
            .times(1)
            .returning(|_, _, _| Ok(JobStatus::Failure));
        gateway.expect_get_calibration().never();

        let workflow = workflow(gateway, PollPolicy::fixed(5, Duration::from_millis(10)));
        let outcome = workflow.run(Path::new("img.fits"), &CancellationToken::new()).await;

        assert_eq!(outcome, SolveOutcome::Completed(SolutionRecord::failure()));
        assert_eq!(workflow.state().message(), Some("job J1 finished without a solution"));
    }

    #[tokio::test]
    async fn test_polling_transport_error_is_error() {
        let mut gateway = MockAstrometryGateway::new();
        expect_login_ok(&mut gateway);
        expect_upload_ok(&mut gateway);
        gateway
            .expect_get_submission_status()
            .times(1)
            .returning(|_, _, _| Err(GatewayError::CommunicationError("connection reset".into())));

        let workflow = workflow(gateway, PollPolicy::default());
        let outcome = workflow.run(Path::new("img.fits"), &CancellationToken::new()).await;

        assert_eq!(outcome, SolveOutcome::Completed(SolutionRecord::error()));
        assert_eq!(
            workflow.state().message(),
            Some("Communication error: connection reset")
        );
    }

    #[tokio::test]
    async fn test_cancel_after_job_success_skips_calibration() {
        let cancel = CancellationToken::new();
        let job_cancel = cancel.clone();

        let mut gateway = MockAstrometryGateway::new();
        expect_login_ok(&mut gateway);
        expect_upload_ok(&mut gateway);
        gateway
            .expect_get_submission_status()
            .returning(|_, _, _| Ok(SubmissionStatus::with_jobs(["J1"])));
        gateway.expect_get_job_status().returning(move |_, _, _| {
            job_cancel.cancel();
            Ok(JobStatus::Success)
        });
        gateway.expect_get_calibration().never();

        let workflow = workflow(gateway, PollPolicy::single_shot());
        let outcome = workflow.run(Path::new("img.fits"), &cancel).await;

        assert_eq!(outcome, SolveOutcome::Completed(SolutionRecord::canceled()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_polls_until_job_appears() {
        let mut gateway = MockAstrometryGateway::new();
        expect_login_ok(&mut gateway);
        expect_upload_ok(&mut gateway);

        let mut rounds = 0;
        gateway
            .expect_get_submission_status()
            .times(3)
            .returning(move |_, _, _| {
                rounds += 1;
                if rounds < 3 {
                    Ok(SubmissionStatus::default())
                } else {
                    Ok(SubmissionStatus::with_jobs(["J1"]))
                }
            });
        gateway
            .expect_get_job_status()
            .times(1)
            .returning(|_, _, _| Ok(JobStatus::Success));
        gateway
            .expect_get_calibration()
            .returning(|_, _| Ok(Calibration::new(1.0, 2.0, 3.0)));

        let workflow = workflow(gateway, PollPolicy::fixed(10, Duration::from_secs(5)));
        let outcome = workflow.run(Path::new("img.fits"), &CancellationToken::new()).await;

        assert_eq!(outcome.status(), WorkflowStatus::Success);
        assert_eq!(outcome.solution().unwrap().radius, 3.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_job_still_solving_when_attempts_run_out() {
        let mut gateway = MockAstrometryGateway::new();
        expect_login_ok(&mut gateway);
        expect_upload_ok(&mut gateway);
        gateway
            .expect_get_submission_status()
            .times(3)
            .returning(|_, _, _| Ok(SubmissionStatus::with_jobs(["J1"])));
        gateway
            .expect_get_job_status()
            .times(3)
            .returning(|_, _, _| Ok(JobStatus::Solving));
        gateway.expect_get_calibration().never();

        let workflow = workflow(gateway, PollPolicy::fixed(3, Duration::from_secs(1)));
        let outcome = workflow.run(Path::new("img.fits"), &CancellationToken::new()).await;

        assert_eq!(outcome, SolveOutcome::Completed(SolutionRecord::failure()));
        assert_eq!(
            workflow.state().message(),
            Some("job J1 still solving after 3 polling attempts")
        );
    }

    #[tokio::test]
    async fn test_second_run_reuses_session() {
        let mut gateway = MockAstrometryGateway::new();
        expect_login_ok(&mut gateway);
        gateway.expect_upload().times(2).returning(|_, _| {
            Ok(UploadResponse::Success {
                submission_id: SubmissionId::from("S1"),
            })
        });
        gateway
            .expect_get_submission_status()
            .times(2)
            .returning(|_, _, _| Ok(SubmissionStatus::default()));

        let workflow = workflow(gateway, PollPolicy::single_shot());
        let first = workflow.run(Path::new("img.fits"), &CancellationToken::new()).await;
        let second = workflow.run(Path::new("img.fits"), &CancellationToken::new()).await;

        assert_eq!(first.status(), WorkflowStatus::Failure);
        assert_eq!(second.status(), WorkflowStatus::Failure);
    }

    #[tokio::test]
    async fn test_cancel_during_failing_poll_is_canceled() {
        let cancel = CancellationToken::new();
        let poll_cancel = cancel.clone();

        let mut gateway = MockAstrometryGateway::new();
        expect_login_ok(&mut gateway);
        expect_upload_ok(&mut gateway);
        gateway
            .expect_get_submission_status()
            .times(1)
            .returning(move |_, _, _| {
                poll_cancel.cancel();
                Err(GatewayError::CommunicationError("reset".into()))
            });
        gateway.expect_get_job_status().never();

        let workflow = workflow(gateway, PollPolicy::default());
        let outcome = workflow.run(Path::new("img.fits"), &cancel).await;

        assert_eq!(outcome, SolveOutcome::Completed(SolutionRecord::canceled()));
        assert_eq!(workflow.state().message(), Some("solve canceled"));
    }

    #[tokio::test]
    async fn test_cancel_during_failing_calibration_is_canceled() {
        let cancel = CancellationToken::new();
        let calibration_cancel = cancel.clone();

        let mut gateway = MockAstrometryGateway::new();
        expect_login_ok(&mut gateway);
        expect_upload_ok(&mut gateway);
        gateway
            .expect_get_submission_status()
            .returning(|_, _, _| Ok(SubmissionStatus::with_jobs(["J1"])));
        gateway
            .expect_get_job_status()
            .returning(|_, _, _| Ok(JobStatus::Success));
        gateway.expect_get_calibration().times(1).returning(move |_, _| {
            calibration_cancel.cancel();
            Err(GatewayError::HttpStatus { status: 502, body: "bad gateway".into() })
        });

        let workflow = workflow(gateway, PollPolicy::single_shot());
        let outcome = workflow.run(Path::new("img.fits"), &cancel).await;

        assert_eq!(outcome.status(), WorkflowStatus::Canceled);
    }

    #[tokio::test]
    async fn test_calibration_in_hand_wins_over_late_cancel() {
        let cancel = CancellationToken::new();
        let calibration_cancel = cancel.clone();

        let mut gateway = MockAstrometryGateway::new();
        expect_login_ok(&mut gateway);
        expect_upload_ok(&mut gateway);
        gateway
            .expect_get_submission_status()
            .returning(|_, _, _| Ok(SubmissionStatus::with_jobs(["J1"])));
        gateway
            .expect_get_job_status()
            .returning(|_, _, _| Ok(JobStatus::Success));
        gateway.expect_get_calibration().times(1).returning(move |_, _| {
            calibration_cancel.cancel();
            Ok(Calibration::new(10.5, 41.2, 1.0))
        });

        let workflow = workflow(gateway, PollPolicy::single_shot());
        let outcome = workflow.run(Path::new("img.fits"), &cancel).await;

        assert_eq!(outcome.status(), WorkflowStatus::Success);
    }

    #[tokio::test]
    async fn test_each_run_starts_from_fresh_state() {
        let gateway = create_solving_gateway(Calibration::new(83.8, -5.4, 0.5));
        let workflow = workflow(gateway, PollPolicy::single_shot());

        let first = workflow.run(Path::new("a.fits"), &CancellationToken::new()).await;
        assert_eq!(first.status(), WorkflowStatus::Success);

        let second = workflow.run(Path::new("b.fits"), &CancellationToken::new()).await;
        assert_eq!(
            second,
            SolveOutcome::Completed(SolutionRecord::success(&Calibration::new(83.8, -5.4, 0.5)))
        );

        let state = workflow.state();
        assert_eq!(state.status(), WorkflowStatus::Success);
        assert_eq!(state.message(), None);
        assert_eq!(state.submission().map(|s| s.submission_id.clone()), Some(SubmissionId::from("1")));
    }
}
