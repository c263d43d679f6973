//! Scripted in-memory implementation of the AstrometryGateway trait.

use std::collections::VecDeque;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use astrosolve_interfaces::{
    AstrometryGateway, Calibration, GatewayResult, JobId, JobStatus, LoginResponse, SessionToken,
    SubmissionId, SubmissionStatus, UploadResponse,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

/// Gateway operations recorded by [`InMemoryGateway`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GatewayCall {
    Login,
    Upload,
    SubmissionStatus,
    JobStatus,
    Calibration,
}

struct Script {
    accepted_key: String,
    login_delay: Option<Duration>,
    upload: GatewayResult<UploadResponse>,
    submission_statuses: VecDeque<GatewayResult<SubmissionStatus>>,
    job_statuses: VecDeque<GatewayResult<JobStatus>>,
    calibration: GatewayResult<Calibration>,
    cancel_hooks: Vec<(GatewayCall, CancellationToken)>,
    calls: Vec<GatewayCall>,
    uploaded_files: Vec<PathBuf>,
    sessions_issued: usize,
}

/// Pops the next scripted answer; the last one repeats forever.
fn next_scripted<T: Clone>(queue: &mut VecDeque<T>) -> Option<T> {
    if queue.len() > 1 {
        queue.pop_front()
    } else {
        queue.front().cloned()
    }
}

/// Thread-safe scripted gateway for workflow tests.
///
/// Clones share the same script and call log, so a test can keep one handle
/// for inspection and hand another to the code under test.
#[derive(Clone)]
pub struct InMemoryGateway {
    script: Arc<Mutex<Script>>,
}

impl fmt::Debug for InMemoryGateway {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let script = self.script.lock();
        f.debug_struct("InMemoryGateway")
            .field("accepted_key", &script.accepted_key)
            .field("calls", &script.calls)
            .finish()
    }
}

impl InMemoryGateway {
    /// Creates a gateway that accepts `accepted_key` and solves on the first poll.
    pub fn new(accepted_key: impl Into<String>) -> Self {
        let script = Script {
            accepted_key: accepted_key.into(),
            login_delay: None,
            upload: Ok(UploadResponse::Success {
                submission_id: SubmissionId::from("1"),
            }),
            submission_statuses: VecDeque::from([Ok(SubmissionStatus::with_jobs(["1"]))]),
            job_statuses: VecDeque::from([Ok(JobStatus::Success)]),
            calibration: Ok(Calibration::new(0.0, 0.0, 0.0)),
            cancel_hooks: Vec::new(),
            calls: Vec::new(),
            uploaded_files: Vec::new(),
            sessions_issued: 0,
        };

        Self {
            script: Arc::new(Mutex::new(script)),
        }
    }

    /// Makes every login wait `delay` before answering.
    pub fn with_login_delay(self, delay: Duration) -> Self {
        self.script.lock().login_delay = Some(delay);
        self
    }

    pub fn with_upload(self, upload: GatewayResult<UploadResponse>) -> Self {
        self.script.lock().upload = upload;
        self
    }

    /// Answers for successive submission polls. The last one repeats.
    pub fn with_submission_statuses<I>(self, statuses: I) -> Self
    where
        I: IntoIterator<Item = GatewayResult<SubmissionStatus>>,
    {
        self.script.lock().submission_statuses = statuses.into_iter().collect();
        self
    }

    /// Answers for successive job polls. The last one repeats.
    pub fn with_job_statuses<I>(self, statuses: I) -> Self
    where
        I: IntoIterator<Item = GatewayResult<JobStatus>>,
    {
        self.script.lock().job_statuses = statuses.into_iter().collect();
        self
    }

    pub fn with_calibration(self, calibration: GatewayResult<Calibration>) -> Self {
        self.script.lock().calibration = calibration;
        self
    }

    /// Cancels `token` right after the gateway answers a `call`.
    pub fn cancel_on(self, call: GatewayCall, token: CancellationToken) -> Self {
        self.script.lock().cancel_hooks.push((call, token));
        self
    }

    /// All calls received so far, in order.
    pub fn calls(&self) -> Vec<GatewayCall> {
        self.script.lock().calls.clone()
    }

    /// Number of times `call` was received.
    pub fn count(&self, call: GatewayCall) -> usize {
        self.script.lock().calls.iter().filter(|c| **c == call).count()
    }

    pub fn uploaded_files(&self) -> Vec<PathBuf> {
        self.script.lock().uploaded_files.clone()
    }

    fn record(&self, call: GatewayCall) {
        self.script.lock().calls.push(call);
    }

    fn fire_hooks(&self, call: GatewayCall) {
        let script = self.script.lock();
        for (_, token) in script.cancel_hooks.iter().filter(|(c, _)| *c == call) {
            token.cancel();
        }
    }
}

#[async_trait]
impl AstrometryGateway for InMemoryGateway {
    async fn login(&self, api_key: &str) -> GatewayResult<LoginResponse> {
        self.record(GatewayCall::Login);

        let delay = self.script.lock().login_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let response = {
            let mut script = self.script.lock();
            if api_key == script.accepted_key {
                script.sessions_issued += 1;
                LoginResponse::Success {
                    session: SessionToken(format!("session-{}", script.sessions_issued)),
                    message: Some("authenticated user: test".to_string()),
                }
            } else {
                LoginResponse::Error {
                    message: "bad apikey".to_string(),
                }
            }
        };

        self.fire_hooks(GatewayCall::Login);
        Ok(response)
    }

    async fn upload(&self, _session: &SessionToken, file_path: &Path) -> GatewayResult<UploadResponse> {
        self.record(GatewayCall::Upload);

        let response = {
            let mut script = self.script.lock();
            script.uploaded_files.push(file_path.to_path_buf());
            script.upload.clone()
        };

        self.fire_hooks(GatewayCall::Upload);
        response
    }

    async fn get_submission_status(
        &self,
        _session: &SessionToken,
        _submission_id: &SubmissionId,
        cancel: &CancellationToken,
    ) -> GatewayResult<SubmissionStatus> {
        self.record(GatewayCall::SubmissionStatus);
        if cancel.is_cancelled() {
            return Ok(SubmissionStatus::default());
        }

        let response = next_scripted(&mut self.script.lock().submission_statuses)
            .unwrap_or_else(|| Ok(SubmissionStatus::default()));

        self.fire_hooks(GatewayCall::SubmissionStatus);
        response
    }

    async fn get_job_status(
        &self,
        _session: &SessionToken,
        _job_id: &JobId,
        cancel: &CancellationToken,
    ) -> GatewayResult<JobStatus> {
        self.record(GatewayCall::JobStatus);
        if cancel.is_cancelled() {
            return Ok(JobStatus::Solving);
        }

        let response = next_scripted(&mut self.script.lock().job_statuses).unwrap_or(Ok(JobStatus::Solving));

        self.fire_hooks(GatewayCall::JobStatus);
        response
    }

    async fn get_calibration(&self, _session: &SessionToken, _job_id: &JobId) -> GatewayResult<Calibration> {
        self.record(GatewayCall::Calibration);

        let response = self.script.lock().calibration.clone();

        self.fire_hooks(GatewayCall::Calibration);
        response
    }
}
