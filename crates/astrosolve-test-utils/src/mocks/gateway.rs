//! Mock implementation of the AstrometryGateway interface.

use std::path::Path;

use astrosolve_interfaces::{
    AstrometryGateway, Calibration, GatewayResult, JobId, JobStatus, LoginResponse, SessionToken,
    SubmissionId, SubmissionStatus, UploadResponse,
};
use async_trait::async_trait;
use mockall::mock;
use tokio_util::sync::CancellationToken;

// Generate the mock implementation
mock! {
    pub AstrometryGateway {}

    #[async_trait]
    impl AstrometryGateway for AstrometryGateway {
        async fn login(&self, api_key: &str) -> GatewayResult<LoginResponse>;
        async fn upload(&self, session: &SessionToken, file_path: &Path) -> GatewayResult<UploadResponse>;
        async fn get_submission_status(
            &self,
            session: &SessionToken,
            submission_id: &SubmissionId,
            cancel: &CancellationToken,
        ) -> GatewayResult<SubmissionStatus>;
        async fn get_job_status(
            &self,
            session: &SessionToken,
            job_id: &JobId,
            cancel: &CancellationToken,
        ) -> GatewayResult<JobStatus>;
        async fn get_calibration(&self, session: &SessionToken, job_id: &JobId) -> GatewayResult<Calibration>;
    }
}

/// Creates a mock gateway that accepts any key and solves every image at `calibration`.
pub fn create_solving_gateway(calibration: Calibration) -> MockAstrometryGateway {
    let mut mock = MockAstrometryGateway::new();

    mock.expect_login().returning(|_| {
        Ok(LoginResponse::Success {
            session: SessionToken("mock-session".to_string()),
            message: None,
        })
    });

    mock.expect_upload().returning(|_, _| {
        Ok(UploadResponse::Success {
            submission_id: SubmissionId::from("1"),
        })
    });

    mock.expect_get_submission_status()
        .returning(|_, _, _| Ok(SubmissionStatus::with_jobs(["1"])));

    mock.expect_get_job_status()
        .returning(|_, _, _| Ok(JobStatus::Success));

    mock.expect_get_calibration()
        .returning(move |_, _| Ok(calibration));

    mock
}
