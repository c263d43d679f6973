use std::path::Path;
use std::time::Duration;

use astrosolve_interfaces::{
    AstrometryGateway, Calibration, GatewayError, GatewayResult, JobId, JobStatus, LoginResponse, SessionToken,
    SubmissionId, SubmissionStatus, UploadResponse,
};
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

/// Configuration for the astrometry.net gateway
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NovaGatewayConfig {
    /// Base URL of the service, without the `/api` suffix
    pub service_url: String,
    /// Timeout in seconds for HTTP requests
    pub timeout_secs: u64,
    /// Whether uploads are published on the service
    pub publicly_visible: bool,
}

impl Default for NovaGatewayConfig {
    fn default() -> Self {
        Self {
            service_url: "http://nova.astrometry.net".to_string(),
            timeout_secs: 30,
            publicly_visible: false,
        }
    }
}

/// Client for the astrometry.net JSON API
#[derive(Debug, Clone)]
pub struct NovaGateway {
    config: NovaGatewayConfig,
    client: Client,
}

/// Identifiers are numbers on the wire, but tolerate strings
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawId {
    Number(u64),
    Text(String),
}

impl RawId {
    fn into_string(self) -> String {
        match self {
            RawId::Number(n) => n.to_string(),
            RawId::Text(s) => s,
        }
    }
}

#[derive(Debug, Serialize)]
struct LoginRequest<'a> {
    apikey: &'a str,
}

#[derive(Debug, Serialize)]
struct UploadRequest<'a> {
    session: &'a str,
    publicly_visible: &'static str,
    allow_commercial_use: &'static str,
    allow_modifications: &'static str,
}

#[derive(Debug, Deserialize)]
struct LoginReply {
    status: String,
    #[serde(default)]
    session: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    errormessage: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UploadReply {
    status: String,
    #[serde(default)]
    subid: Option<RawId>,
    #[serde(default)]
    errormessage: Option<String>,
}

/// Jobs not yet created are reported as `null`, and so is a job list that
/// does not exist yet
#[derive(Debug, Deserialize)]
struct SubmissionReply {
    #[serde(default)]
    jobs: Option<Vec<Option<RawId>>>,
}

#[derive(Debug, Deserialize)]
struct JobReply {
    status: JobStatus,
}

impl NovaGateway {
    /// Creates a new NovaGateway with the provided configuration
    pub fn new(config: NovaGatewayConfig) -> GatewayResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| GatewayError::CommunicationError(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { config, client })
    }

    /// Creates a new NovaGateway with the provided service URL and timeout
    pub fn with_url_and_timeout(service_url: impl Into<String>, timeout_secs: u64) -> GatewayResult<Self> {
        Self::new(NovaGatewayConfig {
            service_url: service_url.into(),
            timeout_secs,
            ..NovaGatewayConfig::default()
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api/{}", self.config.service_url.trim_end_matches('/'), path)
    }

    /// Maps an HTTP error to a GatewayError
    fn map_http_error(error: reqwest::Error) -> GatewayError {
        if error.is_timeout() {
            GatewayError::CommunicationError(format!("Request timeout: {}", error))
        } else if error.is_connect() {
            GatewayError::CommunicationError(format!("Connection error: {}", error))
        } else {
            GatewayError::CommunicationError(format!("HTTP error: {}", error))
        }
    }

    fn request_json<T: Serialize>(payload: &T) -> GatewayResult<String> {
        serde_json::to_string(payload)
            .map_err(|e| GatewayError::InvalidParameter(format!("Failed to encode request: {}", e)))
    }

    async fn read_json<T: DeserializeOwned>(response: Response) -> GatewayResult<T> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| format!("HTTP error: {}", status));
            return Err(GatewayError::HttpStatus {
                status: status.as_u16(),
                body,
            });
        }

        response
            .json::<T>()
            .await
            .map_err(|e| GatewayError::MalformedResponse(format!("Failed to parse response: {}", e)))
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> GatewayResult<T> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(Self::map_http_error)?;

        Self::read_json(response).await
    }

    /// GET that gives up as soon as `cancel` fires, yielding `None`
    async fn get_json_cancellable<T: DeserializeOwned>(
        &self,
        url: &str,
        cancel: &CancellationToken,
    ) -> GatewayResult<Option<T>> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!("Request to {} abandoned on cancellation", url);
                Ok(None)
            }
            result = self.get_json::<T>(url) => result.map(Some),
        }
    }
}

#[async_trait]
impl AstrometryGateway for NovaGateway {
    #[instrument(skip(self, api_key))]
    async fn login(&self, api_key: &str) -> GatewayResult<LoginResponse> {
        let payload = Self::request_json(&LoginRequest { apikey: api_key })?;

        let response = self
            .client
            .post(self.url("login"))
            .form(&[("request-json", payload)])
            .send()
            .await
            .map_err(Self::map_http_error)?;

        let reply: LoginReply = Self::read_json(response).await?;
        match (reply.status.as_str(), reply.session) {
            ("success", Some(session)) => Ok(LoginResponse::Success {
                session: SessionToken(session),
                message: reply.message,
            }),
            (status, _) => {
                let message = reply
                    .errormessage
                    .unwrap_or_else(|| format!("login failed with status '{}'", status));
                Ok(LoginResponse::Error { message })
            }
        }
    }

    #[instrument(skip(self, session), fields(file = %file_path.display()))]
    async fn upload(&self, session: &SessionToken, file_path: &Path) -> GatewayResult<UploadResponse> {
        let bytes = tokio::fs::read(file_path)
            .await
            .map_err(|e| GatewayError::ImageReadError(format!("{}: {}", file_path.display(), e)))?;
        let file_name = file_path
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or("image")
            .to_string();
        debug!(size = bytes.len(), "Uploading {}", file_name);

        let payload = Self::request_json(&UploadRequest {
            session: session.as_str(),
            publicly_visible: if self.config.publicly_visible { "y" } else { "n" },
            allow_commercial_use: "d",
            allow_modifications: "d",
        })?;

        let file_part = Part::bytes(bytes)
            .file_name(file_name)
            .mime_str("application/octet-stream")
            .map_err(|e| GatewayError::InvalidParameter(format!("Invalid content type: {}", e)))?;
        let form = Form::new().text("request-json", payload).part("file", file_part);

        let response = self
            .client
            .post(self.url("upload"))
            .multipart(form)
            .send()
            .await
            .map_err(Self::map_http_error)?;

        let reply: UploadReply = Self::read_json(response).await?;
        match (reply.status.as_str(), reply.subid) {
            ("success", Some(subid)) => Ok(UploadResponse::Success {
                submission_id: SubmissionId(subid.into_string()),
            }),
            (status, _) => {
                let message = reply
                    .errormessage
                    .unwrap_or_else(|| format!("upload failed with status '{}'", status));
                warn!("Upload refused: {}", message);
                Ok(UploadResponse::Error { message })
            }
        }
    }

    #[instrument(skip(self, _session, cancel), fields(submission_id = %submission_id))]
    async fn get_submission_status(
        &self,
        _session: &SessionToken,
        submission_id: &SubmissionId,
        cancel: &CancellationToken,
    ) -> GatewayResult<SubmissionStatus> {
        let url = self.url(&format!("submissions/{}", submission_id));

        let status = match self.get_json_cancellable::<SubmissionReply>(&url, cancel).await? {
            Some(reply) => SubmissionStatus::with_jobs(
                reply
                    .jobs
                    .unwrap_or_default()
                    .into_iter()
                    .flatten()
                    .map(|id| JobId(id.into_string())),
            ),
            None => SubmissionStatus::default(),
        };

        debug!(jobs = status.jobs.len(), "Submission status received");
        Ok(status)
    }

    #[instrument(skip(self, _session, cancel), fields(job_id = %job_id))]
    async fn get_job_status(
        &self,
        _session: &SessionToken,
        job_id: &JobId,
        cancel: &CancellationToken,
    ) -> GatewayResult<JobStatus> {
        let url = self.url(&format!("jobs/{}", job_id));

        let status = self
            .get_json_cancellable::<JobReply>(&url, cancel)
            .await?
            .map(|reply| reply.status)
            .unwrap_or(JobStatus::Solving);

        debug!(?status, "Job status received");
        Ok(status)
    }

    #[instrument(skip(self, _session), fields(job_id = %job_id))]
    async fn get_calibration(&self, _session: &SessionToken, job_id: &JobId) -> GatewayResult<Calibration> {
        self.get_json(&self.url(&format!("jobs/{}/calibration", job_id))).await
    }
}
