//! Client for the remote video job service.
//!
//! The service accepts an upload, converts it in the background and serves
//! the artifact once the job completes. Every call after the upload is
//! authorized by the per-job token handed out on upload.

use async_trait::async_trait;
use reqwest::{multipart, Client, Response};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

use crate::config::RemoteEngineConfig;
use crate::engine::types::SourceFile;
use crate::format::bare_extension;

/// Errors that can occur when talking to the job service.
#[derive(Debug, Error)]
pub enum RemoteJobError {
    /// HTTP request failed.
    #[error("Connection to job service failed: {0}")]
    Connection(#[from] reqwest::Error),

    /// The service answered with an error status.
    #[error("Job service error: {status} - {message}")]
    Api { status: u16, message: String },

    /// The job did not finish in time.
    #[error("Remote job timed out after {timeout_secs} seconds")]
    Timeout { timeout_secs: u64 },

    /// Job unknown to the service (404).
    #[error("Job not found: {0}")]
    NotFound(String),

    /// Failed to parse a response.
    #[error("Failed to parse response: {0}")]
    ParseError(String),
}

impl RemoteJobError {
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::Connection(_) => "RemoteConnectionError",
            Self::Api { .. } => "RemoteApiError",
            Self::Timeout { .. } => "Timeout",
            Self::NotFound(_) => "RemoteJobNotFound",
            Self::ParseError(_) => "RemoteParseError",
        }
    }
}

/// Handle for a job accepted by the service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobTicket {
    pub id: String,
    pub token: String,
}

/// State of a remote job.
#[derive(Debug, Clone, PartialEq)]
pub enum JobStatus {
    Queued,
    Running { progress: f32 },
    Completed,
    Failed {
        kind: Option<String>,
        message: String,
    },
}

/// Raw body of `GET /api/job/{id}`.
#[derive(Debug, Deserialize)]
struct JobStatusResponse {
    state: String,
    #[serde(default)]
    progress: f32,
    error: Option<String>,
    error_kind: Option<String>,
}

impl TryFrom<JobStatusResponse> for JobStatus {
    type Error = RemoteJobError;

    fn try_from(raw: JobStatusResponse) -> Result<Self, Self::Error> {
        match raw.state.as_str() {
            "queued" | "pending" => Ok(Self::Queued),
            "running" | "converting" => Ok(Self::Running {
                progress: raw.progress,
            }),
            "completed" | "done" => Ok(Self::Completed),
            "failed" | "error" => Ok(Self::Failed {
                kind: raw.error_kind,
                message: raw.error.unwrap_or_else(|| "remote job failed".to_string()),
            }),
            other => Err(RemoteJobError::ParseError(format!(
                "unknown job state '{}'",
                other
            ))),
        }
    }
}

/// Operations offered by the job service.
#[async_trait]
pub trait RemoteJobApi: Send + Sync {
    /// Returns the service version; fails when the service is unreachable.
    async fn health(&self) -> Result<String, RemoteJobError>;

    /// Uploads `input` and requests conversion into `to`.
    async fn submit(&self, input: &SourceFile, to: &str) -> Result<JobTicket, RemoteJobError>;

    async fn poll(&self, ticket: &JobTicket) -> Result<JobStatus, RemoteJobError>;

    /// Downloads the artifact of a completed job.
    async fn fetch(&self, ticket: &JobTicket) -> Result<Vec<u8>, RemoteJobError>;

    /// Stops a job and discards its files.
    async fn abort(&self, ticket: &JobTicket) -> Result<(), RemoteJobError>;
}

/// [`RemoteJobApi`] over HTTP.
pub struct HttpJobClient {
    client: Client,
    base_url: String,
}

impl HttpJobClient {
    pub fn new(config: &RemoteEngineConfig) -> Result<Self, RemoteJobError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;
        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Passes successful responses through; turns the rest into errors.
    async fn check(response: Response, what: &str) -> Result<Response, RemoteJobError> {
        let status = response.status();
        if status == 404 {
            return Err(RemoteJobError::NotFound(what.to_string()));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RemoteJobError::Api {
                status: status.as_u16(),
                message: body,
            });
        }
        Ok(response)
    }
}

#[derive(Serialize)]
struct ConvertRequest<'a> {
    id: &'a str,
    token: &'a str,
    to: &'a str,
}

#[derive(Serialize)]
struct AbortRequest<'a> {
    token: &'a str,
}

#[async_trait]
impl RemoteJobApi for HttpJobClient {
    async fn health(&self) -> Result<String, RemoteJobError> {
        let response = self.client.get(self.url("/api/version")).send().await?;
        let response = Self::check(response, "version").await?;
        Ok(response.text().await?.trim().to_string())
    }

    async fn submit(&self, input: &SourceFile, to: &str) -> Result<JobTicket, RemoteJobError> {
        debug!(file = %input.name, to, "Uploading to job service");
        let part = multipart::Part::bytes(input.bytes.to_vec()).file_name(input.name.clone());
        let form = multipart::Form::new().part("file", part);

        let response = self
            .client
            .post(self.url("/api/upload"))
            .multipart(form)
            .send()
            .await?;
        let ticket: JobTicket = Self::check(response, "upload")
            .await?
            .json()
            .await
            .map_err(|e| RemoteJobError::ParseError(format!("upload response: {}", e)))?;

        let response = self
            .client
            .post(self.url("/api/convert"))
            .json(&ConvertRequest {
                id: &ticket.id,
                token: &ticket.token,
                to: bare_extension(to),
            })
            .send()
            .await?;
        Self::check(response, &ticket.id).await?;

        debug!(job = %ticket.id, "Remote job submitted");
        Ok(ticket)
    }

    async fn poll(&self, ticket: &JobTicket) -> Result<JobStatus, RemoteJobError> {
        let response = self
            .client
            .get(self.url(&format!("/api/job/{}", ticket.id)))
            .query(&[("token", &ticket.token)])
            .send()
            .await?;
        let raw: JobStatusResponse = Self::check(response, &ticket.id)
            .await?
            .json()
            .await
            .map_err(|e| RemoteJobError::ParseError(format!("job status: {}", e)))?;
        raw.try_into()
    }

    async fn fetch(&self, ticket: &JobTicket) -> Result<Vec<u8>, RemoteJobError> {
        let response = self
            .client
            .get(self.url(&format!("/api/download/{}/{}", ticket.id, ticket.token)))
            .send()
            .await?;
        let bytes = Self::check(response, &ticket.id).await?.bytes().await?;
        Ok(bytes.to_vec())
    }

    async fn abort(&self, ticket: &JobTicket) -> Result<(), RemoteJobError> {
        let response = self
            .client
            .post(self.url(&format!("/api/job/{}/abort", ticket.id)))
            .json(&AbortRequest {
                token: &ticket.token,
            })
            .send()
            .await?;
        Self::check(response, &ticket.id).await?;
        Ok(())
    }
}
