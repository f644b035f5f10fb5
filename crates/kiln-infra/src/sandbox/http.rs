//! HttpSandboxProvider -- remote sandbox control plane over HTTP.
//!
//! - `POST {base_url}/sandboxes` with an `idempotency-key` header equal to
//!   the workspace key creates the sandbox, or returns the one the control
//!   plane already created for that key.
//! - `GET {base_url}/sandboxes/{id}` looks an existing sandbox up; 404 means
//!   it has expired.
//!
//! The API key is held as a [`SecretString`] and only exposed when building
//! request headers.

use kiln_core::sandbox::{SandboxError, SandboxProvider};
use kiln_types::config::SandboxConfig;
use kiln_types::sandbox::SandboxId;
use reqwest::StatusCode;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

pub struct HttpSandboxProvider {
    client: reqwest::Client,
    api_key: SecretString,
    base_url: String,
    template: String,
    domain: String,
}

#[derive(Debug, Serialize)]
struct CreateSandboxRequest<'a> {
    template: &'a str,
    workspace_key: &'a str,
}

#[derive(Debug, Deserialize)]
struct SandboxInfo {
    sandbox_id: String,
    /// Public domain, when the control plane assigns one per sandbox.
    #[serde(default)]
    domain: Option<String>,
}

impl HttpSandboxProvider {
    pub fn new(config: &SandboxConfig, api_key: SecretString) -> Result<Self, SandboxError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| SandboxError::Rejected(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            api_key,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            template: config.template.clone(),
            domain: config.domain.clone(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    async fn read_info(
        response: reqwest::Response,
        sandbox_id: Option<&SandboxId>,
    ) -> Result<SandboxInfo, SandboxError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(map_status(status, &body, sandbox_id));
        }
        response
            .json::<SandboxInfo>()
            .await
            .map_err(|e| SandboxError::Rejected(format!("invalid control plane response: {e}")))
    }
}

impl SandboxProvider for HttpSandboxProvider {
    fn name(&self) -> &str {
        "http"
    }

    async fn create(&self, workspace_key: &str) -> Result<SandboxId, SandboxError> {
        let body = CreateSandboxRequest {
            template: &self.template,
            workspace_key,
        };

        let response = self
            .client
            .post(self.url("/sandboxes"))
            .header("x-api-key", self.api_key.expose_secret())
            .header("idempotency-key", workspace_key)
            .json(&body)
            .send()
            .await
            .map_err(map_transport)?;

        let info = Self::read_info(response, None).await?;
        Ok(SandboxId::new(info.sandbox_id))
    }

    async fn host(&self, sandbox_id: &SandboxId, port: u16) -> Result<String, SandboxError> {
        let response = self
            .client
            .get(self.url(&format!("/sandboxes/{sandbox_id}")))
            .header("x-api-key", self.api_key.expose_secret())
            .send()
            .await
            .map_err(map_transport)?;

        let info = Self::read_info(response, Some(sandbox_id)).await?;
        let domain = info.domain.as_deref().unwrap_or(&self.domain);
        Ok(super::port_host(port, &info.sandbox_id, domain))
    }
}

fn map_transport(err: reqwest::Error) -> SandboxError {
    if err.is_timeout() {
        SandboxError::Timeout
    } else {
        SandboxError::Unavailable(format!("HTTP request failed: {err}"))
    }
}

fn map_status(status: StatusCode, body: &str, sandbox_id: Option<&SandboxId>) -> SandboxError {
    match (status.as_u16(), sandbox_id) {
        (404 | 410, Some(id)) => SandboxError::NotFound(id.clone()),
        (402 | 429, _) => SandboxError::QuotaExceeded(format!("HTTP {status}: {body}")),
        (408 | 504, _) => SandboxError::Timeout,
        (500..=599, _) => SandboxError::Unavailable(format!("HTTP {status}: {body}")),
        _ => SandboxError::Rejected(format!("HTTP {status}: {body}")),
    }
}
