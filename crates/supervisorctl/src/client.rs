//! HTTP client for the control plane (§4.5, §4.6).

use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Deserialize;
use supervisor_types::{AgentStatus, OperationResult};

/// Client-side error taxonomy, distinguished only by the exit code it
/// produces (§6 "exit codes").
#[derive(Debug)]
pub enum CliError {
    /// Maps to exit code 2.
    Auth(String),
    /// Maps to exit code 3.
    Connection(String),
    /// Maps to exit code 1.
    General(String),
}

impl std::fmt::Display for CliError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Auth(m) | Self::Connection(m) | Self::General(m) => write!(f, "{m}"),
        }
    }
}

impl std::error::Error for CliError {}

impl CliError {
    /// Process exit code per §6: 1 general failure, 2 auth failure, 3
    /// connection failure.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::General(_) => 1,
            Self::Auth(_) => 2,
            Self::Connection(_) => 3,
        }
    }
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    success: bool,
    #[serde(default)]
    data: Option<T>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    code: Option<i64>,
}

/// Thin wrapper over `reqwest` for the subset of the control plane the CLI
/// uses: status/start/stop/restart.
pub struct Client {
    http: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl Client {
    /// Build a client bound to `base_url`, attaching `token` as a bearer
    /// credential on every request when present.
    pub fn new(base_url: String, token: Option<String>, timeout: Duration) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { http, base_url, token })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }

    fn authed(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(t) => builder.bearer_auth(t),
            None => builder,
        }
    }

    async fn send<T: DeserializeOwned>(&self, builder: reqwest::RequestBuilder) -> Result<T, CliError> {
        let response = self.authed(builder).send().await.map_err(classify_transport_error)?;
        let status = response.status();
        let envelope: Envelope<T> = response
            .json()
            .await
            .map_err(|e| CliError::General(format!("invalid response body: {e}")))?;

        if envelope.success {
            envelope
                .data
                .ok_or_else(|| CliError::General("response was missing its data payload".to_string()))
        } else {
            let message = envelope.error.unwrap_or_else(|| "request failed".to_string());
            if status.as_u16() == 401 || envelope.code == Some(-32003) {
                Err(CliError::Auth(message))
            } else {
                Err(CliError::General(message))
            }
        }
    }

    /// `GET /api/v1/agents/status`
    pub async fn list_status(&self) -> Result<Vec<AgentStatus>, CliError> {
        self.send(self.http.get(self.url("/api/v1/agents/status"))).await
    }

    /// `GET /api/v1/agents/{name}/status`
    pub async fn get_status(&self, name: &str) -> Result<AgentStatus, CliError> {
        self.send(self.http.get(self.url(&format!("/api/v1/agents/{name}/status"))))
            .await
    }

    /// `POST /api/v1/agents/{name}/start`
    pub async fn start(&self, name: &str) -> Result<OperationResult, CliError> {
        self.send(self.http.post(self.url(&format!("/api/v1/agents/{name}/start"))))
            .await
    }

    /// `POST /api/v1/agents/{name}/stop`
    pub async fn stop(&self, name: &str) -> Result<OperationResult, CliError> {
        self.send(self.http.post(self.url(&format!("/api/v1/agents/{name}/stop"))))
            .await
    }

    /// `POST /api/v1/agents/{name}/restart`
    pub async fn restart(&self, name: &str) -> Result<OperationResult, CliError> {
        self.send(self.http.post(self.url(&format!("/api/v1/agents/{name}/restart"))))
            .await
    }
}

fn classify_transport_error(err: reqwest::Error) -> CliError {
    if err.is_connect() || err.is_timeout() {
        CliError::Connection(err.to_string())
    } else {
        CliError::General(err.to_string())
    }
}
