use std::time::Duration;

use adrbac_application::EmployeeSource;
use adrbac_core::{AppError, AppResult};
use adrbac_domain::EmployeeRecord;
use async_trait::async_trait;
use reqwest::{StatusCode, Url, header};
use serde::Deserialize;
use tracing::debug;

/// Connection settings for the HR employee API.
#[derive(Debug, Clone)]
pub struct HttpEmployeeSourceConfig {
    /// Base URL; records are fetched from `{base_url}/employee/{username}`.
    pub base_url: String,
    /// Bearer secret sent with every request.
    pub secret: Option<String>,
    /// Per-request timeout.
    pub timeout: Duration,
}

/// HR employee API client implementing the employee source port.
#[derive(Clone)]
pub struct HttpEmployeeSource {
    http_client: reqwest::Client,
    base_url: Url,
    secret: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum EmployeeEnvelope {
    Wrapped { data: EmployeeRecord },
    Bare(EmployeeRecord),
}

impl EmployeeEnvelope {
    fn into_record(self) -> EmployeeRecord {
        match self {
            Self::Wrapped { data } => data,
            Self::Bare(record) => record,
        }
    }
}

impl HttpEmployeeSource {
    /// Builds a client for the configured API.
    pub fn new(config: HttpEmployeeSourceConfig) -> AppResult<Self> {
        let base_url = Url::parse(config.base_url.as_str()).map_err(|error| {
            AppError::Validation(format!(
                "invalid employee API url '{}': {error}",
                config.base_url
            ))
        })?;
        let http_client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|error| AppError::Internal(format!("failed to build HTTP client: {error}")))?;

        Ok(Self {
            http_client,
            base_url,
            secret: config.secret,
        })
    }

    fn employee_url(&self, username: &str) -> AppResult<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| {
                AppError::Validation(format!(
                    "employee API url '{}' cannot carry a path",
                    self.base_url
                ))
            })?
            .pop_if_empty()
            .push("employee")
            .push(username);
        Ok(url)
    }
}

#[async_trait]
impl EmployeeSource for HttpEmployeeSource {
    async fn fetch(&self, username: &str) -> AppResult<Option<EmployeeRecord>> {
        let url = self.employee_url(username)?;
        debug!(username, url = %url, "fetching employee record");

        let mut request = self
            .http_client
            .get(url)
            .header(header::ACCEPT, "application/json");
        if let Some(secret) = &self.secret {
            request = request.bearer_auth(secret);
        }

        let response = request.send().await.map_err(|error| {
            AppError::Internal(format!("employee API request for '{username}' failed: {error}"))
        })?;
        match response.status() {
            StatusCode::NOT_FOUND => return Ok(None),
            status if !status.is_success() => {
                return Err(AppError::Internal(format!(
                    "employee API returned {status} for '{username}'"
                )));
            }
            _ => {}
        }

        let envelope = response.json::<EmployeeEnvelope>().await.map_err(|error| {
            AppError::Internal(format!(
                "failed to decode employee API response for '{username}': {error}"
            ))
        })?;

        Ok(Some(envelope.into_record()))
    }
}
