//! Client for the Maroon credential-issuing API.
//!
//! [`IssueCredentials`] is the seam the refresh engine depends on; [`ApiClient`]
//! is its HTTP implementation. The API authenticates every request with the raw
//! bearer token in the `Authorization` header and answers:
//!
//! - `GET /api/v1/assume-role?roleArn=..&sessionDuration=..` with temporary credentials
//! - `GET /api/v1/console-url?accessType=..&accountId=..&duration=..` with a sign-in URL
//!
//! HTTP 401 means the token was rejected; any other non-200 status is a plain
//! request failure.

use std::fmt;
use std::ops::RangeInclusive;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use reqwest::header::{AUTHORIZATION, HeaderValue};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use url::Url;

use crate::error::{IssueError, MaroonError};
use crate::model::{AccountId, Credentials, Profile};
use crate::secret::Secret;

/// Production API endpoint.
pub const DEFAULT_API_URL: &str = "https://api.maroon.gtech.dev";

/// Allowed lifetime of a console sign-in URL, in seconds.
pub const CONSOLE_DURATION_SECS: RangeInclusive<u32> = 900..=43200;

/// Parameters of one credential request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssumeRoleRequest {
    /// `arn:aws:iam::<account>:role/<name>`.
    pub role_arn: String,
    pub session_duration_secs: u32,
}

impl AssumeRoleRequest {
    pub fn for_profile(profile: &Profile, session_duration_secs: u32) -> Self {
        Self {
            role_arn: profile.role_arn(),
            session_duration_secs,
        }
    }
}

/// Exchanges a role request for temporary credentials.
#[async_trait]
pub trait IssueCredentials: Send + Sync {
    async fn issue(&self, request: &AssumeRoleRequest) -> Result<Credentials, IssueError>;
}

/// Access level granted by a console sign-in URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessType {
    ReadOnly,
    Administrator,
}

impl AccessType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ReadOnly => "ReadOnly",
            Self::Administrator => "Administrator",
        }
    }
}

impl fmt::Display for AccessType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AccessType {
    type Err = MaroonError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ReadOnly" => Ok(Self::ReadOnly),
            "Administrator" => Ok(Self::Administrator),
            other => Err(MaroonError::invalid(
                "access type",
                other,
                "valid types are 'ReadOnly', 'Administrator'",
            )),
        }
    }
}

/// A validated console URL request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsoleUrlRequest {
    account_id: AccountId,
    access_type: AccessType,
    duration_secs: u32,
}

impl ConsoleUrlRequest {
    pub fn new(
        account_id: AccountId,
        access_type: AccessType,
        duration_secs: u32,
    ) -> Result<Self, MaroonError> {
        if !CONSOLE_DURATION_SECS.contains(&duration_secs) {
            return Err(MaroonError::invalid(
                "duration",
                duration_secs.to_string(),
                format!(
                    "must be between {} and {} seconds",
                    CONSOLE_DURATION_SECS.start(),
                    CONSOLE_DURATION_SECS.end()
                ),
            ));
        }
        Ok(Self {
            account_id,
            access_type,
            duration_secs,
        })
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AssumeRoleResponse {
    #[serde(alias = "AccessKeyId")]
    access_key_id: String,
    #[serde(alias = "SecretAccessKey")]
    secret_access_key: String,
    #[serde(alias = "SessionToken")]
    session_token: String,
    #[serde(alias = "Expiration")]
    expiration: DateTime<Utc>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConsoleUrlResponse {
    #[serde(alias = "ConsoleUrl")]
    console_url: String,
}

/// HTTP client for the Maroon API.
#[derive(Debug, Clone)]
pub struct ApiClient {
    base_url: Url,
    token: Secret,
    http: reqwest::Client,
}

impl ApiClient {
    pub fn new(base_url: Url, token: Secret) -> Self {
        Self::with_http_client(base_url, token, reqwest::Client::new())
    }

    pub fn with_http_client(base_url: Url, token: Secret, http: reqwest::Client) -> Self {
        Self {
            base_url,
            token,
            http,
        }
    }

    /// Request a console sign-in URL.
    pub async fn console_url(&self, request: &ConsoleUrlRequest) -> Result<String, IssueError> {
        tracing::info!(
            "Requesting {} console URL for account {}",
            request.access_type,
            request.account_id
        );

        let duration = request.duration_secs.to_string();
        let response: ConsoleUrlResponse = self
            .get_json(
                "api/v1/console-url",
                &[
                    ("accessType", request.access_type.as_str()),
                    ("accountId", request.account_id.as_str()),
                    ("duration", duration.as_str()),
                ],
            )
            .await?;

        if response.console_url.is_empty() {
            return Err(IssueError::request_failed("response has an empty console URL"));
        }
        Ok(response.console_url)
    }

    /// Resolve `path` against the base URL, keeping any base path prefix.
    fn endpoint(&self, path: &str) -> Result<Url, IssueError> {
        let mut base = self.base_url.clone();
        if !base.path().ends_with('/') {
            let with_slash = format!("{}/", base.path());
            base.set_path(&with_slash);
        }
        base.join(path)
            .map_err(|e| IssueError::request_failed(format!("invalid API URL: {}", e)))
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<T, IssueError> {
        let url = self.endpoint(path)?;

        let mut authorization = HeaderValue::from_str(self.token.expose())
            .map_err(|_| IssueError::request_failed("token is not a valid header value"))?;
        authorization.set_sensitive(true);

        let response = self
            .http
            .get(url)
            .query(query)
            .header(AUTHORIZATION, authorization)
            .send()
            .await
            .map_err(|e| IssueError::request_failed(format!("error calling Maroon API: {}", e)))?;

        let status = response.status();
        tracing::debug!("GET {} returned {}", path, status);

        match status {
            StatusCode::OK => {}
            StatusCode::UNAUTHORIZED => return Err(IssueError::InvalidOrExpiredToken),
            other => {
                return Err(IssueError::request_failed(format!(
                    "unexpected status {}",
                    other
                )));
            }
        }

        response.json::<T>().await.map_err(|e| {
            IssueError::request_failed(format!("malformed Maroon API response: {}", e))
        })
    }
}

#[async_trait]
impl IssueCredentials for ApiClient {
    async fn issue(&self, request: &AssumeRoleRequest) -> Result<Credentials, IssueError> {
        tracing::info!("Requesting credentials for {}", request.role_arn);

        let duration = request.session_duration_secs.to_string();
        let response: AssumeRoleResponse = self
            .get_json(
                "api/v1/assume-role",
                &[
                    ("roleArn", request.role_arn.as_str()),
                    ("sessionDuration", duration.as_str()),
                ],
            )
            .await?;

        let credentials = Credentials::new(
            response.access_key_id,
            response.secret_access_key,
            response.session_token,
            response.expiration,
        );
        if !credentials.is_populated() {
            return Err(IssueError::request_failed(
                "response is missing credential fields",
            ));
        }

        Ok(credentials)
    }
}
