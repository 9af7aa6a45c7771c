//! Wire boundary for the Lamad API
//!
//! The gateway and everything above it speak [`RequestSpec`]/[`ApiResponse`]
//! against the [`Transport`] trait, so the renewal coordination and
//! navigation logic can be exercised with a scripted transport in tests.
//! [`HttpTransport`] is the production implementation over reqwest.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header, Client, StatusCode};
use serde_json::Value;

use crate::error::{ApiError, Result};
use crate::types::{ApiConfig, RenewResponse};

/// HTTP method for a request spec
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Method::Get => write!(f, "GET"),
            Method::Post => write!(f, "POST"),
            Method::Put => write!(f, "PUT"),
            Method::Delete => write!(f, "DELETE"),
        }
    }
}

/// Specification of one outbound API request
#[derive(Debug, Clone)]
pub struct RequestSpec {
    pub method: Method,
    /// Path relative to the base URL, e.g. `/courses/c1/chapters`
    pub path: String,
    /// Optional JSON body
    pub body: Option<Value>,
}

impl RequestSpec {
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            method: Method::Get,
            path: path.into(),
            body: None,
        }
    }

    pub fn post(path: impl Into<String>, body: Value) -> Self {
        Self {
            method: Method::Post,
            path: path.into(),
            body: Some(body),
        }
    }
}

/// Raw response: status plus decoded JSON body (`Null` when empty)
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: u16,
    pub body: Value,
}

impl ApiResponse {
    /// True for any 2xx status
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Transport over which API requests travel.
///
/// `send` must report the status as data (never as an error) so the gateway
/// can judge 401s itself; transport-level failures surface as
/// [`ApiError::Network`]. `renew` calls the credential renewal endpoint,
/// which needs no request body: the renewal secret rides an out-of-band
/// transport (a cookie) invisible to this core.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, spec: &RequestSpec, credential: Option<&str>) -> Result<ApiResponse>;

    async fn renew(&self) -> Result<String>;
}

/// Production transport over reqwest
pub struct HttpTransport {
    config: ApiConfig,
    client: Client,
}

impl HttpTransport {
    /// Create a transport for the given API config
    pub fn new(config: ApiConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .cookie_store(true)
            .build()?;
        Ok(Self { config, client })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url, path)
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, spec: &RequestSpec, credential: Option<&str>) -> Result<ApiResponse> {
        let url = self.url(&spec.path);
        let mut request = match spec.method {
            Method::Get => self.client.get(&url),
            Method::Post => self.client.post(&url),
            Method::Put => self.client.put(&url),
            Method::Delete => self.client.delete(&url),
        };

        if let Some(token) = credential {
            request = request.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        if let Some(ref body) = spec.body {
            request = request
                .header(header::CONTENT_TYPE, "application/json")
                .json(body);
        }

        let response = request.send().await?;
        let status = response.status().as_u16();
        let text = response.text().await.unwrap_or_default();
        let body = if text.is_empty() {
            Value::Null
        } else {
            serde_json::from_str(&text).unwrap_or(Value::Null)
        };

        Ok(ApiResponse { status, body })
    }

    async fn renew(&self) -> Result<String> {
        let url = self.url("/auth/renew");
        let response = self.client.post(&url).send().await?;

        if response.status() == StatusCode::UNAUTHORIZED {
            return Err(ApiError::Unauthorized);
        }
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();
            return Err(ApiError::Server { status, message });
        }

        let body: RenewResponse = response.json().await?;
        Ok(body.token)
    }
}
