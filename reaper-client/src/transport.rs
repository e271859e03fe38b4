//! HTTP transport towards the Reaper REST API
//!
//! Handles:
//! - Building absolute URLs from the configured base endpoint
//! - Sending one request with `Accept: application/json`
//! - Racing the request against the caller's cancellation signal
//!
//! The transport returns the raw status and body. Status checking and JSON
//! decoding are done by the client on top of it.

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::ACCEPT;
use reqwest::{Method, StatusCode};
use std::time::Duration;
use tracing::debug;
use url::Url;

use crate::cancel::Cancellation;
use crate::config::ClientConfig;
use crate::error::{ClientError, Result};

/// One request relative to the base endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiRequest {
    pub method: Method,
    /// Path segments, each one percent-encoded on its own
    pub segments: Vec<String>,
    pub query: Vec<(String, String)>,
}

impl ApiRequest {
    pub fn new<I, S>(method: Method, segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            method,
            segments: segments.into_iter().map(Into::into).collect(),
            query: Vec::new(),
        }
    }

    pub fn get<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(Method::GET, segments)
    }

    pub fn put<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(Method::PUT, segments)
    }

    pub fn delete<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(Method::DELETE, segments)
    }

    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    /// Unencoded path, for logs and assertions
    pub fn path(&self) -> String {
        format!("/{}", self.segments.join("/"))
    }
}

#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: StatusCode,
    pub body: Bytes,
}

impl ApiResponse {
    pub fn new(status: StatusCode, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    /// True when the body holds nothing but whitespace
    pub fn is_empty(&self) -> bool {
        self.body.iter().all(u8::is_ascii_whitespace)
    }
}

/// Executes a single request against the Reaper endpoint.
///
/// Implementations must report [`ClientError::Cancelled`] rather than a
/// transport error whenever the signal has fired, and must be safe to share
/// between concurrent fan-out tasks.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    async fn execute(&self, request: ApiRequest, cancel: &Cancellation) -> Result<ApiResponse>;
}

/// Transport backed by one explicitly constructed `reqwest::Client`.
///
/// Cloning shares the connection pool.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    base_url: Url,
    http: reqwest::Client,
}

impl HttpTransport {
    pub fn new(config: &ClientConfig) -> Result<Self> {
        let base_url = config.parse_base_url()?;

        let mut builder = reqwest::Client::builder();
        if let Some(user_agent) = &config.user_agent {
            builder = builder.user_agent(user_agent.as_str());
        }
        if let Some(secs) = config.request_timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        let http = builder.build().map_err(ClientError::Build)?;

        Ok(Self { base_url, http })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Append the request segments to the base path and set the query
    pub fn url_for(&self, request: &ApiRequest) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.set_query(None);
        url.set_fragment(None);
        {
            let mut path = url
                .path_segments_mut()
                .map_err(|_| ClientError::InvalidBaseUrl {
                    url: self.base_url.to_string(),
                    source: url::ParseError::RelativeUrlWithCannotBeABaseBase,
                })?;
            path.pop_if_empty();
            path.extend(request.segments.iter());
        }
        if !request.query.is_empty() {
            url.query_pairs_mut().extend_pairs(request.query.iter());
        }
        Ok(url)
    }
}

/// A failure observed while the signal has fired is reported as cancellation
fn classify(err: reqwest::Error, cancel: &Cancellation) -> ClientError {
    match cancel.reason() {
        Some(reason) => ClientError::Cancelled(reason),
        None => ClientError::transport(err),
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn execute(&self, request: ApiRequest, cancel: &Cancellation) -> Result<ApiResponse> {
        if let Some(reason) = cancel.reason() {
            return Err(ClientError::Cancelled(reason));
        }

        let url = self.url_for(&request)?;
        debug!(method = %request.method, %url, "sending request");

        let send = self
            .http
            .request(request.method.clone(), url.clone())
            .header(ACCEPT, "application/json")
            .send();

        // Dropping the response on any early return releases the connection
        let response = tokio::select! {
            biased;
            reason = cancel.done() => return Err(ClientError::Cancelled(reason)),
            result = send => result.map_err(|e| classify(e, cancel))?,
        };

        let status = response.status();
        let body = tokio::select! {
            biased;
            reason = cancel.done() => return Err(ClientError::Cancelled(reason)),
            result = response.bytes() => result.map_err(|e| classify(e, cancel))?,
        };

        debug!(
            method = %request.method,
            %url,
            status = status.as_u16(),
            bytes = body.len(),
            "response received"
        );
        Ok(ApiResponse { status, body })
    }
}
