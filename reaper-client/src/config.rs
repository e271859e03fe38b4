//! Client configuration
//!
//! `ClientConfig` is plain serde data so a host application can embed it in
//! its own configuration file. The library never reads files or the
//! environment on its own.

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{ClientError, Result};

/// Upper bound of the default fan-out width
pub const MAX_DEFAULT_FAN_OUT: usize = 5;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Base endpoint of the Reaper service, e.g. `http://reaper:8080`
    pub base_url: String,
    /// `User-Agent` header sent with every request
    pub user_agent: Option<String>,
    /// Number of cluster fetches in flight during a fan-out.
    /// `None` means `min(5, available parallelism)`.
    pub max_concurrency: Option<usize>,
    /// Treat non-2xx responses as failures
    pub check_status: bool,
    /// Per-request timeout on the HTTP client, on top of any cancellation deadline
    pub request_timeout_secs: Option<u64>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8080".to_string(),
            user_agent: Some(concat!("reaper-client/", env!("CARGO_PKG_VERSION")).to_string()),
            max_concurrency: None,
            check_status: true,
            request_timeout_secs: None,
        }
    }
}

impl ClientConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = Some(max_concurrency);
        self
    }

    pub fn with_check_status(mut self, check_status: bool) -> Self {
        self.check_status = check_status;
        self
    }

    pub fn with_request_timeout_secs(mut self, secs: u64) -> Self {
        self.request_timeout_secs = Some(secs);
        self
    }

    /// Fan-out width resolved once per call, never below 1
    pub fn fan_out_width(&self) -> usize {
        match self.max_concurrency {
            Some(width) => width.max(1),
            None => default_fan_out_width(),
        }
    }

    /// Parse `base_url`, rejecting URLs that cannot carry a path (`mailto:`, `data:`...)
    pub fn parse_base_url(&self) -> Result<Url> {
        let invalid = |source| ClientError::InvalidBaseUrl {
            url: self.base_url.clone(),
            source,
        };

        let url = Url::parse(&self.base_url).map_err(invalid)?;
        if url.cannot_be_a_base() {
            return Err(invalid(url::ParseError::RelativeUrlWithCannotBeABaseBase));
        }
        Ok(url)
    }
}

/// `min(5, available parallelism)`
pub fn default_fan_out_width() -> usize {
    let cpus = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    cpus.min(MAX_DEFAULT_FAN_OUT)
}
