use crate::cancel::CancelReason;

/// Boxed cause of a transport-level failure
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

pub type Result<T, E = ClientError> = std::result::Result<T, E>;

/// Longest response body kept in a [`ClientError::Status`]
const STATUS_BODY_LIMIT: usize = 512;

/// Failures of calls to the Reaper service
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("invalid base url {url}: {source}")]
    InvalidBaseUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },
    #[error("failed to build HTTP client: {0}")]
    Build(#[source] reqwest::Error),
    #[error("request cancelled: {0}")]
    Cancelled(CancelReason),
    #[error("transport error: {0}")]
    Transport(#[source] BoxError),
    #[error("failed to decode response body: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("unexpected HTTP status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("fetch task for cluster {cluster} panicked")]
    TaskPanicked { cluster: String },
    #[error("{context}: {source}")]
    Operation {
        context: String,
        #[source]
        source: Box<ClientError>,
    },
}

impl ClientError {
    pub(crate) fn transport<E: Into<BoxError>>(err: E) -> Self {
        ClientError::Transport(err.into())
    }

    pub(crate) fn status(status: u16, body: &[u8]) -> Self {
        let mut body = String::from_utf8_lossy(body).into_owned();
        if body.len() > STATUS_BODY_LIMIT {
            let mut cut = STATUS_BODY_LIMIT;
            while !body.is_char_boundary(cut) {
                cut -= 1;
            }
            body.truncate(cut);
        }
        ClientError::Status { status, body }
    }

    /// Wrap with the name of the operation and the resource it targeted
    pub(crate) fn context(self, context: impl Into<String>) -> Self {
        ClientError::Operation {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// The innermost error, looking through operation context
    pub fn root_cause(&self) -> &ClientError {
        let mut current = self;
        while let ClientError::Operation { source, .. } = current {
            current = source;
        }
        current
    }

    pub fn cancel_reason(&self) -> Option<CancelReason> {
        match self.root_cause() {
            ClientError::Cancelled(reason) => Some(*reason),
            _ => None,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel_reason().is_some()
    }
}
