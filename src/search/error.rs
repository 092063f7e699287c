//! Error taxonomy shared by every collection and backend adapter.
//!
//! Callers match on [`ErrorKind`] through [`SearchError::kind`] or
//! [`SearchError::is`]. The sentinel is also reachable through
//! [`std::error::Error::source`], so generic error chains can downcast to it.

use std::fmt;

use strum::{Display, EnumString, IntoStaticStr};

use crate::context::Interrupted;

/// Result type for search operations
pub type SearchResult<T> = std::result::Result<T, SearchError>;

/// Sentinel classifications callers can match on regardless of backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum ErrorKind {
    /// The addressed record or index does not exist
    NotFound,
    /// The backend rejected the query as malformed
    InvalidQuery,
    /// The backend could not be reached or reported itself unhealthy
    BackendUnavailable,
    /// A write was rejected, failed, or did not finish within its wait bound
    IndexingFailed,
    /// The adapter deliberately does not support this operation yet
    NotImplemented,
}

impl std::error::Error for ErrorKind {}

/// Failure reported by a backend or by the transport talking to it.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("request failed: {0}")]
    Transport(#[source] reqwest::Error),

    #[error("backend returned {status} ({code}): {message}")]
    Status {
        status: u16,
        code: String,
        message: String,
    },

    #[error("malformed backend response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("task {task} failed ({code}): {message}")]
    Task {
        task: u64,
        code: String,
        message: String,
    },

    #[error("task {task} did not finish within {waited_ms}ms")]
    TaskTimeout { task: u64, waited_ms: u128 },

    #[error(transparent)]
    Interrupted(#[from] Interrupted),
}

impl BackendError {
    /// True when the backend never answered: connection refused, DNS failure,
    /// transport timeout, or a gateway reporting the service as down.
    pub fn is_unreachable(&self) -> bool {
        match self {
            BackendError::Transport(err) => !err.is_builder(),
            BackendError::Status { status, .. } => matches!(status, 502..=504),
            _ => false,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, BackendError::Status { status: 404, .. })
    }

    /// Backend-specific error code, when the backend supplied one.
    pub fn code(&self) -> Option<&str> {
        match self {
            BackendError::Status { code, .. } | BackendError::Task { code, .. } => {
                Some(code.as_str())
            }
            _ => None,
        }
    }
}

impl From<reqwest::Error> for BackendError {
    fn from(err: reqwest::Error) -> Self {
        BackendError::Transport(err)
    }
}

/// What went wrong underneath a [`SearchError`].
#[derive(Debug)]
pub enum Cause {
    /// One of the fixed sentinel kinds
    Sentinel(ErrorKind),
    /// An unclassified backend failure passed through unchanged
    Backend(BackendError),
    /// Invalid construction parameters
    Configuration(String),
}

impl fmt::Display for Cause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cause::Sentinel(kind) => write!(f, "{}", kind),
            Cause::Backend(err) => write!(f, "{}", err),
            Cause::Configuration(msg) => write!(f, "invalid configuration: {}", msg),
        }
    }
}

/// Error returned by every provider and collection operation.
#[derive(Debug)]
pub struct SearchError {
    op: &'static str,
    cause: Cause,
    context: String,
}

impl SearchError {
    /// A classified failure.
    pub fn new(op: &'static str, kind: ErrorKind, context: impl Into<String>) -> Self {
        Self {
            op,
            cause: Cause::Sentinel(kind),
            context: context.into(),
        }
    }

    /// An unclassified backend failure, kept as-is.
    pub fn backend(op: &'static str, err: BackendError) -> Self {
        Self {
            op,
            cause: Cause::Backend(err),
            context: String::new(),
        }
    }

    pub fn configuration(op: &'static str, msg: impl Into<String>) -> Self {
        Self {
            op,
            cause: Cause::Configuration(msg.into()),
            context: String::new(),
        }
    }

    /// Classify a backend failure, preferring `BackendUnavailable` whenever the
    /// backend could not be reached at all.
    pub fn classify(op: &'static str, fallback: ErrorKind, err: BackendError) -> Self {
        let kind = if err.is_unreachable() {
            ErrorKind::BackendUnavailable
        } else {
            fallback
        };
        Self::new(op, kind, err.to_string())
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = context.into();
        self
    }

    pub fn op(&self) -> &'static str {
        self.op
    }

    pub fn cause(&self) -> &Cause {
        &self.cause
    }

    pub fn context(&self) -> &str {
        &self.context
    }

    /// The sentinel kind, if this error was classified.
    pub fn kind(&self) -> Option<ErrorKind> {
        match self.cause {
            Cause::Sentinel(kind) => Some(kind),
            _ => None,
        }
    }

    pub fn is(&self, kind: ErrorKind) -> bool {
        self.kind() == Some(kind)
    }

    pub fn is_configuration(&self) -> bool {
        matches!(self.cause, Cause::Configuration(_))
    }
}

impl fmt::Display for SearchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.op, self.cause)?;
        if !self.context.is_empty() {
            write!(f, ": {}", self.context)?;
        }
        Ok(())
    }
}

impl std::error::Error for SearchError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match &self.cause {
            Cause::Sentinel(kind) => Some(kind),
            Cause::Backend(err) => Some(err),
            Cause::Configuration(_) => None,
        }
    }
}

impl From<validator::ValidationErrors> for SearchError {
    fn from(err: validator::ValidationErrors) -> Self {
        SearchError::configuration("new", err.to_string())
    }
}
