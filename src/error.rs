//! Top-level error types for the relay core.

use crate::registry::Category;

/// Crate-wide result type alias.
pub type Result<T> = std::result::Result<T, Error>;

/// Error taxonomy for registry operations and upstream fetches.
///
/// Upstream/network failures are caught at the offending fetch and turned
/// into plain-text replies by the service layer; none of these escape a
/// command handler.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("upstream returned HTTP {status}")]
    UpstreamHttp { status: u16 },

    #[error("upstream request timed out")]
    UpstreamTimeout,

    #[error("network error: {0}")]
    UpstreamNetwork(String),

    #[error("response body not parseable: {0}")]
    MalformedResponse(String),

    #[error("unknown trigger: {0}")]
    UnknownTrigger(String),

    #[error("index {index} out of range 1..={len}")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("no triggers registered")]
    EmptyRegistry,

    #[error("trigger '{trigger}' already registered as {existing}")]
    CategoryConflict { trigger: String, existing: Category },

    #[error("failed to persist trigger registry: {0}")]
    ConfigPersistence(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    /// Map a reqwest failure onto the upstream taxonomy.
    pub fn from_reqwest(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Error::UpstreamTimeout
        } else {
            Error::UpstreamNetwork(err.to_string())
        }
    }
}
