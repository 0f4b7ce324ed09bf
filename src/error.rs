//! Error types for pidflow.

use thiserror::Error;

/// Result type alias using pidflow's Error.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for filter and session operations.
#[derive(Error, Debug)]
pub enum Error {
    /// The source locator does not point to an existing resource.
    #[error("URL error: {0}")]
    UrlError(String),

    /// The source exists but its content cannot be parsed, or a mandatory
    /// stream property is missing.
    #[error("non compliant bitstream: {0}")]
    NonCompliantBitstream(String),

    /// The pid or configuration is not supported by this filter.
    #[error("not supported: {0}")]
    NotSupported(String),

    /// The filter cannot accept another input pid; the graph should
    /// instantiate a new filter for it.
    #[error("filter requires a new instance for this pid")]
    RequiresNewInstance,

    /// Transient failure of an external service (codec, parser).
    #[error("service error: {0}")]
    ServiceError(String),

    /// Invalid filter argument.
    #[error("bad parameter: {0}")]
    BadParam(String),

    /// No filter with that name is registered.
    #[error("filter not found: {0}")]
    FilterNotFound(String),

    /// Operation on a pid that was removed.
    #[error("pid removed: {0}")]
    PidRemoved(String),

    /// Scratch memory could not be reserved.
    #[error("out of memory: {0}")]
    OutOfMemory(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Check if this error is a setup failure, fatal for the filter instance.
    pub fn is_setup_failure(&self) -> bool {
        matches!(
            self,
            Error::UrlError(_) | Error::NonCompliantBitstream(_) | Error::Io(_)
        )
    }

    /// Check if this error only affects the current packet.
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::ServiceError(_))
    }
}
