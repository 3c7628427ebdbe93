//! Error type shared by every domwatch crate

use thiserror::Error;

/// Diagnostic emitted whenever a watcher runs in a host without any
/// mutation-observer capability.
pub const UNSUPPORTED_MESSAGE: &str = "This environment does not support MutationObserver";

/// Errors produced by domwatch
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DomwatchError {
    /// The host exposes none of the mutation-observer constructors
    #[error("{}", UNSUPPORTED_MESSAGE)]
    UnsupportedEnvironment,

    /// A watcher was constructed with something that cannot be called
    #[error(
        "a watcher must receive a callback function, or there is nothing to run when mutations occur (got {0})"
    )]
    InvalidArgument(String),

    /// The host rejected an operation (bad selector, failed attach, ...)
    #[error("host error: {0}")]
    Host(String),

    /// Configuration could not be parsed or is out of range
    #[error("invalid configuration: {0}")]
    Config(String),
}

/// Result type for domwatch operations
pub type Result<T> = std::result::Result<T, DomwatchError>;
