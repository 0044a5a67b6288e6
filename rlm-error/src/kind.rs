//! Error kinds for rlm operations

use std::fmt;

/// The kind of error that occurred.
///
/// Callers match on `ErrorKind` to tell a transport failure from a backend
/// rejection or a broken interpreter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum ErrorKind {
    // =========================================================================
    // General errors
    // =========================================================================
    /// An unexpected error occurred - catch-all for unhandled cases
    Unexpected,

    /// Invalid configuration or parameters
    ConfigInvalid,

    // =========================================================================
    // Backend errors
    // =========================================================================
    /// Connection to the backend failed
    NetworkFailed,

    /// The backend did not answer in time
    Timeout,

    /// The backend answered with a non-success status
    BackendRejected,

    /// The backend answered 429
    RateLimited,

    // =========================================================================
    // Kernel errors
    // =========================================================================
    /// The interpreter process could not be started
    KernelUnavailable,

    /// The interpreter sent something we could not understand
    KernelProtocol,

    /// A pipe to the interpreter closed unexpectedly
    ChannelClosed,

    // =========================================================================
    // Recursion errors
    // =========================================================================
    /// Nested invocation refused because the depth limit was reached
    RecursionLimit,

    // =========================================================================
    // Parse errors
    // =========================================================================
    /// Failed to parse input
    ParseFailed,

    /// Serialization/deserialization failed
    SerializationFailed,

    // =========================================================================
    // IO errors
    // =========================================================================
    /// File not found
    FileNotFound,

    /// Permission denied
    PermissionDenied,

    /// IO operation failed
    IoFailed,
}

impl ErrorKind {
    /// Returns the error kind as a static string
    pub fn as_str(&self) -> &'static str {
        match self {
            // General
            ErrorKind::Unexpected => "Unexpected",
            ErrorKind::ConfigInvalid => "ConfigInvalid",

            // Backend
            ErrorKind::NetworkFailed => "NetworkFailed",
            ErrorKind::Timeout => "Timeout",
            ErrorKind::BackendRejected => "BackendRejected",
            ErrorKind::RateLimited => "RateLimited",

            // Kernel
            ErrorKind::KernelUnavailable => "KernelUnavailable",
            ErrorKind::KernelProtocol => "KernelProtocol",
            ErrorKind::ChannelClosed => "ChannelClosed",

            // Recursion
            ErrorKind::RecursionLimit => "RecursionLimit",

            // Parse
            ErrorKind::ParseFailed => "ParseFailed",
            ErrorKind::SerializationFailed => "SerializationFailed",

            // IO
            ErrorKind::FileNotFound => "FileNotFound",
            ErrorKind::PermissionDenied => "PermissionDenied",
            ErrorKind::IoFailed => "IoFailed",
        }
    }

    /// Check if this error kind is retryable by default.
    ///
    /// Only transport-level failures qualify. A backend that answered with an
    /// error status, including 429, is never retried.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorKind::NetworkFailed | ErrorKind::Timeout)
    }

    /// True for failures that happened before the backend produced a status.
    pub fn is_transport(&self) -> bool {
        self.is_retryable()
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
