//! The main Error type for rlm

use crate::{ErrorKind, ErrorStatus};
use std::fmt;

/// The unified error type for all rlm operations.
///
/// This error type provides:
/// - `kind`: What type of error occurred
/// - `message`: Human-readable description
/// - `status`: Whether the error is retryable
/// - `operation`: What operation caused the error
/// - `context`: Key-value pairs for debugging
/// - `source`: The underlying error (if any)
///
/// # Example
///
/// ```rust
/// use rlm_error::{Error, ErrorKind, ErrorStatus};
///
/// let err = Error::new(ErrorKind::NetworkFailed, "connection refused")
///     .with_operation("backend::generate")
///     .with_context("attempt", "1");
///
/// assert_eq!(err.kind(), ErrorKind::NetworkFailed);
/// assert!(err.status().is_retryable());
///
/// let err = err.persist();
/// assert_eq!(err.status(), ErrorStatus::Persistent);
/// ```
pub struct Error {
    kind: ErrorKind,
    message: String,
    status: ErrorStatus,
    operation: &'static str,
    context: Vec<(&'static str, String)>,
    source: Option<anyhow::Error>,
}

impl Error {
    /// Create a new error with the given kind and message
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        let status = if kind.is_retryable() {
            ErrorStatus::Temporary
        } else {
            ErrorStatus::Permanent
        };

        Self {
            kind,
            message: message.into(),
            status,
            operation: "",
            context: Vec::new(),
            source: None,
        }
    }

    // =========================================================================
    // Getters
    // =========================================================================

    /// Get the error kind
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Get the error message
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Get the error status
    pub fn status(&self) -> ErrorStatus {
        self.status
    }

    /// Get the operation that caused this error
    pub fn operation(&self) -> &'static str {
        self.operation
    }

    /// Get the context key-value pairs
    pub fn context(&self) -> &[(&'static str, String)] {
        &self.context
    }

    /// Look up a single context value by key
    pub fn context_value(&self, key: &str) -> Option<&str> {
        self.context
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Get the source error (if any)
    pub fn source_ref(&self) -> Option<&anyhow::Error> {
        self.source.as_ref()
    }

    // =========================================================================
    // Builders (chainable)
    // =========================================================================

    /// Set the operation that caused this error.
    ///
    /// If an operation was already set, the previous one is moved to context
    /// as "called" to preserve the call chain.
    pub fn with_operation(mut self, operation: &'static str) -> Self {
        if !self.operation.is_empty() {
            self.context.push(("called", self.operation.to_string()));
        }
        self.operation = operation;
        self
    }

    /// Add context to the error
    pub fn with_context(mut self, key: &'static str, value: impl Into<String>) -> Self {
        self.context.push((key, value.into()));
        self
    }

    /// Set the source error.
    ///
    /// # Panics (debug only)
    /// Panics in debug mode if source was already set.
    pub fn set_source(mut self, source: impl Into<anyhow::Error>) -> Self {
        debug_assert!(self.source.is_none(), "source error already set");
        self.source = Some(source.into());
        self
    }

    // =========================================================================
    // Status mutations
    // =========================================================================

    /// Mark as persistent after failed retries
    pub fn persist(mut self) -> Self {
        self.status = self.status.persist();
        self
    }

    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        self.status.is_retryable()
    }
}

// =============================================================================
// Display - compact, single-line format for logs
// =============================================================================

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}) at {}", self.kind, self.status, self.operation)?;

        if !self.context.is_empty() {
            write!(f, ", context {{ ")?;
            for (i, (key, value)) in self.context.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{}: {}", key, value)?;
            }
            write!(f, " }}")?;
        }

        if !self.message.is_empty() {
            write!(f, " => {}", self.message)?;
        }

        Ok(())
    }
}

// =============================================================================
// Debug - verbose, multi-line format for debugging
// =============================================================================

impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} ({}) at {}", self.kind, self.status, self.operation)?;

        if !self.message.is_empty() {
            writeln!(f)?;
            writeln!(f, "    Message: {}", self.message)?;
        }

        if !self.context.is_empty() {
            writeln!(f)?;
            writeln!(f, "    Context:")?;
            for (key, value) in &self.context {
                writeln!(f, "        {}: {}", key, value)?;
            }
        }

        if let Some(source) = &self.source {
            writeln!(f)?;
            writeln!(f, "    Source: {:?}", source)?;
        }

        Ok(())
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source.as_ref().map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        let kind = match err.kind() {
            std::io::ErrorKind::NotFound => ErrorKind::FileNotFound,
            std::io::ErrorKind::PermissionDenied => ErrorKind::PermissionDenied,
            std::io::ErrorKind::BrokenPipe => ErrorKind::ChannelClosed,
            _ => ErrorKind::IoFailed,
        };
        Error::new(kind, err.to_string())
            .with_operation("io")
            .set_source(err)
    }
}

// =============================================================================
// Convenience constructors
// =============================================================================

impl Error {
    /// Create an Unexpected error
    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unexpected, message)
    }

    /// Create a ConfigInvalid error
    pub fn config_invalid(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ConfigInvalid, message)
    }

    /// Create a NetworkFailed error (retryable)
    pub fn network_failed(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NetworkFailed, message)
    }

    /// Create a Timeout error (retryable)
    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Timeout, message)
    }

    /// Create a BackendRejected error carrying the HTTP status and body.
    ///
    /// A 429 becomes `RateLimited`; neither is retried.
    pub fn backend_rejected(status: u16, body: impl Into<String>) -> Self {
        let body = body.into();
        let kind = if status == 429 {
            ErrorKind::RateLimited
        } else {
            ErrorKind::BackendRejected
        };
        Self::new(kind, format!("backend returned status {}", status))
        .with_context("status", status.to_string())
        .with_context("body", body)
    }

    /// Create a KernelUnavailable error
    pub fn kernel_unavailable(command: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::new(ErrorKind::KernelUnavailable, reason).with_context("command", command)
    }

    /// Create a KernelProtocol error
    pub fn kernel_protocol(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::KernelProtocol, message)
    }

    /// Create a RecursionLimit error
    pub fn recursion_limit(max_depth: usize) -> Self {
        Self::new(
            ErrorKind::RecursionLimit,
            format!("recursion depth limit {} reached", max_depth),
        )
        .with_context("max_depth", max_depth.to_string())
    }

    /// Create a ParseFailed error
    pub fn parse_failed(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ParseFailed, message)
    }

    /// Create a SerializationFailed error
    pub fn serialization_failed(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::SerializationFailed, message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = Error::new(ErrorKind::KernelProtocol, "unknown message type 'foo'");
        assert_eq!(err.kind(), ErrorKind::KernelProtocol);
        assert_eq!(err.message(), "unknown message type 'foo'");
        assert_eq!(err.status(), ErrorStatus::Permanent);
    }

    #[test]
    fn test_error_with_context() {
        let err = Error::new(ErrorKind::Timeout, "request timed out")
            .with_operation("backend::generate")
            .with_context("model", "openai/gpt-4o-mini")
            .with_context("attempt", "2");

        assert_eq!(err.operation(), "backend::generate");
        assert_eq!(err.context().len(), 2);
        assert_eq!(err.context()[0], ("model", "openai/gpt-4o-mini".to_string()));
        assert_eq!(err.context_value("attempt"), Some("2"));
        assert_eq!(err.context_value("missing"), None);
    }

    #[test]
    fn test_operation_chaining() {
        let err = Error::new(ErrorKind::ChannelClosed, "stdin closed")
            .with_operation("kernel::send")
            .with_operation("environment::execute");

        assert_eq!(err.operation(), "environment::execute");
        assert_eq!(err.context().len(), 1);
        assert_eq!(err.context()[0], ("called", "kernel::send".to_string()));
    }

    #[test]
    fn test_default_status_follows_kind() {
        assert!(Error::network_failed("reset by peer").is_retryable());
        assert!(Error::timeout("slow").is_retryable());
        assert!(!Error::backend_rejected(500, "oops").is_retryable());
    }

    #[test]
    fn test_persist() {
        let err = Error::network_failed("connection refused");
        assert!(err.is_retryable());

        let err = err.persist();
        assert!(!err.is_retryable());
        assert_eq!(err.status(), ErrorStatus::Persistent);
    }

    #[test]
    fn test_backend_rejected_carries_status_and_body() {
        let err = Error::backend_rejected(401, "{\"error\":\"bad key\"}");
        assert_eq!(err.kind(), ErrorKind::BackendRejected);
        assert_eq!(err.context_value("status"), Some("401"));
        assert_eq!(err.context_value("body"), Some("{\"error\":\"bad key\"}"));
    }

    #[test]
    fn test_too_many_requests_is_rate_limited() {
        let err = Error::backend_rejected(429, "slow down");
        assert_eq!(err.kind(), ErrorKind::RateLimited);
        assert_eq!(err.status(), ErrorStatus::Permanent);
        assert!(!err.is_retryable());
        assert_eq!(err.context_value("status"), Some("429"));
    }

    #[test]
    fn test_display() {
        let err = Error::network_failed("connection reset")
            .with_operation("backend::generate")
            .with_context("attempt", "3")
            .persist();

        let display = format!("{}", err);
        assert!(display.contains("NetworkFailed"));
        assert!(display.contains("persistent"));
        assert!(display.contains("backend::generate"));
        assert!(display.contains("attempt: 3"));
        assert!(display.ends_with("=> connection reset"));
    }

    #[test]
    fn test_recursion_limit() {
        let err = Error::recursion_limit(3);
        assert_eq!(err.kind(), ErrorKind::RecursionLimit);
        assert!(err.message().contains("3"));
    }

    #[test]
    fn test_io_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe closed");
        let err: Error = io_err.into();
        assert_eq!(err.kind(), ErrorKind::ChannelClosed);
        assert!(err.source_ref().is_some());
    }
}
