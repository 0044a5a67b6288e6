//! Runtime error types
//!
//! Re-exports rlm-error and adds conversions for the runtime's collaborators.

pub use rlm_error::{Error, ErrorKind, ErrorStatus, Result};

/// Wrap a serde_json failure
pub fn serialization_error(err: serde_json::Error) -> Error {
    Error::serialization_failed(err.to_string()).set_source(err)
}

/// The interpreter pipe closed while we still needed it
pub fn kernel_gone(detail: impl Into<String>) -> Error {
    Error::new(ErrorKind::ChannelClosed, detail).with_operation("kernel::recv")
}
