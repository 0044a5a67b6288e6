//! # rlm-error
//!
//! Unified error handling for the rlm workspace.
//!
//! ## Design Philosophy
//!
//! - **ErrorKind**: Know what went wrong (e.g. NetworkFailed, BackendRejected)
//! - **ErrorStatus**: Decide how to handle it (Permanent, Temporary, Persistent)
//! - **Error Context**: Key-value pairs that help locate the cause
//! - **Error Source**: Wrap underlying errors without leaking raw types
//!
//! ## Usage
//!
//! ```rust
//! use rlm_error::{Error, ErrorKind};
//!
//! fn example() -> Result<(), Error> {
//!     Err(Error::new(ErrorKind::BackendRejected, "backend returned 500")
//!         .with_operation("backend::generate")
//!         .with_context("status", "500"))
//! }
//! ```
//!
//! ## Principles
//!
//! - All fallible functions return `Result<T, rlm_error::Error>`
//! - External errors are wrapped with `set_source(err)`
//! - Same error handled once, subsequent layers only append context

mod error;
mod kind;
mod status;

pub use error::Error;
pub use kind::ErrorKind;
pub use status::ErrorStatus;

/// Result type alias using the rlm Error
pub type Result<T> = std::result::Result<T, Error>;
