//! Core types shared by every pipeline stage.
//!
//! The core module currently holds the error system:
//! - [`AppupError`] - Enumerated error types covering all pipeline failure modes
//! - [`ErrorContext`] - User-friendly error wrapper with suggestions and details
//! - [`user_friendly_error`] - Convert any error to the user-friendly format
//! - [`exit_code_for`] - Map an error chain to the process exit code
//!
//! # Design Principles
//!
//! Every operation that can fail returns a [`Result`] with meaningful error
//! information. Library-level stages return [`AppupError`] directly so callers
//! can match on the failure; command glue uses `anyhow::Result` and adds context.

pub mod error;

pub use error::{AppupError, EXIT_FAILURE, ErrorContext, exit_code_for, user_friendly_error};
