//! Password-authenticated remote command execution.
//!
//! A login issues an opaque token bound to a working directory. Each
//! `exec` runs one command in that directory, intercepting `cd` so the
//! directory persists across calls.

pub mod exec;
pub mod manager;

use thiserror::Error;

pub use manager::{TerminalConfig, TerminalSessionManager};

/// Authorization failures. Execution failures are not errors; they come
/// back as command output.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TerminalError {
    #[error("Invalid password")]
    InvalidPassword,

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Session expired")]
    SessionExpired,
}
