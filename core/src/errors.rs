//! Unified error types for the hostpulse core crate.
//!
//! Sampling failures are transient by nature: the agent maps every
//! `CoreError` to a logged warning (scheduler) or an `"N/A"` marker
//! (HTTP status sections) and never lets one escape to a caller.

use thiserror::Error;

/// Top-level error type for sampling and parsing.
#[derive(Error, Debug)]
pub enum CoreError {
    /// A pseudo-file or command output could not be interpreted.
    #[error("Parse error: {0}")]
    Parse(String),

    /// The requested metric is not provided by this host.
    #[error("Unavailable: {0}")]
    Unavailable(String),

    /// A low-level I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Catch-all for errors that don't fit other categories.
    #[error("{0}")]
    Other(String),
}
