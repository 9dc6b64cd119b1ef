//! Crate-wide error types.

use thiserror::Error;

/// Result type alias using [`RelayError`].
pub type Result<T> = std::result::Result<T, RelayError>;

/// Errors that can occur anywhere in the relay.
#[derive(Error, Debug)]
pub enum RelayError {
    /// Configuration load, validation, or reference-resolution failure. Fatal at startup.
    #[error("configuration error: {0}")]
    Config(String),

    /// Per-message parse failure. Non-fatal, counted and logged.
    #[error("invalid PRI value: {0}")]
    InvalidPriority(u32),

    /// Message could not be matched against any known syslog grammar.
    #[error("unable to parse syslog message: {0:?}")]
    Unparseable(Vec<u8>),

    /// TCP connect failure or timeout. Non-fatal, consumed by the retry loop.
    #[error("connect error for {destination}: {message}")]
    Connect { destination: String, message: String },

    /// Transient send failure. Non-fatal, consumed by the retry loop.
    #[error("send error for {destination}: {message}")]
    Send { destination: String, message: String },

    /// A configured feature that is recognized but not implemented (TLS transport).
    #[error("unsupported: {0}")]
    Unsupported(String),

    /// I/O error with no more specific variant.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid regex in a filter or transform pattern. Fatal at startup, since
    /// patterns are compiled once from the configuration record.
    #[error("invalid pattern: {0}")]
    Pattern(#[from] regex::Error),
}

impl RelayError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn connect(destination: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Connect {
            destination: destination.into(),
            message: message.into(),
        }
    }

    pub fn send(destination: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Send {
            destination: destination.into(),
            message: message.into(),
        }
    }

    pub fn unsupported(msg: impl Into<String>) -> Self {
        Self::Unsupported(msg.into())
    }
}
