//! Error types for the sqlproxy transport and configuration layers.
//!
//! The tokenizer has no error class of its own: malformed SQL always yields a
//! best-effort token list and table lookups return `Option`. Everything that
//! touches the network or configuration reports through [`ProxyError`].
//!
//! Transient conditions (would-block, connect in progress) are *not* errors:
//! the socket layer reports them as a retry status and only fatal conditions
//! escape as `Err`.

use std::io;

use thiserror::Error;

/// Main error type for the proxy core.
#[derive(Error, Debug)]
pub enum ProxyError {
    /// An endpoint string could not be parsed. Raised at construction time,
    /// the previously held address (if any) is left untouched.
    #[error("invalid address '{input}': {reason}")]
    AddressParse { input: String, reason: String },

    /// An operation needs an address that was never set.
    #[error("{op}: no address set")]
    NoAddress { op: &'static str },

    /// An operation is not valid in the socket's current state.
    #[error("{op}: invalid in socket state {state}")]
    InvalidState { op: &'static str, state: &'static str },

    /// The peer closed the connection (zero-byte stream read).
    #[error("connection closed by peer")]
    ConnectionClosed,

    /// A protocol frame exceeds the wire format's maximum payload size.
    #[error("packet payload of {len} bytes exceeds the protocol maximum")]
    PacketTooLarge { len: usize },

    /// Invalid configuration value or logging setup failure.
    #[error("configuration error: {0}")]
    Config(String),

    /// Hard I/O failure on a socket.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Internal invariant violation.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ProxyError {
    /// Build an [`ProxyError::Internal`] from any message.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Build an [`ProxyError::AddressParse`].
    pub fn address(input: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::AddressParse {
            input: input.into(),
            reason: reason.into(),
        }
    }

    /// Whether retrying the same operation after readiness may succeed.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Io(err) => matches!(
                err.kind(),
                io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
            ),
            _ => false,
        }
    }

    /// The raw OS error code, if this wraps one.
    #[must_use]
    pub fn raw_os_error(&self) -> Option<i32> {
        match self {
            Self::Io(err) => err.raw_os_error(),
            _ => None,
        }
    }
}

/// Result type alias for [`ProxyError`].
pub type Result<T> = std::result::Result<T, ProxyError>;
