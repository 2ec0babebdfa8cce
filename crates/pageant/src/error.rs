use std::io;
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PageantError {
    #[error("pageant process not found")]
    AgentNotFound,

    #[error("message too long: {len} bytes exceeds the shared segment limit")]
    MessageTooLong { len: usize },

    #[error("invalid message format: length prefix does not match payload")]
    InvalidMessageFormat,

    #[error("error sending message: pageant did not handle the request")]
    SendFailed,

    #[error("pageant did not answer within {0:?}")]
    Timeout(Duration),

    #[error("response too long: pageant declared {len} bytes")]
    ResponseTooLong { len: usize },

    #[error("shared segment {op} failed: {source}")]
    Segment {
        op: &'static str,
        #[source]
        source: io::Error,
    },

    #[error("invalid certificate line: expected '<type> <base64> [comment]'")]
    InvalidCertificateLine,

    #[error("base64 decode error on certificate: {0}")]
    Decode(#[from] base64::DecodeError),

    #[error("pageant returned error {status}")]
    CertificateRejected { status: u8 },

    #[error("pageant returned a short reply ({len} bytes)")]
    ShortReply { len: usize },

    #[error("pageant reported failure")]
    AgentFailure,

    #[error("unexpected reply from pageant (message type {kind})")]
    UnexpectedReply { kind: u8 },

    #[error("malformed agent message: {0}")]
    Protocol(String),

    #[error("I/O error: {0}")]
    Io(#[source] io::Error),
}

impl PageantError {
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol(message.into())
    }

    /// True when the agent simply isn't there. Callers treat this as
    /// "feature unavailable" rather than a hard failure.
    pub fn is_agent_unavailable(&self) -> bool {
        matches!(self, Self::AgentNotFound)
    }

    /// Recover a bridge error that travelled through `std::io` (the channel's
    /// `Read`/`Write` impls box it with `io::Error::other`).
    pub fn from_io(err: io::Error) -> Self {
        if err.get_ref().is_some_and(|inner| inner.is::<PageantError>()) {
            return match err.into_inner().map(|inner| inner.downcast::<PageantError>()) {
                Some(Ok(inner)) => *inner,
                _ => Self::protocol("bridge error lost in transit"),
            };
        }
        Self::Io(err)
    }
}

impl From<io::Error> for PageantError {
    fn from(err: io::Error) -> Self {
        Self::from_io(err)
    }
}

/// Agent fields that don't decode (or won't encode) are protocol errors:
/// the message, not the transport, is at fault.
impl From<ssh_encoding::Error> for PageantError {
    fn from(err: ssh_encoding::Error) -> Self {
        Self::Protocol(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, PageantError>;
