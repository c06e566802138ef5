//!
//! Transport errors and how loudly each one is reported.
//!

use std::io;

use log::{debug, error, warn};
use thiserror::Error;

use cluck_node::NodeError;

/// An error that ends a TCP connection.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The socket failed
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),
    /// The peer does not speak this protocol
    #[error("bad magic number: expected {expected:#018x}, found {found:#018x}")]
    BadMagic {
        /// The magic number that should have been sent
        expected: u64,
        /// The magic number that was sent
        found: u64,
    },
    /// A frame was corrupted in transit
    #[error("checksum mismatch: expected {expected:#x}, found {found:#x}")]
    ChecksumMismatch {
        /// The checksum computed over the received payload
        expected: i64,
        /// The checksum sent with the frame
        found: i64,
    },
    /// A frame announced a payload larger than allowed
    #[error("frame of {len} bytes exceeds the maximum of {max}")]
    FrameTooLarge {
        /// The announced length
        len: usize,
        /// The configured maximum
        max: usize,
    },
    /// A frame announced a negative payload length
    #[error("negative frame length {0}")]
    NegativeLength(i32),
    /// A frame contained a string that could not be decoded or encoded
    #[error("invalid string in frame")]
    InvalidString,
    /// The peer stopped sending keep-alives
    #[error("connection timed out")]
    TimedOut,
    /// The connection was closed
    #[error("connection closed")]
    Closed,
    /// The link could not be registered on the node
    #[error(transparent)]
    Node(#[from] NodeError),
}

impl TransportError {
    /// Whether the peer broke the protocol, as opposed to going away
    pub fn is_protocol_violation(&self) -> bool {
        matches!(
            self,
            TransportError::BadMagic { .. }
                | TransportError::ChecksumMismatch { .. }
                | TransportError::FrameTooLarge { .. }
                | TransportError::NegativeLength(_)
                | TransportError::InvalidString
        )
    }

    /// Whether this is an ordinary disconnection
    pub fn is_expected_disconnect(&self) -> bool {
        match self {
            TransportError::TimedOut | TransportError::Closed => true,
            TransportError::Io(err) => matches!(
                err.kind(),
                io::ErrorKind::UnexpectedEof
                    | io::ErrorKind::ConnectionReset
                    | io::ErrorKind::ConnectionAborted
                    | io::ErrorKind::ConnectionRefused
                    | io::ErrorKind::BrokenPipe
                    | io::ErrorKind::TimedOut
                    | io::ErrorKind::WouldBlock
            ),
            _ => false,
        }
    }

    /// Turn a read error into [`TransportError::TimedOut`] if it was caused
    /// by the read timeout
    pub(crate) fn from_read(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut => TransportError::TimedOut,
            io::ErrorKind::UnexpectedEof => TransportError::Closed,
            _ => TransportError::Io(err),
        }
    }

    /// Log the end of the connection `context`
    pub(crate) fn report(&self, context: &str) {
        if self.is_protocol_violation() {
            error!("{}: protocol violation: {}", context, self);
        } else if self.is_expected_disconnect() {
            debug!("{}: disconnected: {}", context, self);
        } else {
            warn!("{}: {}", context, self);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        let bad_magic = TransportError::BadMagic {
            expected: 1,
            found: 2,
        };
        assert!(bad_magic.is_protocol_violation());
        assert!(!bad_magic.is_expected_disconnect());

        let reset = TransportError::Io(io::Error::from(io::ErrorKind::ConnectionReset));
        assert!(reset.is_expected_disconnect());
        assert!(!reset.is_protocol_violation());

        let denied = TransportError::Io(io::Error::from(io::ErrorKind::PermissionDenied));
        assert!(!denied.is_expected_disconnect());
        assert!(!denied.is_protocol_violation());
    }

    #[test]
    fn test_read_timeout_becomes_timed_out() {
        assert!(matches!(
            TransportError::from_read(io::Error::from(io::ErrorKind::WouldBlock)),
            TransportError::TimedOut
        ));
        assert!(matches!(
            TransportError::from_read(io::Error::from(io::ErrorKind::UnexpectedEof)),
            TransportError::Closed
        ));
    }
}
