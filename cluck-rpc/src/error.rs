//!
//! Remote procedure call errors
//!

use thiserror::Error;

use cluck_node::NodeError;

/// An error from calling or serving a remote procedure.
#[derive(Debug, Error)]
pub enum RpcError {
    /// No reply arrived before the deadline
    #[error("remote procedure call timed out")]
    TimedOut,
    /// The reply to this call has already been sent
    #[error("reply already sent")]
    ReplyAlreadySent,
    /// A server was asked to respond to a request it does not know about
    #[error("no pending request with key {0}")]
    UnknownRequest(u64),
    /// The manager or a procedure could not be registered on the node
    #[error(transparent)]
    Node(#[from] NodeError),
    /// The timeout sweeper thread could not be started
    #[error("failed to start timeout sweeper: {0}")]
    Io(#[from] std::io::Error),
}
