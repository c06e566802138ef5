//!
//! Links are the transport-agnostic edges of a Cluck network.
//!
//! A link carries a message one hop: from the node it is registered in
//! to whatever sits on the other side (another in-process node, a TCP
//! peer, or a test fake).  The receiving side is responsible for
//! prepending its own name for the link to the source path, so that the
//! source always reads as a route back to the sender.
//!

use std::fmt;

use thiserror::Error;

/// An error from handing a message to a link.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum LinkError {
    /// The link's transport is gone and the link should be detached.
    #[error("link is closed")]
    Closed,
    /// The link was already paired with a peer.
    #[error("link is already paired with a peer")]
    AlreadyPaired,
}

/// A bidirectional named-message channel between a node and its peer.
pub trait Link: Send + Sync {
    /// Send a message across the link.
    ///
    /// `destination` is the remainder of the path after the link's own
    /// name was stripped (`None` addresses the peer node itself, `*`
    /// broadcasts on the peer).
    fn send(
        &self,
        destination: Option<&str>,
        source: Option<&str>,
        payload: &[u8],
    ) -> Result<(), LinkError>;
}

/// An owned Cluck message as it travels across a byte-stream transport.
#[derive(Clone, PartialEq, Eq)]
pub struct Message {
    /// The path still to be resolved, `None` for the receiving node itself
    pub destination: Option<String>,
    /// The breadcrumb path back to the sender
    pub source: Option<String>,
    /// The raw payload, usually starting with a remote message type tag
    pub payload: Vec<u8>,
}

impl Message {
    /// Create a new message from borrowed parts
    pub fn new(destination: Option<&str>, source: Option<&str>, payload: &[u8]) -> Self {
        Self {
            destination: destination.map(str::to_owned),
            source: source.map(str::to_owned),
            payload: payload.to_vec(),
        }
    }
}

impl fmt::Debug for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Message")
            .field("destination", &self.destination)
            .field("source", &self.source)
            .field("len", &self.payload.len())
            .finish()
    }
}

/// Join a link name onto the front of a source path.
///
/// A message without a source that crosses a link gets the link's name
/// as its whole source.
pub fn prefix_source(link_name: &str, source: Option<&str>) -> String {
    match source {
        Some(source) => format!("{link_name}/{source}"),
        None => link_name.to_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefix_source() {
        assert_eq!(prefix_source("robot", None), "robot");
        assert_eq!(prefix_source("robot", Some("drive/left")), "robot/drive/left");
    }

    #[test]
    fn test_message_debug_hides_payload() {
        let message = Message::new(Some("a/b"), None, &[1, 2, 3]);
        let printed = format!("{:?}", message);
        assert!(printed.contains("len: 3"));
        assert!(!printed.contains("[1, 2, 3]"));
    }
}
