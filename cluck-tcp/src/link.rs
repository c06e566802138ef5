//!
//! The link side of a TCP connection.
//!
//! Sending over a [`TcpLink`] only queues the message; the connection's
//! writer thread frames it onto the socket.  This keeps a slow peer from
//! blocking the thread that is routing the message.
//!

use crossbeam::channel::{Sender, TrySendError};
use log::warn;

use cluck_core::{Link, LinkError, Message};

/// A link to the node on the other end of a TCP connection
pub struct TcpLink {
    name: String,
    queue: Sender<Message>,
}

impl TcpLink {
    pub(crate) fn new(name: &str, queue: Sender<Message>) -> Self {
        Self {
            name: name.to_owned(),
            queue,
        }
    }

    /// The name the link is registered under
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Link for TcpLink {
    fn send(
        &self,
        destination: Option<&str>,
        source: Option<&str>,
        payload: &[u8],
    ) -> Result<(), LinkError> {
        match self.queue.try_send(Message::new(destination, source, payload)) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(message)) => {
                warn!("Send queue of {} is full, dropping {:?}", self.name, message);
                Ok(())
            }
            Err(TrySendError::Disconnected(_)) => Err(LinkError::Closed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crossbeam::channel;

    #[test]
    fn test_send_queues_message() {
        let (tx, rx) = channel::bounded(1);
        let link = TcpLink::new("robot", tx);

        link.send(Some("light"), Some("switch"), &[6, 1]).unwrap();
        link.send(Some("light"), Some("switch"), &[6, 0]).unwrap();
        assert_eq!(
            rx.try_iter().collect::<Vec<_>>(),
            vec![Message::new(Some("light"), Some("switch"), &[6, 1])]
        );

        drop(rx);
        assert!(matches!(link.send(None, None, &[13]), Err(LinkError::Closed)));
    }
}
