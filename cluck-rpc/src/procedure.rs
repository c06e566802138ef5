//!
//! Published Procedures
//!
//! A procedure is handed each request together with a [`ReplySink`].  The
//! reply is written into the sink and sent when the sink is closed, which
//! may happen on any thread and at any later time.  A procedure that
//! never closes its sink leaves the caller to time out.
//!

use std::{io, sync::Arc};

use log::{debug, warn};

use cluck_node::{Endpoint, Node, RemoteMessage, RemoteType};

use crate::{binding::BindingTable, error::RpcError};

/// The reply to a single remote procedure call
pub struct ReplySink {
    node: Node,
    procedure: String,
    reply_to: String,
    buffer: Vec<u8>,
    sent: bool,
}

impl ReplySink {
    /// The address the reply will be sent to
    pub fn reply_to(&self) -> &str {
        &self.reply_to
    }

    /// Send everything written so far as the reply
    pub fn close(&mut self) -> Result<(), RpcError> {
        if self.sent {
            return Err(RpcError::ReplyAlreadySent);
        }
        self.sent = true;

        let reply = RemoteMessage::InvokeReply(&self.buffer).encode();
        self.node
            .transmit(Some(&self.reply_to), Some(&self.procedure), &reply);
        Ok(())
    }

    /// Send `reply` as the whole reply
    pub fn reply(mut self, reply: &[u8]) -> Result<(), RpcError> {
        self.buffer.extend_from_slice(reply);
        self.close()
    }
}

impl io::Write for ReplySink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.sent {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, RpcError::ReplyAlreadySent));
        }
        self.buffer.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Drop for ReplySink {
    fn drop(&mut self) {
        if !self.sent {
            debug!(
                "Call from {} to {} finished without a reply",
                self.reply_to, self.procedure
            );
        }
    }
}

/// A procedure that can be published on an [`RpcManager`](crate::RpcManager)
pub trait Procedure: Send + Sync {
    /// Handle a single request
    fn invoke(&self, request: &[u8], reply: ReplySink);
}

impl<F: Fn(&[u8], ReplySink) + Send + Sync> Procedure for F {
    fn invoke(&self, request: &[u8], reply: ReplySink) {
        self(request, reply)
    }
}

pub(crate) struct ProcedureEndpoint<P> {
    pub(crate) name: String,
    pub(crate) table: Arc<BindingTable>,
    pub(crate) procedure: P,
}

impl<P: Procedure> Endpoint for ProcedureEndpoint<P> {
    fn kind(&self) -> Option<RemoteType> {
        Some(RemoteType::Invoke)
    }

    fn receive(&self, node: &Node, source: Option<&str>, payload: &[u8]) {
        self.table.check_timeouts();

        match (RemoteMessage::decode(payload), source) {
            (Ok(RemoteMessage::Invoke(request)), Some(source)) => {
                let sink = ReplySink {
                    node: node.clone(),
                    procedure: self.name.clone(),
                    reply_to: source.to_owned(),
                    buffer: Vec::new(),
                    sent: false,
                };
                self.procedure.invoke(request, sink);
            }
            (Ok(RemoteMessage::Invoke(_)), None) => {
                warn!("Dropping call to {} with nowhere to reply to", self.name)
            }
            (Ok(message), _) => warn!(
                "Received wrong message type {} to procedure {} from {}",
                message.kind(),
                self.name,
                source.unwrap_or("<anonymous>")
            ),
            (Err(err), _) => warn!("Dropping malformed call to {}: {}", self.name, err),
        }
    }
}
