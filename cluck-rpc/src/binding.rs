//!
//! Outstanding Call Bookkeeping
//!
//! Every call that is waiting for a reply has a binding: the handler for
//! its reply, the deadline after which it is given up on, and the path it
//! was sent to for logging.  A binding is removed exactly once, either by
//! its reply or by a timeout sweep, so a handler can never see two replies
//! or a reply after it timed out.
//!
//! Replies come back through [`BindingLink`], a link registered on the
//! node under the manager's name.  The part of the destination after the
//! link name is the correlation name of the call.
//!

use std::{
    collections::HashMap,
    sync::Arc,
    thread::{self, JoinHandle},
    time::Duration,
};

use crossbeam::{
    channel::{self, Sender},
    select,
};
use log::{debug, warn};
use parking_lot::Mutex;
use quanta::{Clock, Instant};

use cluck_core::{Link, LinkError};
use cluck_node::{RemoteMessage, BROADCAST};

pub(crate) type ReplyHandler = Box<dyn FnOnce(Vec<u8>) + Send>;

struct Binding {
    handler: ReplyHandler,
    deadline: Instant,
    path: String,
}

/// The calls currently waiting for a reply
pub(crate) struct BindingTable {
    clock: Clock,
    bindings: Mutex<HashMap<String, Binding>>,
}

impl BindingTable {
    pub(crate) fn new(clock: Clock) -> Self {
        Self {
            clock,
            bindings: Mutex::new(HashMap::new()),
        }
    }

    /// Record a call to `path` that gives up after `timeout`
    pub(crate) fn bind(&self, correlation: String, path: &str, timeout: Duration, handler: ReplyHandler) {
        let deadline = self.clock.now() + timeout;
        self.bindings.lock().insert(
            correlation,
            Binding {
                handler,
                deadline,
                path: path.to_owned(),
            },
        );
    }

    /// Remove every binding past its deadline
    pub(crate) fn check_timeouts(&self) {
        let now = self.clock.now();
        let mut expired = Vec::new();
        self.bindings.lock().retain(|correlation, binding| {
            if binding.deadline <= now {
                expired.push((correlation.clone(), binding.path.clone()));
                false
            } else {
                true
            }
        });

        for (correlation, path) in expired {
            warn!("Remote procedure call {} to {} timed out", correlation, path);
        }
    }

    /// Deliver a reply to the call it belongs to
    pub(crate) fn reply(&self, correlation: &str, reply: Vec<u8>) {
        self.check_timeouts();
        let binding = self.bindings.lock().remove(correlation);
        match binding {
            Some(binding) => (binding.handler)(reply),
            None => warn!(
                "Dropping reply to {} which is unknown, already answered or timed out",
                correlation
            ),
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.bindings.lock().len()
    }
}

/// The link that replies are routed back through
pub(crate) struct BindingLink {
    pub(crate) table: Arc<BindingTable>,
}

impl Link for BindingLink {
    fn send(
        &self,
        destination: Option<&str>,
        source: Option<&str>,
        payload: &[u8],
    ) -> Result<(), LinkError> {
        let Some(correlation) = destination else {
            debug!("Ignoring message to RPC endpoint without correlation name");
            return Ok(());
        };
        // Structure notifications and searches reach every link
        if correlation == BROADCAST {
            return Ok(());
        }

        match RemoteMessage::decode(payload) {
            Ok(RemoteMessage::InvokeReply(reply)) => self.table.reply(correlation, reply.to_vec()),
            Ok(RemoteMessage::NegativeAck(_)) => {
                debug!("Call {} could not be delivered", correlation)
            }
            Ok(message) => warn!(
                "Received wrong message type {} to RPC binding {} from {}",
                message.kind(),
                correlation,
                source.unwrap_or("<anonymous>")
            ),
            Err(err) => warn!("Dropping malformed reply to {}: {}", correlation, err),
        }
        Ok(())
    }
}

/// A thread that sweeps the binding table on a fixed interval until it is
/// dropped
pub(crate) struct Sweeper {
    stop: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl Sweeper {
    pub(crate) fn spawn(table: Arc<BindingTable>, interval: Duration) -> std::io::Result<Self> {
        let (stop, stopped) = channel::bounded::<()>(0);
        let ticker = channel::tick(interval);
        let handle = thread::Builder::new()
            .name(String::from("cluck-rpc-sweeper"))
            .spawn(move || loop {
                select! {
                    recv(ticker) -> _ => table.check_timeouts(),
                    recv(stopped) -> _ => break,
                }
            })?;

        Ok(Self {
            stop: Some(stop),
            handle: Some(handle),
        })
    }
}

impl Drop for Sweeper {
    fn drop(&mut self) {
        drop(self.stop.take());
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("RPC timeout sweeper panicked");
            }
        }
    }
}
