//!
//! The RPC Manager
//!
//! A manager owns the binding table for one node.  Calls go out as
//! `INVOKE` messages whose source is `<manager link>/<correlation name>`,
//! so the reply finds its way back to the manager's link and from there to
//! the binding of the call.
//!
//! Expired calls are swept lazily on every call sent, call received and
//! reply received.  With [`TimeoutSweep::Periodic`] a ticker thread also
//! sweeps on a fixed interval so timeouts are noticed on an idle node.
//!

use std::{sync::Arc, time::Duration};

use crossbeam::channel;
use log::info;
use quanta::Clock;

use cluck_node::{Node, RemoteMessage};
use cluck_utils::UniqueIds;

use crate::{
    binding::{BindingLink, BindingTable, Sweeper},
    error::RpcError,
    procedure::{Procedure, ProcedureEndpoint},
};

/// When expired calls are looked for
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TimeoutSweep {
    /// Only while handling RPC traffic
    Lazy,
    /// While handling RPC traffic and on a fixed interval
    Periodic(Duration),
}

impl Default for TimeoutSweep {
    fn default() -> Self {
        Self::Periodic(Duration::from_millis(100))
    }
}

/// RPC manager configuration
#[derive(Clone)]
pub struct RpcConfig {
    /// The clock deadlines are measured with
    pub clock: Clock,
    /// When expired calls are looked for
    pub sweep: TimeoutSweep,
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            clock: Clock::new(),
            sweep: TimeoutSweep::default(),
        }
    }
}

struct Inner {
    node: Node,
    link_name: String,
    table: Arc<BindingTable>,
    _sweeper: Option<Sweeper>,
}

impl Drop for Inner {
    fn drop(&mut self) {
        self.node.remove(&self.link_name);
    }
}

/// Handles remote procedure calls for a node
#[derive(Clone)]
pub struct RpcManager {
    inner: Arc<Inner>,
}

impl RpcManager {
    /// Attach a new manager to `node`
    pub fn new(node: &Node, config: RpcConfig) -> Result<Self, RpcError> {
        let table = Arc::new(BindingTable::new(config.clock));
        let link_name = UniqueIds::global().next_name("rpc-endpoint");
        node.add_link(
            &link_name,
            Arc::new(BindingLink {
                table: table.clone(),
            }),
        )?;

        let sweeper = match config.sweep {
            TimeoutSweep::Lazy => None,
            TimeoutSweep::Periodic(interval) => match Sweeper::spawn(table.clone(), interval) {
                Ok(sweeper) => Some(sweeper),
                Err(err) => {
                    node.remove(&link_name);
                    return Err(err.into());
                }
            },
        };
        info!("RPC manager attached as {}", link_name);

        Ok(Self {
            inner: Arc::new(Inner {
                node: node.clone(),
                link_name,
                table,
                _sweeper: sweeper,
            }),
        })
    }

    /// The name the manager's reply link is registered under
    pub fn link_name(&self) -> &str {
        &self.inner.link_name
    }

    /// Get a handle for calling the procedure at `path`.  Calls that get
    /// no reply within `timeout` are given up on.
    pub fn subscribe(&self, path: &str, timeout: Duration) -> RemoteProcedure {
        RemoteProcedure {
            manager: self.clone(),
            path: path.to_owned(),
            timeout,
        }
    }

    /// Publish `procedure` on the node under `name`
    pub fn publish(&self, name: &str, procedure: impl Procedure + 'static) -> Result<(), RpcError> {
        self.inner.node.publish(
            name,
            ProcedureEndpoint {
                name: name.to_owned(),
                table: self.inner.table.clone(),
                procedure,
            },
        )?;
        Ok(())
    }

    /// Give up on every call past its deadline
    pub fn check_timeouts(&self) {
        self.inner.table.check_timeouts();
    }

    /// The number of calls still waiting for a reply
    pub fn pending_calls(&self) -> usize {
        self.inner.table.len()
    }
}

/// A procedure published somewhere in the network
#[derive(Clone)]
pub struct RemoteProcedure {
    manager: RpcManager,
    path: String,
    timeout: Duration,
}

impl RemoteProcedure {
    /// The path of the procedure
    pub fn path(&self) -> &str {
        &self.path
    }

    /// How long calls wait for a reply
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Call the procedure without waiting.
    ///
    /// `on_reply` is called with the reply if one arrives in time and is
    /// dropped uncalled otherwise.
    pub fn invoke(&self, request: &[u8], on_reply: impl FnOnce(Vec<u8>) + Send + 'static) {
        let inner = &self.manager.inner;
        inner.table.check_timeouts();

        let correlation = UniqueIds::global().next_hex_id();
        let reply_to = format!("{}/{}", inner.link_name, correlation);
        inner
            .table
            .bind(correlation, &self.path, self.timeout, Box::new(on_reply));
        inner.node.transmit(
            Some(&self.path),
            Some(&reply_to),
            &RemoteMessage::Invoke(request).encode(),
        );
    }

    /// Call the procedure and wait up to its timeout for the reply
    pub fn invoke_blocking(&self, request: &[u8]) -> Result<Vec<u8>, RpcError> {
        self.invoke_with_timeout(request, self.timeout)
    }

    /// Call the procedure and wait up to `wait` for the reply.  A zero
    /// `wait` only returns a reply that arrived synchronously.
    pub fn invoke_with_timeout(&self, request: &[u8], wait: Duration) -> Result<Vec<u8>, RpcError> {
        let (tx, rx) = channel::bounded(1);
        self.invoke(request, move |reply| {
            let _ = tx.send(reply);
        });

        if wait.is_zero() {
            rx.try_recv().map_err(|_| RpcError::TimedOut)
        } else {
            rx.recv_timeout(wait).map_err(|_| RpcError::TimedOut)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::{
        sync::{
            atomic::{AtomicUsize, Ordering},
            Mutex,
        },
        thread,
        time::Instant,
    };

    use cluck_node::local::connect;

    use crate::procedure::ReplySink;

    fn echo(request: &[u8], reply: ReplySink) {
        let _ = reply.reply(request);
    }

    fn network(sweep: TimeoutSweep, clock: Clock) -> (Node, RpcManager, RpcManager) {
        let _ = env_logger::builder().is_test(true).try_init();
        let client = Node::new();
        let server = Node::new();
        connect(&client, "A-link", &server, "B-link").unwrap();
        let config = RpcConfig { clock, sweep };
        let client_rpc = RpcManager::new(&client, config.clone()).unwrap();
        let server_rpc = RpcManager::new(&server, config).unwrap();
        (client, client_rpc, server_rpc)
    }

    #[test]
    fn test_echo_returns_request() {
        let (_client, client_rpc, server_rpc) = network(TimeoutSweep::default(), Clock::new());
        server_rpc.publish("echo", echo).unwrap();

        let procedure = client_rpc.subscribe("A-link/echo", Duration::from_millis(50));
        let start = Instant::now();
        assert_eq!(procedure.invoke_blocking(b"REQUEST").unwrap(), b"REQUEST".to_vec());
        assert!(start.elapsed() < Duration::from_millis(50));
        assert_eq!(client_rpc.pending_calls(), 0);
    }

    #[test]
    fn test_random_payload_round_trips() {
        let (_client, client_rpc, server_rpc) = network(TimeoutSweep::Lazy, Clock::new());
        server_rpc.publish("echo", echo).unwrap();

        let request: Vec<u8> = (0..64).map(|_| rand::random()).collect();
        let procedure = client_rpc.subscribe("A-link/echo", Duration::from_millis(50));
        assert_eq!(procedure.invoke_with_timeout(&request, Duration::ZERO).unwrap(), request);
    }

    #[test]
    fn test_silent_procedure_times_out() {
        let (_client, client_rpc, server_rpc) = network(
            TimeoutSweep::Periodic(Duration::from_millis(10)),
            Clock::new(),
        );
        server_rpc.publish("silent", |_: &[u8], _: ReplySink| {}).unwrap();

        let procedure = client_rpc.subscribe("A-link/silent", Duration::from_millis(50));
        let start = Instant::now();
        assert!(matches!(procedure.invoke_blocking(b"REQUEST"), Err(RpcError::TimedOut)));
        assert!(start.elapsed() >= Duration::from_millis(50));

        thread::sleep(Duration::from_millis(30));
        assert_eq!(client_rpc.pending_calls(), 0);
    }

    #[test]
    fn test_zero_wait_does_not_block() {
        let (_client, client_rpc, server_rpc) = network(TimeoutSweep::Lazy, Clock::new());
        server_rpc.publish("silent", |_: &[u8], _: ReplySink| {}).unwrap();

        let procedure = client_rpc.subscribe("A-link/silent", Duration::from_secs(10));
        let start = Instant::now();
        assert!(matches!(
            procedure.invoke_with_timeout(b"REQUEST", Duration::ZERO),
            Err(RpcError::TimedOut)
        ));
        assert!(start.elapsed() < Duration::from_secs(1));
        assert_eq!(client_rpc.pending_calls(), 1);
    }

    #[test]
    fn test_late_reply_after_sweep_is_dropped() {
        let (clock, mock) = Clock::mock();
        let (_client, client_rpc, server_rpc) = network(TimeoutSweep::Lazy, clock);
        let held = Arc::new(Mutex::new(None));
        let slot = held.clone();
        server_rpc
            .publish("slow", move |_: &[u8], reply: ReplySink| {
                *slot.lock().unwrap() = Some(reply);
            })
            .unwrap();

        let replies = Arc::new(AtomicUsize::new(0));
        let counter = replies.clone();
        let procedure = client_rpc.subscribe("A-link/slow", Duration::from_millis(50));
        procedure.invoke(b"REQUEST", move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(client_rpc.pending_calls(), 1);

        mock.increment(Duration::from_millis(60));
        client_rpc.check_timeouts();
        assert_eq!(client_rpc.pending_calls(), 0);

        let reply = held.lock().unwrap().take().unwrap();
        reply.reply(b"too late").unwrap();
        assert_eq!(replies.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_duplicate_reply_is_dropped() {
        let (client, client_rpc, server_rpc) = network(TimeoutSweep::Lazy, Clock::new());
        let reply_to = Arc::new(Mutex::new(String::new()));
        let slot = reply_to.clone();
        server_rpc
            .publish("echo", move |request: &[u8], reply: ReplySink| {
                *slot.lock().unwrap() = reply.reply_to().to_owned();
                let _ = reply.reply(request);
            })
            .unwrap();

        let replies = Arc::new(AtomicUsize::new(0));
        let counter = replies.clone();
        client_rpc
            .subscribe("A-link/echo", Duration::from_millis(50))
            .invoke(b"REQUEST", move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            });

        // The reply-to path is relative to the server, so send it from there
        let reply_to = reply_to.lock().unwrap().clone();
        assert!(reply_to.starts_with("B-link/"));
        assert!(client.contains(client_rpc.link_name()));
        server_rpc.inner.node.transmit(
            Some(&reply_to),
            None,
            &RemoteMessage::InvokeReply(b"again").encode(),
        );
        assert_eq!(replies.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_broadcasts_leave_pending_calls_alone() {
        let (client, client_rpc, server_rpc) = network(TimeoutSweep::Lazy, Clock::new());
        server_rpc.publish("silent", |_: &[u8], _: ReplySink| {}).unwrap();
        client_rpc
            .subscribe("A-link/silent", Duration::from_secs(10))
            .invoke(b"REQUEST", |_| {});
        assert_eq!(client_rpc.pending_calls(), 1);

        server_rpc.inner.node.notify_network_modified();
        server_rpc
            .inner
            .node
            .search_remotes(Duration::from_millis(50))
            .unwrap();
        assert_eq!(client_rpc.pending_calls(), 1);
        assert!(client.has_link(client_rpc.link_name()));
    }

    #[test]
    fn test_double_close_is_an_error() {
        let (_client, client_rpc, server_rpc) = network(TimeoutSweep::Lazy, Clock::new());
        let outcome = Arc::new(Mutex::new(None));
        let slot = outcome.clone();
        server_rpc
            .publish("twice", move |_: &[u8], mut reply: ReplySink| {
                let first = reply.close();
                let second = reply.close();
                *slot.lock().unwrap() = Some((first.is_ok(), second));
            })
            .unwrap();

        client_rpc
            .subscribe("A-link/twice", Duration::from_millis(50))
            .invoke(b"", |_| {});
        let (first_ok, second) = outcome.lock().unwrap().take().unwrap();
        assert!(first_ok);
        assert!(matches!(second, Err(RpcError::ReplyAlreadySent)));
    }

    #[test]
    fn test_dropping_manager_detaches_link() {
        let node = Node::new();
        let rpc = RpcManager::new(&node, RpcConfig::default()).unwrap();
        let name = rpc.link_name().to_owned();
        assert!(node.has_link(&name));
        drop(rpc);
        assert!(!node.has_link(&name));
    }
}
