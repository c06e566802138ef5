//!
//! The TCP client.
//!
//! A [`TcpClient`] keeps one link on a node connected to a remote server.
//! Whenever the connection fails it is torn down and retried after the
//! configured reconnect delay, until the client is shut down.
//!

use std::{
    net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread::{self, JoinHandle},
    time::Duration,
};

use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender};
use log::{debug, info, warn};
use parking_lot::Mutex;

use cluck_node::Node;

use crate::{
    config::TcpConfig, connection::Connection, error::TransportError,
    protocol::client_handshake,
};

// State shared between the client handle and its connection thread
#[derive(Default)]
struct ClientState {
    stopping: AtomicBool,
    connected: AtomicBool,
    last_error: Mutex<Option<Arc<TransportError>>>,
    // A handle on the live socket so shutdown can interrupt a blocked read
    stream: Mutex<Option<TcpStream>>,
}

impl ClientState {
    fn track(&self, stream: &TcpStream) -> Result<(), TransportError> {
        let mut slot = self.stream.lock();
        if self.stopping.load(Ordering::Acquire) {
            return Err(TransportError::Closed);
        }
        *slot = Some(stream.try_clone()?);
        Ok(())
    }

    fn fail(&self, err: TransportError) {
        *self.last_error.lock() = Some(Arc::new(err));
    }

    fn untrack(&self) {
        self.stream.lock().take();
    }

    fn interrupt(&self) {
        let stream = {
            let mut slot = self.stream.lock();
            self.stopping.store(true, Ordering::Release);
            slot.take()
        };
        if let Some(stream) = stream {
            let _ = stream.shutdown(Shutdown::Both);
        }
    }
}

/// A link kept connected to a remote Cluck server.
pub struct TcpClient {
    link_name: String,
    state: Arc<ClientState>,
    stop: Option<Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl TcpClient {
    /// Start connecting `node` to the server at `address`.  The server's
    /// node is reachable under `link_name` while connected.
    pub fn start(
        node: &Node,
        link_name: &str,
        address: &str,
        config: TcpConfig,
    ) -> Result<Self, TransportError> {
        let state = Arc::new(ClientState::default());
        let (stop, stopped) = channel::bounded(0);

        let worker = Worker {
            node: node.clone(),
            link_name: link_name.to_owned(),
            address: address.to_owned(),
            config,
            state: state.clone(),
            stopped,
        };
        let thread = thread::Builder::new()
            .name(format!("cluck-tcp-client-{link_name}"))
            .spawn(move || worker.run())?;

        Ok(Self {
            link_name: link_name.to_owned(),
            state,
            stop: Some(stop),
            thread: Some(thread),
        })
    }

    /// The name the server's node is reachable under
    pub fn link_name(&self) -> &str {
        &self.link_name
    }

    /// Whether the connection is currently established
    pub fn is_connected(&self) -> bool {
        self.state.connected.load(Ordering::Acquire)
    }

    /// Why the last connection attempt or connection ended, cleared once a
    /// connection is established
    pub fn last_error(&self) -> Option<Arc<TransportError>> {
        self.state.last_error.lock().clone()
    }

    /// Disconnect and stop reconnecting
    pub fn shutdown(&mut self) {
        self.stop.take();
        self.state.interrupt();
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                warn!("Client thread for {} panicked", self.link_name);
            }
        }
    }
}

impl Drop for TcpClient {
    fn drop(&mut self) {
        self.shutdown();
    }
}

struct Worker {
    node: Node,
    link_name: String,
    address: String,
    config: TcpConfig,
    state: Arc<ClientState>,
    stopped: Receiver<()>,
}

impl Worker {
    fn run(self) {
        let mut delay = self.config.reconnect_delay;
        while !self.state.stopping.load(Ordering::Acquire) {
            match self.connect() {
                Ok(stream) => {
                    delay = self.config.reconnect_delay;
                    if let Err(err) = self.serve(stream) {
                        err.report(&format!("Connection {} to {}", self.link_name, self.address));
                        self.state.fail(err);
                    }
                }
                Err(err) => {
                    if err.is_protocol_violation() {
                        err.report(&format!("Connecting {} to {}", self.link_name, self.address));
                    } else {
                        debug!(
                            "Could not connect {} to {}: {}",
                            self.link_name, self.address, err
                        );
                    }
                    self.state.fail(err);
                }
            }

            match self.stopped.recv_timeout(delay) {
                Err(RecvTimeoutError::Timeout) => {}
                _ => break,
            }
            delay = self.config.next_reconnect_delay(delay);
        }
        debug!("Client {} stopped", self.link_name);
    }

    fn connect(&self) -> Result<TcpStream, TransportError> {
        let addresses: Vec<SocketAddr> = self.address.to_socket_addrs()?.collect();
        let mut last_error = None;
        for address in addresses {
            match self.connect_to(&address) {
                Ok(stream) => return Ok(stream),
                Err(err) => last_error = Some(err),
            }
        }
        Err(last_error.unwrap_or(TransportError::Closed))
    }

    fn connect_to(&self, address: &SocketAddr) -> Result<TcpStream, TransportError> {
        let mut stream = TcpStream::connect_timeout(address, self.config.connect_timeout)?;
        self.state.track(&stream)?;
        stream.set_read_timeout(Some(self.config.connect_timeout))?;
        stream.set_write_timeout(Some(self.config.connect_timeout))?;
        if let Err(err) = client_handshake(&mut stream) {
            self.state.untrack();
            return Err(err);
        }
        stream.set_write_timeout(None::<Duration>)?;
        Ok(stream)
    }

    fn serve(&self, stream: TcpStream) -> Result<(), TransportError> {
        let result = Connection::open(&self.node, &self.link_name, stream, &self.config);
        let mut connection = match result {
            Ok(connection) => connection,
            Err(err) => {
                self.state.untrack();
                return Err(err);
            }
        };
        self.state.last_error.lock().take();
        self.state.connected.store(true, Ordering::Release);
        info!("Client {} connected to {}", self.link_name, self.address);
        self.node.notify_network_modified();

        let err = connection.run();
        self.state.connected.store(false, Ordering::Release);
        drop(connection);
        self.state.untrack();

        if self.state.stopping.load(Ordering::Acquire) {
            Ok(())
        } else {
            Err(err)
        }
    }
}
