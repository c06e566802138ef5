//!
//! The TCP server.
//!
//! A [`TcpServer`] accepts Cluck clients and serves each one on a thread
//! pool.  Every accepted client becomes a link on the node named
//! `<server_link_prefix>-<hex id>`.
//!

use std::{
    collections::HashMap,
    io,
    net::{Shutdown, SocketAddr, TcpListener, TcpStream, ToSocketAddrs},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread::{self, JoinHandle},
};

use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};
use log::{debug, info, warn};
use parking_lot::Mutex;
use threadpool::ThreadPool;

use cluck_node::Node;

use crate::{config::TcpConfig, error::TransportError, worker};

/// The sockets of the connections being served
#[derive(Default)]
pub(crate) struct Connections {
    streams: Mutex<HashMap<u64, TcpStream>>,
    next_id: Mutex<u64>,
    closing: AtomicBool,
}

impl Connections {
    fn insert(&self, stream: &TcpStream) -> Result<u64, TransportError> {
        let mut streams = self.streams.lock();
        if self.closing.load(Ordering::Acquire) {
            return Err(TransportError::Closed);
        }
        let id = {
            let mut next_id = self.next_id.lock();
            *next_id += 1;
            *next_id
        };
        streams.insert(id, stream.try_clone()?);
        Ok(id)
    }

    pub(crate) fn remove(&self, id: u64) {
        self.streams.lock().remove(&id);
    }

    pub(crate) fn is_closing(&self) -> bool {
        self.closing.load(Ordering::Acquire)
    }

    fn len(&self) -> usize {
        self.streams.lock().len()
    }

    fn close_all(&self) {
        let streams: Vec<TcpStream> = {
            let mut streams = self.streams.lock();
            self.closing.store(true, Ordering::Release);
            streams.drain().map(|(_, stream)| stream).collect()
        };
        for stream in streams {
            let _ = stream.shutdown(Shutdown::Both);
        }
    }
}

/// A server that links accepted Cluck clients into a node.
pub struct TcpServer {
    local_addr: SocketAddr,
    connections: Arc<Connections>,
    stop: Option<Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl TcpServer {
    /// Listen on `address` and start accepting clients onto `node`
    pub fn bind<A: ToSocketAddrs>(
        node: &Node,
        address: A,
        config: TcpConfig,
    ) -> Result<Self, TransportError> {
        let listener = TcpListener::bind(address)?;
        listener.set_nonblocking(true)?;
        let local_addr = listener.local_addr()?;
        let connections = Arc::new(Connections::default());
        let (stop, stopped) = channel::bounded(0);

        let acceptor = Acceptor {
            node: node.clone(),
            listener,
            pool: ThreadPool::with_name(
                String::from("cluck-tcp-worker"),
                config.max_connections.max(1),
            ),
            config,
            connections: connections.clone(),
            stopped,
        };
        let thread = thread::Builder::new()
            .name(String::from("cluck-tcp-server"))
            .spawn(move || acceptor.run())?;
        info!("Listening for Cluck clients on {}", local_addr);

        Ok(Self {
            local_addr,
            connections,
            stop: Some(stop),
            thread: Some(thread),
        })
    }

    /// The address the server is listening on
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// The number of clients currently connected
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Stop accepting clients and disconnect the connected ones
    pub fn shutdown(&mut self) {
        self.stop.take();
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                warn!("Server thread for {} panicked", self.local_addr);
            }
        }
    }
}

impl Drop for TcpServer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

struct Acceptor {
    node: Node,
    listener: TcpListener,
    pool: ThreadPool,
    config: TcpConfig,
    connections: Arc<Connections>,
    stopped: Receiver<()>,
}

impl Acceptor {
    fn run(self) {
        loop {
            if !matches!(self.stopped.try_recv(), Err(TryRecvError::Empty)) {
                break;
            }

            match self.listener.accept() {
                Ok((stream, peer)) => self.accept(stream, peer),
                Err(err) => {
                    if err.kind() != io::ErrorKind::WouldBlock {
                        warn!("Failed to accept a client: {}", err);
                    }
                    match self.stopped.recv_timeout(self.config.accept_poll_interval) {
                        Err(RecvTimeoutError::Timeout) => {}
                        _ => break,
                    }
                }
            }
        }

        self.connections.close_all();
        self.pool.join();
        debug!("Server stopped");
    }

    fn accept(&self, stream: TcpStream, peer: SocketAddr) {
        if self.connections.len() >= self.config.max_connections {
            warn!("Refusing {}: already serving {} clients", peer, self.config.max_connections);
            let _ = stream.shutdown(Shutdown::Both);
            return;
        }

        let id = match stream
            .set_nonblocking(false)
            .map_err(TransportError::from)
            .and_then(|()| self.connections.insert(&stream))
        {
            Ok(id) => id,
            Err(err) => {
                err.report(&format!("Accepting {peer}"));
                return;
            }
        };

        let node = self.node.clone();
        let config = self.config.clone();
        let connections = self.connections.clone();
        self.pool
            .execute(move || worker::serve(node, stream, config, connections, id));
    }
}
