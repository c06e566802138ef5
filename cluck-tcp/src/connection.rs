//!
//! A single established connection.
//!
//! The thread that owns a [`Connection`] reads frames and routes them into
//! the node.  A writer thread drains the link's send queue onto the socket
//! and fills idle periods with keep-alives.  Dropping the connection
//! detaches its link and stops the writer.
//!

use std::{
    io::BufReader,
    net::{Shutdown, TcpStream},
    sync::Arc,
    thread::{self, JoinHandle},
    time::Duration,
};

use crossbeam::channel::{self, Receiver, RecvTimeoutError};
use log::{debug, info, warn};

use cluck_core::{link::prefix_source, Link, Message};
use cluck_node::Node;

use crate::{
    config::TcpConfig,
    error::TransportError,
    link::TcpLink,
    protocol::{is_keepalive, keepalive, FrameCodec},
};

/// Tracks whether the peer sends keep-alives.
///
/// Peers that never send keep-alives are never timed out.  Once the first
/// one arrives the peer is expected to keep sending them, and that
/// expectation is never dropped again.
#[derive(Clone, Copy, Debug)]
pub struct KeepAliveMonitor {
    timeout_period: Duration,
    active: bool,
}

impl KeepAliveMonitor {
    /// Create a monitor that allows `timeout_period` of silence once active
    pub fn new(timeout_period: Duration) -> Self {
        Self {
            timeout_period,
            active: false,
        }
    }

    /// Whether silence is being enforced
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Record a keep-alive.  Returns the read timeout to start enforcing
    /// when this is the first one.
    pub fn keepalive_received(&mut self) -> Option<Duration> {
        if self.active {
            None
        } else {
            self.active = true;
            Some(self.timeout_period)
        }
    }
}

pub(crate) struct Connection {
    node: Node,
    link_name: String,
    link: Option<Arc<TcpLink>>,
    stream: TcpStream,
    reader: BufReader<TcpStream>,
    codec: FrameCodec,
    monitor: KeepAliveMonitor,
    writer: Option<JoinHandle<()>>,
}

impl Connection {
    /// Register `stream` on `node` as the link `link_name` and start its
    /// writer.  The handshake must already be done.
    pub(crate) fn open(
        node: &Node,
        link_name: &str,
        stream: TcpStream,
        config: &TcpConfig,
    ) -> Result<Self, TransportError> {
        stream.set_nodelay(config.nodelay)?;
        stream.set_read_timeout(None)?;
        let reader = BufReader::new(stream.try_clone()?);
        let write_stream = stream.try_clone()?;
        let codec = FrameCodec::new(config.max_message_size);

        let (tx, rx) = channel::bounded(config.send_queue_size);
        let link = Arc::new(TcpLink::new(link_name, tx));
        node.add_link(link_name, link.clone())?;

        let keepalive_interval = config.keepalive_interval;
        let name = link_name.to_owned();
        let writer = thread::Builder::new()
            .name(format!("cluck-tcp-writer-{link_name}"))
            .spawn(move || write_loop(&name, write_stream, rx, codec, keepalive_interval));
        let writer = match writer {
            Ok(writer) => writer,
            Err(err) => {
                node.remove_link(link_name, &*link);
                return Err(err.into());
            }
        };
        info!("Connected link {} to {:?}", link_name, stream.peer_addr().ok());

        Ok(Self {
            node: node.clone(),
            link_name: link_name.to_owned(),
            link: Some(link),
            stream,
            reader,
            codec,
            monitor: KeepAliveMonitor::new(config.timeout_period),
            writer: Some(writer),
        })
    }

    /// Route incoming frames into the node until the connection fails
    pub(crate) fn run(&mut self) -> TransportError {
        loop {
            if let Err(err) = self.receive() {
                return err;
            }
        }
    }

    fn receive(&mut self) -> Result<(), TransportError> {
        let message = self.codec.read(&mut self.reader)?;
        if is_keepalive(&message) {
            if let Some(timeout) = self.monitor.keepalive_received() {
                debug!("Link {} sends keep-alives, enforcing {:?}", self.link_name, timeout);
                self.stream.set_read_timeout(Some(timeout))?;
            }
            return Ok(());
        }

        let Some(link) = self.link.as_ref() else {
            return Err(TransportError::Closed);
        };
        let Message {
            destination,
            source,
            payload,
        } = message;
        let source = prefix_source(&self.link_name, source.as_deref());
        self.node.transmit_excluding(
            destination.as_deref(),
            Some(&source),
            &payload,
            Some(&**link as &dyn Link),
        );
        Ok(())
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        if let Some(link) = self.link.take() {
            self.node.remove_link(&self.link_name, &*link);
        }
        let _ = self.stream.shutdown(Shutdown::Both);
        if let Some(writer) = self.writer.take() {
            if writer.join().is_err() {
                warn!("Writer for link {} panicked", self.link_name);
            }
        }
        info!("Disconnected link {}", self.link_name);
    }
}

fn write_loop(
    name: &str,
    mut stream: TcpStream,
    queue: Receiver<Message>,
    codec: FrameCodec,
    keepalive_interval: Duration,
) {
    let keepalive = keepalive();
    loop {
        let result = match queue.recv_timeout(keepalive_interval) {
            Ok(message) => codec.write(&mut stream, &message),
            Err(RecvTimeoutError::Timeout) => codec.write(&mut stream, &keepalive),
            Err(RecvTimeoutError::Disconnected) => break,
        };

        match result {
            Ok(()) => {}
            Err(err @ TransportError::FrameTooLarge { .. }) => {
                warn!("Dropping message on link {}: {}", name, err)
            }
            Err(err) => {
                err.report(&format!("Writer for link {name}"));
                break;
            }
        }
    }
    let _ = stream.shutdown(Shutdown::Both);
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::{
        io::Write,
        net::TcpListener,
        sync::Mutex,
        time::Instant,
    };

    use cluck_node::{Endpoint, RemoteType};

    #[test]
    fn test_keepalive_activation_is_one_way() {
        let mut monitor = KeepAliveMonitor::new(Duration::from_millis(600));
        assert!(!monitor.is_active());
        assert_eq!(monitor.keepalive_received(), Some(Duration::from_millis(600)));
        assert!(monitor.is_active());
        for _ in 0..3 {
            assert_eq!(monitor.keepalive_received(), None);
            assert!(monitor.is_active());
        }
    }

    struct Collector(Mutex<Vec<(Option<String>, Vec<u8>)>>);

    impl Endpoint for Collector {
        fn kind(&self) -> Option<RemoteType> {
            None
        }

        fn receive(&self, _node: &Node, source: Option<&str>, payload: &[u8]) {
            self.0
                .lock()
                .unwrap()
                .push((source.map(str::to_owned), payload.to_vec()));
        }
    }

    fn pair() -> (TcpStream, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let client = TcpStream::connect(listener.local_addr().unwrap()).unwrap();
        let (server, _) = listener.accept().unwrap();
        (client, server)
    }

    #[test]
    fn test_connection_routes_frames_and_writes_keepalives() {
        let _ = env_logger::builder().is_test(true).try_init();
        let (mut peer, local) = pair();
        let node = Node::new();
        let collector = Arc::new(Collector(Mutex::new(Vec::new())));
        node.publish_shared("sink", collector.clone()).unwrap();

        let config = TcpConfig {
            keepalive_interval: Duration::from_millis(20),
            ..Default::default()
        };
        let codec = FrameCodec::new(config.max_message_size);
        let mut connection = Connection::open(&node, "peer", local, &config).unwrap();
        assert!(node.has_link("peer"));

        codec
            .write(&mut peer, &Message::new(Some("sink"), Some("sender"), &[6, 1]))
            .unwrap();
        peer.shutdown(Shutdown::Write).unwrap();
        assert!(connection.run().is_expected_disconnect());
        assert_eq!(
            *collector.0.lock().unwrap(),
            vec![(Some(String::from("peer/sender")), vec![6, 1])]
        );

        let message = codec.read(&mut peer).unwrap();
        assert!(is_keepalive(&message));

        drop(connection);
        assert!(!node.has_link("peer"));
    }

    #[test]
    fn test_silent_peer_times_out_after_first_keepalive() {
        let _ = env_logger::builder().is_test(true).try_init();
        let (mut peer, local) = pair();
        let node = Node::new();
        let config = TcpConfig {
            timeout_period: Duration::from_millis(100),
            ..Default::default()
        };
        let codec = FrameCodec::new(config.max_message_size);
        let mut connection = Connection::open(&node, "peer", local, &config).unwrap();

        codec.write(&mut peer, &keepalive()).unwrap();
        peer.flush().unwrap();
        let start = Instant::now();
        assert!(matches!(connection.run(), TransportError::TimedOut));
        assert!(start.elapsed() >= Duration::from_millis(100));
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn test_peer_without_keepalives_is_never_timed_out() {
        let _ = env_logger::builder().is_test(true).try_init();
        let (mut peer, local) = pair();
        let node = Node::new();
        let collector = Arc::new(Collector(Mutex::new(Vec::new())));
        node.publish_shared("sink", collector.clone()).unwrap();
        let config = TcpConfig {
            timeout_period: Duration::from_millis(50),
            ..Default::default()
        };
        let codec = FrameCodec::new(config.max_message_size);
        let mut connection = Connection::open(&node, "peer", local, &config).unwrap();

        let sender = thread::spawn(move || {
            thread::sleep(Duration::from_millis(200));
            codec
                .write(&mut peer, &Message::new(Some("sink"), Some("sender"), &[6, 0]))
                .unwrap();
            peer.shutdown(Shutdown::Write).unwrap();
            peer
        });

        let start = Instant::now();
        let err = connection.run();
        assert!(!matches!(err, TransportError::TimedOut));
        assert!(err.is_expected_disconnect());
        assert!(start.elapsed() >= Duration::from_millis(200));
        assert_eq!(
            *collector.0.lock().unwrap(),
            vec![(Some(String::from("peer/sender")), vec![6, 0])]
        );
        drop(sender.join().unwrap());
    }
}
