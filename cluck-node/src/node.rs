//!
//! The Cluck Node: a process-local routing table.
//!
//! A node owns one flat namespace.  Each name is either a publication (a
//! local [`Endpoint`]) or a [`Link`] to another part of the network.  A
//! destination path such as `robot/drive/speed` is resolved one segment at
//! a time: `robot` is looked up here and, if it is a link, `drive/speed`
//! is handed to the link for the next node to resolve.
//!
//! Delivery to a publication happens synchronously on the calling thread.
//! The routing table is locked only long enough to find the target; no
//! link or endpoint is ever called with the lock held.
//!
//! Broadcasts (`*`) are forwarded over every link except the one they
//! arrived on, so the network of links must be a tree.
//!

use std::{
    collections::{hash_map, HashMap},
    fmt,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Weak,
    },
};

use log::{debug, info, warn};
use parking_lot::Mutex;
use thiserror::Error;

use cluck_core::{Link, LinkError};

use crate::message::{is_negative_ack, RemoteMessage, RemoteType};

/// The destination that addresses every node and publication in the network
pub const BROADCAST: &str = "*";

/// Something published on a node that messages can be delivered to.
pub trait Endpoint: Send + Sync {
    /// The kind reported for this endpoint during remote discovery.
    ///
    /// Endpoints that are plumbing rather than something a user would
    /// subscribe to return `None` and stay hidden.
    fn kind(&self) -> Option<RemoteType>;

    /// Handle a message addressed to this endpoint
    fn receive(&self, node: &Node, source: Option<&str>, payload: &[u8]);

    /// Handle a broadcast message
    fn receive_broadcast(&self, _node: &Node, _source: Option<&str>, _payload: &[u8]) {}
}

/// An error registering something on a node.
#[derive(Debug, Error)]
pub enum NodeError {
    /// The name cannot be used as a single path segment
    #[error("invalid name {0:?}")]
    InvalidName(String),
    /// The name is already a publication or a link
    #[error("name {0:?} is already in use")]
    NameInUse(String),
    /// A link could not be set up
    #[error(transparent)]
    Link(#[from] LinkError),
}

/// Node configuration
#[derive(Clone, Debug, Default)]
pub struct NodeConfig {
    /// Send a negative acknowledgement back to the source of any message
    /// that cannot be routed, so producers can drop subscribers that have
    /// gone away.
    pub nack_on_miss: bool,
}

/// The result of resolving a destination against the routing table.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Route<'a> {
    /// The destination is the node itself
    Node,
    /// The destination is every node and publication
    Broadcast,
    /// The destination is a local publication
    Publication {
        /// The name of the publication
        name: &'a str,
    },
    /// The destination is below a local publication, which is never valid
    /// except for broadcasts
    PublicationSubAddress {
        /// The name of the publication
        name: &'a str,
        /// The remainder of the path
        rest: &'a str,
    },
    /// The destination is reached through a link
    Link {
        /// The name of the link
        name: &'a str,
        /// The path for the next node to resolve
        rest: Option<&'a str>,
    },
    /// Nothing is registered under the first segment of the destination
    Miss {
        /// The first segment of the destination
        base: &'a str,
    },
}

#[derive(Clone)]
enum Entry {
    Publication(Arc<dyn Endpoint>),
    Link(Arc<dyn Link>),
}

struct Shared {
    entries: Mutex<HashMap<String, Entry>>,
    config: NodeConfig,
    misses: AtomicU64,
}

/// A handle to a Cluck node.
///
/// Nodes are cheap to clone and every clone refers to the same routing
/// table.
#[derive(Clone)]
pub struct Node {
    shared: Arc<Shared>,
}

/// A handle to a node that does not keep it alive.
#[derive(Clone)]
pub struct WeakNode {
    shared: Weak<Shared>,
}

impl WeakNode {
    /// Get the node back if it still exists
    pub fn upgrade(&self) -> Option<Node> {
        self.shared.upgrade().map(|shared| Node { shared })
    }
}

impl fmt::Debug for WeakNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("WeakNode")
    }
}

/// Split a path into its first segment and the remainder
pub fn split_path(path: &str) -> (&str, Option<&str>) {
    match path.split_once('/') {
        Some((base, rest)) => (base, Some(rest)),
        None => (path, None),
    }
}

fn same_link(registered: &Arc<dyn Link>, other: &dyn Link) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(registered), other)
}

fn validate_name(name: &str) -> Result<(), NodeError> {
    if name.is_empty() || name == BROADCAST || name.contains('/') {
        Err(NodeError::InvalidName(name.to_owned()))
    } else {
        Ok(())
    }
}

impl Default for Node {
    fn default() -> Self {
        Self::new()
    }
}

impl Node {
    /// Create a new node with the default configuration
    pub fn new() -> Self {
        Self::with_config(NodeConfig::default())
    }

    /// Create a new node with a specific configuration
    pub fn with_config(config: NodeConfig) -> Self {
        Self {
            shared: Arc::new(Shared {
                entries: Mutex::new(HashMap::new()),
                config,
                misses: AtomicU64::new(0),
            }),
        }
    }

    /// Get a handle that does not keep the node alive
    pub fn downgrade(&self) -> WeakNode {
        WeakNode {
            shared: Arc::downgrade(&self.shared),
        }
    }

    /// The configuration the node was created with
    pub fn config(&self) -> &NodeConfig {
        &self.shared.config
    }

    /// Publish an endpoint under `name`
    pub fn publish(&self, name: &str, endpoint: impl Endpoint + 'static) -> Result<(), NodeError> {
        self.publish_shared(name, Arc::new(endpoint))
    }

    /// Publish an already shared endpoint under `name`
    pub fn publish_shared(&self, name: &str, endpoint: Arc<dyn Endpoint>) -> Result<(), NodeError> {
        self.insert(name, Entry::Publication(endpoint))?;
        debug!("Published {}", name);
        Ok(())
    }

    /// Register a link as the root of the subtree `name`
    pub fn add_link(&self, name: &str, link: Arc<dyn Link>) -> Result<(), NodeError> {
        self.insert(name, Entry::Link(link))?;
        debug!("Attached link {}", name);
        Ok(())
    }

    fn insert(&self, name: &str, entry: Entry) -> Result<(), NodeError> {
        validate_name(name)?;
        match self.shared.entries.lock().entry(name.to_owned()) {
            hash_map::Entry::Occupied(_) => Err(NodeError::NameInUse(name.to_owned())),
            hash_map::Entry::Vacant(vacant) => {
                vacant.insert(entry);
                Ok(())
            }
        }
    }

    /// Remove the publication or link registered under `name`
    pub fn remove(&self, name: &str) -> bool {
        self.shared.entries.lock().remove(name).is_some()
    }

    /// Remove the link registered under `name`, but only if it is `link`
    pub fn remove_link(&self, name: &str, link: &dyn Link) -> bool {
        let mut entries = self.shared.entries.lock();
        let matches = matches!(
            entries.get(name),
            Some(Entry::Link(current)) if same_link(current, link)
        );
        if matches {
            entries.remove(name);
        }
        matches
    }

    /// Whether anything is registered under `name`
    pub fn contains(&self, name: &str) -> bool {
        self.shared.entries.lock().contains_key(name)
    }

    /// Whether a link is registered under `name`
    pub fn has_link(&self, name: &str) -> bool {
        matches!(self.shared.entries.lock().get(name), Some(Entry::Link(_)))
    }

    /// Every registered name, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.shared.entries.lock().keys().cloned().collect();
        names.sort();
        names
    }

    /// The number of messages dropped because their destination could not
    /// be resolved
    pub fn routing_misses(&self) -> u64 {
        self.shared.misses.load(Ordering::Relaxed)
    }

    /// Resolve a destination against the current routing table
    pub fn resolve<'a>(&self, destination: Option<&'a str>) -> Route<'a> {
        let Some(destination) = destination else {
            return Route::Node;
        };
        if destination == BROADCAST {
            return Route::Broadcast;
        }
        let (base, rest) = split_path(destination);
        match (self.shared.entries.lock().get(base), rest) {
            (Some(Entry::Link(_)), rest) => Route::Link { name: base, rest },
            (Some(Entry::Publication(_)), None) => Route::Publication { name: base },
            (Some(Entry::Publication(_)), Some(rest)) => Route::PublicationSubAddress { name: base, rest },
            (None, _) => Route::Miss { base },
        }
    }

    /// Send a message from this node
    pub fn transmit(&self, destination: Option<&str>, source: Option<&str>, payload: &[u8]) {
        self.transmit_excluding(destination, source, payload, None)
    }

    /// Send a message from this node, never forwarding it over `exclude`.
    ///
    /// Links call this with themselves as `exclude` when they hand a
    /// received message to their node, so a message cannot echo straight
    /// back to where it came from.
    pub fn transmit_excluding(
        &self,
        destination: Option<&str>,
        source: Option<&str>,
        payload: &[u8],
        exclude: Option<&dyn Link>,
    ) {
        let Some(destination) = destination else {
            if !is_negative_ack(payload) {
                warn!(
                    "Received message addressed to unreceiving node from {}",
                    source.unwrap_or("<anonymous>")
                );
            }
            return;
        };

        if destination == BROADCAST {
            self.broadcast(source, payload, exclude);
            return;
        }

        let (base, rest) = split_path(destination);
        let entry = self.shared.entries.lock().get(base).cloned();
        match entry {
            Some(Entry::Link(link)) => {
                if exclude.is_some_and(|exclude| same_link(&link, exclude)) {
                    debug!("Not echoing message for {} back over its own link", destination);
                } else if let Err(err) = link.send(rest, source, payload) {
                    self.detach(base, &link, err);
                }
            }
            Some(Entry::Publication(endpoint)) => match rest {
                None => self.deliver(base, endpoint.as_ref(), source, payload),
                Some(BROADCAST) => self.deliver_broadcast(base, endpoint.as_ref(), source, payload),
                Some(rest) => warn!(
                    "Received message to invalid sub-address {} of {} from {}",
                    rest,
                    base,
                    source.unwrap_or("<anonymous>")
                ),
            },
            None => self.miss(destination, base, source, payload),
        }
    }

    fn broadcast(&self, source: Option<&str>, payload: &[u8], exclude: Option<&dyn Link>) {
        let entries: Vec<(String, Entry)> = self
            .shared
            .entries
            .lock()
            .iter()
            .map(|(name, entry)| (name.clone(), entry.clone()))
            .collect();

        for (name, entry) in entries {
            match entry {
                Entry::Link(link) => {
                    if exclude.is_some_and(|exclude| same_link(&link, exclude)) {
                        continue;
                    }
                    if let Err(err) = link.send(Some(BROADCAST), source, payload) {
                        self.detach(&name, &link, err);
                    }
                }
                Entry::Publication(endpoint) => {
                    self.deliver_broadcast(&name, endpoint.as_ref(), source, payload)
                }
            }
        }
    }

    fn deliver(&self, name: &str, endpoint: &dyn Endpoint, source: Option<&str>, payload: &[u8]) {
        if payload == [RemoteType::Ping.tag()] {
            self.answer_ping(name, endpoint, source);
        } else {
            endpoint.receive(self, source, payload);
        }
    }

    fn deliver_broadcast(
        &self,
        name: &str,
        endpoint: &dyn Endpoint,
        source: Option<&str>,
        payload: &[u8],
    ) {
        if payload == [RemoteType::Ping.tag()] {
            self.answer_ping(name, endpoint, source);
        } else {
            endpoint.receive_broadcast(self, source, payload);
        }
    }

    fn answer_ping(&self, name: &str, endpoint: &dyn Endpoint, source: Option<&str>) {
        if let (Some(kind), Some(source)) = (endpoint.kind(), source) {
            let answer = RemoteMessage::PingResponse(kind).encode();
            self.transmit(Some(source), Some(name), &answer);
        }
    }

    fn detach(&self, name: &str, link: &Arc<dyn Link>, err: LinkError) {
        if self.remove_link(name, link.as_ref()) {
            info!("Detached link {}: {}", name, err);
        }
    }

    fn miss(&self, destination: &str, base: &str, source: Option<&str>, payload: &[u8]) {
        self.shared.misses.fetch_add(1, Ordering::Relaxed);
        warn!(
            "No link for {} ({}) from {}!",
            destination,
            base,
            source.unwrap_or("<anonymous>")
        );

        if self.shared.config.nack_on_miss && !is_negative_ack(payload) {
            if let Some(source) = source {
                let nack = RemoteMessage::NegativeAck(&[]).encode();
                self.transmit(Some(source), Some(destination), &nack);
            }
        }
    }

    /// Tell every node in the network that the structure of the network
    /// changed, so remote subscriptions get re-established.
    pub fn notify_network_modified(&self) {
        self.transmit(Some(BROADCAST), None, &RemoteMessage::Notify.encode());
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("names", &self.names())
            .field("routing_misses", &self.routing_misses())
            .finish()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    use std::sync::Mutex as StdMutex;

    /// An endpoint that records everything it receives
    #[derive(Default)]
    pub(crate) struct Recorder {
        pub kind: Option<RemoteType>,
        pub received: StdMutex<Vec<(Option<String>, Vec<u8>)>>,
        pub broadcasts: StdMutex<Vec<(Option<String>, Vec<u8>)>>,
    }

    impl Recorder {
        pub fn of_kind(kind: RemoteType) -> Arc<Self> {
            Arc::new(Self {
                kind: Some(kind),
                ..Default::default()
            })
        }

        pub fn received(&self) -> Vec<(Option<String>, Vec<u8>)> {
            self.received.lock().unwrap().clone()
        }
    }

    impl Endpoint for Recorder {
        fn kind(&self) -> Option<RemoteType> {
            self.kind
        }

        fn receive(&self, _node: &Node, source: Option<&str>, payload: &[u8]) {
            self.received
                .lock()
                .unwrap()
                .push((source.map(str::to_owned), payload.to_vec()));
        }

        fn receive_broadcast(&self, _node: &Node, source: Option<&str>, payload: &[u8]) {
            self.broadcasts
                .lock()
                .unwrap()
                .push((source.map(str::to_owned), payload.to_vec()));
        }
    }

    /// A link that records what is sent over it
    #[derive(Default)]
    pub(crate) struct RecordingLink {
        pub closed: bool,
        pub sent: StdMutex<Vec<(Option<String>, Option<String>, Vec<u8>)>>,
    }

    impl Link for RecordingLink {
        fn send(
            &self,
            destination: Option<&str>,
            source: Option<&str>,
            payload: &[u8],
        ) -> Result<(), LinkError> {
            if self.closed {
                return Err(LinkError::Closed);
            }
            self.sent.lock().unwrap().push((
                destination.map(str::to_owned),
                source.map(str::to_owned),
                payload.to_vec(),
            ));
            Ok(())
        }
    }

    #[test]
    fn test_publish_and_deliver_locally() {
        let node = Node::new();
        let recorder = Recorder::of_kind(RemoteType::BooleanOutput);
        node.publish_shared("light", recorder.clone()).unwrap();

        node.transmit(Some("light"), Some("driver"), &[6, 1]);
        assert_eq!(
            recorder.received(),
            vec![(Some(String::from("driver")), vec![6, 1])]
        );
    }

    #[test]
    fn test_names_share_one_namespace() {
        let node = Node::new();
        node.publish_shared("a", Recorder::of_kind(RemoteType::EventOutput))
            .unwrap();
        assert!(matches!(
            node.add_link("a", Arc::new(RecordingLink::default())),
            Err(NodeError::NameInUse(_))
        ));
        assert!(matches!(
            node.publish_shared("b/c", Arc::new(Recorder::default())),
            Err(NodeError::InvalidName(_))
        ));
        assert!(matches!(
            node.publish_shared("*", Arc::new(Recorder::default())),
            Err(NodeError::InvalidName(_))
        ));
        assert_eq!(node.names(), vec![String::from("a")]);
    }

    #[test]
    fn test_forward_strips_first_segment() {
        let node = Node::new();
        let link = Arc::new(RecordingLink::default());
        node.add_link("robot", link.clone()).unwrap();

        node.transmit(Some("robot/drive/speed"), Some("ui"), &[9, 0, 0, 0, 0]);
        node.transmit(Some("robot"), None, &[13]);
        assert_eq!(
            *link.sent.lock().unwrap(),
            vec![
                (
                    Some(String::from("drive/speed")),
                    Some(String::from("ui")),
                    vec![9, 0, 0, 0, 0]
                ),
                (None, None, vec![13]),
            ]
        );
    }

    #[test]
    fn test_excluded_link_is_not_echoed() {
        let node = Node::new();
        let link = Arc::new(RecordingLink::default());
        node.add_link("robot", link.clone()).unwrap();

        let exclude: &dyn Link = &*link;
        node.transmit_excluding(Some("robot/x"), None, &[1], Some(exclude));
        node.transmit_excluding(Some(BROADCAST), None, &[13], Some(exclude));
        assert!(link.sent.lock().unwrap().is_empty());
    }

    #[test]
    fn test_closed_link_is_detached() {
        let node = Node::new();
        node.add_link(
            "gone",
            Arc::new(RecordingLink {
                closed: true,
                ..Default::default()
            }),
        )
        .unwrap();

        node.transmit(Some("gone/x"), None, &[1]);
        assert!(!node.contains("gone"));
    }

    #[test]
    fn test_resolution_is_deterministic() {
        let node = Node::new();
        node.add_link("robot", Arc::new(RecordingLink::default()))
            .unwrap();
        node.publish_shared("light", Arc::new(Recorder::default()))
            .unwrap();

        for _ in 0..2 {
            assert_eq!(
                node.resolve(Some("robot/a/b")),
                Route::Link {
                    name: "robot",
                    rest: Some("a/b")
                }
            );
            assert_eq!(node.resolve(Some("light")), Route::Publication { name: "light" });
            assert_eq!(
                node.resolve(Some("light/x")),
                Route::PublicationSubAddress {
                    name: "light",
                    rest: "x"
                }
            );
            assert_eq!(node.resolve(Some("nowhere/x")), Route::Miss { base: "nowhere" });
            assert_eq!(node.resolve(None), Route::Node);
            assert_eq!(node.resolve(Some("*")), Route::Broadcast);
        }
    }

    #[test]
    fn test_miss_is_counted_and_never_delivered() {
        let node = Node::new();
        let recorder = Arc::new(Recorder::default());
        node.publish_shared("light", recorder.clone()).unwrap();

        node.transmit(Some("lights"), Some("ui"), &[6, 1]);
        node.transmit(Some("light/sub"), Some("ui"), &[6, 1]);
        assert_eq!(node.routing_misses(), 1);
        assert!(recorder.received().is_empty());
    }

    #[test]
    fn test_nack_on_miss() {
        let node = Node::with_config(NodeConfig { nack_on_miss: true });
        let recorder = Arc::new(Recorder::default());
        node.publish_shared("producer", recorder.clone()).unwrap();

        node.transmit(Some("subscriber-gone"), Some("producer"), &[5, 1]);
        assert_eq!(
            recorder.received(),
            vec![(Some(String::from("subscriber-gone")), vec![16])]
        );
    }

    #[test]
    fn test_ping_is_answered_for_publications() {
        let node = Node::new();
        let searcher = Arc::new(Recorder::default());
        node.publish_shared("searcher", searcher.clone()).unwrap();
        node.publish_shared("light", Recorder::of_kind(RemoteType::BooleanOutput))
            .unwrap();

        node.transmit(Some(BROADCAST), Some("searcher"), &[RemoteType::Ping.tag()]);
        assert_eq!(
            searcher.received(),
            vec![(
                Some(String::from("light")),
                vec![0, RemoteType::BooleanOutput.tag()]
            )]
        );
    }

    #[test]
    fn test_broadcast_reaches_links_and_publications() {
        let node = Node::new();
        let link = Arc::new(RecordingLink::default());
        let recorder = Arc::new(Recorder::default());
        node.add_link("robot", link.clone()).unwrap();
        node.publish_shared("light", recorder.clone()).unwrap();

        node.notify_network_modified();
        assert_eq!(
            *link.sent.lock().unwrap(),
            vec![(Some(String::from("*")), None, vec![13])]
        );
        assert_eq!(*recorder.broadcasts.lock().unwrap(), vec![(None, vec![13])]);
    }
}
