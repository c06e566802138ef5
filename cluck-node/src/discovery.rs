//!
//! Remote Discovery and Structure Notifications
//!
//! A search broadcasts a ping from a local endpoint.  Every publication
//! that hears it answers with its kind, and the search endpoint reports
//! each path it hears from once.
//!

use std::{
    collections::{hash_map, HashMap},
    time::{Duration, Instant},
};

use crossbeam::channel;
use log::{debug, warn};
use parking_lot::Mutex;

use cluck_utils::UniqueIds;

use crate::{
    message::{RemoteMessage, RemoteType},
    node::{Endpoint, Node, NodeError, BROADCAST},
    publish::decode_or_warn,
};

type SearchListener = Box<dyn Fn(&str, RemoteType) + Send + Sync>;

struct SearchEndpoint {
    name: String,
    found: Mutex<HashMap<String, RemoteType>>,
    listener: SearchListener,
}

impl SearchEndpoint {
    fn report(&self, path: &str, kind: RemoteType) {
        match self.found.lock().entry(path.to_owned()) {
            hash_map::Entry::Vacant(vacant) => {
                vacant.insert(kind);
            }
            hash_map::Entry::Occupied(occupied) => {
                if *occupied.get() != kind {
                    warn!(
                        "Remote {} reported as both {} and {}, keeping {}",
                        path,
                        occupied.get(),
                        kind,
                        occupied.get()
                    );
                }
                return;
            }
        }
        (self.listener)(path, kind);
    }
}

impl Endpoint for SearchEndpoint {
    fn kind(&self) -> Option<RemoteType> {
        None
    }

    fn receive(&self, _node: &Node, source: Option<&str>, payload: &[u8]) {
        match (decode_or_warn(&self.name, source, payload), source) {
            (Some(RemoteMessage::PingResponse(kind)), Some(path)) => self.report(path, kind),
            (Some(message), _) => warn!(
                "Received wrong message type {} to search {} from {}",
                message.kind(),
                self.name,
                source.unwrap_or("<anonymous>")
            ),
            (None, _) => {}
        }
    }
}

struct NotifyEndpoint<F> {
    listener: F,
}

impl<F: Fn() + Send + Sync> Endpoint for NotifyEndpoint<F> {
    fn kind(&self) -> Option<RemoteType> {
        None
    }

    fn receive(&self, _node: &Node, _source: Option<&str>, payload: &[u8]) {
        if let Ok(RemoteMessage::Notify) = RemoteMessage::decode(payload) {
            (self.listener)();
        }
    }

    fn receive_broadcast(&self, _node: &Node, _source: Option<&str>, payload: &[u8]) {
        if let Ok(RemoteMessage::Notify) = RemoteMessage::decode(payload) {
            (self.listener)();
        }
    }
}

impl Node {
    /// Call `listener` every time the structure of the network changes
    pub fn subscribe_to_structure_notifications(
        &self,
        local_name: &str,
        listener: impl Fn() + Send + Sync + 'static,
    ) -> Result<(), NodeError> {
        self.publish(local_name, NotifyEndpoint { listener })
    }

    /// Start looking for every publication in the network.
    ///
    /// `listener` is called once per path with the kind of the publication
    /// found there.  Searching again from the same `local_name` pings the
    /// network again without reporting known paths twice.
    pub fn start_search_remotes(
        &self,
        local_name: &str,
        listener: impl Fn(&str, RemoteType) + Send + Sync + 'static,
    ) -> Result<(), NodeError> {
        let endpoint = SearchEndpoint {
            name: local_name.to_owned(),
            found: Mutex::new(HashMap::new()),
            listener: Box::new(listener),
        };
        match self.publish(local_name, endpoint) {
            Ok(()) => {}
            Err(NodeError::NameInUse(_)) => debug!("Repeating search from {}", local_name),
            Err(err) => return Err(err),
        }
        self.transmit(Some(BROADCAST), Some(local_name), &RemoteMessage::Ping.encode());
        Ok(())
    }

    /// Search the network for `timeout` and return every publication
    /// found, in the order the answers arrived.
    pub fn search_remotes(&self, timeout: Duration) -> Result<Vec<(String, RemoteType)>, NodeError> {
        let local_name = UniqueIds::global().next_name("search");
        let (tx, rx) = channel::unbounded();
        self.start_search_remotes(&local_name, move |path, kind| {
            let _ = tx.send((path.to_owned(), kind));
        })?;

        let deadline = Instant::now() + timeout;
        let mut found = Vec::new();
        while let Ok(remote) = rx.recv_deadline(deadline) {
            found.push(remote);
        }
        self.remove(&local_name);
        Ok(found)
    }
}
