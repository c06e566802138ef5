//!
//! In-process Links
//!
//! A pair of [`LocalLink`]s joins two nodes in the same process.  Sending
//! over one half hands the message straight to the other half's node on
//! the calling thread, so delivery through any chain of local links is
//! synchronous.
//!

use std::sync::{Arc, OnceLock, Weak};

use cluck_core::{link::prefix_source, Link, LinkError};

use crate::node::{Node, NodeError, WeakNode};

struct Peer {
    node: WeakNode,
    name: String,
    link: Weak<LocalLink>,
}

/// One half of an in-process link between two nodes.
#[derive(Default)]
pub struct LocalLink {
    peer: OnceLock<Peer>,
}

impl LocalLink {
    /// Create an unpaired link
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Pair this link with `link`, the half registered on `node` under
    /// `name`.  A link can only ever be paired once.
    pub fn pair(&self, node: &Node, name: &str, link: &Arc<LocalLink>) -> Result<(), LinkError> {
        self.peer
            .set(Peer {
                node: node.downgrade(),
                name: name.to_owned(),
                link: Arc::downgrade(link),
            })
            .map_err(|_| LinkError::AlreadyPaired)
    }

    /// Whether this link has been paired
    pub fn is_paired(&self) -> bool {
        self.peer.get().is_some()
    }
}

impl Link for LocalLink {
    fn send(
        &self,
        destination: Option<&str>,
        source: Option<&str>,
        payload: &[u8],
    ) -> Result<(), LinkError> {
        let peer = self.peer.get().ok_or(LinkError::Closed)?;
        let node = peer.node.upgrade().ok_or(LinkError::Closed)?;
        let link = peer.link.upgrade().ok_or(LinkError::Closed)?;

        let source = prefix_source(&peer.name, source);
        node.transmit_excluding(destination, Some(&source), payload, Some(&*link as &dyn Link));
        Ok(())
    }
}

/// Join `a` and `b` with a pair of local links.
///
/// `b` becomes reachable from `a` under `name_in_a` and `a` from `b` under
/// `name_in_b`.  If either name cannot be registered nothing is left
/// behind.
pub fn connect(
    a: &Node,
    name_in_a: &str,
    b: &Node,
    name_in_b: &str,
) -> Result<(Arc<LocalLink>, Arc<LocalLink>), NodeError> {
    let link_a = LocalLink::new();
    let link_b = LocalLink::new();
    link_a.pair(b, name_in_b, &link_b)?;
    link_b.pair(a, name_in_a, &link_a)?;

    a.add_link(name_in_a, link_a.clone())?;
    if let Err(err) = b.add_link(name_in_b, link_b.clone()) {
        a.remove_link(name_in_a, &*link_a);
        return Err(err);
    }
    Ok((link_a, link_b))
}
