//!
//! Process-wide unique identifiers.
//!
//! Cluck needs names that will not collide with anything else published in
//! the network: RPC reply bindings, correlation ids, and the local
//! endpoints that remote subscriptions are delivered to.  Ids are a counter
//! started at a random offset so that two runs of the same program (and two
//! programs on the same network) are very unlikely to hand out the same
//! name.
//!

use std::sync::{
    atomic::{AtomicU64, Ordering},
    OnceLock,
};

/// A generator of unique hexadecimal ids.
#[derive(Debug)]
pub struct UniqueIds {
    /// The next id to hand out
    next: AtomicU64,
}

impl UniqueIds {
    /// Create a new generator starting at the given id
    pub const fn starting_at(start: u64) -> Self {
        Self {
            next: AtomicU64::new(start),
        }
    }

    /// Create a new generator starting at a random 32-bit offset
    pub fn new() -> Self {
        Self::starting_at(u64::from(rand::random::<u32>()))
    }

    /// The generator shared by the whole process
    pub fn global() -> &'static UniqueIds {
        static GLOBAL: OnceLock<UniqueIds> = OnceLock::new();
        GLOBAL.get_or_init(UniqueIds::new)
    }

    /// Get the next raw id
    pub fn next_id(&self) -> u64 {
        self.next.fetch_add(1, Ordering::Relaxed)
    }

    /// Get the next id as a lowercase hexadecimal string
    pub fn next_hex_id(&self) -> String {
        format!("{:x}", self.next_id())
    }

    /// Get the next id formatted as `<prefix>-<hex id>`
    pub fn next_name(&self, prefix: &str) -> String {
        format!("{}-{:x}", prefix, self.next_id())
    }
}

impl Default for UniqueIds {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::{collections::HashSet, sync::Arc, thread};

    #[test]
    fn test_ids_are_sequential() {
        let ids = UniqueIds::starting_at(0xfe);
        assert_eq!(ids.next_hex_id(), "fe");
        assert_eq!(ids.next_hex_id(), "ff");
        assert_eq!(ids.next_name("rpc-endpoint"), "rpc-endpoint-100");
    }

    #[test]
    fn test_ids_are_unique_across_threads() {
        let ids = Arc::new(UniqueIds::new());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let ids = ids.clone();
                thread::spawn(move || (0..250).map(|_| ids.next_id()).collect::<Vec<_>>())
            })
            .collect();

        let mut seen = HashSet::new();
        for handle in handles {
            for id in handle.join().unwrap() {
                assert!(seen.insert(id));
            }
        }
        assert_eq!(seen.len(), 1000);
    }
}
