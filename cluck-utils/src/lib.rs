//!
//! Utilities for Cluck
//!
//! The main usage of this crate is for helpers that don't really fit in
//! any of the other Cluck crates, but are still needed by all of them:
//! network byte order packing and unique name generation.
//!

#![deny(missing_docs)]

pub mod packing;
pub use packing::{Packable, PackingError};

pub mod unique_ids;
pub use unique_ids::UniqueIds;
