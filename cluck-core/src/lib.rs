//!
//! Cluck-Core is a collection of traits that layout the core of the
//! Cluck routing framework.
//!
//! Everything that moves through Cluck is a [`Message`] handed from a
//! node to a [`Link`].  Everything a node can publish is described by one
//! of the channel traits in [`channel`], and the generic publisher,
//! subscriber, client and server traits let remote proxies be used the
//! same way as any other communication primitive.
//!

#![deny(unsafe_code)]
#![deny(missing_docs)]

pub mod channel;
pub use channel::{EventInput, EventOutput, Input, LogLevel, LogTarget, Output};

pub mod link;
pub use link::{Link, LinkError, Message};

pub mod publisher_subscriber;
pub use publisher_subscriber::{Publisher, Subscriber};

pub mod client_server;
pub use client_server::{Client, Server};
