//!
//! Cluck TCP Transport
//!
//! Links Cluck nodes in different processes over TCP.  A [`TcpServer`]
//! accepts any number of clients onto its node and a [`TcpClient`] keeps a
//! single link connected to a server, reconnecting whenever the connection
//! drops.
//!
//! ```no_run
//! use cluck_node::Node;
//! use cluck_tcp::{TcpClient, TcpConfig, TcpServer};
//!
//! let robot = Node::new();
//! let _server = TcpServer::bind(&robot, "0.0.0.0:5800", TcpConfig::default()).unwrap();
//!
//! let driver = Node::new();
//! let _client = TcpClient::start(&driver, "robot", "10.0.0.2:5800", TcpConfig::default()).unwrap();
//! ```
//!

#![deny(missing_docs)]

pub mod config;
pub use config::TcpConfig;

pub mod error;
pub use error::TransportError;

pub mod protocol;
pub use protocol::FrameCodec;

pub mod link;
pub use link::TcpLink;

pub mod connection;
pub use connection::KeepAliveMonitor;

pub mod client;
pub use client::TcpClient;

pub mod server;
pub use server::TcpServer;

mod worker;
