//!
//! # Cluck
//!
//! Cluck connects the pieces of a robot's control software.  Every process
//! runs a node, publishes its inputs, outputs, events, log targets and
//! procedures on that node under a name, and links the node to other nodes.
//! Everything published anywhere in the resulting tree can then be used by
//! path, for example `robot/drive/speed`, as if it were local.
//!
//! ## Nodes and Links
//!
//! A [`Node`](node::Node) routes messages by the first segment of their
//! destination: either to something published on the node or to a link
//! leading to another node.  Links are either in-process
//! ([`local::connect`](node::local::connect)) or TCP connections
//! ([`TcpServer`](tcp::TcpServer) and [`TcpClient`](tcp::TcpClient)).
//!
//! ## Remote Channels
//!
//! Subscribing to a path returns a proxy that behaves like the remote
//! channel: setting a remote output sends the value to the node that
//! published it, and a remote input keeps its latest value up to date by
//! subscribing with the publishing node.
//!
//! ## Remote Procedure Calls
//!
//! Procedures are published through an [`RpcManager`](rpc::RpcManager)
//! and called by path with a deadline.  A reply is delivered at most once
//! and never after its call has timed out.
//!
//! ```no_run
//! use std::time::Duration;
//!
//! use cluck::prelude::*;
//!
//! let driver = Node::new();
//! let _robot = TcpClient::start(&driver, "robot", "10.0.0.2:5800", TcpConfig::default()).unwrap();
//!
//! driver.subscribe_output::<bool>("robot/light").set(true);
//!
//! let rpc = RpcManager::new(&driver, RpcConfig::default()).unwrap();
//! let status = rpc.subscribe("robot/status", Duration::from_millis(500));
//! println!("{:?}", status.invoke_blocking(&[]));
//! ```
//!

#![deny(missing_docs)]

pub mod prelude;

/// Cluck Core Traits
pub use cluck_core as core;
/// Cluck Nodes and Remote Channels
pub use cluck_node as node;
/// Cluck Remote Procedure Calls
pub use cluck_rpc as rpc;
/// Cluck TCP Transport
pub use cluck_tcp as tcp;
/// Cluck Utility Functionality and Traits
pub use cluck_utils as utils;
