//!
//! Cluck Remote Procedure Calls
//!
//! Procedures are published on a node like any other endpoint and are
//! called by path through an [`RpcManager`].  Every call carries a deadline
//! and its reply is delivered at most once, and never after the call has
//! timed out.
//!
//! ```
//! use std::time::Duration;
//!
//! use cluck_node::Node;
//! use cluck_rpc::{ReplySink, RpcConfig, RpcManager};
//!
//! let node = Node::new();
//! let rpc = RpcManager::new(&node, RpcConfig::default()).unwrap();
//! rpc.publish("echo", |request: &[u8], reply: ReplySink| {
//!     let _ = reply.reply(request);
//! })
//! .unwrap();
//!
//! let echo = rpc.subscribe("echo", Duration::from_millis(50));
//! assert_eq!(echo.invoke_blocking(b"hello").unwrap(), b"hello".to_vec());
//! ```
//!

#![deny(missing_docs)]

mod binding;

pub mod error;
pub use error::RpcError;

pub mod procedure;
pub use procedure::{Procedure, ReplySink};

pub mod manager;
pub use manager::{RemoteProcedure, RpcConfig, RpcManager, TimeoutSweep};

pub mod client_server;
pub use client_server::{RpcClient, RpcServer};
