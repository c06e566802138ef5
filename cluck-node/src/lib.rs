//!
//! Cluck Node
//!
//! The node is the center of a Cluck network.  Applications publish their
//! channels on a node, connect it to other nodes with links, and subscribe
//! to channels published anywhere in the resulting tree by path.
//!
//! ```
//! use cluck_node::{local, Node};
//! use cluck_core::Output;
//!
//! let robot = Node::new();
//! let driver = Node::new();
//! local::connect(&driver, "robot", &robot, "driver").unwrap();
//!
//! robot.publish_output("light", |on: bool| println!("light: {on}")).unwrap();
//! driver.subscribe_output::<bool>("robot/light").set(true);
//! ```
//!

#![deny(missing_docs)]

pub mod message;
pub use message::{MessageError, RemoteMessage, RemoteType, RemoteValue};

pub mod node;
pub use node::{Endpoint, Node, NodeConfig, NodeError, Route, WeakNode, BROADCAST};

pub mod local;
pub use local::LocalLink;

pub mod publish;

pub mod remote;
pub use remote::{
    RemoteEventInput, RemoteEventOutput, RemoteInput, RemoteLogTarget, RemoteOutput,
    RemoteOutputStream,
};

pub mod discovery;
