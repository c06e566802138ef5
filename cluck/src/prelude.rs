//!
//! The Cluck Prelude
//!
//! Everything needed to publish on a node, link it to other nodes and use
//! what they publish.
//!

pub use cluck_core::{
    Client, EventInput, EventOutput, Input, Link, LogLevel, LogTarget, Output, Publisher, Server,
    Subscriber,
};

pub use cluck_node::{local, Endpoint, Node, NodeConfig, NodeError, RemoteType};

pub use cluck_rpc::{Procedure, RemoteProcedure, ReplySink, RpcConfig, RpcError, RpcManager};

pub use cluck_tcp::{TcpClient, TcpConfig, TcpServer, TransportError};

pub use cluck_utils::Packable;
