//!
//! Serving one accepted connection.
//!

use std::{net::TcpStream, sync::Arc};

use log::info;

use cluck_node::Node;
use cluck_utils::UniqueIds;

use crate::{
    config::TcpConfig, connection::Connection, error::TransportError,
    protocol::server_handshake, server::Connections,
};

/// Handshake with an accepted client and route its traffic until it
/// disconnects.
pub(crate) fn serve(
    node: Node,
    mut stream: TcpStream,
    config: TcpConfig,
    connections: Arc<Connections>,
    id: u64,
) {
    let peer = stream.peer_addr().ok();
    let link_name = UniqueIds::global().next_name(&config.server_link_prefix);
    if let Err(err) = handshake(&mut stream, &config) {
        err.report(&format!("Handshake with {peer:?}"));
        connections.remove(id);
        return;
    }

    info!("Accepted {:?} as {}", peer, link_name);
    match Connection::open(&node, &link_name, stream, &config) {
        Ok(mut connection) => {
            node.notify_network_modified();
            let err = connection.run();
            drop(connection);
            if !connections.is_closing() {
                err.report(&format!("Connection {link_name}"));
            }
        }
        Err(err) => err.report(&format!("Connection {link_name}")),
    }
    connections.remove(id);
}

fn handshake(stream: &mut TcpStream, config: &TcpConfig) -> Result<(), TransportError> {
    stream.set_read_timeout(Some(config.connect_timeout))?;
    stream.set_write_timeout(Some(config.connect_timeout))?;
    server_handshake(stream)?;
    stream.set_write_timeout(None)?;
    Ok(())
}
