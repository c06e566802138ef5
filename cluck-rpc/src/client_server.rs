//!
//! Generic Client and Server Adapters
//!
//! [`RpcClient`] and [`RpcServer`] let remote procedures be polled the same
//! way as any other Cluck client or server.
//!

use std::collections::HashMap;

use crossbeam::channel::{self, Receiver, Sender};

use cluck_core::{Client, Server};
use cluck_utils::UniqueIds;

use crate::{
    error::RpcError,
    manager::{RemoteProcedure, RpcManager},
    procedure::ReplySink,
};

type Response = Result<(Vec<u8>, Vec<u8>), RpcError>;

/// Reports a timeout if the call it belongs to is dropped without a reply
struct PendingResponse {
    request: Option<Vec<u8>>,
    tx: Sender<Response>,
}

impl PendingResponse {
    fn complete(mut self, reply: Vec<u8>) {
        if let Some(request) = self.request.take() {
            let _ = self.tx.send(Ok((request, reply)));
        }
    }
}

impl Drop for PendingResponse {
    fn drop(&mut self) {
        if self.request.take().is_some() {
            let _ = self.tx.send(Err(RpcError::TimedOut));
        }
    }
}

/// A client for a remote procedure
pub struct RpcClient {
    procedure: RemoteProcedure,
    tx: Sender<Response>,
    rx: Receiver<Response>,
}

impl RpcClient {
    /// Create a client for `procedure`
    pub fn new(procedure: RemoteProcedure) -> Self {
        let (tx, rx) = channel::unbounded();
        Self { procedure, tx, rx }
    }
}

impl Client for RpcClient {
    type Request = Vec<u8>;
    type Response = Vec<u8>;
    type Error = RpcError;

    fn send_request(&mut self, request: Self::Request) -> Result<(), Self::Error> {
        let pending = PendingResponse {
            request: Some(request.clone()),
            tx: self.tx.clone(),
        };
        self.procedure
            .invoke(&request, move |reply| pending.complete(reply));
        Ok(())
    }

    fn poll_for_responses(&mut self) -> Vec<Response> {
        self.rx.try_iter().collect()
    }
}

/// A server for a procedure published on an [`RpcManager`]
pub struct RpcServer {
    rx: Receiver<(u64, Vec<u8>, ReplySink)>,
    pending: HashMap<u64, ReplySink>,
}

impl RpcServer {
    /// Publish a procedure under `name` whose requests are answered through
    /// this server
    pub fn new(manager: &RpcManager, name: &str) -> Result<Self, RpcError> {
        let (tx, rx) = channel::unbounded();
        let keys = UniqueIds::starting_at(0);
        manager.publish(name, move |request: &[u8], reply: ReplySink| {
            let _ = tx.send((keys.next_id(), request.to_vec(), reply));
        })?;

        Ok(Self {
            rx,
            pending: HashMap::new(),
        })
    }

    /// The number of requests that have been polled but not answered
    pub fn pending_requests(&self) -> usize {
        self.pending.len()
    }
}

impl Server for RpcServer {
    type Request = Vec<u8>;
    type Response = Vec<u8>;
    type Key = u64;
    type Error = RpcError;

    fn poll_for_requests(&mut self) -> Vec<Result<(Self::Key, Self::Request), Self::Error>> {
        let mut requests = Vec::new();
        for (key, request, reply) in self.rx.try_iter() {
            self.pending.insert(key, reply);
            requests.push(Ok((key, request)));
        }
        requests
    }

    fn send_response(
        &mut self,
        client_key: Self::Key,
        _request: Self::Request,
        response: Self::Response,
    ) -> Result<(), Self::Error> {
        let reply = self
            .pending
            .remove(&client_key)
            .ok_or(RpcError::UnknownRequest(client_key))?;
        reply.reply(&response)
    }
}
