//!
//! Polled Request/Response
//!
//! A server answers requests sent to one path in the routing tree, and any
//! number of clients anywhere in the tree can address it by that path.
//! Both sides are polled: nothing here blocks, requests and responses are
//! collected as they arrive and handed out in batches.
//!

/// The calling side of a request/response exchange with the server at a
/// fixed path.
pub trait Client {
    /// The request payload
    type Request;
    /// The response payload
    type Response;
    /// Why a request failed
    type Error;

    /// Send a request towards the server's path.  The response, if any,
    /// turns up in a later call to [`Client::poll_for_responses`].
    fn send_request(&mut self, request: Self::Request) -> Result<(), Self::Error>;

    /// Take every exchange that finished since the last poll, each paired
    /// with the request that started it.  A request that was never
    /// answered comes back as an error.
    #[allow(clippy::type_complexity)]
    fn poll_for_responses(&mut self) -> Vec<Result<(Self::Request, Self::Response), Self::Error>>;
}

/// The answering side, published under a name on a node.
pub trait Server {
    /// The request payload
    type Request;
    /// The response payload
    type Response;
    /// Identifies a request that has been polled but not answered yet.  The
    /// reply path back to the caller stays behind the key.
    type Key;
    /// Why a response could not be sent
    type Error;

    /// Take every request that arrived since the last poll
    #[allow(clippy::type_complexity)]
    fn poll_for_requests(&mut self) -> Vec<Result<(Self::Key, Self::Request), Self::Error>>;

    /// Answer the request identified by `client_key`.  Each key is answered
    /// at most once.
    fn send_response(
        &mut self,
        client_key: Self::Key,
        request: Self::Request,
        response: Self::Response,
    ) -> Result<(), Self::Error>;

    /// Answer several requests, reporting the outcome of each
    fn send_responses(
        &mut self,
        responses: Vec<(Self::Key, Self::Request, Self::Response)>,
    ) -> Vec<Result<(), Self::Error>> {
        responses
            .into_iter()
            .map(|(key, request, response)| self.send_response(key, request, response))
            .collect()
    }
}
