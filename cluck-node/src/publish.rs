//!
//! Publications
//!
//! Publishing makes an application channel reachable through a node under
//! a name.  Outputs, event outputs, log targets and output streams only
//! ever receive.  Inputs and event inputs keep a set of subscribers that
//! they push every change to, until a subscriber sends a negative
//! acknowledgement.
//!

use std::{
    collections::HashSet,
    io::Write,
    marker::PhantomData,
    sync::Arc,
};

use log::{debug, warn};
use parking_lot::Mutex;

use cluck_core::{EventInput, EventOutput, Input, LogTarget, Output};

use crate::{
    message::{RemoteMessage, RemoteType, RemoteValue},
    node::{Endpoint, Node, NodeError},
};

/// Decode a payload delivered to `name`, logging it if it is malformed
pub(crate) fn decode_or_warn<'a>(
    name: &str,
    source: Option<&str>,
    payload: &'a [u8],
) -> Option<RemoteMessage<'a>> {
    match RemoteMessage::decode(payload) {
        Ok(message) => Some(message),
        Err(err) => {
            warn!(
                "Dropping malformed message to {} from {}: {}",
                name,
                source.unwrap_or("<anonymous>"),
                err
            );
            None
        }
    }
}

fn unexpected(name: &str, source: Option<&str>, message: &RemoteMessage<'_>) {
    warn!(
        "Received wrong message type {} to {} from {}",
        message.kind(),
        name,
        source.unwrap_or("<anonymous>")
    );
}

/// The paths subscribed to a producer
#[derive(Clone, Default)]
struct Subscribers(Arc<Mutex<HashSet<String>>>);

impl Subscribers {
    fn add(&self, path: &str) {
        if self.0.lock().insert(path.to_owned()) {
            debug!("Added subscriber {}", path);
        }
    }

    fn remove(&self, path: &str) {
        if self.0.lock().remove(path) {
            debug!("Removed subscriber {}", path);
        }
    }

    fn send_all(&self, node: &Node, name: &str, payload: &[u8]) {
        let paths: Vec<String> = self.0.lock().iter().cloned().collect();
        for path in paths {
            node.transmit(Some(&path), Some(name), payload);
        }
    }
}

struct OutputEndpoint<T, O> {
    name: String,
    output: O,
    _value: PhantomData<fn(T)>,
}

impl<T: RemoteValue, O: Output<T>> Endpoint for OutputEndpoint<T, O> {
    fn kind(&self) -> Option<RemoteType> {
        Some(T::OUTPUT)
    }

    fn receive(&self, _node: &Node, source: Option<&str>, payload: &[u8]) {
        let Some(message) = decode_or_warn(&self.name, source, payload) else {
            return;
        };
        match T::from_output(&message) {
            Some(value) => self.output.set(value),
            None => unexpected(&self.name, source, &message),
        }
    }
}

struct ProducerEndpoint<T, I> {
    name: String,
    input: Arc<I>,
    subscribers: Subscribers,
    _value: PhantomData<fn() -> T>,
}

impl<T: RemoteValue, I: Input<T>> Endpoint for ProducerEndpoint<T, I> {
    fn kind(&self) -> Option<RemoteType> {
        Some(T::PRODUCER)
    }

    fn receive(&self, node: &Node, source: Option<&str>, payload: &[u8]) {
        let Some(message) = decode_or_warn(&self.name, source, payload) else {
            return;
        };
        match (message.kind(), source) {
            (kind, Some(source)) if kind == T::PRODUCER => {
                self.subscribers.add(source);
                let current = self.input.get().response().encode();
                node.transmit(Some(source), Some(&self.name), &current);
            }
            (RemoteType::NegativeAck, Some(source)) => self.subscribers.remove(source),
            _ => unexpected(&self.name, source, &message),
        }
    }
}

struct EventOutputEndpoint<E> {
    name: String,
    event: E,
}

impl<E: EventOutput> Endpoint for EventOutputEndpoint<E> {
    fn kind(&self) -> Option<RemoteType> {
        Some(RemoteType::EventOutput)
    }

    fn receive(&self, _node: &Node, source: Option<&str>, payload: &[u8]) {
        match decode_or_warn(&self.name, source, payload) {
            Some(RemoteMessage::EventOutput) => self.event.event(),
            Some(message) => unexpected(&self.name, source, &message),
            None => {}
        }
    }
}

struct EventInputEndpoint {
    name: String,
    subscribers: Subscribers,
}

impl Endpoint for EventInputEndpoint {
    fn kind(&self) -> Option<RemoteType> {
        Some(RemoteType::EventInput)
    }

    fn receive(&self, _node: &Node, source: Option<&str>, payload: &[u8]) {
        match (decode_or_warn(&self.name, source, payload), source) {
            (Some(RemoteMessage::EventInput), Some(source)) => self.subscribers.add(source),
            (Some(RemoteMessage::NegativeAck(_)), Some(source)) => self.subscribers.remove(source),
            (Some(message), _) => unexpected(&self.name, source, &message),
            (None, _) => {}
        }
    }
}

struct LogTargetEndpoint<L> {
    name: String,
    target: L,
}

impl<L: LogTarget> Endpoint for LogTargetEndpoint<L> {
    fn kind(&self) -> Option<RemoteType> {
        Some(RemoteType::LogTarget)
    }

    fn receive(&self, _node: &Node, source: Option<&str>, payload: &[u8]) {
        match decode_or_warn(&self.name, source, payload) {
            Some(RemoteMessage::LogTarget { level, message }) => self.target.log(level, &message),
            Some(message) => unexpected(&self.name, source, &message),
            None => {}
        }
    }
}

struct OutputStreamEndpoint<W> {
    name: String,
    stream: Mutex<W>,
}

impl<W: Write + Send> Endpoint for OutputStreamEndpoint<W> {
    fn kind(&self) -> Option<RemoteType> {
        Some(RemoteType::OutputStream)
    }

    fn receive(&self, _node: &Node, source: Option<&str>, payload: &[u8]) {
        match decode_or_warn(&self.name, source, payload) {
            Some(RemoteMessage::OutputStream(bytes)) => {
                let mut stream = self.stream.lock();
                if let Err(err) = stream.write_all(bytes).and_then(|()| stream.flush()) {
                    warn!("Failed to write to output stream {}: {}", self.name, err);
                }
            }
            Some(message) => unexpected(&self.name, source, &message),
            None => {}
        }
    }
}

impl Node {
    /// Publish a boolean or float output that remote writers can set
    pub fn publish_output<T: RemoteValue>(
        &self,
        name: &str,
        output: impl Output<T> + 'static,
    ) -> Result<(), NodeError> {
        self.publish(
            name,
            OutputEndpoint {
                name: name.to_owned(),
                output,
                _value: PhantomData,
            },
        )
    }

    /// Publish a boolean or float input that remote readers can subscribe
    /// to.  Subscribers get the current value when they subscribe and
    /// every change after that.
    pub fn publish_input<T: RemoteValue, I: Input<T> + 'static>(
        &self,
        name: &str,
        input: I,
    ) -> Result<(), NodeError> {
        let input = Arc::new(input);
        let subscribers = Subscribers::default();
        self.publish(
            name,
            ProducerEndpoint {
                name: name.to_owned(),
                input: input.clone(),
                subscribers: subscribers.clone(),
                _value: PhantomData,
            },
        )?;

        let node = self.downgrade();
        let name = name.to_owned();
        input.on_change(Box::new(move |value: T| {
            if let Some(node) = node.upgrade() {
                subscribers.send_all(&node, &name, &value.response().encode());
            }
        }));
        Ok(())
    }

    /// Publish an event that remote callers can fire
    pub fn publish_event_output(
        &self,
        name: &str,
        event: impl EventOutput + 'static,
    ) -> Result<(), NodeError> {
        self.publish(
            name,
            EventOutputEndpoint {
                name: name.to_owned(),
                event,
            },
        )
    }

    /// Publish an event source that remote listeners can subscribe to
    pub fn publish_event_input(&self, name: &str, input: &dyn EventInput) -> Result<(), NodeError> {
        let subscribers = Subscribers::default();
        self.publish(
            name,
            EventInputEndpoint {
                name: name.to_owned(),
                subscribers: subscribers.clone(),
            },
        )?;

        let node = self.downgrade();
        let name = name.to_owned();
        input.on_event(Box::new(move || {
            if let Some(node) = node.upgrade() {
                subscribers.send_all(&node, &name, &RemoteMessage::EventInputResponse.encode());
            }
        }));
        Ok(())
    }

    /// Publish a log target that remote loggers can write to
    pub fn publish_log_target(
        &self,
        name: &str,
        target: impl LogTarget + 'static,
    ) -> Result<(), NodeError> {
        self.publish(
            name,
            LogTargetEndpoint {
                name: name.to_owned(),
                target,
            },
        )
    }

    /// Publish a byte sink that remote writers can stream into
    pub fn publish_output_stream(
        &self,
        name: &str,
        stream: impl Write + Send + 'static,
    ) -> Result<(), NodeError> {
        self.publish(
            name,
            OutputStreamEndpoint {
                name: name.to_owned(),
                stream: Mutex::new(stream),
            },
        )
    }
}
