//!
//! Remote Proxies
//!
//! Subscribing to a path gives back a proxy that behaves like the local
//! channel on the other end.  Writers (outputs, events, log targets and
//! streams) just send a message per call.  Readers (inputs and event
//! inputs) publish a hidden consumer endpoint under a unique local name,
//! ask the producer to push updates to it, and ask again whenever the
//! network announces that its structure changed.
//!

use std::{convert::Infallible, io, marker::PhantomData, sync::Arc};

use log::warn;
use parking_lot::Mutex;

use cluck_core::{EventInput, EventOutput, Input, LogLevel, LogTarget, Output, Publisher, Subscriber};
use cluck_utils::UniqueIds;

use crate::{
    message::{RemoteMessage, RemoteType, RemoteValue},
    node::{Endpoint, Node, NodeError},
    publish::decode_or_warn,
};

/// A remote boolean or float output
#[derive(Clone, Debug)]
pub struct RemoteOutput<T> {
    node: Node,
    path: String,
    _value: PhantomData<fn(T)>,
}

impl<T: RemoteValue> Output<T> for RemoteOutput<T> {
    fn set(&self, value: T) {
        self.node.transmit(Some(&self.path), None, &value.output().encode());
    }
}

impl<T: RemoteValue> Publisher for RemoteOutput<T> {
    type Data = T;
    type Error = Infallible;

    fn publish(&mut self, data: Self::Data) -> Result<(), Self::Error> {
        self.set(data);
        Ok(())
    }
}

/// A remote event that can be fired
#[derive(Clone, Debug)]
pub struct RemoteEventOutput {
    node: Node,
    path: String,
}

impl EventOutput for RemoteEventOutput {
    fn event(&self) {
        self.node
            .transmit(Some(&self.path), None, &RemoteMessage::EventOutput.encode());
    }
}

/// A remote log target
#[derive(Clone, Debug)]
pub struct RemoteLogTarget {
    node: Node,
    path: String,
}

impl LogTarget for RemoteLogTarget {
    fn log(&self, level: LogLevel, message: &str) {
        let message = RemoteMessage::LogTarget {
            level,
            message: message.into(),
        };
        self.node.transmit(Some(&self.path), None, &message.encode());
    }
}

/// A remote byte sink.  Every write is sent as its own chunk.
#[derive(Clone, Debug)]
pub struct RemoteOutputStream {
    node: Node,
    path: String,
}

impl io::Write for RemoteOutputStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if !buf.is_empty() {
            self.node
                .transmit(Some(&self.path), None, &RemoteMessage::OutputStream(buf).encode());
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

type ValueListener<T> = Box<dyn Fn(T) + Send + Sync>;

struct InputState<T> {
    value: Mutex<Option<T>>,
    listeners: Mutex<Vec<Arc<dyn Fn(T) + Send + Sync>>>,
}

impl<T: Copy> InputState<T> {
    fn update(&self, value: T) {
        *self.value.lock() = Some(value);
        let listeners = self.listeners.lock().clone();
        for listener in listeners {
            listener(value);
        }
    }
}

struct ConsumerEndpoint<T> {
    local_name: String,
    path: String,
    state: Arc<InputState<T>>,
}

impl<T: RemoteValue> Endpoint for ConsumerEndpoint<T> {
    fn kind(&self) -> Option<RemoteType> {
        None
    }

    fn receive(&self, _node: &Node, source: Option<&str>, payload: &[u8]) {
        let Some(message) = decode_or_warn(&self.local_name, source, payload) else {
            return;
        };
        match T::from_response(&message) {
            Some(value) => self.state.update(value),
            None => warn!(
                "Received wrong message type {} to {} from {}",
                message.kind(),
                self.local_name,
                source.unwrap_or("<anonymous>")
            ),
        }
    }

    fn receive_broadcast(&self, node: &Node, _source: Option<&str>, payload: &[u8]) {
        if let Ok(RemoteMessage::Notify) = RemoteMessage::decode(payload) {
            node.transmit(Some(&self.path), Some(&self.local_name), &T::request().encode());
        }
    }
}

/// A remote boolean or float input.
///
/// The input keeps its subscription alive until it is dropped, at which
/// point the producer is told to forget it.
pub struct RemoteInput<T: RemoteValue> {
    node: Node,
    local_name: String,
    path: String,
    state: Arc<InputState<T>>,
    current: Option<T>,
}

impl<T: RemoteValue> RemoteInput<T> {
    /// The path of the producer this input is subscribed to
    pub fn path(&self) -> &str {
        &self.path
    }

    /// The local name updates are delivered to
    pub fn local_name(&self) -> &str {
        &self.local_name
    }

    /// The last value received, if any
    pub fn latest(&self) -> Option<T> {
        *self.state.value.lock()
    }
}

impl<T: RemoteValue> Input<T> for RemoteInput<T> {
    fn get(&self) -> T {
        self.latest().unwrap_or_default()
    }

    fn on_change(&self, listener: ValueListener<T>) {
        self.state.listeners.lock().push(Arc::from(listener));
    }
}

impl<T: RemoteValue> Subscriber for RemoteInput<T> {
    type Target = Option<T>;

    fn get(&mut self) -> &Self::Target {
        self.current = self.latest();
        &self.current
    }
}

impl<T: RemoteValue> Drop for RemoteInput<T> {
    fn drop(&mut self) {
        self.node.remove(&self.local_name);
        self.node.transmit(
            Some(&self.path),
            Some(&self.local_name),
            &RemoteMessage::NegativeAck(&[]).encode(),
        );
    }
}

type EventListener = Arc<dyn Fn() + Send + Sync>;

struct EventConsumerEndpoint {
    local_name: String,
    path: String,
    listeners: Arc<Mutex<Vec<EventListener>>>,
}

impl Endpoint for EventConsumerEndpoint {
    fn kind(&self) -> Option<RemoteType> {
        None
    }

    fn receive(&self, _node: &Node, source: Option<&str>, payload: &[u8]) {
        match decode_or_warn(&self.local_name, source, payload) {
            Some(RemoteMessage::EventInputResponse) => {
                let listeners = self.listeners.lock().clone();
                for listener in listeners {
                    listener();
                }
            }
            Some(message) => warn!(
                "Received wrong message type {} to {} from {}",
                message.kind(),
                self.local_name,
                source.unwrap_or("<anonymous>")
            ),
            None => {}
        }
    }

    fn receive_broadcast(&self, node: &Node, _source: Option<&str>, payload: &[u8]) {
        if let Ok(RemoteMessage::Notify) = RemoteMessage::decode(payload) {
            node.transmit(
                Some(&self.path),
                Some(&self.local_name),
                &RemoteMessage::EventInput.encode(),
            );
        }
    }
}

/// A remote event source
pub struct RemoteEventInput {
    node: Node,
    local_name: String,
    path: String,
    listeners: Arc<Mutex<Vec<EventListener>>>,
}

impl RemoteEventInput {
    /// The path of the event source this input is subscribed to
    pub fn path(&self) -> &str {
        &self.path
    }
}

impl EventInput for RemoteEventInput {
    fn on_event(&self, listener: Box<dyn Fn() + Send + Sync>) {
        self.listeners.lock().push(Arc::from(listener));
    }
}

impl Drop for RemoteEventInput {
    fn drop(&mut self) {
        self.node.remove(&self.local_name);
        self.node.transmit(
            Some(&self.path),
            Some(&self.local_name),
            &RemoteMessage::NegativeAck(&[]).encode(),
        );
    }
}

impl Node {
    /// Get a proxy for the boolean or float output at `path`
    pub fn subscribe_output<T: RemoteValue>(&self, path: &str) -> RemoteOutput<T> {
        RemoteOutput {
            node: self.clone(),
            path: path.to_owned(),
            _value: PhantomData,
        }
    }

    /// Subscribe to the boolean or float input at `path`
    pub fn subscribe_input<T: RemoteValue>(&self, path: &str) -> Result<RemoteInput<T>, NodeError> {
        let local_name = UniqueIds::global().next_name(T::LOCAL_PREFIX);
        let state = Arc::new(InputState {
            value: Mutex::new(None),
            listeners: Mutex::new(Vec::new()),
        });
        self.publish(
            &local_name,
            ConsumerEndpoint::<T> {
                local_name: local_name.clone(),
                path: path.to_owned(),
                state: state.clone(),
            },
        )?;
        self.transmit(Some(path), Some(&local_name), &T::request().encode());

        Ok(RemoteInput {
            node: self.clone(),
            local_name,
            path: path.to_owned(),
            state,
            current: None,
        })
    }

    /// Get a proxy for the event output at `path`
    pub fn subscribe_event_output(&self, path: &str) -> RemoteEventOutput {
        RemoteEventOutput {
            node: self.clone(),
            path: path.to_owned(),
        }
    }

    /// Subscribe to the event source at `path`
    pub fn subscribe_event_input(&self, path: &str) -> Result<RemoteEventInput, NodeError> {
        let local_name = UniqueIds::global().next_name("evi");
        let listeners = Arc::new(Mutex::new(Vec::new()));
        self.publish(
            &local_name,
            EventConsumerEndpoint {
                local_name: local_name.clone(),
                path: path.to_owned(),
                listeners: listeners.clone(),
            },
        )?;
        self.transmit(Some(path), Some(&local_name), &RemoteMessage::EventInput.encode());

        Ok(RemoteEventInput {
            node: self.clone(),
            local_name,
            path: path.to_owned(),
            listeners,
        })
    }

    /// Get a proxy for the log target at `path`
    pub fn subscribe_log_target(&self, path: &str) -> RemoteLogTarget {
        RemoteLogTarget {
            node: self.clone(),
            path: path.to_owned(),
        }
    }

    /// Get a proxy for the output stream at `path`
    pub fn subscribe_output_stream(&self, path: &str) -> RemoteOutputStream {
        RemoteOutputStream {
            node: self.clone(),
            path: path.to_owned(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::{io::Write, sync::Mutex as StdMutex};

    use crate::{
        local::connect,
        publish::tests::{TestEvent, TestInput},
    };

    fn linked() -> (Node, Node) {
        let robot = Node::new();
        let driver = Node::new();
        connect(&driver, "robot", &robot, "driver").unwrap();
        (robot, driver)
    }

    #[test]
    fn test_remote_output_sets_value() {
        let (robot, driver) = linked();
        let seen = Arc::new(StdMutex::new(Vec::new()));
        let sink = seen.clone();
        robot
            .publish_output("light", move |value: bool| sink.lock().unwrap().push(value))
            .unwrap();

        let mut light = driver.subscribe_output::<bool>("robot/light");
        light.set(true);
        light.publish(false).unwrap();
        assert_eq!(*seen.lock().unwrap(), vec![true, false]);
    }

    #[test]
    fn test_remote_float_input_gets_current_value_and_updates() {
        let (robot, driver) = linked();
        let initial: f32 = rand::random();
        let sensor = TestInput::new(initial);
        robot.publish_input("sensor", sensor.clone()).unwrap();

        let mut remote = driver.subscribe_input::<f32>("robot/sensor").unwrap();
        assert_eq!(Subscriber::get(&mut remote), &Some(initial));

        let updates = Arc::new(StdMutex::new(Vec::new()));
        let sink = updates.clone();
        remote.on_change(Box::new(move |value: f32| sink.lock().unwrap().push(value)));
        sensor.change(initial + 1.0);
        assert_eq!(Input::get(&remote), initial + 1.0);
        assert_eq!(*updates.lock().unwrap(), vec![initial + 1.0]);
    }

    #[test]
    fn test_remote_input_resubscribes_on_notify() {
        let robot = Node::new();
        let driver = Node::new();
        let sensor = TestInput::new(true);
        robot.publish_input("sensor", sensor.clone()).unwrap();

        let remote = driver.subscribe_input::<bool>("robot/sensor").unwrap();
        assert_eq!(remote.latest(), None);

        connect(&driver, "robot", &robot, "driver").unwrap();
        driver.notify_network_modified();
        assert_eq!(remote.latest(), Some(true));
    }

    #[test]
    fn test_dropped_remote_input_unsubscribes() {
        let (robot, driver) = linked();
        let sensor = TestInput::new(false);
        robot.publish_input("sensor", sensor.clone()).unwrap();

        let remote = driver.subscribe_input::<bool>("robot/sensor").unwrap();
        let local_name = remote.local_name().to_owned();
        assert!(driver.contains(&local_name));
        drop(remote);
        assert!(!driver.contains(&local_name));

        let misses = driver.routing_misses();
        sensor.change(true);
        assert_eq!(driver.routing_misses(), misses);
    }

    #[test]
    fn test_remote_events_both_ways() {
        let (robot, driver) = linked();
        let fired = Arc::new(StdMutex::new(0));
        let counter = fired.clone();
        robot
            .publish_event_output("horn", move || *counter.lock().unwrap() += 1)
            .unwrap();
        let button = TestEvent::default();
        robot.publish_event_input("button", &button).unwrap();

        driver.subscribe_event_output("robot/horn").event();
        assert_eq!(*fired.lock().unwrap(), 1);

        let presses = Arc::new(StdMutex::new(0));
        let counter = presses.clone();
        let remote = driver.subscribe_event_input("robot/button").unwrap();
        remote.on_event(Box::new(move || *counter.lock().unwrap() += 1));
        button.fire();
        button.fire();
        assert_eq!(*presses.lock().unwrap(), 2);
    }

    #[test]
    fn test_remote_log_target_and_stream() {
        let (robot, driver) = linked();
        let entries = Arc::new(StdMutex::new(Vec::new()));
        let sink = entries.clone();
        robot
            .publish_log_target("log", move |level: LogLevel, message: &str| {
                sink.lock().unwrap().push((level, message.to_owned()))
            })
            .unwrap();
        let chunks = Arc::new(StdMutex::new(0usize));
        let counter = chunks.clone();
        robot
            .publish_output_stream("console", CountingWriter(counter))
            .unwrap();

        driver
            .subscribe_log_target("robot/log")
            .log(LogLevel::Info, "hello");
        assert_eq!(
            *entries.lock().unwrap(),
            vec![(LogLevel::Info, String::from("hello"))]
        );

        let mut console = driver.subscribe_output_stream("robot/console");
        console.write_all(b"42").unwrap();
        console.write_all(b"").unwrap();
        assert_eq!(*chunks.lock().unwrap(), 1);
    }

    struct CountingWriter(Arc<StdMutex<usize>>);

    impl Write for CountingWriter {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            *self.0.lock().unwrap() += 1;
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }
}
