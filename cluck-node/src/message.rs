//!
//! Remote Message Types
//!
//! The first byte of every typed Cluck payload is a remote message type
//! (RMT) tag.  The tag says what shape of endpoint the message is for, so a
//! subscriber can talk to a path without knowing anything else about it.
//! Payloads are decoded into [`RemoteMessage`] and matched exhaustively
//! instead of switching on raw bytes.
//!

use std::{borrow::Cow, fmt};

use thiserror::Error;

use cluck_core::LogLevel;
use cluck_utils::{Packable, PackingError};

/// The remote message type tag at payload offset 0.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum RemoteType {
    /// Discovery probe and its answer
    Ping = 0,
    /// Fire a remote event output
    EventOutput = 1,
    /// Legacy acknowledgement of an event output
    EventOutputResponse = 2,
    /// Send a line to a remote log target
    LogTarget = 3,
    /// Subscribe to a remote boolean input
    BooleanProducer = 4,
    /// A boolean input's current value
    BooleanProducerResponse = 5,
    /// Write a remote boolean output
    BooleanOutput = 6,
    /// Subscribe to a remote float input
    FloatProducer = 7,
    /// A float input's current value
    FloatProducerResponse = 8,
    /// Write a remote float output
    FloatOutput = 9,
    /// Append bytes to a remote output stream
    OutputStream = 10,
    /// Call a remote procedure
    Invoke = 11,
    /// The result of a remote procedure call
    InvokeReply = 12,
    /// The network structure changed
    Notify = 13,
    /// Subscribe to a remote event input
    EventInput = 14,
    /// A subscribed event input fired
    EventInputResponse = 15,
    /// Negative acknowledgement, also used for keep-alives
    NegativeAck = 16,
}

impl RemoteType {
    const ALL: [RemoteType; 17] = [
        RemoteType::Ping,
        RemoteType::EventOutput,
        RemoteType::EventOutputResponse,
        RemoteType::LogTarget,
        RemoteType::BooleanProducer,
        RemoteType::BooleanProducerResponse,
        RemoteType::BooleanOutput,
        RemoteType::FloatProducer,
        RemoteType::FloatProducerResponse,
        RemoteType::FloatOutput,
        RemoteType::OutputStream,
        RemoteType::Invoke,
        RemoteType::InvokeReply,
        RemoteType::Notify,
        RemoteType::EventInput,
        RemoteType::EventInputResponse,
        RemoteType::NegativeAck,
    ];

    /// The byte this type is encoded as
    pub fn tag(self) -> u8 {
        self as u8
    }

    /// Look up a type by its byte
    pub fn from_tag(tag: u8) -> Option<Self> {
        Self::ALL.get(usize::from(tag)).copied()
    }

    /// A human readable name of the type
    pub fn name(self) -> &'static str {
        match self {
            RemoteType::Ping => "Ping",
            RemoteType::EventOutput => "EventOutput",
            RemoteType::EventOutputResponse => "EventOutputResponse",
            RemoteType::LogTarget => "LogTarget",
            RemoteType::BooleanProducer => "BooleanInput",
            RemoteType::BooleanProducerResponse => "BooleanInputResponse",
            RemoteType::BooleanOutput => "BooleanOutput",
            RemoteType::FloatProducer => "FloatInput",
            RemoteType::FloatProducerResponse => "FloatInputResponse",
            RemoteType::FloatOutput => "FloatOutput",
            RemoteType::OutputStream => "OutputStream",
            RemoteType::Invoke => "RemoteProcedure",
            RemoteType::InvokeReply => "RemoteProcedureReply",
            RemoteType::Notify => "Notify",
            RemoteType::EventInput => "EventInput",
            RemoteType::EventInputResponse => "EventInputResponse",
            RemoteType::NegativeAck => "NegativeAck",
        }
    }
}

impl fmt::Display for RemoteType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// An error decoding a typed payload.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum MessageError {
    /// The payload had no tag byte
    #[error("empty payload")]
    Empty,
    /// The tag byte is not a known remote message type
    #[error("unknown remote message type {0}")]
    UnknownType(u8),
    /// The payload is too short or too long for its type
    #[error("bad length {len} for {kind}")]
    BadLength {
        /// The decoded type
        kind: RemoteType,
        /// The length of the whole payload
        len: usize,
    },
    /// A value inside the payload is out of range
    #[error("invalid value in {kind} payload")]
    InvalidValue {
        /// The decoded type
        kind: RemoteType,
    },
    /// A valid message of a type the receiver does not handle
    #[error("expected {expected} but received {found}")]
    Unexpected {
        /// The type the receiver handles
        expected: RemoteType,
        /// The type that arrived
        found: RemoteType,
    },
}

/// A decoded typed payload.
#[derive(Clone, Debug, PartialEq)]
pub enum RemoteMessage<'a> {
    /// A discovery probe
    Ping,
    /// An answer to a discovery probe naming the kind of the answering endpoint
    PingResponse(RemoteType),
    /// Fire an event output
    EventOutput,
    /// Legacy event acknowledgement
    EventOutputResponse,
    /// A line for a log target
    LogTarget {
        /// The severity of the line
        level: LogLevel,
        /// The text of the line
        message: Cow<'a, str>,
    },
    /// Subscribe to a boolean input
    BooleanProducer,
    /// A boolean input's value
    BooleanProducerResponse(bool),
    /// Write a boolean output
    BooleanOutput(bool),
    /// Subscribe to a float input
    FloatProducer,
    /// A float input's value
    FloatProducerResponse(f32),
    /// Write a float output
    FloatOutput(f32),
    /// Bytes for an output stream
    OutputStream(&'a [u8]),
    /// Call a procedure with the given request
    Invoke(&'a [u8]),
    /// The response of a procedure call
    InvokeReply(&'a [u8]),
    /// The structure of the network changed
    Notify,
    /// Subscribe to an event input
    EventInput,
    /// A subscribed event input fired
    EventInputResponse,
    /// A negative acknowledgement with any trailing bytes
    NegativeAck(&'a [u8]),
}

impl<'a> RemoteMessage<'a> {
    /// The remote message type of this message
    pub fn kind(&self) -> RemoteType {
        match self {
            RemoteMessage::Ping | RemoteMessage::PingResponse(_) => RemoteType::Ping,
            RemoteMessage::EventOutput => RemoteType::EventOutput,
            RemoteMessage::EventOutputResponse => RemoteType::EventOutputResponse,
            RemoteMessage::LogTarget { .. } => RemoteType::LogTarget,
            RemoteMessage::BooleanProducer => RemoteType::BooleanProducer,
            RemoteMessage::BooleanProducerResponse(_) => RemoteType::BooleanProducerResponse,
            RemoteMessage::BooleanOutput(_) => RemoteType::BooleanOutput,
            RemoteMessage::FloatProducer => RemoteType::FloatProducer,
            RemoteMessage::FloatProducerResponse(_) => RemoteType::FloatProducerResponse,
            RemoteMessage::FloatOutput(_) => RemoteType::FloatOutput,
            RemoteMessage::OutputStream(_) => RemoteType::OutputStream,
            RemoteMessage::Invoke(_) => RemoteType::Invoke,
            RemoteMessage::InvokeReply(_) => RemoteType::InvokeReply,
            RemoteMessage::Notify => RemoteType::Notify,
            RemoteMessage::EventInput => RemoteType::EventInput,
            RemoteMessage::EventInputResponse => RemoteType::EventInputResponse,
            RemoteMessage::NegativeAck(_) => RemoteType::NegativeAck,
        }
    }

    /// Decode a payload
    pub fn decode(payload: &'a [u8]) -> Result<Self, MessageError> {
        let (&tag, body) = payload.split_first().ok_or(MessageError::Empty)?;
        let kind = RemoteType::from_tag(tag).ok_or(MessageError::UnknownType(tag))?;
        let bad_length = MessageError::BadLength {
            kind,
            len: payload.len(),
        };

        let message = match kind {
            RemoteType::Ping => match body {
                [] => RemoteMessage::Ping,
                [answer] => RemoteMessage::PingResponse(
                    RemoteType::from_tag(*answer).ok_or(MessageError::UnknownType(*answer))?,
                ),
                _ => return Err(bad_length),
            },
            RemoteType::EventOutput => RemoteMessage::EventOutput,
            RemoteType::EventOutputResponse => RemoteMessage::EventOutputResponse,
            RemoteType::LogTarget => {
                let (&level, text) = body.split_first().ok_or(bad_length)?;
                let level = LogLevel::from_id(level as i8)
                    .ok_or(MessageError::InvalidValue { kind })?;
                RemoteMessage::LogTarget {
                    level,
                    message: String::from_utf8_lossy(text),
                }
            }
            RemoteType::BooleanProducer => RemoteMessage::BooleanProducer,
            RemoteType::BooleanProducerResponse => {
                RemoteMessage::BooleanProducerResponse(decode_bool(kind, body)?)
            }
            RemoteType::BooleanOutput => RemoteMessage::BooleanOutput(decode_bool(kind, body)?),
            RemoteType::FloatProducer => RemoteMessage::FloatProducer,
            RemoteType::FloatProducerResponse => {
                RemoteMessage::FloatProducerResponse(decode_float(kind, body)?)
            }
            RemoteType::FloatOutput => RemoteMessage::FloatOutput(decode_float(kind, body)?),
            RemoteType::OutputStream => RemoteMessage::OutputStream(body),
            RemoteType::Invoke => RemoteMessage::Invoke(body),
            RemoteType::InvokeReply => RemoteMessage::InvokeReply(body),
            RemoteType::Notify => RemoteMessage::Notify,
            RemoteType::EventInput => RemoteMessage::EventInput,
            RemoteType::EventInputResponse => RemoteMessage::EventInputResponse,
            RemoteType::NegativeAck => RemoteMessage::NegativeAck(body),
        };
        Ok(message)
    }

    /// Decode a payload that must be of a single type
    pub fn decode_expecting(payload: &'a [u8], expected: RemoteType) -> Result<Self, MessageError> {
        let message = Self::decode(payload)?;
        if message.kind() == expected {
            Ok(message)
        } else {
            Err(MessageError::Unexpected {
                expected,
                found: message.kind(),
            })
        }
    }

    /// Encode the message into a payload
    pub fn encode(&self) -> Vec<u8> {
        let mut payload = vec![self.kind().tag()];
        match self {
            RemoteMessage::PingResponse(answer) => payload.push(answer.tag()),
            RemoteMessage::LogTarget { level, message } => {
                payload.push(level.id() as u8);
                payload.extend_from_slice(message.as_bytes());
            }
            RemoteMessage::BooleanProducerResponse(value) | RemoteMessage::BooleanOutput(value) => {
                payload.extend(value.to_packed())
            }
            RemoteMessage::FloatProducerResponse(value) | RemoteMessage::FloatOutput(value) => {
                payload.extend(value.to_packed())
            }
            RemoteMessage::OutputStream(bytes)
            | RemoteMessage::Invoke(bytes)
            | RemoteMessage::InvokeReply(bytes)
            | RemoteMessage::NegativeAck(bytes) => payload.extend_from_slice(bytes),
            RemoteMessage::Ping
            | RemoteMessage::EventOutput
            | RemoteMessage::EventOutputResponse
            | RemoteMessage::BooleanProducer
            | RemoteMessage::FloatProducer
            | RemoteMessage::Notify
            | RemoteMessage::EventInput
            | RemoteMessage::EventInputResponse => {}
        }
        payload
    }
}

/// Whether a raw payload is a negative acknowledgement
pub fn is_negative_ack(payload: &[u8]) -> bool {
    payload.first() == Some(&RemoteType::NegativeAck.tag())
}

fn decode_bool(kind: RemoteType, body: &[u8]) -> Result<bool, MessageError> {
    decode_packed(kind, body)
}

fn decode_float(kind: RemoteType, body: &[u8]) -> Result<f32, MessageError> {
    decode_packed(kind, body)
}

fn decode_packed<T: Packable>(kind: RemoteType, body: &[u8]) -> Result<T, MessageError> {
    if body.len() != T::len() {
        return Err(MessageError::BadLength {
            kind,
            len: body.len() + 1,
        });
    }
    T::unpack(body).map_err(|err| match err {
        PackingError::InvalidBufferSize => MessageError::BadLength {
            kind,
            len: body.len() + 1,
        },
        PackingError::InvalidValue => MessageError::InvalidValue { kind },
    })
}

/// A value type that can travel through an input/output channel pair.
///
/// Booleans and floats share all of their publishing and subscribing code;
/// this trait supplies the message variants that differ.
pub trait RemoteValue: Copy + Default + Send + Sync + 'static {
    /// The kind of a published output of this type
    const OUTPUT: RemoteType;
    /// The kind of a published input of this type
    const PRODUCER: RemoteType;
    /// The prefix of local names created for subscriptions to this type
    const LOCAL_PREFIX: &'static str;

    /// The message writing `self` to an output
    fn output(self) -> RemoteMessage<'static>;
    /// The message reporting `self` as an input's value
    fn response(self) -> RemoteMessage<'static>;
    /// The message requesting a subscription to an input
    fn request() -> RemoteMessage<'static>;
    /// The value written by an output message
    fn from_output(message: &RemoteMessage<'_>) -> Option<Self>;
    /// The value reported by a response message
    fn from_response(message: &RemoteMessage<'_>) -> Option<Self>;
}

impl RemoteValue for bool {
    const OUTPUT: RemoteType = RemoteType::BooleanOutput;
    const PRODUCER: RemoteType = RemoteType::BooleanProducer;
    const LOCAL_PREFIX: &'static str = "bin";

    fn output(self) -> RemoteMessage<'static> {
        RemoteMessage::BooleanOutput(self)
    }

    fn response(self) -> RemoteMessage<'static> {
        RemoteMessage::BooleanProducerResponse(self)
    }

    fn request() -> RemoteMessage<'static> {
        RemoteMessage::BooleanProducer
    }

    fn from_output(message: &RemoteMessage<'_>) -> Option<Self> {
        match message {
            RemoteMessage::BooleanOutput(value) => Some(*value),
            _ => None,
        }
    }

    fn from_response(message: &RemoteMessage<'_>) -> Option<Self> {
        match message {
            RemoteMessage::BooleanProducerResponse(value) => Some(*value),
            _ => None,
        }
    }
}

impl RemoteValue for f32 {
    const OUTPUT: RemoteType = RemoteType::FloatOutput;
    const PRODUCER: RemoteType = RemoteType::FloatProducer;
    const LOCAL_PREFIX: &'static str = "fin";

    fn output(self) -> RemoteMessage<'static> {
        RemoteMessage::FloatOutput(self)
    }

    fn response(self) -> RemoteMessage<'static> {
        RemoteMessage::FloatProducerResponse(self)
    }

    fn request() -> RemoteMessage<'static> {
        RemoteMessage::FloatProducer
    }

    fn from_output(message: &RemoteMessage<'_>) -> Option<Self> {
        match message {
            RemoteMessage::FloatOutput(value) => Some(*value),
            _ => None,
        }
    }

    fn from_response(message: &RemoteMessage<'_>) -> Option<Self> {
        match message {
            RemoteMessage::FloatProducerResponse(value) => Some(*value),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tags_match_wire_values() {
        assert_eq!(RemoteType::Ping.tag(), 0);
        assert_eq!(RemoteType::LogTarget.tag(), 3);
        assert_eq!(RemoteType::BooleanOutput.tag(), 6);
        assert_eq!(RemoteType::Invoke.tag(), 11);
        assert_eq!(RemoteType::InvokeReply.tag(), 12);
        assert_eq!(RemoteType::NegativeAck.tag(), 16);
        for tag in 0..=16u8 {
            assert_eq!(RemoteType::from_tag(tag).unwrap().tag(), tag);
        }
        assert_eq!(RemoteType::from_tag(17), None);
    }

    #[test]
    fn test_decode_rejects_bad_payloads() {
        assert_eq!(RemoteMessage::decode(&[]), Err(MessageError::Empty));
        assert_eq!(RemoteMessage::decode(&[200]), Err(MessageError::UnknownType(200)));
        assert_eq!(
            RemoteMessage::decode(&[RemoteType::FloatOutput.tag(), 0, 0]),
            Err(MessageError::BadLength {
                kind: RemoteType::FloatOutput,
                len: 3
            })
        );
        assert_eq!(
            RemoteMessage::decode(&[RemoteType::BooleanOutput.tag()]),
            Err(MessageError::BadLength {
                kind: RemoteType::BooleanOutput,
                len: 1
            })
        );
        assert_eq!(
            RemoteMessage::decode(&[RemoteType::BooleanOutput.tag(), 2]),
            Err(MessageError::InvalidValue {
                kind: RemoteType::BooleanOutput
            })
        );
        assert_eq!(
            RemoteMessage::decode(&[RemoteType::LogTarget.tag(), 4, b'x']),
            Err(MessageError::InvalidValue {
                kind: RemoteType::LogTarget
            })
        );
    }

    #[test]
    fn test_decode_typed_values() {
        assert_eq!(
            RemoteMessage::decode(&[6, 1]),
            Ok(RemoteMessage::BooleanOutput(true))
        );
        assert_eq!(
            RemoteMessage::decode(&[9, 0x3F, 0x80, 0, 0]),
            Ok(RemoteMessage::FloatOutput(1.0))
        );
        assert_eq!(
            RemoteMessage::decode(&[0, 11]),
            Ok(RemoteMessage::PingResponse(RemoteType::Invoke))
        );
        assert_eq!(
            RemoteMessage::decode(&[16, 0x6D]),
            Ok(RemoteMessage::NegativeAck(&[0x6D]))
        );
    }

    #[test]
    fn test_log_target_layout() {
        let message = RemoteMessage::LogTarget {
            level: LogLevel::Warning,
            message: Cow::Borrowed("low battery"),
        };
        let payload = message.encode();
        assert_eq!(&payload[..2], &[3, 6]);
        assert_eq!(&payload[2..], b"low battery");
        assert_eq!(RemoteMessage::decode(&payload), Ok(message));
    }

    #[test]
    fn test_decode_expecting() {
        let payload = RemoteMessage::Invoke(b"abc").encode();
        assert!(RemoteMessage::decode_expecting(&payload, RemoteType::Invoke).is_ok());
        assert_eq!(
            RemoteMessage::decode_expecting(&payload, RemoteType::InvokeReply),
            Err(MessageError::Unexpected {
                expected: RemoteType::InvokeReply,
                found: RemoteType::Invoke
            })
        );
    }

    #[test]
    fn test_remote_values() {
        assert_eq!(bool::from_output(&true.output()), Some(true));
        assert_eq!(f32::from_response(&2.5f32.response()), Some(2.5));
        assert_eq!(f32::from_output(&true.output()), None);
        assert!(is_negative_ack(&[16]));
        assert!(!is_negative_ack(&[]));
    }
}
