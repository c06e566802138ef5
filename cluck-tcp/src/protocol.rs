//!
//! The Cluck TCP wire protocol.
//!
//! A connection starts with a handshake: the client sends
//! [`CLIENT_MAGIC`] and the server answers [`SERVER_MAGIC`].  After that
//! both directions carry frames:
//!
//! ```text
//! +-------------+--------+--------------+------------+---------+--------------+
//! | destination | source | length (i32) | seed (i64) | payload | checksum     |
//! | (nullable)  | (null.)|              |            |         | (i64)        |
//! +-------------+--------+--------------+------------+---------+--------------+
//! ```
//!
//! Everything is big endian.  A nullable string is a presence byte,
//! followed when present by a `u16` length and that many bytes of UTF-8.
//! The checksum is computed over the payload from a random per-frame seed.
//!

use std::io::{Read, Write};

use cluck_core::Message;
use cluck_node::RemoteType;

use crate::error::TransportError;

/// Sent by the client to open a connection
pub const CLIENT_MAGIC: u64 = 0x1540_00CA_0000_0003;

/// Sent by the server to accept a connection
pub const SERVER_MAGIC: u64 = 0x1540_00CB_0000_0003;

/// Destination of keep-alive frames
pub const KEEPALIVE_DESTINATION: &str = "KEEPALIVE";

/// Payload of keep-alive frames
pub const KEEPALIVE_PAYLOAD: [u8; 2] = [RemoteType::NegativeAck as u8, 0x6D];

/// Checksum of `payload` starting from `seed`
pub fn checksum(seed: i64, payload: &[u8]) -> i64 {
    payload.iter().fold(seed, |hash, &byte| {
        hash.wrapping_mul(43).wrapping_add(i64::from(byte as i8))
    })
}

/// A keep-alive frame
pub fn keepalive() -> Message {
    Message::new(Some(KEEPALIVE_DESTINATION), None, &KEEPALIVE_PAYLOAD)
}

/// Whether a received message is a keep-alive rather than traffic
pub fn is_keepalive(message: &Message) -> bool {
    message.destination.as_deref() == Some(KEEPALIVE_DESTINATION)
        && message.source.is_none()
        && message.payload == KEEPALIVE_PAYLOAD
}

fn read_u64<R: Read>(reader: &mut R) -> Result<u64, TransportError> {
    let mut bytes = [0u8; 8];
    reader.read_exact(&mut bytes).map_err(TransportError::from_read)?;
    Ok(u64::from_be_bytes(bytes))
}

fn expect_magic<R: Read>(reader: &mut R, expected: u64) -> Result<(), TransportError> {
    let found = read_u64(reader)?;
    if found == expected {
        Ok(())
    } else {
        Err(TransportError::BadMagic { expected, found })
    }
}

/// Run the client side of the handshake
pub fn client_handshake<S: Read + Write>(stream: &mut S) -> Result<(), TransportError> {
    stream.write_all(&CLIENT_MAGIC.to_be_bytes())?;
    stream.flush()?;
    expect_magic(stream, SERVER_MAGIC)
}

/// Run the server side of the handshake
pub fn server_handshake<S: Read + Write>(stream: &mut S) -> Result<(), TransportError> {
    expect_magic(stream, CLIENT_MAGIC)?;
    stream.write_all(&SERVER_MAGIC.to_be_bytes())?;
    stream.flush()?;
    Ok(())
}

/// Frame encoder and decoder
#[derive(Clone, Copy, Debug)]
pub struct FrameCodec {
    max_message_size: usize,
}

impl FrameCodec {
    /// Create a codec that rejects payloads over `max_message_size` bytes
    pub fn new(max_message_size: usize) -> Self {
        Self { max_message_size }
    }

    /// Encode a message into a frame with the given checksum seed
    pub fn encode_with_seed(&self, message: &Message, seed: i64) -> Result<Vec<u8>, TransportError> {
        let len = i32::try_from(message.payload.len())
            .ok()
            .filter(|&len| len as usize <= self.max_message_size)
            .ok_or(TransportError::FrameTooLarge {
                len: message.payload.len(),
                max: self.max_message_size,
            })?;

        let mut frame = Vec::with_capacity(message.payload.len() + 32);
        put_nullable_string(&mut frame, message.destination.as_deref())?;
        put_nullable_string(&mut frame, message.source.as_deref())?;
        frame.extend_from_slice(&len.to_be_bytes());
        frame.extend_from_slice(&seed.to_be_bytes());
        frame.extend_from_slice(&message.payload);
        frame.extend_from_slice(&checksum(seed, &message.payload).to_be_bytes());
        Ok(frame)
    }

    /// Encode a message into a frame with a random checksum seed
    pub fn encode(&self, message: &Message) -> Result<Vec<u8>, TransportError> {
        self.encode_with_seed(message, rand::random())
    }

    /// Write a message as a single frame
    pub fn write<W: Write>(&self, writer: &mut W, message: &Message) -> Result<(), TransportError> {
        let frame = self.encode(message)?;
        writer.write_all(&frame)?;
        writer.flush()?;
        Ok(())
    }

    /// Read the next frame
    pub fn read<R: Read>(&self, reader: &mut R) -> Result<Message, TransportError> {
        let destination = read_nullable_string(reader)?;
        let source = read_nullable_string(reader)?;

        let mut len = [0u8; 4];
        reader.read_exact(&mut len).map_err(TransportError::from_read)?;
        let len = i32::from_be_bytes(len);
        if len < 0 {
            return Err(TransportError::NegativeLength(len));
        }
        let len = len as usize;
        if len > self.max_message_size {
            return Err(TransportError::FrameTooLarge {
                len,
                max: self.max_message_size,
            });
        }

        let mut seed = [0u8; 8];
        reader.read_exact(&mut seed).map_err(TransportError::from_read)?;
        let seed = i64::from_be_bytes(seed);

        let mut payload = vec![0u8; len];
        reader
            .read_exact(&mut payload)
            .map_err(TransportError::from_read)?;

        let mut found = [0u8; 8];
        reader.read_exact(&mut found).map_err(TransportError::from_read)?;
        let found = i64::from_be_bytes(found);
        let expected = checksum(seed, &payload);
        if expected != found {
            return Err(TransportError::ChecksumMismatch { expected, found });
        }

        Ok(Message {
            destination,
            source,
            payload,
        })
    }
}

fn put_nullable_string(frame: &mut Vec<u8>, value: Option<&str>) -> Result<(), TransportError> {
    match value {
        None => frame.push(0),
        Some(value) => {
            let len = u16::try_from(value.len()).map_err(|_| TransportError::InvalidString)?;
            frame.push(1);
            frame.extend_from_slice(&len.to_be_bytes());
            frame.extend_from_slice(value.as_bytes());
        }
    }
    Ok(())
}

fn read_nullable_string<R: Read>(reader: &mut R) -> Result<Option<String>, TransportError> {
    let mut presence = [0u8; 1];
    reader
        .read_exact(&mut presence)
        .map_err(TransportError::from_read)?;
    match presence[0] {
        0 => Ok(None),
        1 => {
            let mut len = [0u8; 2];
            reader.read_exact(&mut len).map_err(TransportError::from_read)?;
            let mut bytes = vec![0u8; usize::from(u16::from_be_bytes(len))];
            reader
                .read_exact(&mut bytes)
                .map_err(TransportError::from_read)?;
            String::from_utf8(bytes)
                .map(Some)
                .map_err(|_| TransportError::InvalidString)
        }
        _ => Err(TransportError::InvalidString),
    }
}
