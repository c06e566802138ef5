//!
//! Utility Packing and Unpacking Methods Necessary for Data
//! Sent over a Cluck Link.
//!
//! Everything is packed big-endian (network byte order) so values written
//! here can be read by any peer that speaks the Cluck wire format.
//!

/// An error from attempting to pack data into a buffer or from
/// attempting to unpack data from a slice.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PackingError {
    /// The buffer to pack or unpack data from cannot be used as
    /// the data will not fit in the buffer.
    InvalidBufferSize,
    /// The bytes do not describe a valid value of the type.
    InvalidValue,
}

/// Trait implemented by data to be sent over network boundaries.
pub trait Packable: Sized {
    /// Get the minimum necessary length of a buffer to pack this data
    /// into.
    fn len() -> usize;

    /// Pack a given piece of data into a given buffer.
    fn pack(self, buffer: &mut [u8]) -> Result<(), PackingError>;

    /// Unpack a given piece of data from an array of bytes
    fn unpack(data: &[u8]) -> Result<Self, PackingError>;

    /// Pack the data into a freshly allocated buffer of exactly `len()` bytes.
    fn to_packed(self) -> Vec<u8> {
        let mut buffer = vec![0u8; Self::len()];
        match self.pack(&mut buffer) {
            Ok(()) => buffer,
            Err(_) => unreachable!("buffer is allocated with the packed length"),
        }
    }
}

macro_rules! packable_primitive {
    ($primitive_name: ident, $length: literal) => {
        impl Packable for $primitive_name {
            fn len() -> usize {
                $length as usize
            }

            fn pack(self, buffer: &mut [u8]) -> Result<(), PackingError> {
                if buffer.len() < Self::len() {
                    return Err(PackingError::InvalidBufferSize);
                }

                buffer[..Self::len()].copy_from_slice(&self.to_be_bytes()[..]);
                Ok(())
            }

            fn unpack(data: &[u8]) -> Result<Self, PackingError> {
                let bytes: [u8; $length] = data
                    .get(..Self::len())
                    .and_then(|bytes| bytes.try_into().ok())
                    .ok_or(PackingError::InvalidBufferSize)?;
                Ok(Self::from_be_bytes(bytes))
            }
        }
    };
}

packable_primitive!(u8, 1);
packable_primitive!(u16, 2);
packable_primitive!(u32, 4);
packable_primitive!(u64, 8);
packable_primitive!(i8, 1);
packable_primitive!(i16, 2);
packable_primitive!(i32, 4);
packable_primitive!(i64, 8);
packable_primitive!(f32, 4);
packable_primitive!(f64, 8);

impl Packable for bool {
    fn len() -> usize {
        1
    }

    fn pack(self, buffer: &mut [u8]) -> Result<(), PackingError> {
        match buffer.first_mut() {
            Some(byte) => {
                *byte = u8::from(self);
                Ok(())
            }
            None => Err(PackingError::InvalidBufferSize),
        }
    }

    fn unpack(data: &[u8]) -> Result<Self, PackingError> {
        match data.first() {
            Some(0) => Ok(false),
            Some(1) => Ok(true),
            Some(_) => Err(PackingError::InvalidValue),
            None => Err(PackingError::InvalidBufferSize),
        }
    }
}
