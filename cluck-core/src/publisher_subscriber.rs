//!
//! Value Channels
//!
//! A publisher writes values to a channel published somewhere in the
//! routing tree, and a subscriber keeps the latest value from one.  Either
//! end may be local or reached through any number of links by path.
//!

/// Writes values to a channel.
pub trait Publisher {
    /// The value type of the channel
    type Data;
    /// Why a value could not be written
    type Error;

    /// Write `data` to the channel.  Over a link this is fire and forget:
    /// success means the value was handed to the route, not that it
    /// arrived.
    fn publish(&mut self, data: Self::Data) -> Result<(), Self::Error>;
}

/// Keeps the latest value of a channel.
pub trait Subscriber {
    /// What the subscriber holds, usually `Option<T>` until a value has
    /// arrived
    type Target;

    /// Take in anything that arrived since the last call and return the
    /// latest value
    fn get(&mut self) -> &Self::Target;
}
