//!
//! Channel Collaborator Traits
//!
//! Cluck does not own any reactive channel primitives.  Booleans, floats,
//! events, log targets and byte streams are provided by the application
//! and reach Cluck through the small traits in this module.  Every trait is
//! implemented for plain closures so simple wiring needs no extra types.
//!

use std::{fmt, sync::Arc};

/// A sink of values of type `T` (a boolean or float output).
pub trait Output<T>: Send + Sync {
    /// Write a new value to the output
    fn set(&self, value: T);
}

impl<T, F: Fn(T) + Send + Sync> Output<T> for F {
    fn set(&self, value: T) {
        self(value)
    }
}

/// A source of values of type `T` (a boolean or float input).
pub trait Input<T>: Send + Sync {
    /// The current value of the input
    fn get(&self) -> T;

    /// Register a listener that is called with every new value
    fn on_change(&self, listener: Box<dyn Fn(T) + Send + Sync>);
}

impl<T, I: Input<T> + ?Sized> Input<T> for Arc<I> {
    fn get(&self) -> T {
        (**self).get()
    }

    fn on_change(&self, listener: Box<dyn Fn(T) + Send + Sync>) {
        (**self).on_change(listener)
    }
}

/// Something that can be fired.
pub trait EventOutput: Send + Sync {
    /// Fire the event
    fn event(&self);
}

impl<F: Fn() + Send + Sync> EventOutput for F {
    fn event(&self) {
        self()
    }
}

/// Something that fires.
pub trait EventInput: Send + Sync {
    /// Register a listener that is called every time the event fires
    fn on_event(&self, listener: Box<dyn Fn() + Send + Sync>);
}

/// Severity of a log message as carried over the wire.
///
/// The discriminants are the signed ids carried on the wire.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(i8)]
pub enum LogLevel {
    /// Finest tracing
    Finest = -9,
    /// Finer tracing
    Finer = -6,
    /// Fine tracing
    Fine = -3,
    /// Configuration messages
    Config = 0,
    /// Informational messages
    Info = 3,
    /// Something unexpected that is recoverable
    Warning = 6,
    /// Something is broken
    Severe = 9,
}

impl LogLevel {
    /// The wire id of this level
    pub fn id(self) -> i8 {
        self as i8
    }

    /// Look up a level by its wire id
    pub fn from_id(id: i8) -> Option<Self> {
        match id {
            -9 => Some(LogLevel::Finest),
            -6 => Some(LogLevel::Finer),
            -3 => Some(LogLevel::Fine),
            0 => Some(LogLevel::Config),
            3 => Some(LogLevel::Info),
            6 => Some(LogLevel::Warning),
            9 => Some(LogLevel::Severe),
            _ => None,
        }
    }
}

impl From<LogLevel> for log::Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Severe => log::Level::Error,
            LogLevel::Warning => log::Level::Warn,
            LogLevel::Info | LogLevel::Config => log::Level::Info,
            LogLevel::Fine => log::Level::Debug,
            LogLevel::Finer | LogLevel::Finest => log::Level::Trace,
        }
    }
}

impl From<log::Level> for LogLevel {
    fn from(level: log::Level) -> Self {
        match level {
            log::Level::Error => LogLevel::Severe,
            log::Level::Warn => LogLevel::Warning,
            log::Level::Info => LogLevel::Info,
            log::Level::Debug => LogLevel::Fine,
            log::Level::Trace => LogLevel::Finest,
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LogLevel::Finest => "FINEST",
            LogLevel::Finer => "FINER",
            LogLevel::Fine => "FINE",
            LogLevel::Config => "CONFIG",
            LogLevel::Info => "INFO",
            LogLevel::Warning => "WARNING",
            LogLevel::Severe => "SEVERE",
        };
        f.write_str(name)
    }
}

/// A destination for log messages.
pub trait LogTarget: Send + Sync {
    /// Record a message at the given level
    fn log(&self, level: LogLevel, message: &str);
}

impl<F: Fn(LogLevel, &str) + Send + Sync> LogTarget for F {
    fn log(&self, level: LogLevel, message: &str) {
        self(level, message)
    }
}

/// A log target that forwards everything it receives into the `log` facade
/// of this process.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogForwarder;

impl LogTarget for LogForwarder {
    fn log(&self, level: LogLevel, message: &str) {
        log::log!(target: "cluck::remote", log::Level::from(level), "{}", message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::{Arc, Mutex};

    #[test]
    fn test_log_level_ids_round_trip() {
        for level in [
            LogLevel::Finest,
            LogLevel::Finer,
            LogLevel::Fine,
            LogLevel::Config,
            LogLevel::Info,
            LogLevel::Warning,
            LogLevel::Severe,
        ] {
            assert_eq!(LogLevel::from_id(level.id()), Some(level));
        }
        assert_eq!(LogLevel::from_id(1), None);
    }

    #[test]
    fn test_log_level_maps_onto_log_facade() {
        assert_eq!(log::Level::from(LogLevel::Severe), log::Level::Error);
        assert_eq!(log::Level::from(LogLevel::Fine), log::Level::Debug);
        assert_eq!(LogLevel::from(log::Level::Warn), LogLevel::Warning);
    }

    #[test]
    fn test_closures_are_channels() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = {
            let seen = seen.clone();
            move |value: f32| seen.lock().unwrap().push(value)
        };
        Output::<f32>::set(&sink, 1.5);
        Output::<f32>::set(&sink, -2.0);
        assert_eq!(*seen.lock().unwrap(), vec![1.5, -2.0]);
    }
}
