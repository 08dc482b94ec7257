//! Part of [sparkaware](https://github.com/sparkaware/sparkaware), a library for making
//! MQTT brokers aware of the [Sparkplug](https://sparkplug.eclipse.org/) convention.
//!
//! This library defines the boundary between the session engine and the hosting broker:
//! the inbound event feed and the outbound publish/disconnect surface.
//!
//! # Feature Flags
//!
//! - `channel-broker`: Enables the channel based [EventSource] and [Broker]
//!   implementation. Useful for writing tests where it is not appropriate to run inside
//!   a real broker. Disabled by default.

mod traits;
mod types;

pub use traits::{Broker, DynBroker, DynEventSource, EventSource};
pub use types::*;

/// A basic [EventSource] and [Broker] implementation based on channels
///
/// Useful for writing tests where it is not appropriate to be running inside a real
/// MQTT broker
#[cfg(any(feature = "channel-broker", doc))]
pub mod channel;
