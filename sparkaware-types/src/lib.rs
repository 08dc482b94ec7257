//! Part of [sparkaware](https://github.com/sparkaware/sparkaware), a library for making
//! MQTT brokers aware of the [Sparkplug](https://sparkplug.eclipse.org/) convention.
//!
//! This library defines the Sparkplug value types shared by the session engine and the
//! broker boundary: the topic classifier, outbound topic builders, the structured payload
//! model, and the codec trait through which payload bytes enter and leave the system.
//!
//! # Feature Flags
//!
//! - `json-codec`: Enables [JsonPayloadCodec], a [PayloadCodec] implementation backed by
//!   JSON. Useful for tests where the real binary codec is not available. Disabled by
//!   default.

pub mod constants;
pub mod topic;
pub mod utils;

mod codec;
mod payload;

pub use codec::*;
pub use payload::*;
