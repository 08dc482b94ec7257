//! Sparkplug session awareness for MQTT brokers.
//!
//! The hosting broker feeds publish, connect and disconnect events into the
//! [engine], which tracks edge node and device lifecycles, validates sequence
//! numbers, and issues corrective actions (rebirth requests, synthetic death
//! certificates) back through the [broker] boundary.

pub use sparkaware_engine as engine;
pub use sparkaware_types as types;
pub mod broker {
    pub use sparkaware_broker::*;
}
