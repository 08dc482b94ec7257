//! Part of [sparkaware](https://github.com/sparkaware/sparkaware), a library for making
//! MQTT brokers aware of the [Sparkplug](https://sparkplug.eclipse.org/) convention.
//!
//! This library implements the session-state engine: it observes every publish, connect
//! and disconnect event the hosting broker delivers, maintains per-edge-node and
//! per-device lifecycle state, validates sequence numbers, and emits corrective actions
//! (rebirth requests, synthetic death certificates, session invalidation) back into the
//! broker.

mod actions;
mod aware;
mod builder;
mod config;
mod engine;
mod error;
mod machine;
mod session;
mod store;

pub use actions::{Disposition, DropReason};
pub use aware::{AwareHandle, SparkplugAware};
pub use builder::SparkplugAwareBuilder;
pub use config::AwareConfig;
pub use engine::{DeviceView, Engine, SessionView};
pub use error::{BuildError, StoreError};
pub use session::{NodeIdentifier, SessionPhase};
