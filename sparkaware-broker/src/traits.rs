use async_trait::async_trait;

use crate::{BrokerEvent, OutboundPublish};

/// The outbound surface of the hosting broker.
///
/// All calls are best-effort notifications from the engine's perspective; a failed call
/// is logged by the caller and never rolls back session state.
#[async_trait]
pub trait Broker {
    /// Publishes a message into the broker.
    ///
    /// # Returns
    ///
    /// - `Ok(())` if the message was accepted by the broker
    /// - `Err(())` if the publication failed
    async fn publish(&self, publish: OutboundPublish) -> Result<(), ()>;

    /// Disconnects the named client session.
    ///
    /// # Returns
    ///
    /// - `Ok(())` if the disconnection was accepted by the broker
    /// - `Err(())` if the disconnection failed
    async fn disconnect(&self, client_id: &str) -> Result<(), ()>;
}

pub type DynBroker = dyn Broker + Send + Sync;

/// The inbound event feed from the hosting broker.
#[async_trait]
pub trait EventSource {
    /// Wait for the next broker event. `None` means the feed has closed.
    async fn poll(&mut self) -> Option<BrokerEvent>;
}

pub type DynEventSource = dyn EventSource + Send;
