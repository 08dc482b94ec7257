use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::{BrokerEvent, OutboundPublish};

/// A request issued to the broker by the engine, as observed by a [BrokerHarness].
#[derive(Clone, Debug, PartialEq)]
pub enum BrokerRequest {
    Publish(OutboundPublish),
    Disconnect { client_id: String },
}

/// A [Broker](crate::Broker) implementation that forwards requests over a channel.
///
/// # Examples
///
/// See [ChannelEventSource]
#[derive(Clone)]
pub struct ChannelBroker {
    tx: mpsc::UnboundedSender<BrokerRequest>,
}

#[async_trait]
impl crate::Broker for ChannelBroker {
    async fn publish(&self, publish: OutboundPublish) -> Result<(), ()> {
        match self.tx.send(BrokerRequest::Publish(publish)) {
            Ok(_) => Ok(()),
            Err(_) => Err(()),
        }
    }

    async fn disconnect(&self, client_id: &str) -> Result<(), ()> {
        match self.tx.send(BrokerRequest::Disconnect {
            client_id: client_id.to_string(),
        }) {
            Ok(_) => Ok(()),
            Err(_) => Err(()),
        }
    }
}

/// The test side of the channel pair: injects inbound events and observes the requests
/// the engine issues back to the broker.
///
/// # Examples
///
/// ```no_run
/// use sparkaware_broker::{BrokerEvent, channel::ChannelEventSource};
/// use tokio::runtime::Runtime;
///
/// let rt = Runtime::new().unwrap();
/// rt.block_on(async {
///     let (source, broker, mut harness) = ChannelEventSource::new();
///
///     //create an engine that uses the event source and broker
///
///     //Send an event to the event source
///     harness.tx_event.send(BrokerEvent::Connect {
///         client_id: "edge1".to_string(),
///         clean_start: true,
///     }).unwrap();
///
///     //Receive a request produced by the engine
///     let request = harness.rx_request.recv().await.unwrap();
/// });
/// ```
pub struct BrokerHarness {
    pub tx_event: mpsc::UnboundedSender<BrokerEvent>,
    pub rx_request: mpsc::UnboundedReceiver<BrokerRequest>,
}

/// An [EventSource](crate::EventSource) implementation that uses channels
///
/// # Examples
///
/// See [BrokerHarness]
pub struct ChannelEventSource {
    rx: mpsc::UnboundedReceiver<BrokerEvent>,
}

impl ChannelEventSource {
    /// Creates a new event source along with the corresponding broker and harness.
    pub fn new() -> (Self, ChannelBroker, BrokerHarness) {
        let (tx_event, rx_event) = mpsc::unbounded_channel();
        let (tx_request, rx_request) = mpsc::unbounded_channel();
        (
            Self { rx: rx_event },
            ChannelBroker { tx: tx_request },
            BrokerHarness {
                tx_event,
                rx_request,
            },
        )
    }
}

#[async_trait]
impl crate::EventSource for ChannelEventSource {
    async fn poll(&mut self) -> Option<BrokerEvent> {
        self.rx.recv().await
    }
}
