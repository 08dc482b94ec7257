use bytes::Bytes;
use sparkaware_types::topic::QoS;

/// A publish delivered by the broker's inbound interception point.
#[derive(Debug, Clone, PartialEq)]
pub struct InboundPublish {
    /// The MQTT client the publish arrived from.
    pub client_id: String,
    /// The raw topic string.
    pub topic: String,
    /// The payload bytes, untouched.
    pub payload: Bytes,
    pub qos: QoS,
    pub retain: bool,
}

/// An event supplied by the hosting broker.
#[derive(Debug, Clone, PartialEq)]
pub enum BrokerEvent {
    Publish(InboundPublish),
    Connect {
        client_id: String,
        clean_start: bool,
    },
    Disconnect {
        client_id: String,
        /// Whether the underlying MQTT session ended cleanly.
        clean: bool,
    },
    SessionExpiry {
        client_id: String,
    },
}

/// A publish issued back into the broker.
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundPublish {
    pub topic: String,
    pub payload: Vec<u8>,
    pub qos: QoS,
    pub retain: bool,
    /// Message expiry interval in seconds, where the broker supports it.
    pub message_expiry: Option<u64>,
}

impl OutboundPublish {
    pub fn new(topic: String, payload: Vec<u8>, qos: QoS, retain: bool) -> Self {
        Self {
            topic,
            payload,
            qos,
            retain,
            message_expiry: None,
        }
    }

    pub fn with_message_expiry(mut self, seconds: u64) -> Self {
        self.message_expiry = Some(seconds);
        self
    }
}
