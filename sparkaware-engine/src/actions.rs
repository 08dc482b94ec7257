use std::sync::Arc;

use futures::future::join_all;
use log::{debug, error};
use sparkaware_broker::{DynBroker, OutboundPublish};
use sparkaware_types::{
    constants::{BDSEQ, NODE_CONTROL_REBIRTH},
    topic::{DeviceMessageKind, DeviceTopic, NodeMessageKind, NodeTopic, QoS},
    utils::timestamp,
    DecodedPayload, DynPayloadCodec, Metric, MetricValue,
};
use thiserror::Error;

use crate::{config::AwareConfig, session::NodeIdentifier};

/// A broker-side effect decided by a state transition.
///
/// Actions are executed strictly after the per-identity session lock has been released;
/// their failure never rolls back the already-committed transition.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Action {
    /// Ask the node to republish its birth certificate.
    RequestRebirth { id: NodeIdentifier },
    /// Announce a node death on its behalf.
    SyntheticNodeDeath { id: NodeIdentifier, bdseq: Option<u8> },
    /// Announce a device death on its behalf.
    SyntheticDeviceDeath { id: NodeIdentifier, device: String },
    /// Clone an accepted birth certificate onto the retained sys topic.
    RepublishBirth {
        origin_topic: String,
        payload: Vec<u8>,
    },
    /// Force the underlying MQTT session closed.
    Disconnect { client_id: String },
}

/// Why an inbound message was suppressed.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    #[error("device message without a live parent node session")]
    OrphanDevice,
    #[error("device is not part of its node's current birth")]
    UnknownDevice,
    #[error("no live session for the identity")]
    UnknownSession,
    #[error("payload could not be decoded or is missing required fields")]
    MalformedPayload,
    #[error("sequence gap detected")]
    SequenceViolation,
    #[error("session is stale pending rebirth")]
    StaleSession,
    #[error("death certificate from a previous session")]
    StaleDeathCertificate,
    #[error("session store contention")]
    Contended,
    #[error("extension is shutting down")]
    ShuttingDown,
}

/// What the hosting broker should do with the inbound event.
#[derive(Debug, Clone, PartialEq)]
pub enum Disposition {
    /// Deliver unchanged; the message is not Sparkplug or the engine is disabled.
    Passthrough,
    /// Deliver; session state was updated.
    Accept,
    /// Deliver with a replacement payload.
    Rewrite(Vec<u8>),
    /// Suppress delivery.
    Drop(DropReason),
}

/// Translates decided [Action]s into broker calls.
pub(crate) struct ActionExecutor {
    broker: Arc<DynBroker>,
    codec: Arc<DynPayloadCodec>,
    sys_topic: Option<String>,
    systopic_message_expiry: Option<u64>,
}

impl ActionExecutor {
    pub(crate) fn new(
        broker: Arc<DynBroker>,
        codec: Arc<DynPayloadCodec>,
        config: &AwareConfig,
    ) -> Self {
        Self {
            broker,
            codec,
            sys_topic: config.sys_topic.clone(),
            systopic_message_expiry: config.systopic_message_expiry,
        }
    }

    pub(crate) async fn execute(&self, actions: Vec<Action>) {
        if actions.is_empty() {
            return;
        }
        join_all(actions.into_iter().map(|action| self.execute_one(action))).await;
    }

    async fn execute_one(&self, action: Action) {
        match action {
            Action::RequestRebirth { id } => {
                let topic = NodeTopic::new(&id.group, NodeMessageKind::NCmd, &id.node);
                debug!("requesting rebirth. node = {id}");
                let quality = topic.get_publish_quality_retain();
                self.publish_payload(topic.topic, quality, rebirth_payload())
                    .await;
            }
            Action::SyntheticNodeDeath { id, bdseq } => {
                let topic = NodeTopic::new(&id.group, NodeMessageKind::NDeath, &id.node);
                debug!("publishing synthetic node death. node = {id}");
                let quality = topic.get_publish_quality_retain();
                self.publish_payload(topic.topic, quality, death_payload(bdseq))
                    .await;
            }
            Action::SyntheticDeviceDeath { id, device } => {
                let topic =
                    DeviceTopic::new(&id.group, DeviceMessageKind::DDeath, &id.node, &device);
                debug!("publishing synthetic device death. node = {id} device = {device}");
                let quality = topic.get_publish_quality_retain();
                self.publish_payload(topic.topic, quality, death_payload(None))
                    .await;
            }
            Action::RepublishBirth {
                origin_topic,
                payload,
            } => {
                let prefix = match &self.sys_topic {
                    Some(prefix) => prefix,
                    None => return,
                };
                let mut publish = OutboundPublish::new(
                    format!("{prefix}{origin_topic}"),
                    payload,
                    QoS::AtLeastOnce,
                    true,
                );
                if let Some(expiry) = self.systopic_message_expiry {
                    publish = publish.with_message_expiry(expiry);
                }
                let topic = publish.topic.clone();
                if self.broker.publish(publish).await.is_err() {
                    error!("publish to sys topic {topic} failed");
                }
            }
            Action::Disconnect { client_id } => {
                if self.broker.disconnect(&client_id).await.is_err() {
                    error!("broker rejected disconnect of client {client_id}");
                }
            }
        }
    }

    async fn publish_payload(&self, topic: String, quality: (QoS, bool), payload: DecodedPayload) {
        let bytes = match self.codec.encode(&payload) {
            Ok(bytes) => bytes,
            Err(e) => {
                error!("unable to encode payload for {topic}: {e}");
                return;
            }
        };
        let (qos, retain) = quality;
        if self
            .broker
            .publish(OutboundPublish::new(topic.clone(), bytes, qos, retain))
            .await
            .is_err()
        {
            error!("broker rejected publish on {topic}");
        }
    }
}

fn rebirth_payload() -> DecodedPayload {
    DecodedPayload {
        timestamp: Some(timestamp()),
        seq: None,
        metrics: vec![Metric::new_named(
            NODE_CONTROL_REBIRTH,
            MetricValue::Bool(true),
        )],
        uuid: None,
        body: None,
    }
}

fn death_payload(bdseq: Option<u8>) -> DecodedPayload {
    let metrics = match bdseq {
        Some(bdseq) => vec![Metric::new_named(BDSEQ, MetricValue::Int(bdseq as i64))],
        None => Vec::new(),
    };
    DecodedPayload {
        timestamp: Some(timestamp()),
        seq: None,
        metrics,
        uuid: None,
        body: None,
    }
}
