#![allow(dead_code)]

use bytes::Bytes;
use sparkaware_broker::{BrokerEvent, InboundPublish};
use sparkaware_types::{
    constants::BDSEQ, topic::QoS, DecodedPayload, JsonPayloadCodec, Metric, MetricValue,
    PayloadCodec,
};

pub fn encode(payload: &DecodedPayload) -> Vec<u8> {
    JsonPayloadCodec::new().encode(payload).unwrap()
}

pub fn decode(bytes: &[u8]) -> DecodedPayload {
    JsonPayloadCodec::new().decode(bytes).unwrap()
}

pub fn publish(client_id: &str, topic: &str, payload: &DecodedPayload) -> BrokerEvent {
    BrokerEvent::Publish(InboundPublish {
        client_id: client_id.to_string(),
        topic: topic.to_string(),
        payload: Bytes::from(encode(payload)),
        qos: QoS::AtMostOnce,
        retain: false,
    })
}

pub fn payload(seq: u64) -> DecodedPayload {
    DecodedPayload {
        timestamp: Some(1_000),
        seq: Some(seq),
        ..Default::default()
    }
}

pub fn empty_payload() -> DecodedPayload {
    DecodedPayload {
        timestamp: Some(1_000),
        ..Default::default()
    }
}

pub fn birth_payload(seq: u64, bdseq: u8) -> DecodedPayload {
    let mut payload = payload(seq);
    payload
        .metrics
        .push(Metric::new_named(BDSEQ, MetricValue::Int(bdseq as i64)));
    payload
}

pub fn death_payload(bdseq: u8) -> DecodedPayload {
    let mut payload = empty_payload();
    payload
        .metrics
        .push(Metric::new_named(BDSEQ, MetricValue::Int(bdseq as i64)));
    payload
}
