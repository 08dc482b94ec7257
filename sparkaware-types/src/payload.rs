use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::constants::{BDSEQ, NODE_CONTROL_REBIRTH};

/// The value carried by a [Metric].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum MetricValue {
    Bool(bool),
    Int(i64),
    UInt(u64),
    Double(f64),
    Text(String),
}

impl MetricValue {
    fn as_int(&self) -> Option<i64> {
        match self {
            MetricValue::Int(v) => Some(*v),
            MetricValue::UInt(v) => i64::try_from(*v).ok(),
            _ => None,
        }
    }
}

/// A single metric within a decoded payload.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Metric {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<MetricValue>,
}

impl Metric {
    pub fn new_named<S: Into<String>>(name: S, value: MetricValue) -> Self {
        Self {
            name: Some(name.into()),
            alias: None,
            timestamp: None,
            value: Some(value),
        }
    }

    fn is_named(&self, name: &str) -> bool {
        self.name.as_deref() == Some(name)
    }
}

/// A payload after the external codec has decoded it.
///
/// This is the structured message the session engine operates on. The binary wire
/// encoding never appears here; it is the concern of the [PayloadCodec](crate::PayloadCodec)
/// implementation.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DecodedPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seq: Option<u64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub metrics: Vec<Metric>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uuid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Vec<u8>>,
}

impl DecodedPayload {
    /// The payload sequence number as the wrapping 8 bit counter Sparkplug defines.
    ///
    /// Returns `None` when the payload has no seq or a value outside 0..=255.
    pub fn seq_u8(&self) -> Option<u8> {
        match self.seq {
            Some(seq) if seq <= u8::MAX as u64 => Some(seq as u8),
            _ => None,
        }
    }

    /// The birth/death sequence metric, when the payload carries a valid one.
    pub fn bdseq(&self) -> Option<u8> {
        for metric in &self.metrics {
            if !metric.is_named(BDSEQ) {
                continue;
            }
            let value = metric.value.as_ref()?.as_int()?;
            if !(0..=u8::MAX as i64).contains(&value) {
                return None;
            }
            return Some(value as u8);
        }
        None
    }

    /// Whether the payload carries a `Node Control/Rebirth = true` metric.
    pub fn requests_rebirth(&self) -> bool {
        self.metrics.iter().any(|metric| {
            metric.is_named(NODE_CONTROL_REBIRTH)
                && metric.value == Some(MetricValue::Bool(true))
        })
    }
}

/// Error produced when a STATE message body cannot be understood.
#[derive(Error, Debug, PartialEq)]
pub enum StateDecodeError {
    #[error("unable to decode state message as json: {0}")]
    Json(String),
    #[error("state message has no online flag")]
    MissingOnlineFlag,
}

/// The body of a host application STATE message.
#[derive(Debug, Clone, PartialEq)]
pub enum StatePayload {
    Online { timestamp: u64 },
    Offline { timestamp: u64 },
}

impl StatePayload {
    /// Parse a STATE message body.
    ///
    /// Unknown fields are tolerated; a missing timestamp defaults to zero.
    pub fn from_json(bytes: &[u8]) -> Result<Self, StateDecodeError> {
        let value: serde_json::Value = serde_json::from_slice(bytes)
            .map_err(|e| StateDecodeError::Json(e.to_string()))?;
        let online = value
            .get("online")
            .and_then(serde_json::Value::as_bool)
            .ok_or(StateDecodeError::MissingOnlineFlag)?;
        let timestamp = value
            .get("timestamp")
            .and_then(serde_json::Value::as_u64)
            .unwrap_or(0);
        Ok(if online {
            StatePayload::Online { timestamp }
        } else {
            StatePayload::Offline { timestamp }
        })
    }
}

impl From<StatePayload> for Vec<u8> {
    fn from(value: StatePayload) -> Self {
        match value {
            StatePayload::Online { timestamp } => {
                format!("{{\"online\" : true, \"timestamp\" : {timestamp}}}").into()
            }
            StatePayload::Offline { timestamp } => {
                format!("{{\"online\" : false, \"timestamp\" : {timestamp}}}").into()
            }
        }
    }
}
