use crate::constants::{
    DBIRTH, DCMD, DDATA, DDEATH, NAMESPACE, NBIRTH, NCMD, NDATA, NDEATH, STATE,
};

/// Message types a topic can carry within the Sparkplug namespace.
///
/// `Unknown` captures a type token that is syntactically in the right place but not part
/// of the recognized set, so callers can ignore such messages without treating them as
/// errors.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MessageType {
    NBirth,
    NDeath,
    NData,
    NCmd,
    DBirth,
    DDeath,
    DData,
    DCmd,
    State,
    Unknown(String),
}

/// The lifecycle role of a message, independent of node or device scope.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MessageKind {
    Birth,
    Death,
    Data,
    Cmd,
    State,
    Other,
}

impl MessageType {
    pub fn from_token(token: &str) -> Self {
        match token {
            NBIRTH => MessageType::NBirth,
            NDEATH => MessageType::NDeath,
            NDATA => MessageType::NData,
            NCMD => MessageType::NCmd,
            DBIRTH => MessageType::DBirth,
            DDEATH => MessageType::DDeath,
            DDATA => MessageType::DData,
            DCMD => MessageType::DCmd,
            STATE => MessageType::State,
            other => MessageType::Unknown(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            MessageType::NBirth => NBIRTH,
            MessageType::NDeath => NDEATH,
            MessageType::NData => NDATA,
            MessageType::NCmd => NCMD,
            MessageType::DBirth => DBIRTH,
            MessageType::DDeath => DDEATH,
            MessageType::DData => DDATA,
            MessageType::DCmd => DCMD,
            MessageType::State => STATE,
            MessageType::Unknown(token) => token,
        }
    }

    pub fn kind(&self) -> MessageKind {
        match self {
            MessageType::NBirth | MessageType::DBirth => MessageKind::Birth,
            MessageType::NDeath | MessageType::DDeath => MessageKind::Death,
            MessageType::NData | MessageType::DData => MessageKind::Data,
            MessageType::NCmd | MessageType::DCmd => MessageKind::Cmd,
            MessageType::State => MessageKind::State,
            MessageType::Unknown(_) => MessageKind::Other,
        }
    }

    pub fn is_node_scoped(&self) -> bool {
        matches!(
            self,
            MessageType::NBirth | MessageType::NDeath | MessageType::NData | MessageType::NCmd
        )
    }

    pub fn is_device_scoped(&self) -> bool {
        matches!(
            self,
            MessageType::DBirth | MessageType::DDeath | MessageType::DData | MessageType::DCmd
        )
    }

    pub fn is_birth(&self) -> bool {
        self.kind() == MessageKind::Birth
    }

    pub fn is_death(&self) -> bool {
        self.kind() == MessageKind::Death
    }
}

/// The Sparkplug address a topic resolves to.
///
/// Derived per message from its topic and not kept beyond the processing of one event.
#[derive(Clone, Debug, PartialEq)]
pub struct SparkplugAddress {
    pub group_id: String,
    pub message_type: MessageType,
    pub node_id: String,
    pub device_id: Option<String>,
}

/// Result of classifying a raw MQTT topic against the Sparkplug namespace.
#[derive(Clone, Debug, PartialEq)]
pub enum Classification {
    /// The topic is not part of the Sparkplug namespace. The message must pass through
    /// untouched.
    NotSparkplug,
    /// A message on an edge node's own topics.
    Node(SparkplugAddress),
    /// A message on a device topic under an edge node.
    Device(SparkplugAddress),
    /// A host application STATE message.
    State { host_id: String },
    /// A well-shaped Sparkplug topic carrying a message type outside the recognized set.
    Unsupported(SparkplugAddress),
}

fn segment_ok(segment: &str) -> bool {
    !segment.is_empty() && !segment.contains(['+', '#'])
}

/// Classify a raw topic string into a Sparkplug address.
///
/// Topics must match `spBv1.0/<group>/<message-type>/<edge-node>[/<device>]` or
/// `spBv1.0/STATE/<host-id>`. An unknown namespace version or a malformed segment count
/// yields [Classification::NotSparkplug], never an error.
pub fn classify(topic: &str) -> Classification {
    let parts: Vec<&str> = topic.split('/').collect();
    if parts.len() < 3 || parts[0] != NAMESPACE {
        return Classification::NotSparkplug;
    }

    if parts[1] == STATE {
        if parts.len() != 3 || !segment_ok(parts[2]) {
            return Classification::NotSparkplug;
        }
        return Classification::State {
            host_id: parts[2].to_string(),
        };
    }

    if parts.len() < 4 || parts.len() > 5 {
        return Classification::NotSparkplug;
    }
    if parts[1..].iter().any(|segment| !segment_ok(segment)) {
        return Classification::NotSparkplug;
    }

    let message_type = MessageType::from_token(parts[2]);
    let node_scoped = message_type.is_node_scoped();
    let device_scoped = message_type.is_device_scoped();
    let address = SparkplugAddress {
        group_id: parts[1].to_string(),
        message_type,
        node_id: parts[3].to_string(),
        device_id: parts.get(4).map(|s| s.to_string()),
    };

    // `STATE` is only valid directly under the namespace; inside a group it is just an
    // unrecognized type token.
    if !node_scoped && !device_scoped {
        return Classification::Unsupported(address);
    }
    if node_scoped {
        if address.device_id.is_some() {
            return Classification::NotSparkplug;
        }
        return Classification::Node(address);
    }
    if address.device_id.is_none() {
        return Classification::NotSparkplug;
    }
    Classification::Device(address)
}

/// Quality of service levels for outbound publishes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum QoS {
    AtMostOnce,
    AtLeastOnce,
    ExactlyOnce,
}

/// Message kinds published on an edge node's own topics.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NodeMessageKind {
    NBirth,
    NDeath,
    NData,
    NCmd,
}

impl NodeMessageKind {
    fn as_str(&self) -> &str {
        match self {
            NodeMessageKind::NBirth => NBIRTH,
            NodeMessageKind::NDeath => NDEATH,
            NodeMessageKind::NData => NDATA,
            NodeMessageKind::NCmd => NCMD,
        }
    }
}

/// Message kinds published on a device topic.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeviceMessageKind {
    DBirth,
    DDeath,
    DData,
    DCmd,
}

impl DeviceMessageKind {
    fn as_str(&self) -> &str {
        match self {
            DeviceMessageKind::DBirth => DBIRTH,
            DeviceMessageKind::DDeath => DDEATH,
            DeviceMessageKind::DData => DDATA,
            DeviceMessageKind::DCmd => DCMD,
        }
    }
}

/// A concrete topic for publishing a node scoped message.
#[derive(Clone, Debug, PartialEq)]
pub struct NodeTopic {
    pub topic: String,
    pub kind: NodeMessageKind,
}

impl NodeTopic {
    pub fn new(group_id: &str, kind: NodeMessageKind, node_id: &str) -> Self {
        Self {
            topic: format!("{}/{}/{}/{}", NAMESPACE, group_id, kind.as_str(), node_id),
            kind,
        }
    }

    pub fn get_publish_quality_retain(&self) -> (QoS, bool) {
        match self.kind {
            NodeMessageKind::NBirth => (QoS::AtMostOnce, false),
            NodeMessageKind::NData => (QoS::AtMostOnce, false),
            NodeMessageKind::NCmd => (QoS::AtMostOnce, false),
            NodeMessageKind::NDeath => (QoS::AtLeastOnce, false),
        }
    }
}

/// A concrete topic for publishing a device scoped message.
#[derive(Clone, Debug, PartialEq)]
pub struct DeviceTopic {
    pub topic: String,
    pub kind: DeviceMessageKind,
}

impl DeviceTopic {
    pub fn new(group_id: &str, kind: DeviceMessageKind, node_id: &str, device_id: &str) -> Self {
        Self {
            topic: format!(
                "{}/{}/{}/{}/{}",
                NAMESPACE,
                group_id,
                kind.as_str(),
                node_id,
                device_id
            ),
            kind,
        }
    }

    pub fn get_publish_quality_retain(&self) -> (QoS, bool) {
        match self.kind {
            DeviceMessageKind::DBirth => (QoS::AtLeastOnce, false),
            DeviceMessageKind::DData => (QoS::AtMostOnce, false),
            DeviceMessageKind::DCmd => (QoS::AtMostOnce, false),
            DeviceMessageKind::DDeath => (QoS::AtLeastOnce, false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_topics_classify() {
        let class = classify("spBv1.0/plant1/NBIRTH/press");
        match class {
            Classification::Node(address) => {
                assert_eq!(address.group_id, "plant1");
                assert_eq!(address.message_type, MessageType::NBirth);
                assert_eq!(address.node_id, "press");
                assert_eq!(address.device_id, None);
            }
            other => panic!("expected node classification, got {other:?}"),
        }
    }

    #[test]
    fn device_topics_classify() {
        let class = classify("spBv1.0/plant1/DDATA/press/valve2");
        match class {
            Classification::Device(address) => {
                assert_eq!(address.message_type, MessageType::DData);
                assert_eq!(address.device_id.as_deref(), Some("valve2"));
            }
            other => panic!("expected device classification, got {other:?}"),
        }
    }

    #[test]
    fn state_topics_classify() {
        assert_eq!(
            classify("spBv1.0/STATE/scada1"),
            Classification::State {
                host_id: "scada1".to_string()
            }
        );
        assert_eq!(classify("spBv1.0/STATE/a/b"), Classification::NotSparkplug);
    }

    #[test]
    fn foreign_namespaces_pass_through() {
        assert_eq!(classify("spAv1.0/g/NBIRTH/n"), Classification::NotSparkplug);
        assert_eq!(classify("spBv2.0/g/NBIRTH/n"), Classification::NotSparkplug);
        assert_eq!(classify("some/other/topic"), Classification::NotSparkplug);
        assert_eq!(classify(""), Classification::NotSparkplug);
    }

    #[test]
    fn malformed_segment_counts_pass_through() {
        assert_eq!(classify("spBv1.0/g"), Classification::NotSparkplug);
        assert_eq!(classify("spBv1.0/g/NBIRTH"), Classification::NotSparkplug);
        assert_eq!(
            classify("spBv1.0/g/DDATA/n/d/extra"),
            Classification::NotSparkplug
        );
        // node scoped type with a device segment, and vice versa
        assert_eq!(classify("spBv1.0/g/NDATA/n/d"), Classification::NotSparkplug);
        assert_eq!(classify("spBv1.0/g/DDATA/n"), Classification::NotSparkplug);
    }

    #[test]
    fn empty_and_wildcard_segments_pass_through() {
        assert_eq!(classify("spBv1.0//NBIRTH/n"), Classification::NotSparkplug);
        assert_eq!(classify("spBv1.0/g/NBIRTH/"), Classification::NotSparkplug);
        assert_eq!(classify("spBv1.0/g/NBIRTH/+"), Classification::NotSparkplug);
        assert_eq!(classify("spBv1.0/g/NBIRTH/#"), Classification::NotSparkplug);
    }

    #[test]
    fn unknown_message_types_flag_unsupported() {
        match classify("spBv1.0/g/NRECORD/n") {
            Classification::Unsupported(address) => {
                assert_eq!(
                    address.message_type,
                    MessageType::Unknown("NRECORD".to_string())
                );
            }
            other => panic!("expected unsupported classification, got {other:?}"),
        }
        // STATE is only valid directly under the namespace
        assert!(matches!(
            classify("spBv1.0/g/STATE/n"),
            Classification::Unsupported(_)
        ));
    }

    #[test]
    fn outbound_topic_builders() {
        let ncmd = NodeTopic::new("plant1", NodeMessageKind::NCmd, "press");
        assert_eq!(ncmd.topic, "spBv1.0/plant1/NCMD/press");
        assert_eq!(ncmd.get_publish_quality_retain(), (QoS::AtMostOnce, false));

        let ddeath = DeviceTopic::new("plant1", DeviceMessageKind::DDeath, "press", "valve2");
        assert_eq!(ddeath.topic, "spBv1.0/plant1/DDEATH/press/valve2");
        assert_eq!(ddeath.get_publish_quality_retain(), (QoS::AtLeastOnce, false));
    }
}
