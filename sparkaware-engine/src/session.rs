use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

/// Used to uniquely identify an edge node
#[derive(Debug, PartialEq, Eq, Hash, Clone)]
pub struct NodeIdentifier {
    pub group: String,
    pub node: String,
}

impl NodeIdentifier {
    pub fn new<S: Into<String>, S1: Into<String>>(group: S, node: S1) -> Self {
        Self {
            group: group.into(),
            node: node.into(),
        }
    }
}

impl fmt::Display for NodeIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.group, self.node)
    }
}

/// Lifecycle phase of a live session record.
///
/// Absent and dead sessions have no record; removal is the terminal transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    /// The identity published a birth certificate and has been in order since.
    Birthed,
    /// Disorder was detected; data is not trusted until a rebirth arrives.
    Stale,
}

#[derive(Debug)]
pub(crate) struct DeviceSession {
    pub phase: SessionPhase,
    pub last_seq: u8,
    pub birth_timestamp: u64,
    pub last_activity: u64,
}

impl DeviceSession {
    pub(crate) fn new(seq: u8, birth_timestamp: u64, now: u64) -> Self {
        Self {
            phase: SessionPhase::Birthed,
            last_seq: seq,
            birth_timestamp,
            last_activity: now,
        }
    }
}

#[derive(Debug)]
pub(crate) struct NodeSession {
    pub phase: SessionPhase,
    pub last_seq: u8,
    pub bdseq: Option<u8>,
    pub birth_timestamp: u64,
    pub last_activity: u64,
    pub last_rebirth_request: u64,
    pub client_id: String,
    pub devices: HashMap<String, DeviceSession>,
}

impl NodeSession {
    pub(crate) fn new(client_id: &str, seq: u8, bdseq: Option<u8>, birth_timestamp: u64, now: u64) -> Self {
        Self {
            phase: SessionPhase::Birthed,
            last_seq: seq,
            bdseq,
            birth_timestamp,
            last_activity: now,
            last_rebirth_request: 0,
            client_id: client_id.to_string(),
            devices: HashMap::new(),
        }
    }

    pub(crate) fn touch(&mut self, now: u64) {
        self.last_activity = now;
    }

    /// Whether enough time has passed since the last rebirth request to issue another.
    pub(crate) fn rebirth_allowed(&self, now: u64, cooldown: Duration) -> bool {
        self.last_rebirth_request == 0
            || now.saturating_sub(self.last_rebirth_request) >= cooldown.as_millis() as u64
    }

    pub(crate) fn note_rebirth_request(&mut self, now: u64) {
        self.last_rebirth_request = now;
    }
}

/// Next expected value for the wrapping 8 bit sequence counter.
pub(crate) fn seq_follows(last: u8, next: u8) -> bool {
    last.wrapping_add(1) == next
}
