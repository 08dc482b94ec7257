use log::{debug, info, warn};
use sparkaware_types::{topic::MessageKind, DecodedPayload};

use crate::{
    actions::{Action, Disposition, DropReason},
    config::AwareConfig,
    session::{seq_follows, DeviceSession, NodeIdentifier, NodeSession, SessionPhase},
};

/// The state held for one identity: either no session, or a live record.
#[derive(Debug)]
pub(crate) enum Slot {
    Absent,
    Present(NodeSession),
}

impl Slot {
    pub(crate) fn session_mut(&mut self) -> Option<&mut NodeSession> {
        match self {
            Slot::Present(session) => Some(session),
            Slot::Absent => None,
        }
    }

    pub(crate) fn is_absent(&self) -> bool {
        matches!(self, Slot::Absent)
    }
}

/// The result of one transition: what to do with the inbound event, and which broker
/// side effects to run once the session lock is released.
#[derive(Debug)]
pub(crate) struct Outcome {
    pub disposition: Disposition,
    pub actions: Vec<Action>,
}

impl Outcome {
    fn accept() -> Self {
        Self {
            disposition: Disposition::Accept,
            actions: Vec::new(),
        }
    }

    fn accept_with(actions: Vec<Action>) -> Self {
        Self {
            disposition: Disposition::Accept,
            actions,
        }
    }

    fn rejected(reason: DropReason) -> Self {
        Self {
            disposition: Disposition::Drop(reason),
            actions: Vec::new(),
        }
    }

    fn rejected_with(reason: DropReason, actions: Vec<Action>) -> Self {
        Self {
            disposition: Disposition::Drop(reason),
            actions,
        }
    }
}

pub(crate) fn on_node_message(
    slot: &mut Slot,
    id: &NodeIdentifier,
    kind: MessageKind,
    payload: &DecodedPayload,
    client_id: &str,
    now: u64,
    config: &AwareConfig,
) -> Outcome {
    match kind {
        MessageKind::Birth => node_birth(slot, id, payload, client_id, now),
        MessageKind::Death => node_death(slot, id, payload),
        MessageKind::Data | MessageKind::Cmd => node_data(slot, id, kind, payload, now, config),
        _ => Outcome::accept(),
    }
}

fn node_birth(
    slot: &mut Slot,
    id: &NodeIdentifier,
    payload: &DecodedPayload,
    client_id: &str,
    now: u64,
) -> Outcome {
    let seq = match payload.seq_u8() {
        Some(seq) => seq,
        None => {
            warn!("birth payload without a sequence number - discarding. node = {id}");
            return Outcome::rejected(DropReason::MalformedPayload);
        }
    };
    let bdseq = payload.bdseq();
    let birth_timestamp = payload.timestamp.unwrap_or(now);

    let session = match slot.session_mut() {
        None => {
            *slot = Slot::Present(NodeSession::new(client_id, seq, bdseq, birth_timestamp, now));
            debug!("node session established. node = {id}");
            return Outcome::accept();
        }
        Some(session) => session,
    };

    // A second birth for a live identity is the node restarting or resyncing; the prior
    // session and every device under it are replaced in one step.
    let mut actions = Vec::new();
    if session.phase == SessionPhase::Birthed {
        warn!("duplicate birth replaces live session. node = {id}");
        if session.client_id != client_id {
            actions.push(Action::Disconnect {
                client_id: session.client_id.clone(),
            });
        }
    } else {
        debug!("rebirth received for stale session. node = {id}");
    }
    let discarded = session.devices.len();
    session.devices.clear();
    session.phase = SessionPhase::Birthed;
    session.last_seq = seq;
    session.bdseq = bdseq;
    session.birth_timestamp = birth_timestamp;
    session.last_rebirth_request = 0;
    session.client_id = client_id.to_string();
    session.touch(now);
    if discarded > 0 {
        debug!("discarded {discarded} device sessions on rebirth. node = {id}");
    }
    Outcome::accept_with(actions)
}

fn node_death(slot: &mut Slot, id: &NodeIdentifier, payload: &DecodedPayload) -> Outcome {
    let session = match slot.session_mut() {
        None => {
            debug!("death certificate for unknown session. node = {id}");
            return Outcome::accept();
        }
        Some(session) => session,
    };
    if let (Some(session_bdseq), Some(death_bdseq)) = (session.bdseq, payload.bdseq()) {
        if session_bdseq != death_bdseq {
            debug!("ignoring death certificate from a previous session. node = {id}");
            return Outcome::rejected(DropReason::StaleDeathCertificate);
        }
    }
    debug!("node session ended. node = {id}");
    *slot = Slot::Absent;
    Outcome::accept()
}

fn node_data(
    slot: &mut Slot,
    id: &NodeIdentifier,
    kind: MessageKind,
    payload: &DecodedPayload,
    now: u64,
    config: &AwareConfig,
) -> Outcome {
    let session = match slot.session_mut() {
        None => {
            if kind == MessageKind::Cmd {
                // Commands are host originated; there is nothing to validate without a
                // session, and answering them with a rebirth request would loop our own
                // NCMD publishes back into more requests.
                return Outcome::accept();
            }
            debug!("message for unknown session - requesting rebirth. node = {id}");
            return Outcome::rejected_with(
                DropReason::UnknownSession,
                vec![Action::RequestRebirth { id: id.clone() }],
            );
        }
        Some(session) => session,
    };

    let seq = match payload.seq_u8() {
        Some(seq) => seq,
        None => {
            if kind == MessageKind::Cmd {
                // Commands originate from host applications and carry no seq; they are
                // delivered without touching the node's counters.
                return Outcome::accept();
            }
            warn!("data payload without a sequence number - discarding. node = {id}");
            return Outcome::rejected(DropReason::MalformedPayload);
        }
    };

    match session.phase {
        SessionPhase::Stale => {
            let actions = gated_rebirth(session, id, now, config);
            Outcome::rejected_with(DropReason::StaleSession, actions)
        }
        SessionPhase::Birthed => {
            if seq_follows(session.last_seq, seq) {
                session.last_seq = seq;
                session.touch(now);
                Outcome::accept()
            } else {
                warn!(
                    "sequence gap, expected {expected} got {seq} - session stale. node = {id}",
                    expected = session.last_seq.wrapping_add(1)
                );
                session.phase = SessionPhase::Stale;
                let actions = gated_rebirth(session, id, now, config);
                Outcome::rejected_with(DropReason::SequenceViolation, actions)
            }
        }
    }
}

fn gated_rebirth(
    session: &mut NodeSession,
    id: &NodeIdentifier,
    now: u64,
    config: &AwareConfig,
) -> Vec<Action> {
    if session.rebirth_allowed(now, config.rebirth_cooldown) {
        session.note_rebirth_request(now);
        vec![Action::RequestRebirth { id: id.clone() }]
    } else {
        Vec::new()
    }
}

enum DeviceDataDecision {
    Accepted,
    Stale,
    Gap,
}

pub(crate) fn on_device_message(
    slot: &mut Slot,
    id: &NodeIdentifier,
    device_id: &str,
    kind: MessageKind,
    payload: &DecodedPayload,
    now: u64,
    config: &AwareConfig,
) -> Outcome {
    let session = match slot.session_mut() {
        None => {
            debug!(
                "device message without a live parent - dropping. node = {id} device = {device_id}"
            );
            return Outcome::rejected(DropReason::OrphanDevice);
        }
        Some(session) => session,
    };

    if session.phase == SessionPhase::Stale {
        let actions = gated_rebirth(session, id, now, config);
        return Outcome::rejected_with(DropReason::StaleSession, actions);
    }

    match kind {
        MessageKind::Birth => {
            let seq = match payload.seq_u8() {
                Some(seq) => seq,
                None => {
                    warn!(
                        "device birth without a sequence number - discarding. node = {id} device = {device_id}"
                    );
                    return Outcome::rejected(DropReason::MalformedPayload);
                }
            };
            let birth_timestamp = payload.timestamp.unwrap_or(now);
            if session
                .devices
                .insert(
                    device_id.to_string(),
                    DeviceSession::new(seq, birth_timestamp, now),
                )
                .is_some()
            {
                debug!(
                    "duplicate device birth replaces device state. node = {id} device = {device_id}"
                );
            } else {
                debug!("device session established. node = {id} device = {device_id}");
            }
            session.touch(now);
            Outcome::accept()
        }
        MessageKind::Death => {
            if session.devices.remove(device_id).is_none() {
                debug!("death certificate for unknown device. node = {id} device = {device_id}");
            } else {
                debug!("device session ended. node = {id} device = {device_id}");
            }
            session.touch(now);
            Outcome::accept()
        }
        MessageKind::Data | MessageKind::Cmd => {
            let decision = {
                let device = match session.devices.get_mut(device_id) {
                    None => {
                        if kind == MessageKind::Cmd {
                            return Outcome::accept();
                        }
                        debug!(
                            "data for unknown device - requesting rebirth. node = {id} device = {device_id}"
                        );
                        let actions = gated_rebirth(session, id, now, config);
                        return Outcome::rejected_with(DropReason::UnknownDevice, actions);
                    }
                    Some(device) => device,
                };
                let seq = match payload.seq_u8() {
                    Some(seq) => seq,
                    None => {
                        if kind == MessageKind::Cmd {
                            return Outcome::accept();
                        }
                        warn!(
                            "device data without a sequence number - discarding. node = {id} device = {device_id}"
                        );
                        return Outcome::rejected(DropReason::MalformedPayload);
                    }
                };
                if device.phase == SessionPhase::Stale {
                    DeviceDataDecision::Stale
                } else if seq_follows(device.last_seq, seq) {
                    device.last_seq = seq;
                    device.last_activity = now;
                    DeviceDataDecision::Accepted
                } else {
                    warn!(
                        "device sequence gap, expected {expected} got {seq} - device stale. node = {id} device = {device_id}",
                        expected = device.last_seq.wrapping_add(1)
                    );
                    device.phase = SessionPhase::Stale;
                    DeviceDataDecision::Gap
                }
            };
            match decision {
                DeviceDataDecision::Accepted => {
                    session.touch(now);
                    Outcome::accept()
                }
                DeviceDataDecision::Stale => {
                    let actions = gated_rebirth(session, id, now, config);
                    Outcome::rejected_with(DropReason::StaleSession, actions)
                }
                DeviceDataDecision::Gap => {
                    let actions = gated_rebirth(session, id, now, config);
                    Outcome::rejected_with(DropReason::SequenceViolation, actions)
                }
            }
        }
        _ => Outcome::accept(),
    }
}

pub(crate) fn on_connection_lost(
    slot: &mut Slot,
    id: &NodeIdentifier,
    clean: bool,
    now: u64,
) -> Outcome {
    let session = match slot.session_mut() {
        None => return Outcome::accept(),
        Some(session) => session,
    };
    if clean {
        info!("session closed by clean disconnect. node = {id}");
        let mut actions: Vec<Action> = session
            .devices
            .keys()
            .map(|device| Action::SyntheticDeviceDeath {
                id: id.clone(),
                device: device.clone(),
            })
            .collect();
        actions.push(Action::SyntheticNodeDeath {
            id: id.clone(),
            bdseq: session.bdseq,
        });
        *slot = Slot::Absent;
        Outcome::accept_with(actions)
    } else {
        debug!("connection lost, awaiting will or expiry. node = {id}");
        session.phase = SessionPhase::Stale;
        session.touch(now);
        Outcome::accept()
    }
}

pub(crate) fn on_takeover(slot: &mut Slot, id: &NodeIdentifier) -> Outcome {
    if let Some(session) = slot.session_mut() {
        debug!("client started a fresh mqtt session - awaiting rebirth. node = {id}");
        session.phase = SessionPhase::Stale;
    }
    Outcome::accept()
}

pub(crate) fn on_sweep(
    slot: &mut Slot,
    id: &NodeIdentifier,
    now: u64,
    config: &AwareConfig,
) -> Outcome {
    let cutoff = config.staleness_timeout.as_millis() as u64;
    let session = match slot.session_mut() {
        None => return Outcome::accept(),
        Some(session) => session,
    };

    if now.saturating_sub(session.last_activity) >= cutoff {
        info!("session idle past staleness timeout - declaring dead. node = {id}");
        let mut actions: Vec<Action> = session
            .devices
            .keys()
            .map(|device| Action::SyntheticDeviceDeath {
                id: id.clone(),
                device: device.clone(),
            })
            .collect();
        actions.push(Action::SyntheticNodeDeath {
            id: id.clone(),
            bdseq: session.bdseq,
        });
        *slot = Slot::Absent;
        return Outcome::accept_with(actions);
    }

    let expired: Vec<String> = session
        .devices
        .iter()
        .filter(|(_, device)| now.saturating_sub(device.last_activity) >= cutoff)
        .map(|(name, _)| name.clone())
        .collect();
    let mut actions = Vec::new();
    for device in expired {
        info!("device idle past staleness timeout - declaring dead. node = {id} device = {device}");
        session.devices.remove(&device);
        actions.push(Action::SyntheticDeviceDeath {
            id: id.clone(),
            device,
        });
    }
    Outcome::accept_with(actions)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn config() -> AwareConfig {
        AwareConfig::new(Duration::from_secs(60))
    }

    fn id() -> NodeIdentifier {
        NodeIdentifier::new("plant1", "press")
    }

    fn payload(seq: Option<u64>) -> DecodedPayload {
        DecodedPayload {
            timestamp: Some(1_000),
            seq,
            ..Default::default()
        }
    }

    fn birth(slot: &mut Slot, seq: u64) -> Outcome {
        on_node_message(
            slot,
            &id(),
            MessageKind::Birth,
            &payload(Some(seq)),
            "edge1",
            1_000,
            &config(),
        )
    }

    fn data(slot: &mut Slot, seq: u64, now: u64) -> Outcome {
        on_node_message(
            slot,
            &id(),
            MessageKind::Data,
            &payload(Some(seq)),
            "edge1",
            now,
            &config(),
        )
    }

    #[test]
    fn birth_establishes_session() {
        let mut slot = Slot::Absent;
        let outcome = birth(&mut slot, 0);
        assert_eq!(outcome.disposition, Disposition::Accept);
        assert!(outcome.actions.is_empty());
        let session = slot.session_mut().unwrap();
        assert_eq!(session.phase, SessionPhase::Birthed);
        assert_eq!(session.last_seq, 0);
    }

    #[test]
    fn in_order_data_is_accepted() {
        let mut slot = Slot::Absent;
        birth(&mut slot, 0);
        for seq in 1..=5 {
            let outcome = data(&mut slot, seq, 2_000);
            assert_eq!(outcome.disposition, Disposition::Accept);
        }
        assert_eq!(slot.session_mut().unwrap().last_seq, 5);
    }

    #[test]
    fn sequence_wraps_at_255() {
        let mut slot = Slot::Absent;
        birth(&mut slot, 0);
        let session = slot.session_mut().unwrap();
        session.last_seq = 255;
        let outcome = data(&mut slot, 0, 2_000);
        assert_eq!(outcome.disposition, Disposition::Accept);
        assert_eq!(slot.session_mut().unwrap().last_seq, 0);
    }

    #[test]
    fn sequence_gap_demotes_and_requests_rebirth_once() {
        let mut slot = Slot::Absent;
        birth(&mut slot, 0);
        data(&mut slot, 1, 2_000);

        let outcome = data(&mut slot, 3, 3_000);
        assert_eq!(
            outcome.disposition,
            Disposition::Drop(DropReason::SequenceViolation)
        );
        assert_eq!(
            outcome.actions,
            vec![Action::RequestRebirth { id: id() }]
        );
        let session = slot.session_mut().unwrap();
        assert_eq!(session.phase, SessionPhase::Stale);
        assert_eq!(session.last_seq, 1);

        // within the cooldown no further rebirth request is emitted
        let outcome = data(&mut slot, 4, 3_500);
        assert_eq!(
            outcome.disposition,
            Disposition::Drop(DropReason::StaleSession)
        );
        assert!(outcome.actions.is_empty());
    }

    #[test]
    fn rebirth_resumes_stale_session() {
        let mut slot = Slot::Absent;
        birth(&mut slot, 0);
        data(&mut slot, 3, 2_000);
        assert_eq!(slot.session_mut().unwrap().phase, SessionPhase::Stale);

        let outcome = birth(&mut slot, 0);
        assert_eq!(outcome.disposition, Disposition::Accept);
        assert!(outcome.actions.is_empty());
        assert_eq!(slot.session_mut().unwrap().phase, SessionPhase::Birthed);

        let outcome = data(&mut slot, 1, 3_000);
        assert_eq!(outcome.disposition, Disposition::Accept);
    }

    #[test]
    fn duplicate_birth_resets_counters_and_devices() {
        let mut slot = Slot::Absent;
        birth(&mut slot, 0);
        on_device_message(
            &mut slot,
            &id(),
            "valve2",
            MessageKind::Birth,
            &payload(Some(1)),
            2_000,
            &config(),
        );
        data(&mut slot, 1, 2_000);
        assert_eq!(slot.session_mut().unwrap().devices.len(), 1);

        let outcome = birth(&mut slot, 0);
        assert_eq!(outcome.disposition, Disposition::Accept);
        assert!(outcome.actions.is_empty());
        let session = slot.session_mut().unwrap();
        assert_eq!(session.last_seq, 0);
        assert!(session.devices.is_empty());
    }

    #[test]
    fn duplicate_birth_from_other_client_disconnects_prior() {
        let mut slot = Slot::Absent;
        birth(&mut slot, 0);
        let outcome = on_node_message(
            &mut slot,
            &id(),
            MessageKind::Birth,
            &payload(Some(0)),
            "edge1-b",
            2_000,
            &config(),
        );
        assert_eq!(
            outcome.actions,
            vec![Action::Disconnect {
                client_id: "edge1".to_string()
            }]
        );
        assert_eq!(slot.session_mut().unwrap().client_id, "edge1-b");
    }

    #[test]
    fn death_removes_session() {
        let mut slot = Slot::Absent;
        birth(&mut slot, 0);
        let outcome = on_node_message(
            &mut slot,
            &id(),
            MessageKind::Death,
            &payload(None),
            "edge1",
            2_000,
            &config(),
        );
        assert_eq!(outcome.disposition, Disposition::Accept);
        assert!(slot.is_absent());

        // data after death is unknown-session data
        let outcome = data(&mut slot, 1, 3_000);
        assert_eq!(
            outcome.disposition,
            Disposition::Drop(DropReason::UnknownSession)
        );
        assert_eq!(outcome.actions.len(), 1);
    }

    #[test]
    fn stale_death_certificate_is_ignored() {
        let mut slot = Slot::Absent;
        let mut birth_payload = payload(Some(0));
        birth_payload.metrics.push(sparkaware_types::Metric::new_named(
            sparkaware_types::constants::BDSEQ,
            sparkaware_types::MetricValue::Int(1),
        ));
        on_node_message(
            &mut slot,
            &id(),
            MessageKind::Birth,
            &birth_payload,
            "edge1",
            1_000,
            &config(),
        );

        let mut death_payload = payload(None);
        death_payload.metrics.push(sparkaware_types::Metric::new_named(
            sparkaware_types::constants::BDSEQ,
            sparkaware_types::MetricValue::Int(0),
        ));
        let outcome = on_node_message(
            &mut slot,
            &id(),
            MessageKind::Death,
            &death_payload,
            "edge1",
            2_000,
            &config(),
        );
        assert_eq!(
            outcome.disposition,
            Disposition::Drop(DropReason::StaleDeathCertificate)
        );
        assert!(!slot.is_absent());
    }

    #[test]
    fn orphan_device_message_has_no_effect() {
        let mut slot = Slot::Absent;
        let outcome = on_device_message(
            &mut slot,
            &id(),
            "valve2",
            MessageKind::Data,
            &payload(Some(1)),
            1_000,
            &config(),
        );
        assert_eq!(
            outcome.disposition,
            Disposition::Drop(DropReason::OrphanDevice)
        );
        assert!(outcome.actions.is_empty());
        assert!(slot.is_absent());
    }

    #[test]
    fn unknown_device_data_requests_rebirth() {
        let mut slot = Slot::Absent;
        birth(&mut slot, 0);
        let outcome = on_device_message(
            &mut slot,
            &id(),
            "valve2",
            MessageKind::Data,
            &payload(Some(1)),
            2_000,
            &config(),
        );
        assert_eq!(
            outcome.disposition,
            Disposition::Drop(DropReason::UnknownDevice)
        );
        assert_eq!(outcome.actions.len(), 1);
    }

    #[test]
    fn device_sequencing_is_independent() {
        let mut slot = Slot::Absent;
        birth(&mut slot, 0);
        on_device_message(
            &mut slot,
            &id(),
            "valve2",
            MessageKind::Birth,
            &payload(Some(3)),
            2_000,
            &config(),
        );
        data(&mut slot, 1, 2_000);

        let outcome = on_device_message(
            &mut slot,
            &id(),
            "valve2",
            MessageKind::Data,
            &payload(Some(4)),
            3_000,
            &config(),
        );
        assert_eq!(outcome.disposition, Disposition::Accept);

        // a device gap stales the device and requests a node rebirth
        let outcome = on_device_message(
            &mut slot,
            &id(),
            "valve2",
            MessageKind::Data,
            &payload(Some(6)),
            4_000,
            &config(),
        );
        assert_eq!(
            outcome.disposition,
            Disposition::Drop(DropReason::SequenceViolation)
        );
        assert_eq!(outcome.actions.len(), 1);

        // the node itself is still in order
        let session = slot.session_mut().unwrap();
        assert_eq!(session.phase, SessionPhase::Birthed);
        assert_eq!(session.last_seq, 1);
    }

    #[test]
    fn commands_without_seq_pass_through() {
        let mut slot = Slot::Absent;
        birth(&mut slot, 0);
        let outcome = on_node_message(
            &mut slot,
            &id(),
            MessageKind::Cmd,
            &payload(None),
            "scada1",
            2_000,
            &config(),
        );
        assert_eq!(outcome.disposition, Disposition::Accept);
        assert_eq!(slot.session_mut().unwrap().last_seq, 0);
    }

    #[test]
    fn clean_disconnect_emits_synthetic_deaths() {
        let mut slot = Slot::Absent;
        birth(&mut slot, 0);
        on_device_message(
            &mut slot,
            &id(),
            "valve2",
            MessageKind::Birth,
            &payload(Some(1)),
            2_000,
            &config(),
        );

        let outcome = on_connection_lost(&mut slot, &id(), true, 3_000);
        assert!(slot.is_absent());
        assert_eq!(outcome.actions.len(), 2);
        assert!(outcome
            .actions
            .iter()
            .any(|a| matches!(a, Action::SyntheticNodeDeath { .. })));
        assert!(outcome.actions.iter().any(|a| matches!(
            a,
            Action::SyntheticDeviceDeath { device, .. } if device == "valve2"
        )));
    }

    #[test]
    fn unclean_disconnect_demotes_to_stale() {
        let mut slot = Slot::Absent;
        birth(&mut slot, 0);
        let outcome = on_connection_lost(&mut slot, &id(), false, 3_000);
        assert!(outcome.actions.is_empty());
        assert_eq!(slot.session_mut().unwrap().phase, SessionPhase::Stale);
    }

    #[test]
    fn sweep_expires_idle_node() {
        let mut slot = Slot::Absent;
        birth(&mut slot, 0);
        let cutoff = config().staleness_timeout.as_millis() as u64;

        let outcome = on_sweep(&mut slot, &id(), 1_000 + cutoff, &config());
        assert!(slot.is_absent());
        assert_eq!(outcome.actions.len(), 1);
        assert!(matches!(
            outcome.actions[0],
            Action::SyntheticNodeDeath { .. }
        ));
    }

    #[test]
    fn sweep_expires_idle_device_under_live_node() {
        let mut slot = Slot::Absent;
        birth(&mut slot, 0);
        on_device_message(
            &mut slot,
            &id(),
            "valve2",
            MessageKind::Birth,
            &payload(Some(1)),
            1_000,
            &config(),
        );
        let cutoff = config().staleness_timeout.as_millis() as u64;
        // keep the node alive but let the device idle out
        data(&mut slot, 1, 1_000 + cutoff - 1);

        let outcome = on_sweep(&mut slot, &id(), 1_000 + cutoff, &config());
        let session = slot.session_mut().unwrap();
        assert_eq!(session.phase, SessionPhase::Birthed);
        assert!(session.devices.is_empty());
        assert_eq!(outcome.actions.len(), 1);
        assert!(matches!(
            outcome.actions[0],
            Action::SyntheticDeviceDeath { .. }
        ));
    }
}
