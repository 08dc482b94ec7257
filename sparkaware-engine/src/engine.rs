use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use log::{debug, info, warn};
use sparkaware_broker::{Broker, BrokerEvent, DynBroker, InboundPublish};
use sparkaware_types::{
    topic::{classify, Classification, MessageKind, SparkplugAddress},
    utils::timestamp,
    DecodedPayload, DynPayloadCodec, PayloadCodec, StatePayload,
};

use crate::{
    actions::{ActionExecutor, Disposition, DropReason},
    config::AwareConfig,
    error::StoreError,
    machine,
    session::{NodeIdentifier, SessionPhase},
    store::SessionStore,
};

const JSON_LOG_TARGET: &str = "sparkaware::json";

/// A read-only snapshot of one device's session.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceView {
    pub name: String,
    pub phase: SessionPhase,
    pub last_seq: u8,
}

/// A read-only snapshot of one node's session.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionView {
    pub phase: SessionPhase,
    pub last_seq: u8,
    pub bdseq: Option<u8>,
    pub birth_timestamp: u64,
    pub client_id: String,
    pub devices: Vec<DeviceView>,
}

/// The Sparkplug session-state engine.
///
/// [process_event](Engine::process_event) may be called concurrently from any number of
/// broker threads; transitions for the same identity are serialized internally while
/// unrelated identities proceed in parallel.
pub struct Engine {
    config: AwareConfig,
    store: SessionStore,
    codec: Arc<DynPayloadCodec>,
    executor: ActionExecutor,
    accepting: AtomicBool,
}

impl Engine {
    pub fn new<B, C>(broker: B, codec: C, config: AwareConfig) -> Self
    where
        B: Broker + Send + Sync + 'static,
        C: PayloadCodec + 'static,
    {
        Self::from_parts(Arc::new(broker), Arc::new(codec), config)
    }

    pub(crate) fn from_parts(
        broker: Arc<DynBroker>,
        codec: Arc<DynPayloadCodec>,
        config: AwareConfig,
    ) -> Self {
        Self {
            store: SessionStore::new(config.lock_timeout),
            executor: ActionExecutor::new(broker, codec.clone(), &config),
            codec,
            config,
            accepting: AtomicBool::new(true),
        }
    }

    /// Stop accepting new events. In-flight transitions are allowed to complete.
    pub fn begin_shutdown(&self) {
        if self.accepting.swap(false, Ordering::SeqCst) {
            info!("sparkplug session engine shutting down");
        }
    }

    pub fn is_accepting(&self) -> bool {
        self.accepting.load(Ordering::SeqCst)
    }

    /// The number of identities currently tracked.
    pub fn session_count(&self) -> usize {
        self.store.len()
    }

    /// Snapshot a single session, if it is live.
    pub async fn inspect(&self, group: &str, node: &str) -> Option<SessionView> {
        let id = NodeIdentifier::new(group, node);
        self.store
            .with_slot(&id, |slot| {
                slot.session_mut().map(|session| SessionView {
                    phase: session.phase,
                    last_seq: session.last_seq,
                    bdseq: session.bdseq,
                    birth_timestamp: session.birth_timestamp,
                    client_id: session.client_id.clone(),
                    devices: session
                        .devices
                        .iter()
                        .map(|(name, device)| DeviceView {
                            name: name.clone(),
                            phase: device.phase,
                            last_seq: device.last_seq,
                        })
                        .collect(),
                })
            })
            .await
            .ok()
            .flatten()
    }

    /// Process one broker event and decide what the broker should do with it.
    pub async fn process_event(&self, event: BrokerEvent) -> Disposition {
        if !self.accepting.load(Ordering::SeqCst) {
            debug!("event rejected, engine is shutting down");
            return Disposition::Drop(DropReason::ShuttingDown);
        }
        match event {
            BrokerEvent::Publish(publish) => self.process_publish(publish).await,
            BrokerEvent::Connect {
                client_id,
                clean_start,
            } => {
                if clean_start {
                    self.process_takeover(&client_id).await;
                }
                Disposition::Accept
            }
            BrokerEvent::Disconnect { client_id, clean } => {
                self.process_connection_lost(&client_id, clean).await;
                Disposition::Accept
            }
            BrokerEvent::SessionExpiry { client_id } => {
                self.process_connection_lost(&client_id, true).await;
                Disposition::Accept
            }
        }
    }

    async fn process_publish(&self, publish: InboundPublish) -> Disposition {
        if !self.config.enabled {
            return Disposition::Passthrough;
        }
        match classify(&publish.topic) {
            Classification::NotSparkplug => Disposition::Passthrough,
            Classification::Unsupported(address) => {
                debug!(
                    "ignoring unsupported sparkplug message type {} on {}",
                    address.message_type.as_str(),
                    publish.topic
                );
                Disposition::Passthrough
            }
            Classification::State { host_id } => {
                match StatePayload::from_json(&publish.payload) {
                    Ok(state) => debug!("host application state. host = {host_id} {state:?}"),
                    Err(e) => warn!("undecodable state message. host = {host_id}: {e}"),
                }
                Disposition::Passthrough
            }
            Classification::Node(address) => self.process_node_publish(address, publish).await,
            Classification::Device(address) => self.process_device_publish(address, publish).await,
        }
    }

    fn decode(&self, publish: &InboundPublish) -> Option<DecodedPayload> {
        match self.codec.decode(&publish.payload) {
            Ok(payload) => {
                if self.config.json_log {
                    self.log_payload_json(publish, &payload);
                }
                Some(payload)
            }
            Err(e) => {
                warn!("undecodable payload on {}: {e}", publish.topic);
                None
            }
        }
    }

    fn log_payload_json(&self, publish: &InboundPublish, payload: &DecodedPayload) {
        match serde_json::to_string_pretty(payload) {
            Ok(json) => log::info!(
                target: JSON_LOG_TARGET,
                "sparkplug message: client_id={}, topic={} payload={json}",
                publish.client_id,
                publish.topic
            ),
            Err(e) => debug!("unable to render payload as json: {e}"),
        }
    }

    async fn process_node_publish(
        &self,
        address: SparkplugAddress,
        publish: InboundPublish,
    ) -> Disposition {
        let payload = match self.decode(&publish) {
            Some(payload) => payload,
            None => return Disposition::Drop(DropReason::MalformedPayload),
        };
        let id = NodeIdentifier::new(address.group_id, address.node_id);
        let kind = address.message_type.kind();
        let now = timestamp();

        let outcome = match self
            .store
            .with_slot(&id, |slot| {
                machine::on_node_message(
                    slot,
                    &id,
                    kind,
                    &payload,
                    &publish.client_id,
                    now,
                    &self.config,
                )
            })
            .await
        {
            Ok(outcome) => outcome,
            Err(StoreError::Contended) => {
                warn!("dropping event, session lock contended. node = {id}");
                return Disposition::Drop(DropReason::Contended);
            }
        };

        let mut disposition = outcome.disposition;
        let mut actions = outcome.actions;
        if disposition == Disposition::Accept {
            match kind {
                MessageKind::Birth => {
                    self.store.bind_client(&publish.client_id, id.clone());
                    if let Some(action) = self.republish_birth_action(&publish) {
                        actions.push(action);
                    }
                }
                MessageKind::Death => {
                    if self.config.refresh_death_timestamps {
                        disposition = self.refresh_death_timestamp(&publish, payload, now);
                    }
                }
                _ => {}
            }
        }

        self.executor.execute(actions).await;
        disposition
    }

    async fn process_device_publish(
        &self,
        address: SparkplugAddress,
        publish: InboundPublish,
    ) -> Disposition {
        let payload = match self.decode(&publish) {
            Some(payload) => payload,
            None => return Disposition::Drop(DropReason::MalformedPayload),
        };
        let device_id = match &address.device_id {
            Some(device_id) => device_id.clone(),
            None => return Disposition::Passthrough,
        };
        let id = NodeIdentifier::new(address.group_id, address.node_id);
        let kind = address.message_type.kind();
        let now = timestamp();

        let outcome = match self
            .store
            .with_slot(&id, |slot| {
                machine::on_device_message(slot, &id, &device_id, kind, &payload, now, &self.config)
            })
            .await
        {
            Ok(outcome) => outcome,
            Err(StoreError::Contended) => {
                warn!("dropping event, session lock contended. node = {id}");
                return Disposition::Drop(DropReason::Contended);
            }
        };

        let mut actions = outcome.actions;
        if outcome.disposition == Disposition::Accept && kind == MessageKind::Birth {
            if let Some(action) = self.republish_birth_action(&publish) {
                actions.push(action);
            }
        }

        self.executor.execute(actions).await;
        outcome.disposition
    }

    fn republish_birth_action(&self, publish: &InboundPublish) -> Option<crate::actions::Action> {
        self.config.sys_topic.as_ref()?;
        Some(crate::actions::Action::RepublishBirth {
            origin_topic: publish.topic.clone(),
            payload: publish.payload.to_vec(),
        })
    }

    /// Re-stamp an accepted death certificate with the arrival time. Death certificates
    /// are registered as MQTT wills at connect time, so the timestamp they carry
    /// predates the actual disconnect.
    fn refresh_death_timestamp(
        &self,
        publish: &InboundPublish,
        mut payload: DecodedPayload,
        now: u64,
    ) -> Disposition {
        payload.timestamp = Some(now);
        match self.codec.encode(&payload) {
            Ok(bytes) => {
                debug!("refreshed death certificate timestamp on {}", publish.topic);
                Disposition::Rewrite(bytes)
            }
            Err(e) => {
                warn!(
                    "unable to re-encode death certificate on {}: {e}",
                    publish.topic
                );
                Disposition::Accept
            }
        }
    }

    async fn process_connection_lost(&self, client_id: &str, clean: bool) {
        let now = timestamp();
        for id in self.store.identities_for_client(client_id) {
            match self
                .store
                .with_slot(&id, |slot| machine::on_connection_lost(slot, &id, clean, now))
                .await
            {
                Ok(outcome) => self.executor.execute(outcome.actions).await,
                Err(StoreError::Contended) => {
                    warn!("unable to apply disconnect, session lock contended. node = {id}")
                }
            }
        }
    }

    async fn process_takeover(&self, client_id: &str) {
        for id in self.store.identities_for_client(client_id) {
            match self
                .store
                .with_slot(&id, |slot| machine::on_takeover(slot, &id))
                .await
            {
                Ok(outcome) => self.executor.execute(outcome.actions).await,
                Err(StoreError::Contended) => {
                    warn!("unable to apply session takeover, session lock contended. node = {id}")
                }
            }
        }
    }

    /// One pass of the staleness sweep.
    ///
    /// Candidates are gathered from a best effort snapshot and every expiry decision is
    /// re-checked under the per-identity lock, so a message racing the sweep wins.
    pub async fn sweep(&self) {
        let now = timestamp();
        let candidates = self
            .store
            .stale_candidates(self.config.staleness_timeout, now);
        for id in candidates {
            match self
                .store
                .with_slot(&id, |slot| machine::on_sweep(slot, &id, now, &self.config))
                .await
            {
                Ok(outcome) => self.executor.execute(outcome.actions).await,
                Err(StoreError::Contended) => {
                    debug!("sweep skipping contended session. node = {id}")
                }
            }
        }
    }
}
