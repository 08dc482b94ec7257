use std::{
    collections::{HashMap, HashSet},
    sync::{Arc, Mutex as StdMutex},
    time::Duration,
};

use tokio::{sync::Mutex as AsyncMutex, time::timeout};

use crate::{
    error::StoreError,
    machine::Slot,
    session::NodeIdentifier,
};

/// Maps broker client ids to the Sparkplug identities they birthed, so connection level
/// events can be routed to the affected sessions.
#[derive(Default)]
struct ClientIndex {
    forward: HashMap<NodeIdentifier, String>,
    reverse: HashMap<String, HashSet<NodeIdentifier>>,
}

impl ClientIndex {
    fn bind(&mut self, client_id: &str, id: NodeIdentifier) {
        if let Some(previous) = self.forward.insert(id.clone(), client_id.to_string()) {
            if let Some(ids) = self.reverse.get_mut(&previous) {
                ids.remove(&id);
                if ids.is_empty() {
                    self.reverse.remove(&previous);
                }
            }
        }
        self.reverse
            .entry(client_id.to_string())
            .or_default()
            .insert(id);
    }

    fn unbind(&mut self, id: &NodeIdentifier) {
        if let Some(client) = self.forward.remove(id) {
            if let Some(ids) = self.reverse.get_mut(&client) {
                ids.remove(id);
                if ids.is_empty() {
                    self.reverse.remove(&client);
                }
            }
        }
    }

    fn identities(&self, client_id: &str) -> Vec<NodeIdentifier> {
        self.reverse
            .get(client_id)
            .map(|ids| ids.iter().cloned().collect())
            .unwrap_or_default()
    }
}

/// The authoritative table of session records.
///
/// Transitions for one identity are serialized through a per-identity async mutex; the
/// outer index lock is only ever held to look a slot up, never across a transition, so
/// unrelated identities never contend.
pub(crate) struct SessionStore {
    slots: StdMutex<HashMap<NodeIdentifier, Arc<AsyncMutex<Slot>>>>,
    clients: StdMutex<ClientIndex>,
    lock_timeout: Duration,
}

impl SessionStore {
    pub(crate) fn new(lock_timeout: Duration) -> Self {
        Self {
            slots: StdMutex::new(HashMap::new()),
            clients: StdMutex::new(ClientIndex::default()),
            lock_timeout,
        }
    }

    fn slot(&self, id: &NodeIdentifier) -> Arc<AsyncMutex<Slot>> {
        let mut slots = self.slots.lock().unwrap();
        slots
            .entry(id.clone())
            .or_insert_with(|| Arc::new(AsyncMutex::new(Slot::Absent)))
            .clone()
    }

    /// Run `f` with exclusive access to the identity's slot.
    ///
    /// Acquisition waits up to the configured deadline and is retried once before the
    /// event is given up on, so a stuck peer can never block a broker thread
    /// indefinitely. A slot left `Absent` by `f` is detached from the table before the
    /// lock is released.
    pub(crate) async fn with_slot<F, R>(&self, id: &NodeIdentifier, f: F) -> Result<R, StoreError>
    where
        F: FnOnce(&mut Slot) -> R,
    {
        let slot = self.slot(id);
        let mut guard = match timeout(self.lock_timeout, slot.lock()).await {
            Ok(guard) => guard,
            Err(_) => match timeout(self.lock_timeout, slot.lock()).await {
                Ok(guard) => guard,
                Err(_) => return Err(StoreError::Contended),
            },
        };
        let result = f(&mut guard);
        if guard.is_absent() {
            self.detach(id, &slot);
        }
        Ok(result)
    }

    /// Detach a slot from the table, provided it has not been replaced concurrently.
    fn detach(&self, id: &NodeIdentifier, slot: &Arc<AsyncMutex<Slot>>) {
        let mut slots = self.slots.lock().unwrap();
        if let Some(existing) = slots.get(id) {
            if Arc::ptr_eq(existing, slot) {
                slots.remove(id);
            }
        }
        drop(slots);
        self.clients.lock().unwrap().unbind(id);
    }

    pub(crate) fn bind_client(&self, client_id: &str, id: NodeIdentifier) {
        self.clients.lock().unwrap().bind(client_id, id);
    }

    pub(crate) fn identities_for_client(&self, client_id: &str) -> Vec<NodeIdentifier> {
        self.clients.lock().unwrap().identities(client_id)
    }

    pub(crate) fn len(&self) -> usize {
        self.slots.lock().unwrap().len()
    }

    /// Identities whose node or devices have been quiet since before the cutoff.
    ///
    /// Best effort snapshot: a slot that is locked is mid-mutation and skipped; the next
    /// sweep pass will see it. Candidates are re-checked under the per-identity lock
    /// before any expiry decision is made.
    pub(crate) fn stale_candidates(&self, older_than: Duration, now: u64) -> Vec<NodeIdentifier> {
        let entries: Vec<(NodeIdentifier, Arc<AsyncMutex<Slot>>)> = {
            let slots = self.slots.lock().unwrap();
            slots
                .iter()
                .map(|(id, slot)| (id.clone(), slot.clone()))
                .collect()
        };
        let cutoff = older_than.as_millis() as u64;
        let mut candidates = Vec::new();
        for (id, slot) in entries {
            let guard = match slot.try_lock() {
                Ok(guard) => guard,
                Err(_) => continue,
            };
            if let Slot::Present(session) = &*guard {
                let node_idle = now.saturating_sub(session.last_activity) >= cutoff;
                let device_idle = session
                    .devices
                    .values()
                    .any(|device| now.saturating_sub(device.last_activity) >= cutoff);
                if node_idle || device_idle {
                    candidates.push(id);
                }
            }
        }
        candidates
    }
}
