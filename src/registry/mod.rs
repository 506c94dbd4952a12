//! Authoritative in-memory set of fleet nodes.
//!
//! Records are created by explicit registration, relayed sightings or
//! core-node reconciliation, then overlaid with live presence. Nothing is
//! removed without an explicit [`NodeRegistry::remove`]. Every change is
//! published as a [`RegistrySnapshot`] on a `watch` channel so a presentation
//! layer can refresh without polling.
mod types;

pub use types::{
    ConnectionState, CoreNodeSpec, FleetNodeStatus, NodeHints, NodeRecord, NodeSource, NodeType,
    ObservedNode, PresenceMap, PresenceRecord, PresenceState, RegistrySnapshot,
};

use chrono::{DateTime, Utc};
use log::{debug, info};
use std::collections::BTreeMap;
use tokio::sync::watch;

/// Single-writer node registry.
///
/// Mutating calls take `&mut self`; readers either borrow through
/// [`NodeRegistry::get`]/[`NodeRegistry::snapshot`] or hold a receiver from
/// [`NodeRegistry::subscribe`].
#[derive(Debug)]
pub struct NodeRegistry {
    nodes: BTreeMap<String, NodeRecord>,
    core: Vec<CoreNodeSpec>,
    revision: u64,
    publisher: watch::Sender<RegistrySnapshot>,
}

impl Default for NodeRegistry {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl NodeRegistry {
    /// Creates an empty registry that will guarantee the given core nodes on
    /// every [`NodeRegistry::ensure_core_nodes`] pass.
    pub fn new(core: Vec<CoreNodeSpec>) -> Self {
        let (publisher, _) = watch::channel(RegistrySnapshot::default());
        Self {
            nodes: BTreeMap::new(),
            core,
            revision: 0,
            publisher,
        }
    }

    /// Creates or overwrites the record for `id`.
    ///
    /// Identity fields (label, hints, capabilities) are last-write-wins. Live
    /// fields such as connection state and timestamps survive an overwrite so
    /// re-claiming a node doesn't make it look offline. A blank id is ignored.
    pub fn register<I, S>(&mut self, id: &str, label: &str, hints: NodeHints, capabilities: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        if id.trim().is_empty() {
            debug!("Ignoring registration without an id");
            return;
        }

        let capabilities = capabilities.into_iter().map(Into::into).collect();
        match self.nodes.get_mut(id) {
            Some(node) => {
                debug!("Overwriting node {id}");
                node.label = label.to_owned();
                node.hostname = hints.hostname;
                node.address = hints.address;
                node.hardware_address = hints.hardware_address;
                node.node_type = hints.node_type;
                node.capabilities = capabilities;
                node.source = NodeSource::Claimed;
            }
            None => {
                info!("Registered node {id} ({label})");
                let mut node = NodeRecord::new(id, label, hints, NodeSource::Claimed);
                node.capabilities = capabilities;
                self.nodes.insert(id.to_owned(), node);
            }
        }
        self.publish();
    }

    /// Merges a relayed sighting. Unknown ids are added as observed nodes;
    /// known ones gain any missing hints and capabilities.
    pub fn observe(&mut self, sighting: ObservedNode) {
        if sighting.id.trim().is_empty() {
            debug!("Ignoring sighting without an id");
            return;
        }

        let node = self.nodes.entry(sighting.id.clone()).or_insert_with(|| {
            debug!(
                "Observed new node {} via {}",
                sighting.id,
                sighting.via.as_deref().unwrap_or("direct")
            );
            let label = sighting.label.as_deref().unwrap_or(&sighting.id);
            NodeRecord::new(&sighting.id, label, NodeHints::default(), NodeSource::Observed)
        });

        fill(&mut node.hostname, sighting.hints.hostname);
        fill(&mut node.address, sighting.hints.address);
        fill(&mut node.hardware_address, sighting.hints.hardware_address);
        if node.node_type == NodeType::Unknown {
            node.node_type = sighting.hints.node_type;
        }
        node.capabilities.extend(sighting.capabilities);
        if let Some(seen) = sighting.seen_at {
            node.last_seen = node.last_seen.max(Some(seen));
        }
        self.publish();
    }

    /// Overlays live presence on every known node.
    ///
    /// Nodes missing from `presence` keep their last known state. Every
    /// pending connecting flag is cleared, whatever the outcome.
    /// Returns whether anything changed.
    pub fn update_from_presence(&mut self, presence: &PresenceMap) -> bool {
        let mut changed = false;
        for node in self.nodes.values_mut() {
            if node.connecting {
                node.connecting = false;
                changed = true;
            }
            let Some(record) = presence.get(&node.id) else {
                continue;
            };
            changed |= apply_presence(node, record);
        }
        if changed {
            self.publish();
        }
        changed
    }

    /// Sets or clears the transient connecting flag. Unknown ids are ignored.
    pub fn set_connecting(&mut self, id: &str, connecting: bool) -> bool {
        let Some(node) = self.nodes.get_mut(id) else {
            debug!("set_connecting on unknown node {id}");
            return false;
        };
        if node.connecting == connecting {
            return false;
        }
        node.connecting = connecting;
        self.publish();
        true
    }

    /// Makes sure every configured core node exists.
    ///
    /// Missing nodes are created with state taken from `presence`, or from
    /// `fleet` reachability when presence has nothing. Existing records are
    /// never touched, so a second pass with the same inputs changes nothing.
    pub fn ensure_core_nodes(&mut self, presence: &PresenceMap, fleet: &[FleetNodeStatus]) -> bool {
        let mut restored = Vec::new();
        for baseline in &self.core {
            if self.nodes.contains_key(&baseline.id) {
                continue;
            }

            let hints = NodeHints {
                node_type: baseline.node_type,
                ..NodeHints::default()
            };
            let mut node = NodeRecord::new(&baseline.id, &baseline.label, hints, NodeSource::Core);
            node.capabilities = baseline.capabilities.iter().cloned().collect();

            if let Some(record) = presence.get(&baseline.id) {
                apply_presence(&mut node, record);
            } else if let Some(status) = baseline.find_status(fleet) {
                if status.reachable {
                    node.state = ConnectionState::Online;
                } else {
                    node.last_error = status
                        .last_action
                        .as_ref()
                        .map(|action| format!("unreachable after {action}"));
                }
            }

            restored.push(baseline.id.clone());
            self.nodes.insert(baseline.id.clone(), node);
        }

        if restored.is_empty() {
            return false;
        }
        info!("Restored core nodes: {}", restored.join(", "));
        self.publish();
        true
    }

    /// Removes a node. This is the only way records leave the registry.
    pub fn remove(&mut self, id: &str) -> Option<NodeRecord> {
        let removed = self.nodes.remove(id)?;
        info!("Removed node {id}");
        self.publish();
        Some(removed)
    }

    /// Records a heartbeat. Also counts as a sighting.
    pub fn heartbeat(&mut self, id: &str, at: DateTime<Utc>) -> bool {
        let Some(node) = self.nodes.get_mut(id) else {
            return false;
        };
        node.last_heartbeat = Some(at);
        node.last_seen = node.last_seen.max(Some(at));
        self.publish();
        true
    }

    pub fn record_error(&mut self, id: &str, message: &str) -> bool {
        let Some(node) = self.nodes.get_mut(id) else {
            return false;
        };
        node.state = ConnectionState::Error;
        node.connecting = false;
        node.last_error = Some(message.to_owned());
        self.publish();
        true
    }

    pub fn get(&self, id: &str) -> Option<&NodeRecord> {
        self.nodes.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// True when `id` is one of the configured core nodes.
    pub fn is_core(&self, id: &str) -> bool {
        self.core.iter().any(|baseline| baseline.id == id)
    }

    /// Nodes sorted by id.
    pub fn snapshot(&self) -> Vec<NodeRecord> {
        self.nodes.values().cloned().collect()
    }

    /// Receiver that sees a fresh snapshot after every change.
    pub fn subscribe(&self) -> watch::Receiver<RegistrySnapshot> {
        self.publisher.subscribe()
    }

    fn publish(&mut self) {
        self.revision += 1;
        let snapshot = RegistrySnapshot {
            revision: self.revision,
            nodes: self.snapshot(),
        };
        self.publisher.send_replace(snapshot);
    }
}

fn fill(slot: &mut Option<String>, value: Option<String>) {
    if slot.is_none() {
        *slot = value.filter(|v| !v.trim().is_empty());
    }
}

/// Copies presence state and hints onto `node`. Returns whether anything
/// changed.
fn apply_presence(node: &mut NodeRecord, record: &PresenceRecord) -> bool {
    let before = node.clone();

    node.state = record.state.connection_state();
    match node.state {
        ConnectionState::Error => {
            if record.last_error.is_some() {
                node.last_error.clone_from(&record.last_error);
            }
        }
        ConnectionState::Online => node.last_error = None,
        ConnectionState::Offline | ConnectionState::Connecting => {}
    }

    if let Some(ip) = record.ip.as_ref().filter(|v| !v.trim().is_empty()) {
        node.address = Some(ip.clone());
    }
    if let Some(mac) = record.mac.as_ref().filter(|v| !v.trim().is_empty()) {
        node.hardware_address = Some(mac.clone());
    }
    if let Some(hostname) = record.hostname.as_ref().filter(|v| !v.trim().is_empty()) {
        node.hostname = Some(hostname.clone());
    }
    if let Some(seen) = record.last_seen() {
        node.last_seen = node.last_seen.max(Some(seen));
    }

    if node.state != before.state {
        debug!("Node {} is now {}", node.id, node.state);
    }
    *node != before
}
