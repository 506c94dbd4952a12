//! Records held and consumed by the node registry.
use chrono::{DateTime, Utc};
use serde_derive::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::fmt;

/// Live presence keyed by node id, as pushed by the presence feed.
pub type PresenceMap = HashMap<String, PresenceRecord>;

/// Kind of fleet member.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NodeType {
    ControlHost,
    Relay,
    RadioPeripheral,
    GpsPeripheral,
    #[default]
    #[serde(other)]
    Unknown,
}

/// Connection state of a node as the operator sees it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    #[default]
    Offline,
    Connecting,
    Online,
    Error,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Offline => "offline",
            Self::Connecting => "connecting",
            Self::Online => "online",
            Self::Error => "error",
        };
        f.write_str(s)
    }
}

/// State string reported by the presence feed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PresenceState {
    #[default]
    Offline,
    Connecting,
    Online,
    Error,
    Scanning,
    Idle,
    #[serde(other)]
    Unknown,
}

impl PresenceState {
    /// Parses a feed state string; unrecognised values become `Unknown`.
    pub fn parse(state: &str) -> Self {
        match state.trim().to_ascii_lowercase().as_str() {
            "offline" => Self::Offline,
            "connecting" => Self::Connecting,
            "online" => Self::Online,
            "error" => Self::Error,
            "scanning" => Self::Scanning,
            "idle" => Self::Idle,
            _ => Self::Unknown,
        }
    }

    /// Scanning and idle nodes are up, just busy or quiet.
    pub const fn connection_state(self) -> ConnectionState {
        match self {
            Self::Online | Self::Scanning | Self::Idle => ConnectionState::Online,
            Self::Connecting => ConnectionState::Connecting,
            Self::Error => ConnectionState::Error,
            Self::Offline | Self::Unknown => ConnectionState::Offline,
        }
    }
}

/// Ephemeral presence for one node. Never persisted by the registry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresenceRecord {
    pub node_id: String,
    pub state: PresenceState,
    pub ip: Option<String>,
    pub mac: Option<String>,
    pub hostname: Option<String>,
    pub last_error: Option<String>,
    /// Epoch milliseconds.
    pub last_seen_ms: Option<i64>,
}

impl PresenceRecord {
    pub fn new(node_id: &str, state: PresenceState) -> Self {
        Self {
            node_id: node_id.to_owned(),
            state,
            ..Self::default()
        }
    }

    pub fn last_seen(&self) -> Option<DateTime<Utc>> {
        self.last_seen_ms.and_then(DateTime::from_timestamp_millis)
    }
}

/// Where a record came from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeSource {
    /// Explicit operator registration.
    #[default]
    Claimed,
    /// Sighting relayed by another node, never claimed.
    Observed,
    /// Restored by core-node reconciliation.
    Core,
}

/// Addressing hints attached to a node.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeHints {
    pub hostname: Option<String>,
    pub address: Option<String>,
    pub hardware_address: Option<String>,
    pub node_type: NodeType,
}

/// A claimed or observed fleet member.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeRecord {
    pub id: String,
    pub label: String,
    pub hostname: Option<String>,
    pub address: Option<String>,
    pub hardware_address: Option<String>,
    pub node_type: NodeType,
    pub capabilities: BTreeSet<String>,
    pub last_seen: Option<DateTime<Utc>>,
    pub last_heartbeat: Option<DateTime<Utc>>,
    pub state: ConnectionState,
    /// Operator-initiated connect in progress; cleared by the next presence update.
    pub connecting: bool,
    pub last_error: Option<String>,
    pub source: NodeSource,
}

impl NodeRecord {
    pub(crate) fn new(id: &str, label: &str, hints: NodeHints, source: NodeSource) -> Self {
        Self {
            id: id.to_owned(),
            label: label.to_owned(),
            hostname: hints.hostname,
            address: hints.address,
            hardware_address: hints.hardware_address,
            node_type: hints.node_type,
            capabilities: BTreeSet::new(),
            last_seen: None,
            last_heartbeat: None,
            state: ConnectionState::Offline,
            connecting: false,
            last_error: None,
            source,
        }
    }

    /// State shown to the operator: `Connecting` while a connect is pending.
    pub const fn connection_state(&self) -> ConnectionState {
        if self.connecting {
            ConnectionState::Connecting
        } else {
            self.state
        }
    }

    pub fn has_capability(&self, capability: &str) -> bool {
        self.capabilities.contains(capability)
    }

    /// True for nodes the operator owns (claimed or core), as opposed to
    /// relayed sightings.
    pub const fn is_claimed(&self) -> bool {
        !matches!(self.source, NodeSource::Observed)
    }
}

/// Node sighting relayed by another fleet member.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObservedNode {
    pub id: String,
    pub label: Option<String>,
    pub hints: NodeHints,
    pub capabilities: Vec<String>,
    pub seen_at: Option<DateTime<Utc>>,
    /// Id of the relay that reported the sighting.
    pub via: Option<String>,
}

/// Well-known baseline node that must always exist.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoreNodeSpec {
    pub id: String,
    pub label: String,
    #[serde(default)]
    pub node_type: NodeType,
    #[serde(default)]
    pub capabilities: Vec<String>,
    /// Other names the fleet-status source may use for this node.
    #[serde(default)]
    pub aliases: Vec<String>,
}

impl CoreNodeSpec {
    fn answers_to(&self, name: &str) -> bool {
        let name = name.trim();
        self.id.eq_ignore_ascii_case(name) || self.aliases.iter().any(|a| a.eq_ignore_ascii_case(name))
    }

    pub(crate) fn find_status<'a>(&self, fleet: &'a [FleetNodeStatus]) -> Option<&'a FleetNodeStatus> {
        fleet.iter().find(|s| self.answers_to(&s.name))
    }
}

/// Descriptor from the fleet-status reconciliation source.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FleetNodeStatus {
    pub name: String,
    pub reachable: bool,
    pub last_action: Option<String>,
}

/// Published view of the registry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RegistrySnapshot {
    /// Increments on every published change.
    pub revision: u64,
    /// Nodes sorted by id.
    pub nodes: Vec<NodeRecord>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn presence_states_map_onto_connection_states() {
        assert_eq!(PresenceState::parse("Scanning").connection_state(), ConnectionState::Online);
        assert_eq!(PresenceState::parse("idle").connection_state(), ConnectionState::Online);
        assert_eq!(PresenceState::parse("error").connection_state(), ConnectionState::Error);
        assert_eq!(PresenceState::parse("rebooting"), PresenceState::Unknown);
        assert_eq!(PresenceState::Unknown.connection_state(), ConnectionState::Offline);
    }

    #[test]
    fn presence_deserializes_unknown_state() {
        let record: PresenceRecord =
            serde_json::from_str(r#"{"node_id":"n1","state":"warming-up","ip":null,"mac":null,"hostname":null,"last_error":null,"last_seen_ms":1700000000000}"#)
                .unwrap();
        assert_eq!(record.state, PresenceState::Unknown);
        assert_eq!(record.last_seen().unwrap().timestamp(), 1_700_000_000);
    }

    #[test]
    fn core_spec_matches_aliases_case_insensitively() {
        let baseline = CoreNodeSpec {
            id: "exec-pi".to_owned(),
            label: "Control Host".to_owned(),
            node_type: NodeType::ControlHost,
            capabilities: vec![],
            aliases: vec!["pi-aux".to_owned()],
        };
        let fleet = vec![FleetNodeStatus {
            name: "PI-AUX".to_owned(),
            reachable: true,
            last_action: None,
        }];
        assert!(baseline.find_status(&fleet).is_some());
    }
}
