//! Single-slot state machine that follows one device from firmware staging
//! to a live, claimed node.
//!
//! ```text
//! staged -> flashing -> flashed -> discovered -> claimed -> online | offline
//! ```
//!
//! Starting a flash resets the slot unless firmware was just staged. A transition whose precondition
//! isn't met is ignored and reported as `false`.
use crate::registry::{ConnectionState, NodeRecord, NodeRegistry, PresenceMap};
use chrono::{DateTime, Duration, Utc};
use log::{debug, info};
use serde_derive::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlashStage {
    Staged,
    Flashing,
    Flashed,
    Discovered,
    Claimed,
    Online,
    Offline,
}

impl FlashStage {
    /// Stages where a node id is bound to the flow.
    pub const fn is_bound(self) -> bool {
        matches!(self, Self::Claimed | Self::Online | Self::Offline)
    }
}

impl fmt::Display for FlashStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Staged => "staged",
            Self::Flashing => "flashing",
            Self::Flashed => "flashed",
            Self::Discovered => "discovered",
            Self::Claimed => "claimed",
            Self::Online => "online",
            Self::Offline => "offline",
        };
        f.write_str(s)
    }
}

/// Result of the local firmware check.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FirmwarePrep {
    pub ready: bool,
    /// Artifacts that were expected but not found.
    pub missing: Vec<String>,
}

impl FirmwarePrep {
    pub const fn ready() -> Self {
        Self {
            ready: true,
            missing: Vec::new(),
        }
    }

    pub fn missing<I, S>(items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            ready: false,
            missing: items.into_iter().map(Into::into).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageTransition {
    pub stage: FlashStage,
    pub at: DateTime<Utc>,
}

/// The one active flow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlashLifecycleState {
    pub stage: FlashStage,
    /// Device type being flashed.
    pub target: Option<String>,
    pub node_id: Option<String>,
    pub history: Vec<StageTransition>,
}

impl FlashLifecycleState {
    fn start(stage: FlashStage, target: Option<String>) -> Self {
        Self {
            stage,
            target,
            node_id: None,
            history: vec![StageTransition {
                stage,
                at: Utc::now(),
            }],
        }
    }

    fn advance(&mut self, stage: FlashStage) {
        if self.stage == stage {
            return;
        }
        info!("Flash stage {} -> {}", self.stage, stage);
        self.stage = stage;
        self.history.push(StageTransition {
            stage,
            at: Utc::now(),
        });
    }
}

/// Owner of the flash slot.
#[derive(Debug, Default)]
pub struct FlashLifecycle {
    state: Option<FlashLifecycleState>,
}

impl FlashLifecycle {
    pub const fn new() -> Self {
        Self { state: None }
    }

    pub const fn state(&self) -> Option<&FlashLifecycleState> {
        self.state.as_ref()
    }

    pub fn stage(&self) -> Option<FlashStage> {
        self.state.as_ref().map(|s| s.stage)
    }

    pub fn history(&self) -> &[StageTransition] {
        match &self.state {
            Some(state) => &state.history,
            None => &[],
        }
    }

    /// Drops the active flow, if any.
    pub fn clear(&mut self) {
        self.state = None;
    }

    /// Records that firmware is ready locally, replacing any earlier flow.
    /// An unready check leaves the slot alone.
    pub fn mark_staged(&mut self, prep: &FirmwarePrep) -> bool {
        if !prep.ready {
            debug!("Firmware not staged, missing: {}", prep.missing.join(", "));
            return false;
        }
        info!("Firmware staged");
        self.state = Some(FlashLifecycleState::start(FlashStage::Staged, None));
        true
    }

    /// Starts a flash for `target`, resetting whatever was there. A staged
    /// flow carries on, so its history keeps the staging entry.
    pub fn begin_flash(&mut self, target: &str) -> &FlashLifecycleState {
        info!("Flashing {target}");
        let target = Some(target.to_owned()).filter(|t| !t.trim().is_empty());
        let state = match self.state.take() {
            Some(mut staged) if staged.stage == FlashStage::Staged => {
                staged.target = target;
                staged.advance(FlashStage::Flashing);
                staged
            }
            _ => FlashLifecycleState::start(FlashStage::Flashing, target),
        };
        self.state.insert(state)
    }

    /// Flash tool reported completion.
    pub fn mark_flashed(&mut self) -> bool {
        let stage = self.stage();
        match self.state.as_mut() {
            Some(state) if state.stage == FlashStage::Flashing => {
                state.advance(FlashStage::Flashed);
                true
            }
            _ => ignored("mark_flashed", stage),
        }
    }

    /// Binds the only candidate while flashing or flashed. With zero or
    /// several candidates the operator has to pick, so nothing happens.
    pub fn observe_candidates(&mut self, candidates: &[String]) -> bool {
        let stage = self.stage();
        let Some(state) = self.state.as_mut() else {
            return ignored("observe_candidates", stage);
        };
        if !matches!(state.stage, FlashStage::Flashing | FlashStage::Flashed) {
            return ignored("observe_candidates", stage);
        }
        let [candidate] = candidates else {
            debug!("{} discovery candidates, waiting", candidates.len());
            return false;
        };
        state.node_id = Some(candidate.clone());
        state.advance(FlashStage::Discovered);
        true
    }

    /// Operator bound `node_id` to the flow. Allowed from flashing onward,
    /// so a claim may skip discovery entirely.
    pub fn mark_claimed(&mut self, node_id: &str) -> bool {
        let stage = self.stage();
        let node_id = node_id.trim();
        let Some(state) = self.state.as_mut() else {
            return ignored("mark_claimed", stage);
        };
        if node_id.is_empty() || state.stage == FlashStage::Staged {
            return ignored("mark_claimed", stage);
        }
        state.node_id = Some(node_id.to_owned());
        state.advance(FlashStage::Claimed);
        true
    }

    /// Re-derives online/offline for a bound node. Absent presence counts as
    /// offline.
    pub fn update_from_presence(&mut self, presence: &PresenceMap) -> bool {
        let Some(state) = self.state.as_mut() else {
            return false;
        };
        if !state.stage.is_bound() {
            return false;
        }
        let Some(node_id) = state.node_id.as_deref() else {
            return false;
        };

        let online = presence
            .get(node_id)
            .is_some_and(|p| p.state.connection_state() == ConnectionState::Online);
        let next = if online {
            FlashStage::Online
        } else {
            FlashStage::Offline
        };
        let changed = state.stage != next;
        state.advance(next);
        changed
    }
}

fn ignored(op: &str, stage: Option<FlashStage>) -> bool {
    match stage {
        Some(stage) => debug!("Ignoring {op} while {stage}"),
        None => debug!("Ignoring {op} with no active flash"),
    }
    false
}

/// Node ids worth offering the operator as "the device I just flashed":
/// present in the feed, seen within `window` of `now`, not offline, and not
/// already claimed in the registry. Sorted for stable display.
pub fn discovery_candidates(
    registry: &NodeRegistry,
    presence: &PresenceMap,
    now: DateTime<Utc>,
    window: Duration,
) -> Vec<String> {
    let mut ids = presence
        .iter()
        .filter(|(id, _)| !id.trim().is_empty())
        .filter(|(_, p)| p.state.connection_state() != ConnectionState::Offline)
        .filter(|(_, p)| p.last_seen().is_some_and(|seen| now - seen <= window))
        .filter(|(id, _)| !registry.get(id.as_str()).is_some_and(NodeRecord::is_claimed))
        .map(|(id, _)| id.clone())
        .collect::<Vec<_>>();
    ids.sort();
    ids
}
