use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::quest::Quest;
use crate::config::EngineConfig;

/// The persisted subset of engine state. Duration counters are not included
/// and restart at zero with the process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerSnapshot {
    pub hp: f64,
    pub xp: f64,
    pub level: u32,
    pub happiness: f64,
    pub quest_streak: i32,
    pub active: Vec<Quest>,
    pub available: Vec<Quest>,
}

impl PlayerSnapshot {
    /// A brand-new player at full health.
    pub fn fresh(config: &EngineConfig) -> Self {
        Self {
            hp: config.max_hp,
            ..Self::default()
        }
    }
}

impl Default for PlayerSnapshot {
    fn default() -> Self {
        Self {
            hp: EngineConfig::default().max_hp,
            xp: 0.0,
            level: 1,
            happiness: 100.0,
            quest_streak: 0,
            active: Vec::new(),
            available: Vec::new(),
        }
    }
}

/// Receives a snapshot after every state change. Must not block.
pub trait SnapshotSink: Send + Sync {
    fn submit(&self, snapshot: PlayerSnapshot);
}

pub type SharedSnapshotSink = Arc<dyn SnapshotSink>;

/// Drops snapshots; used when nothing should be persisted.
pub struct DiscardSnapshots;

impl SnapshotSink for DiscardSnapshots {
    fn submit(&self, _snapshot: PlayerSnapshot) {}
}
