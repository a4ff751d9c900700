//! Outbound activity notifications.
//!
//! The engine reports behaviour and progress here without waiting on the
//! result. Implementations must return immediately.

mod journal;

use std::{collections::VecDeque, fmt, sync::Arc};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::engine::QuestKind;

pub use journal::{ActivityJournal, DailyActivity, JournalHandle};

pub type SharedActivityLog = Arc<dyn ActivityLogger>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HpReason {
    BadPosture,
    GoodPosture,
    Idle,
    Overwork,
    QuestReward,
}

impl HpReason {
    pub fn as_str(self) -> &'static str {
        match self {
            HpReason::BadPosture => "bad_posture",
            HpReason::GoodPosture => "good_posture",
            HpReason::Idle => "idle",
            HpReason::Overwork => "overwork",
            HpReason::QuestReward => "quest_reward",
        }
    }
}

impl fmt::Display for HpReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ActivityEvent {
    TurtleNeck {
        duration_secs: f64,
    },
    EyeClosed,
    QuestAccepted {
        name: String,
        kind: QuestKind,
        target_duration: f64,
        reward_xp: u32,
    },
    QuestCompleted {
        name: String,
        kind: QuestKind,
        duration: f64,
        reward_xp: u32,
    },
    HpChanged {
        before: f64,
        after: f64,
        reason: HpReason,
        delta: f64,
    },
}

pub trait ActivityLogger: Send + Sync {
    fn record(&self, event: ActivityEvent);

    fn log_turtle_neck(&self, duration_secs: f64) {
        self.record(ActivityEvent::TurtleNeck { duration_secs });
    }

    fn log_eye_closed(&self) {
        self.record(ActivityEvent::EyeClosed);
    }

    fn log_quest_accepted(
        &self,
        name: &str,
        kind: QuestKind,
        target_duration: f64,
        reward_xp: u32,
    ) {
        self.record(ActivityEvent::QuestAccepted {
            name: name.to_string(),
            kind,
            target_duration,
            reward_xp,
        });
    }

    fn log_quest_completed(
        &self,
        name: &str,
        kind: QuestKind,
        duration: f64,
        reward_xp: u32,
    ) {
        self.record(ActivityEvent::QuestCompleted {
            name: name.to_string(),
            kind,
            duration,
            reward_xp,
        });
    }

    fn log_hp_change(&self, before: f64, after: f64, reason: HpReason, delta: f64) {
        self.record(ActivityEvent::HpChanged {
            before,
            after,
            reason,
            delta,
        });
    }
}

/// Discards everything.
pub struct NullActivityLog;

impl ActivityLogger for NullActivityLog {
    fn record(&self, _event: ActivityEvent) {}
}

/// Keeps the most recent events in memory.
pub struct MemoryActivityLog {
    capacity: usize,
    events: Mutex<VecDeque<ActivityEvent>>,
}

impl MemoryActivityLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            events: Mutex::new(VecDeque::with_capacity(capacity.min(1024))),
        }
    }

    pub fn events(&self) -> Vec<ActivityEvent> {
        self.events.lock().iter().cloned().collect()
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

impl ActivityLogger for MemoryActivityLog {
    fn record(&self, event: ActivityEvent) {
        let mut events = self.events.lock();
        events.push_back(event);
        while events.len() > self.capacity {
            events.pop_front();
        }
    }
}

/// Forwards every event to each inner logger.
pub struct FanoutActivityLog(pub Vec<SharedActivityLog>);

impl ActivityLogger for FanoutActivityLog {
    fn record(&self, event: ActivityEvent) {
        for logger in &self.0 {
            logger.record(event.clone());
        }
    }
}
