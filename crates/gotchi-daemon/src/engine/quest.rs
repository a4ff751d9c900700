use serde::{Deserialize, Serialize};

use super::Signal;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuestKind {
    Focus,
    Posture,
    Rest,
    Recovery,
}

impl QuestKind {
    /// Rest-type quests put the player in protected mode while active.
    pub fn is_restful(self) -> bool {
        matches!(self, QuestKind::Rest | QuestKind::Recovery)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            QuestKind::Focus => "focus",
            QuestKind::Posture => "posture",
            QuestKind::Rest => "rest",
            QuestKind::Recovery => "recovery",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Difficulty {
    Easy,
    Normal,
    Hard,
}

/// A quest template plus its progress. Identity is list membership only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quest {
    pub name: String,
    pub kind: QuestKind,
    /// Seconds of qualifying behaviour needed to complete.
    pub target_duration: f64,
    pub reward_xp: u32,
    pub difficulty: Difficulty,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub clear_condition: String,
    /// Posture quests flagged continuous restart from zero on a slip.
    #[serde(default)]
    pub continuous: bool,
    #[serde(default)]
    pub progress: f64,
    #[serde(default)]
    pub completed: bool,
}

impl Quest {
    /// Accrues progress for one tick. Returns true when the quest has just
    /// reached its target.
    pub(crate) fn accrue(
        &mut self,
        signal: &Signal,
        idle_secs: f64,
        rest_idle_secs: f64,
        dt: f64,
    ) -> bool {
        if self.completed {
            return false;
        }

        match self.kind {
            QuestKind::Focus => {
                if !signal.bad_posture && !signal.is_drowsy {
                    self.progress += dt;
                }
            }
            QuestKind::Posture => {
                if !signal.bad_posture {
                    self.progress += dt;
                } else if self.continuous {
                    self.progress = 0.0;
                }
            }
            QuestKind::Rest | QuestKind::Recovery => {
                if idle_secs > rest_idle_secs || signal.is_active_movement {
                    self.progress += dt;
                }
            }
        }

        self.progress >= self.target_duration
    }

    pub fn progress_percent(&self) -> f64 {
        if self.target_duration <= 0.0 {
            return 100.0;
        }
        (self.progress / self.target_duration * 100.0).clamp(0.0, 100.0)
    }

    pub fn view(&self) -> QuestView {
        QuestView {
            quest: self.clone(),
            progress_percent: self.progress_percent(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestView {
    #[serde(flatten)]
    pub quest: Quest,
    pub progress_percent: f64,
}
