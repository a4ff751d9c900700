use serde::{Deserialize, Serialize};

use crate::engine::{PlayerView, Signal};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    Ping {
        nonce: Option<String>,
    },
    /// Latest classifier reading; missing flags read as false.
    Signal {
        #[serde(default)]
        bad_posture: bool,
        #[serde(default)]
        is_drowsy: bool,
        #[serde(default)]
        has_user_input: bool,
        #[serde(default)]
        is_active_movement: bool,
    },
    /// Index into `available_quests`. Signed so a bogus negative index is
    /// rejected by the engine path instead of failing to parse.
    AcceptQuest {
        index: i64,
    },
    GetState,
}

impl ClientMessage {
    pub fn as_signal(&self) -> Option<Signal> {
        match *self {
            ClientMessage::Signal {
                bad_posture,
                is_drowsy,
                has_user_input,
                is_active_movement,
            } => Some(Signal {
                bad_posture,
                is_drowsy,
                has_user_input,
                is_active_movement,
            }),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DaemonMessage {
    Hello {
        version: String,
        capabilities: Vec<String>,
    },
    Pong {
        nonce: Option<String>,
    },
    State {
        state: PlayerView,
    },
    QuestAcceptResult {
        index: i64,
        success: bool,
    },
    Log {
        level: String,
        message: String,
        timestamp: i64,
    },
}
