//! Daily activity journal written as one JSON document per local date.

use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use tokio::{sync::mpsc, task::JoinHandle};
use tracing::{debug, warn};

use super::{ActivityEvent, ActivityLogger, HpReason};
use crate::engine::QuestKind;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DetectionLog {
    pub count: u32,
    pub events: Vec<DetectionRecord>,
    /// Detections per local hour ("09", "14", ...).
    pub hourly_freq: BTreeMap<String, u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionRecord {
    pub time: String,
    pub duration_secs: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestRecord {
    pub name: String,
    pub kind: QuestKind,
    pub duration: f64,
    pub reward_xp: u32,
    pub time: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QuestLog {
    pub accepted: Vec<QuestRecord>,
    pub completed: Vec<QuestRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HpRecord {
    pub time: String,
    pub hp_before: f64,
    pub hp_after: f64,
    pub change: f64,
    pub reason: HpReason,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DailySummary {
    pub total_detections: u32,
    pub turtle_neck_count: u32,
    pub eye_closed_count: u32,
    pub quests_completed: usize,
    pub avg_hp: f64,
    pub peak_activity_hour: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DailyActivity {
    pub date: String,
    pub turtle_neck: DetectionLog,
    pub eye_closed: DetectionLog,
    pub quests: QuestLog,
    pub hp_changes: Vec<HpRecord>,
    pub summary: DailySummary,
}

impl DailyActivity {
    fn for_date(date: &str) -> Self {
        Self {
            date: date.to_string(),
            ..Self::default()
        }
    }

    fn apply(&mut self, event: &ActivityEvent, now: DateTime<Local>) {
        let time = now.format("%H:%M:%S").to_string();
        let hour = now.format("%H").to_string();

        match event {
            ActivityEvent::TurtleNeck { duration_secs } => {
                self.turtle_neck.push(time, hour, Some(*duration_secs));
            }
            ActivityEvent::EyeClosed => {
                self.eye_closed.push(time, hour, None);
            }
            ActivityEvent::QuestAccepted {
                name,
                kind,
                target_duration,
                reward_xp,
            } => self.quests.accepted.push(QuestRecord {
                name: name.clone(),
                kind: *kind,
                duration: *target_duration,
                reward_xp: *reward_xp,
                time,
            }),
            ActivityEvent::QuestCompleted {
                name,
                kind,
                duration,
                reward_xp,
            } => self.quests.completed.push(QuestRecord {
                name: name.clone(),
                kind: *kind,
                duration: *duration,
                reward_xp: *reward_xp,
                time,
            }),
            ActivityEvent::HpChanged {
                before,
                after,
                reason,
                delta,
            } => self.hp_changes.push(HpRecord {
                time,
                hp_before: round1(*before),
                hp_after: round1(*after),
                change: round1(*delta),
                reason: *reason,
            }),
        }
    }

    fn refresh_summary(&mut self) {
        let mut combined: BTreeMap<&str, u32> = BTreeMap::new();
        for (hour, count) in self
            .turtle_neck
            .hourly_freq
            .iter()
            .chain(self.eye_closed.hourly_freq.iter())
        {
            *combined.entry(hour.as_str()).or_default() += count;
        }
        let peak_activity_hour = combined
            .iter()
            .max_by_key(|(_, count)| **count)
            .map(|(hour, _)| hour.to_string());

        let avg_hp = if self.hp_changes.is_empty() {
            0.0
        } else {
            let total: f64 = self.hp_changes.iter().map(|c| c.hp_after).sum();
            round1(total / self.hp_changes.len() as f64)
        };

        self.summary = DailySummary {
            total_detections: self.turtle_neck.count + self.eye_closed.count,
            turtle_neck_count: self.turtle_neck.count,
            eye_closed_count: self.eye_closed.count,
            quests_completed: self.quests.completed.len(),
            avg_hp,
            peak_activity_hour,
        };
    }
}

impl DetectionLog {
    fn push(&mut self, time: String, hour: String, duration_secs: Option<f64>) {
        self.count += 1;
        self.events.push(DetectionRecord {
            time,
            duration_secs,
        });
        *self.hourly_freq.entry(hour).or_default() += 1;
    }
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

fn date_key(now: DateTime<Local>) -> String {
    now.format("%Y-%m-%d").to_string()
}

pub struct ActivityJournal {
    dir: PathBuf,
    today: DailyActivity,
    unflushed: bool,
}

impl ActivityJournal {
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir)
            .await
            .with_context(|| format!("failed to create activity dir {:?}", dir))?;
        let today = Self::load_day(&dir, &date_key(Local::now())).await;
        Ok(Self {
            dir,
            today,
            unflushed: false,
        })
    }

    pub fn today(&self) -> &DailyActivity {
        &self.today
    }

    fn path_for(dir: &Path, date: &str) -> PathBuf {
        dir.join(format!("activity_{date}.json"))
    }

    async fn load_day(dir: &Path, date: &str) -> DailyActivity {
        let path = Self::path_for(dir, date);
        match tokio::fs::read_to_string(&path).await {
            Ok(raw) => match serde_json::from_str::<DailyActivity>(&raw) {
                Ok(day) => day,
                Err(err) => {
                    warn!(?err, "Discarding unreadable activity journal {:?}", path);
                    DailyActivity::for_date(date)
                }
            },
            Err(_) => DailyActivity::for_date(date),
        }
    }

    /// Applies an event, rolling over to a new file when the date changed.
    /// Unwritten events of the previous day are flushed to its own file first.
    pub async fn record(&mut self, event: &ActivityEvent, now: DateTime<Local>) {
        let date = date_key(now);
        if self.today.date != date {
            if self.unflushed {
                if let Err(err) = self.flush().await {
                    warn!(?err, "Failed to close activity journal for {}", self.today.date);
                }
            }
            self.today = Self::load_day(&self.dir, &date).await;
        }
        self.today.apply(event, now);
        self.unflushed = true;
    }

    pub async fn flush(&mut self) -> Result<()> {
        self.today.refresh_summary();
        let path = Self::path_for(&self.dir, &self.today.date);
        let payload = serde_json::to_vec_pretty(&self.today)?;
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, payload)
            .await
            .with_context(|| format!("failed to write {:?}", tmp))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .with_context(|| format!("failed to replace {:?}", path))?;
        self.unflushed = false;
        Ok(())
    }

    /// Moves the journal onto a background task and returns a logger that
    /// feeds it without blocking.
    pub fn spawn(mut self) -> (JournalHandle, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::unbounded_channel::<ActivityEvent>();
        let task = tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                let mut batch = vec![event];
                while let Ok(more) = rx.try_recv() {
                    batch.push(more);
                }
                let now = Local::now();
                for event in &batch {
                    self.record(event, now).await;
                }
                match self.flush().await {
                    Ok(()) => debug!("Journaled {} activity events", batch.len()),
                    Err(err) => warn!(?err, "Failed to write activity journal"),
                }
            }
        });
        (JournalHandle { tx }, task)
    }
}

#[derive(Clone)]
pub struct JournalHandle {
    tx: mpsc::UnboundedSender<ActivityEvent>,
}

impl ActivityLogger for JournalHandle {
    fn record(&self, event: ActivityEvent) {
        // A closed journal only loses history; the engine keeps running.
        let _ = self.tx.send(event);
    }
}
