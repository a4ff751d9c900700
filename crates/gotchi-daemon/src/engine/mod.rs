//! Player state engine: HP ledger, quest lifecycle and leveling, driven one
//! tick at a time by behavioural signals.
//!
//! The engine performs no I/O. Activity notifications and snapshots leave
//! through [`ActivityLogger`] and [`SnapshotSink`], both of which must return
//! without blocking.

pub mod duration;
pub mod generator;
pub mod hp;
pub mod leveling;
pub mod quest;
pub mod snapshot;

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::{
    activity::{ActivityLogger, HpReason, NullActivityLog, SharedActivityLog},
    config::EngineConfig,
};

pub use duration::DurationAccumulator;
pub use generator::QuestGenerator;
pub use hp::{DurationState, HpLedger};
pub use quest::{Difficulty, Quest, QuestKind, QuestView};
pub use snapshot::{DiscardSnapshots, PlayerSnapshot, SharedSnapshotSink, SnapshotSink};

/// One classifier reading. Transient; never persisted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signal {
    pub bad_posture: bool,
    pub is_drowsy: bool,
    pub has_user_input: bool,
    pub is_active_movement: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Player {
    pub hp: f64,
    pub xp: f64,
    pub level: u32,
    pub happiness: f64,
}

/// Everything a front end needs to render the companion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerView {
    pub hp: f64,
    pub max_hp: f64,
    pub xp: f64,
    pub level: u32,
    pub happiness: f64,
    pub quest_streak: i32,
    pub next_level_xp: f64,
    pub level_progress: u8,
    pub is_taking_damage: bool,
    pub bad_posture_duration: f64,
    pub protected: bool,
    pub quests: Vec<QuestView>,
    pub available_quests: Vec<QuestView>,
}

pub struct PlayerStateEngine {
    config: EngineConfig,
    player: Player,
    quest_streak: i32,
    active: Vec<Quest>,
    available: Vec<Quest>,
    ledger: HpLedger,
    generator: QuestGenerator,
    activity: SharedActivityLog,
    sink: SharedSnapshotSink,
}

impl PlayerStateEngine {
    pub fn new(config: EngineConfig, snapshot: PlayerSnapshot) -> Self {
        Self::with_generator(config, snapshot, QuestGenerator::new())
    }

    pub fn with_generator(
        config: EngineConfig,
        snapshot: PlayerSnapshot,
        generator: QuestGenerator,
    ) -> Self {
        let player = Player {
            hp: snapshot.hp.clamp(0.0, config.max_hp),
            xp: snapshot.xp.max(0.0),
            level: snapshot.level.max(1),
            happiness: snapshot.happiness.clamp(0.0, 100.0),
        };
        let mut engine = Self {
            ledger: HpLedger::new(&config),
            config,
            player,
            quest_streak: snapshot.quest_streak,
            active: snapshot.active,
            available: snapshot.available,
            generator,
            activity: Arc::new(NullActivityLog),
            sink: Arc::new(DiscardSnapshots),
        };
        engine.active.retain(|q| !q.completed);
        engine.trim_to_capacity();
        engine.refill_offers();
        engine
    }

    pub fn with_activity_log(mut self, activity: SharedActivityLog) -> Self {
        self.activity = activity;
        self
    }

    pub fn with_snapshot_sink(mut self, sink: SharedSnapshotSink) -> Self {
        self.sink = sink;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn player(&self) -> &Player {
        &self.player
    }

    pub fn durations(&self) -> &DurationState {
        &self.ledger.durations
    }

    pub fn active_quests(&self) -> &[Quest] {
        &self.active
    }

    pub fn available_quests(&self) -> &[Quest] {
        &self.available
    }

    pub fn quest_streak(&self) -> i32 {
        self.quest_streak
    }

    /// Maximum simultaneously active quests at the current level.
    pub fn capacity(&self) -> usize {
        self.config.quests.capacity(self.player.level)
    }

    /// Rest-type quests in progress suspend every HP penalty.
    pub fn is_protected(&self) -> bool {
        self.active
            .iter()
            .any(|q| !q.completed && q.kind.is_restful())
    }

    fn open_quest_count(&self) -> usize {
        self.active.iter().filter(|q| !q.completed).count()
    }

    /// Advances the engine by `dt` seconds of the given behaviour.
    pub fn update(&mut self, signal: Signal, dt: f64) {
        let dt = if dt.is_finite() { dt.max(0.0) } else { 0.0 };
        let protected = self.is_protected();
        let mut dirty = false;

        let outcome = self.ledger.tick(
            &mut self.player,
            &signal,
            dt,
            protected,
            &self.config,
            self.activity.as_ref(),
        );
        dirty |= outcome.changed;

        // A heal later in the same tick does not undo a depletion.
        if outcome.depleted {
            self.deplete();
            dirty = true;
        }

        dirty |= self.advance_quests(&signal, dt);

        if protected && !self.is_protected() {
            self.ledger.clear_idle();
        }

        dirty |= self.refill_offers();

        if dirty {
            self.persist();
        }
    }

    /// Accepts `available[index]`. Returns false without touching state when
    /// the index is out of range or every slot is taken.
    pub fn accept_quest(&mut self, index: usize) -> bool {
        if index >= self.available.len() || self.open_quest_count() >= self.capacity() {
            return false;
        }

        let quest = self.available.remove(index);
        self.available.clear();
        info!(name = %quest.name, kind = quest.kind.as_str(), "Quest accepted");
        self.activity.log_quest_accepted(
            &quest.name,
            quest.kind,
            quest.target_duration,
            quest.reward_xp,
        );
        self.active.push(quest);
        self.refill_offers();
        self.persist();
        true
    }

    pub fn get_state(&self) -> PlayerView {
        let next_level_xp = leveling::xp_required(&self.config.leveling, self.player.level + 1);
        let level_progress = if next_level_xp > 0.0 {
            (self.player.xp / next_level_xp * 100.0).clamp(0.0, 100.0) as u8
        } else {
            100
        };

        PlayerView {
            hp: self.player.hp,
            max_hp: self.config.max_hp,
            xp: self.player.xp,
            level: self.player.level,
            happiness: self.player.happiness,
            quest_streak: self.quest_streak,
            next_level_xp,
            level_progress,
            is_taking_damage: self.ledger.is_taking_damage(),
            bad_posture_duration: self.ledger.durations.bad_posture.elapsed(),
            protected: self.is_protected(),
            quests: self.active.iter().map(Quest::view).collect(),
            available_quests: self.available.iter().map(Quest::view).collect(),
        }
    }

    pub fn snapshot(&self) -> PlayerSnapshot {
        PlayerSnapshot {
            hp: self.player.hp,
            xp: self.player.xp,
            level: self.player.level,
            happiness: self.player.happiness,
            quest_streak: self.quest_streak,
            active: self.active.clone(),
            available: self.available.clone(),
        }
    }

    /// Adds XP, scaled for late-game levels, and processes level-ups.
    pub fn gain_xp(&mut self, amount: u32) {
        let scaled = leveling::scaled_reward(&self.config.leveling, self.player.level, amount);
        self.player.xp += f64::from(scaled);
        self.check_level_up();
    }

    pub fn check_level_up(&mut self) {
        let from = self.player.level;
        let gained = leveling::apply_level_ups(
            &self.config.leveling,
            &mut self.player.level,
            &mut self.player.xp,
        );
        if gained > 0 {
            info!(from, to = self.player.level, xp = self.player.xp, "Level up");
        }
    }

    fn deplete(&mut self) {
        let from = self.player.level;
        self.player.level = self.player.level.saturating_sub(1).max(1);
        self.player.hp = self.config.max_hp / 2.0;
        self.player.xp = 0.0;
        self.player.happiness =
            (self.player.happiness - self.config.depletion_happiness_penalty).clamp(0.0, 100.0);
        self.quest_streak = self.quest_streak.min(0) - 1;
        warn!(from, to = self.player.level, "HP depleted, level down");
        self.trim_to_capacity();
    }

    /// Drops the most recently accepted open quests until the open count
    /// fits the capacity of the current level.
    fn trim_to_capacity(&mut self) {
        let capacity = self.capacity();
        while self.open_quest_count() > capacity {
            let Some(pos) = self.active.iter().rposition(|q| !q.completed) else {
                break;
            };
            let dropped = self.active.remove(pos);
            warn!(
                name = %dropped.name,
                level = self.player.level,
                capacity,
                "Quest dropped, no slot left at this level"
            );
        }
    }

    /// Accrues progress on every open quest and settles completions. Returns
    /// true if any quest moved, so progress survives a restart.
    fn advance_quests(&mut self, signal: &Signal, dt: f64) -> bool {
        let idle = self.ledger.durations.idle.elapsed();
        let rest_idle_secs = self.config.quests.rest_idle_secs;
        let mut finished = Vec::new();
        let mut progressed = false;

        for quest in self.active.iter_mut().filter(|q| !q.completed) {
            let before = quest.progress;
            if quest.accrue(signal, idle, rest_idle_secs, dt) {
                quest.completed = true;
                finished.push(quest.clone());
            }
            progressed |= quest.progress != before;
        }

        if finished.is_empty() {
            return progressed;
        }

        self.active.retain(|q| !q.completed);
        for quest in &finished {
            self.complete(quest);
        }
        self.available.clear();
        self.refill_offers();
        true
    }

    fn complete(&mut self, quest: &Quest) {
        let heal = match quest.kind {
            QuestKind::Focus => self.config.quests.heal_focus,
            QuestKind::Posture => self.config.quests.heal_posture,
            QuestKind::Rest => self.config.quests.heal_rest,
            QuestKind::Recovery => self.config.quests.heal_recovery,
        };

        self.gain_xp(quest.reward_xp);
        self.player.change_hp(
            heal,
            HpReason::QuestReward,
            &self.config,
            self.activity.as_ref(),
        );
        self.player.happiness =
            (self.player.happiness + self.config.quests.happiness_bonus).clamp(0.0, 100.0);
        self.quest_streak += 1;

        info!(
            name = %quest.name,
            kind = quest.kind.as_str(),
            reward_xp = quest.reward_xp,
            streak = self.quest_streak,
            "Quest completed"
        );
        self.activity.log_quest_completed(
            &quest.name,
            quest.kind,
            quest.progress,
            quest.reward_xp,
        );
    }

    /// Offers a fresh set of quests when none are on the table and a slot is
    /// free. Returns true if offers were generated.
    fn refill_offers(&mut self) -> bool {
        if !self.available.is_empty() || self.open_quest_count() >= self.capacity() {
            return false;
        }
        self.available = self.generator.generate(self.quest_streak).to_vec();
        true
    }

    fn persist(&self) {
        self.sink.submit(self.snapshot());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activity::{ActivityEvent, MemoryActivityLog};
    use approx::assert_relative_eq;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct RecordingSink(Mutex<Vec<PlayerSnapshot>>);

    impl SnapshotSink for RecordingSink {
        fn submit(&self, snapshot: PlayerSnapshot) {
            self.0.lock().push(snapshot);
        }
    }

    fn quest(kind: QuestKind, target: f64, reward_xp: u32) -> Quest {
        Quest {
            name: format!("{kind:?} quest"),
            kind,
            target_duration: target,
            reward_xp,
            difficulty: Difficulty::Normal,
            description: String::new(),
            clear_condition: String::new(),
            continuous: false,
            progress: 0.0,
            completed: false,
        }
    }

    fn engine_with(snapshot: PlayerSnapshot) -> PlayerStateEngine {
        PlayerStateEngine::with_generator(
            EngineConfig::default(),
            snapshot,
            QuestGenerator::seeded(3),
        )
    }

    fn focused() -> Signal {
        Signal {
            bad_posture: false,
            is_drowsy: false,
            has_user_input: true,
            is_active_movement: false,
        }
    }

    #[test]
    fn fresh_engine_offers_three_quests() {
        let engine = engine_with(PlayerSnapshot::default());
        assert_eq!(engine.available_quests().len(), 3);
        assert!(engine.active_quests().is_empty());
    }

    #[test]
    fn accept_moves_one_template_and_clears_offers() {
        let log = Arc::new(MemoryActivityLog::new(16));
        let mut engine = engine_with(PlayerSnapshot::default()).with_activity_log(log.clone());
        let chosen = engine.available_quests()[1].clone();

        assert!(engine.accept_quest(1));
        assert_eq!(engine.active_quests(), &[chosen.clone()]);
        assert!(engine.available_quests().is_empty());
        assert!(matches!(
            &log.events()[0],
            ActivityEvent::QuestAccepted { name, .. } if *name == chosen.name
        ));
    }

    #[test]
    fn accept_rejects_bad_index_and_full_slots() {
        let mut engine = engine_with(PlayerSnapshot::default());
        let before = engine.snapshot();
        assert!(!engine.accept_quest(3));
        assert_eq!(engine.snapshot(), before);

        let mut full = engine_with(PlayerSnapshot {
            active: vec![quest(QuestKind::Focus, 100.0, 10)],
            available: vec![quest(QuestKind::Posture, 100.0, 10)],
            ..PlayerSnapshot::default()
        });
        let before = full.snapshot();
        assert!(!full.accept_quest(0));
        assert_eq!(full.snapshot(), before);
    }

    #[test]
    fn no_offers_while_slots_are_full() {
        let mut engine = engine_with(PlayerSnapshot::default());
        assert!(engine.accept_quest(0));
        engine.update(focused(), 1.0);
        assert!(engine.available_quests().is_empty());
    }

    #[test]
    fn second_slot_opens_at_bonus_level() {
        let mut engine = engine_with(PlayerSnapshot {
            level: 5,
            ..PlayerSnapshot::default()
        });
        assert_eq!(engine.capacity(), 2);
        assert!(engine.accept_quest(0));
        engine.update(focused(), 0.1);
        assert_eq!(engine.available_quests().len(), 3);
        assert!(engine.accept_quest(0));
        assert!(!engine.accept_quest(0));
    }

    #[test]
    fn completion_rewards_and_regenerates() {
        let log = Arc::new(MemoryActivityLog::new(64));
        let mut engine = engine_with(PlayerSnapshot {
            hp: 50.0,
            happiness: 80.0,
            active: vec![quest(QuestKind::Focus, 5.0, 50)],
            ..PlayerSnapshot::default()
        })
        .with_activity_log(log.clone());
        assert!(engine.available_quests().is_empty());

        for _ in 0..5 {
            engine.update(focused(), 1.0);
        }

        assert!(engine.active_quests().is_empty());
        assert_relative_eq!(engine.player().xp, 50.0);
        assert_relative_eq!(engine.player().hp, 55.0);
        assert_relative_eq!(engine.player().happiness, 85.0);
        assert_eq!(engine.quest_streak(), 1);
        assert_eq!(engine.available_quests().len(), 3);
        assert!(log.events().iter().any(|e| matches!(
            e,
            ActivityEvent::QuestCompleted { reward_xp: 50, .. }
        )));
    }

    #[test]
    fn late_game_reward_is_scaled() {
        let mut engine = engine_with(PlayerSnapshot {
            level: 5,
            active: vec![quest(QuestKind::Posture, 1.0, 50)],
            ..PlayerSnapshot::default()
        });
        engine.update(focused(), 1.0);
        assert_relative_eq!(engine.player().xp, 60.0);
    }

    #[test]
    fn rest_quest_protects_and_clears_idle_on_finish() {
        let mut engine = engine_with(PlayerSnapshot {
            hp: 60.0,
            active: vec![quest(QuestKind::Rest, 400.0, 10)],
            ..PlayerSnapshot::default()
        });
        assert!(engine.is_protected());

        let away = Signal::default();
        for _ in 0..410 {
            engine.update(away, 1.0);
        }

        assert!(!engine.is_protected());
        assert!(engine.active_quests().is_empty());
        assert_relative_eq!(engine.player().hp, 60.0 + engine.config().quests.heal_rest);
        assert_relative_eq!(engine.durations().idle.elapsed(), 0.0);
    }

    #[test]
    fn depletion_levels_down_once() {
        let sink = Arc::new(RecordingSink::default());
        let mut engine = engine_with(PlayerSnapshot {
            hp: 0.4,
            xp: 75.0,
            level: 3,
            quest_streak: 2,
            ..PlayerSnapshot::default()
        })
        .with_snapshot_sink(sink.clone());

        let slouch = Signal {
            bad_posture: true,
            ..focused()
        };
        for _ in 0..4 {
            engine.update(slouch, 1.0);
        }

        assert_eq!(engine.player().level, 2);
        assert_relative_eq!(engine.player().hp, 50.0);
        assert_relative_eq!(engine.player().xp, 0.0);
        assert_eq!(engine.quest_streak(), -1);
        assert!(sink.0.lock().iter().all(|s| s.hp >= 0.0));
    }

    #[test]
    fn mutations_are_persisted() {
        let sink = Arc::new(RecordingSink::default());
        let mut engine =
            engine_with(PlayerSnapshot::default()).with_snapshot_sink(sink.clone());

        engine.update(focused(), 1.0);
        assert!(sink.0.lock().is_empty());

        assert!(engine.accept_quest(0));
        assert_eq!(sink.0.lock().len(), 1);
        assert_eq!(sink.0.lock()[0].active.len(), 1);
    }

    #[test]
    fn progress_alone_is_persisted() {
        let sink = Arc::new(RecordingSink::default());
        let mut engine = engine_with(PlayerSnapshot {
            active: vec![quest(QuestKind::Focus, 100.0, 10)],
            ..PlayerSnapshot::default()
        })
        .with_snapshot_sink(sink.clone());

        engine.update(focused(), 1.0);
        engine.update(focused(), 1.0);

        let saved = sink.0.lock();
        assert_eq!(saved.len(), 2);
        assert_relative_eq!(saved[1].active[0].progress, 2.0);
    }

    #[test]
    fn accept_refills_offers_while_a_slot_is_free() {
        let sink = Arc::new(RecordingSink::default());
        let mut engine = engine_with(PlayerSnapshot {
            level: 5,
            ..PlayerSnapshot::default()
        })
        .with_snapshot_sink(sink.clone());

        assert!(engine.accept_quest(0));
        assert_eq!(engine.available_quests().len(), 3);
        assert_eq!(sink.0.lock()[0].available.len(), 3);
    }

    #[test]
    fn depletion_stands_when_a_heal_lands_in_the_same_tick() {
        let mut engine = engine_with(PlayerSnapshot {
            hp: 3.0,
            xp: 40.0,
            level: 3,
            ..PlayerSnapshot::default()
        });

        for _ in 0..300 {
            engine.update(focused(), 1.0);
        }
        // Tick 601: idle penalty drains the last 3 HP, then the 600s heal fires.
        for _ in 0..301 {
            engine.update(Signal::default(), 1.0);
        }

        assert_eq!(engine.player().level, 2);
        assert_relative_eq!(engine.player().hp, 50.0);
        assert_relative_eq!(engine.player().xp, 0.0);
    }

    #[test]
    fn depletion_drops_quests_beyond_new_capacity() {
        let mut first = quest(QuestKind::Focus, 100.0, 10);
        first.name = "Warm-up Focus".into();
        let mut second = quest(QuestKind::Focus, 100.0, 10);
        second.name = "Deep Work".into();
        let mut engine = engine_with(PlayerSnapshot {
            hp: 0.2,
            level: 5,
            active: vec![first, second],
            ..PlayerSnapshot::default()
        });

        let slouch = Signal {
            bad_posture: true,
            ..focused()
        };
        for _ in 0..4 {
            engine.update(slouch, 1.0);
        }

        assert_eq!(engine.player().level, 4);
        assert_eq!(engine.capacity(), 1);
        assert_eq!(engine.active_quests().len(), 1);
        assert_eq!(engine.active_quests()[0].name, "Warm-up Focus");
        assert!(engine.available_quests().is_empty());
    }

    #[test]
    fn surplus_quests_are_dropped_on_load() {
        let engine = engine_with(PlayerSnapshot {
            level: 1,
            active: vec![
                quest(QuestKind::Focus, 100.0, 10),
                quest(QuestKind::Posture, 100.0, 10),
                quest(QuestKind::Rest, 100.0, 10),
            ],
            ..PlayerSnapshot::default()
        });

        assert_eq!(engine.active_quests().len(), 1);
        assert_eq!(engine.active_quests()[0].kind, QuestKind::Focus);
        assert!(!engine.is_protected());
    }

    #[test]
    fn snapshot_values_are_clamped_on_load() {
        let engine = engine_with(PlayerSnapshot {
            hp: 400.0,
            level: 0,
            happiness: -20.0,
            ..PlayerSnapshot::default()
        });
        assert_relative_eq!(engine.player().hp, 100.0);
        assert_eq!(engine.player().level, 1);
        assert_relative_eq!(engine.player().happiness, 0.0);
    }

    #[test]
    fn view_reports_progress() {
        let engine = engine_with(PlayerSnapshot {
            xp: 50.0,
            ..PlayerSnapshot::default()
        });
        let view = engine.get_state();
        assert_relative_eq!(view.next_level_xp, 100.0);
        assert_eq!(view.level_progress, 50);
        assert_eq!(view.max_hp, 100.0);
        assert_eq!(view.available_quests.len(), 3);
    }
}
