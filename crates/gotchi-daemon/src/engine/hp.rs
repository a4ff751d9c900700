//! Time-proportional HP penalties and heals.

use tracing::debug;

use super::{Player, Signal, duration::DurationAccumulator};
use crate::{
    activity::{ActivityLogger, HpReason},
    config::EngineConfig,
};

/// Continuous-behaviour counters. Not persisted; every process starts at zero.
#[derive(Debug, Clone)]
pub struct DurationState {
    pub bad_posture: DurationAccumulator,
    pub good_posture: DurationAccumulator,
    pub idle: DurationAccumulator,
    pub continuous_work: DurationAccumulator,
}

impl DurationState {
    pub fn new(hysteresis_secs: f64) -> Self {
        Self {
            bad_posture: DurationAccumulator::new(hysteresis_secs),
            good_posture: DurationAccumulator::new(hysteresis_secs),
            idle: DurationAccumulator::new(hysteresis_secs),
            continuous_work: DurationAccumulator::new(hysteresis_secs),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LedgerOutcome {
    pub changed: bool,
    pub depleted: bool,
}

impl Player {
    /// The single HP chokepoint. Clamps into `[0, max_hp]` and reports
    /// changes above the noise threshold. Returns true if this change
    /// drained HP to zero.
    pub(crate) fn change_hp(
        &mut self,
        amount: f64,
        reason: HpReason,
        config: &EngineConfig,
        logger: &dyn ActivityLogger,
    ) -> bool {
        let before = self.hp;
        self.hp = (self.hp + amount).clamp(0.0, config.max_hp);
        debug!(before, after = self.hp, %reason, amount, "HP change");
        if amount.abs() > config.hp_log_threshold {
            logger.log_hp_change(before, self.hp, reason, amount);
        }
        amount < 0.0 && self.hp <= 0.0
    }
}

#[derive(Debug, Clone)]
pub struct HpLedger {
    pub durations: DurationState,
    turtle_neck_reported: bool,
    was_drowsy: bool,
    taking_damage: bool,
}

impl HpLedger {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            durations: DurationState::new(config.hysteresis_secs),
            turtle_neck_reported: false,
            was_drowsy: false,
            taking_damage: false,
        }
    }

    /// Bad posture is currently past its grace period and being charged.
    pub fn is_taking_damage(&self) -> bool {
        self.taking_damage
    }

    pub fn clear_idle(&mut self) {
        self.durations.idle.reset();
    }

    pub fn tick(
        &mut self,
        player: &mut Player,
        signal: &Signal,
        dt: f64,
        protected: bool,
        config: &EngineConfig,
        logger: &dyn ActivityLogger,
    ) -> LedgerOutcome {
        let posture = &config.posture;
        let durations = &mut self.durations;

        let bad = durations.bad_posture.advance(signal.bad_posture, dt);
        let good = durations.good_posture.advance(!signal.bad_posture, dt);
        let idle_now = !signal.has_user_input && !signal.bad_posture && !signal.is_active_movement;
        let idle = durations.idle.advance(idle_now, dt);
        let work = if protected {
            durations.continuous_work.reset();
            0.0
        } else {
            durations.continuous_work.advance(true, dt)
        };

        let past_grace = signal.bad_posture && bad > posture.grace_secs;
        if past_grace && !self.turtle_neck_reported {
            logger.log_turtle_neck(bad);
            self.turtle_neck_reported = true;
        } else if bad == 0.0 {
            self.turtle_neck_reported = false;
        }
        if signal.is_drowsy && !self.was_drowsy {
            logger.log_eye_closed();
        }
        self.was_drowsy = signal.is_drowsy;
        self.taking_damage = past_grace && !protected;

        let mut outcome = LedgerOutcome::default();
        let mut apply = |player: &mut Player, amount: f64, reason: HpReason| {
            outcome.changed = true;
            if player.change_hp(amount, reason, config, logger) {
                outcome.depleted = true;
            }
        };

        if !protected {
            if past_grace {
                apply(player, -posture_loss(config, bad, dt), HpReason::BadPosture);
            }
            if idle > config.idle.threshold_secs {
                apply(player, -config.idle.penalty, HpReason::Idle);
                durations.idle.reset();
            }
            if work > config.overwork.threshold_secs {
                apply(player, -config.overwork.penalty, HpReason::Overwork);
                durations.continuous_work.reset();
            }
        }

        if good > posture.heal_window_secs {
            apply(player, posture.heal_amount, HpReason::GoodPosture);
            durations.good_posture.reset();
        }

        outcome
    }
}

/// HP lost this tick to a posture episode that has lasted `bad` seconds.
fn posture_loss(config: &EngineConfig, bad: f64, dt: f64) -> f64 {
    let rules = &config.posture;
    let mut per_second = rules.rate_instant;
    let past_3min = bad > rules.threshold_3min_secs;
    let past_7min = bad > rules.threshold_7min_secs;

    if rules.stack_penalties {
        if past_3min {
            per_second += rules.rate_3min / 60.0;
        }
        if past_7min {
            per_second += rules.rate_7min / 60.0;
        }
    } else if past_7min {
        per_second += rules.rate_7min / 60.0;
    } else if past_3min {
        per_second += rules.rate_3min / 60.0;
    }

    per_second * dt
}
