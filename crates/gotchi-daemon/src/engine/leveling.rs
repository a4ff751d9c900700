use crate::config::LevelingConfig;

/// XP needed to go from `target - 1` to `target`.
///
/// Listed levels are used as-is. Gaps between two listed levels are
/// interpolated, and levels past the last entry grow by
/// `extrapolation_step` each.
pub fn xp_required(config: &LevelingConfig, target: u32) -> f64 {
    let mut table: Vec<(u32, f64)> = config
        .thresholds
        .iter()
        .map(|t| (t.level, t.xp))
        .collect();
    table.sort_by_key(|(level, _)| *level);

    let Some(&(first_level, first_xp)) = table.first() else {
        return config.extrapolation_step * f64::from(target.saturating_sub(1));
    };
    if target <= first_level {
        return first_xp;
    }

    for pair in table.windows(2) {
        let (lo_level, lo_xp) = pair[0];
        let (hi_level, hi_xp) = pair[1];
        if target == hi_level {
            return hi_xp;
        }
        if target > lo_level && target < hi_level {
            let span = f64::from(hi_level - lo_level);
            let offset = f64::from(target - lo_level);
            return lo_xp + (hi_xp - lo_xp) * offset / span;
        }
    }

    let (last_level, last_xp) = table[table.len() - 1];
    last_xp + f64::from(target - last_level) * config.extrapolation_step
}

/// Applies the late-game multiplier, truncating to whole XP.
pub fn scaled_reward(config: &LevelingConfig, level: u32, amount: u32) -> u32 {
    if level >= config.late_game_level {
        (f64::from(amount) * config.late_game_multiplier) as u32
    } else {
        amount
    }
}

/// Spends XP on as many level-ups as it covers, carrying the remainder.
/// Returns the number of levels gained.
pub fn apply_level_ups(config: &LevelingConfig, level: &mut u32, xp: &mut f64) -> u32 {
    let mut gained = 0;
    loop {
        let threshold = xp_required(config, *level + 1);
        if threshold <= 0.0 || *xp < threshold {
            break;
        }
        *xp -= threshold;
        *level += 1;
        gained += 1;
    }
    gained
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::XpThreshold;
    use approx::assert_relative_eq;

    fn ladder(entries: &[(u32, f64)], step: f64) -> LevelingConfig {
        LevelingConfig {
            thresholds: entries
                .iter()
                .map(|&(level, xp)| XpThreshold { level, xp })
                .collect(),
            extrapolation_step: step,
            ..LevelingConfig::default()
        }
    }

    #[test]
    fn listed_levels_are_exact() {
        let config = LevelingConfig::default();
        assert_relative_eq!(xp_required(&config, 2), 100.0);
        assert_relative_eq!(xp_required(&config, 3), 300.0);
        assert_relative_eq!(xp_required(&config, 10), 2000.0);
    }

    #[test]
    fn gaps_interpolate_and_tail_extrapolates() {
        let config = LevelingConfig::default();
        assert_relative_eq!(xp_required(&config, 4), 550.0);
        assert_relative_eq!(xp_required(&config, 11), 2500.0);
        assert_relative_eq!(xp_required(&config, 13), 3500.0);
    }

    #[test]
    fn multi_level_overflow_carries_remainder() {
        let config = ladder(&[(2, 100.0), (3, 300.0)], 500.0);
        let mut level = 1;
        let mut xp = 250.0 + 200.0;
        let gained = apply_level_ups(&config, &mut level, &mut xp);
        assert_eq!(gained, 2);
        assert_eq!(level, 3);
        assert_relative_eq!(xp, 50.0);
    }

    #[test]
    fn exact_threshold_levels_up_to_zero() {
        let config = ladder(&[(2, 100.0)], 100.0);
        let mut level = 1;
        let mut xp = 100.0;
        apply_level_ups(&config, &mut level, &mut xp);
        assert_eq!(level, 2);
        assert_relative_eq!(xp, 0.0);
    }

    #[test]
    fn late_game_scaling_truncates() {
        let config = LevelingConfig::default();
        assert_eq!(scaled_reward(&config, 4, 50), 50);
        assert_eq!(scaled_reward(&config, 5, 50), 60);
        assert_eq!(scaled_reward(&config, 7, 15), 18);
        assert_eq!(scaled_reward(&config, 5, 11), 13);
    }
}
