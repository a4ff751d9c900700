use std::{env, fs, path::Path, path::PathBuf, time::Duration};

use anyhow::{Context, Result};
use serde::Deserialize;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub bridge: BridgeConfig,
    #[serde(default)]
    pub driver: DriverConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub activity: ActivityConfig,
    #[serde(default)]
    pub engine: EngineConfig,
}

impl AppConfig {
    pub fn load() -> Result<Self> {
        if let Ok(path) = env::var("GOTCHI_CONFIG") {
            return Self::from_path(Path::new(&path));
        }

        let project_root = env::var("GOTCHI_ROOT").unwrap_or_else(|_| ".".to_string());
        let default_path = Path::new(&project_root).join("config/gotchi.toml");
        if default_path.exists() {
            return Self::from_path(&default_path);
        }

        let example_path = Path::new(&project_root).join("config/gotchi.example.toml");
        if example_path.exists() {
            tracing::warn!("Using example configuration at {:?}", example_path);
            return Self::from_path(&example_path);
        }

        Ok(Self::default())
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {:?}", path))?;
        Self::from_toml(&contents).with_context(|| format!("invalid config: {:?}", path))
    }

    pub fn from_toml(contents: &str) -> Result<Self> {
        Ok(toml::from_str(contents)?)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct BridgeConfig {
    #[serde(default = "BridgeConfig::default_listen_addr")]
    pub listen_addr: String,
    #[serde(default = "BridgeConfig::default_max_clients")]
    pub max_clients: usize,
}

impl BridgeConfig {
    fn default_listen_addr() -> String {
        "127.0.0.1:7878".into()
    }
    fn default_max_clients() -> usize {
        4
    }
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            listen_addr: Self::default_listen_addr(),
            max_clients: Self::default_max_clients(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DriverConfig {
    #[serde(default = "DriverConfig::default_tick_interval_ms")]
    pub tick_interval_ms: u64,
    /// Upper bound on the `dt` fed to the engine, so a suspended laptop does
    /// not wake up to an hour of penalties in one tick.
    #[serde(default = "DriverConfig::default_max_tick_secs")]
    pub max_tick_secs: f64,
    #[serde(default = "DriverConfig::default_signal_stale_ms")]
    pub signal_stale_ms: u64,
}

impl DriverConfig {
    fn default_tick_interval_ms() -> u64 {
        1000
    }
    fn default_max_tick_secs() -> f64 {
        5.0
    }
    fn default_signal_stale_ms() -> u64 {
        10_000
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn signal_stale(&self) -> Duration {
        Duration::from_millis(self.signal_stale_ms)
    }
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: Self::default_tick_interval_ms(),
            max_tick_secs: Self::default_max_tick_secs(),
            signal_stale_ms: Self::default_signal_stale_ms(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "backend")]
pub enum StorageConfig {
    #[serde(rename = "file")]
    File {
        #[serde(default = "StorageConfig::default_path")]
        path: PathBuf,
    },
    #[serde(rename = "turso")]
    Turso {
        url: String,
        #[serde(default = "StorageConfig::default_auth_token_env")]
        auth_token_env: String,
    },
}

impl StorageConfig {
    fn default_path() -> PathBuf {
        PathBuf::from("data/player.json")
    }
    fn default_auth_token_env() -> String {
        "TURSO_AUTH_TOKEN".into()
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self::File {
            path: Self::default_path(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ActivityConfig {
    #[serde(default = "ActivityConfig::default_enabled")]
    pub enabled: bool,
    #[serde(default = "ActivityConfig::default_dir")]
    pub dir: PathBuf,
}

impl ActivityConfig {
    fn default_enabled() -> bool {
        true
    }
    fn default_dir() -> PathBuf {
        PathBuf::from("data/activity_logs")
    }
}

impl Default for ActivityConfig {
    fn default() -> Self {
        Self {
            enabled: Self::default_enabled(),
            dir: Self::default_dir(),
        }
    }
}

/// Every tunable the player state engine reads. Nothing in `engine` hardcodes
/// a rate or threshold.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub max_hp: f64,
    /// How long a condition must read false before its duration resets.
    pub hysteresis_secs: f64,
    /// HP changes smaller than this are applied but not reported.
    pub hp_log_threshold: f64,
    pub depletion_happiness_penalty: f64,
    pub posture: PostureRules,
    pub idle: IdleRules,
    pub overwork: OverworkRules,
    pub quests: QuestRules,
    pub leveling: LevelingConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_hp: 100.0,
            hysteresis_secs: 1.0,
            hp_log_threshold: 0.1,
            depletion_happiness_penalty: 10.0,
            posture: PostureRules::default(),
            idle: IdleRules::default(),
            overwork: OverworkRules::default(),
            quests: QuestRules::default(),
            leveling: LevelingConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PostureRules {
    pub grace_secs: f64,
    /// HP per second once the grace period has passed.
    pub rate_instant: f64,
    pub threshold_3min_secs: f64,
    /// HP per minute on top of the instant rate.
    pub rate_3min: f64,
    pub threshold_7min_secs: f64,
    /// HP per minute past the second threshold.
    pub rate_7min: f64,
    /// When false the 7-minute rate replaces the 3-minute rate instead of
    /// adding to it.
    pub stack_penalties: bool,
    pub heal_window_secs: f64,
    pub heal_amount: f64,
}

impl Default for PostureRules {
    fn default() -> Self {
        Self {
            grace_secs: 3.0,
            rate_instant: 0.5,
            threshold_3min_secs: 180.0,
            rate_3min: 2.0,
            threshold_7min_secs: 420.0,
            rate_7min: 5.0,
            stack_penalties: true,
            heal_window_secs: 600.0,
            heal_amount: 3.0,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct IdleRules {
    pub threshold_secs: f64,
    pub penalty: f64,
}

impl Default for IdleRules {
    fn default() -> Self {
        Self {
            threshold_secs: 300.0,
            penalty: 3.0,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OverworkRules {
    pub threshold_secs: f64,
    pub penalty: f64,
}

impl Default for OverworkRules {
    fn default() -> Self {
        Self {
            threshold_secs: 5400.0,
            penalty: 10.0,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct QuestRules {
    pub base_slots: usize,
    /// Level at which one extra quest slot opens. `None` keeps a single
    /// policy of `base_slots` for every level.
    pub bonus_slot_level: Option<u32>,
    /// Idle time after which Rest and Recovery quests start progressing.
    pub rest_idle_secs: f64,
    pub happiness_bonus: f64,
    pub heal_focus: f64,
    pub heal_posture: f64,
    pub heal_rest: f64,
    pub heal_recovery: f64,
}

impl QuestRules {
    pub fn capacity(&self, level: u32) -> usize {
        match self.bonus_slot_level {
            Some(unlock) if level >= unlock => self.base_slots + 1,
            _ => self.base_slots,
        }
    }
}

impl Default for QuestRules {
    fn default() -> Self {
        Self {
            base_slots: 1,
            bonus_slot_level: Some(5),
            rest_idle_secs: 10.0,
            happiness_bonus: 5.0,
            heal_focus: 5.0,
            heal_posture: 3.0,
            heal_rest: 8.0,
            heal_recovery: 10.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct XpThreshold {
    pub level: u32,
    pub xp: f64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LevelingConfig {
    /// XP needed to reach each listed level from the one below it.
    pub thresholds: Vec<XpThreshold>,
    /// Added per level past the last listed threshold.
    pub extrapolation_step: f64,
    pub late_game_level: u32,
    pub late_game_multiplier: f64,
}

impl Default for LevelingConfig {
    fn default() -> Self {
        Self {
            thresholds: vec![
                XpThreshold { level: 2, xp: 100.0 },
                XpThreshold { level: 3, xp: 300.0 },
                XpThreshold { level: 5, xp: 800.0 },
                XpThreshold { level: 10, xp: 2000.0 },
            ],
            extrapolation_step: 500.0,
            late_game_level: 5,
            late_game_multiplier: 1.2,
        }
    }
}
