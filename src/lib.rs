pub mod config;
pub mod console;
pub mod plugin;
pub mod tracker;
pub mod world;

pub use plugin::{SimpleSleep, SleepHost};
pub use tracker::{SleepDecision, SleepThresholdTracker};
pub use world::{PlayerId, WorldName};

/// How many sleeping players it takes to skip the night.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SleepRequirement {
    /// Share of the online players, in (0, 1].
    Percentage(f64),
    /// Fixed number of players, capped at the online player count.
    Amount(u32),
}

impl Default for SleepRequirement {
    fn default() -> Self {
        SleepRequirement::Percentage(0.5)
    }
}

impl std::fmt::Display for SleepRequirement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SleepRequirement::Percentage(ratio) => write!(f, "{}%", percent(*ratio)),
            SleepRequirement::Amount(1) => write!(f, "1 player"),
            SleepRequirement::Amount(amount) => write!(f, "{} players", amount),
        }
    }
}

/// Ratio as a percentage, rounded to two decimals.
pub(crate) fn percent(ratio: f64) -> f64 {
    (ratio * 10000.0).round() / 100.0
}

/// What to do when the configuration file holds invalid values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OnInvalidConfig {
    #[default]
    UseDefault,
    Refuse,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SleepConfiguration {
    pub requirement: SleepRequirement,
    pub show_sleeping_players: bool,
    pub wake_up_hour: f32,
    pub on_invalid: OnInvalidConfig,
}

impl Default for SleepConfiguration {
    fn default() -> Self {
        Self {
            requirement: SleepRequirement::default(),
            show_sleeping_players: true,
            wake_up_hour: 6.0,
            on_invalid: OnInvalidConfig::UseDefault,
        }
    }
}
