use chrono::{DateTime, Days, NaiveTime, Utc};
use std::fmt;
use std::fmt::{Display, Formatter};

/// Identifier of a connected player, as handed out by the host server.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct PlayerId(pub u64);

impl Display for PlayerId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for PlayerId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse().map(PlayerId)
    }
}

/// Name of a world. Every world runs its own day/night cycle.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct WorldName(String);

impl WorldName {
    pub fn new(name: impl Into<String>) -> Self {
        WorldName(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for WorldName {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for WorldName {
    fn from(s: &str) -> Self {
        WorldName(s.to_owned())
    }
}

/// Computes the game time a skipped night ends at.
///
/// This is the next time of day equal to `wake_up_hour` (fractional hours, so `5.5` is 05:30)
/// strictly after `now`. If `now` is already at or past that time today, tomorrow's is used.
pub fn wake_up_instant(now: DateTime<Utc>, wake_up_hour: f32) -> DateTime<Utc> {
    let wake_up_hour = wake_up_hour.clamp(0.0, 23.999);
    let hour = wake_up_hour as u32;
    let minutes = ((wake_up_hour - hour as f32) * 60.0) as u32;

    let time = NaiveTime::from_hms_opt(hour, minutes.min(59), 0).unwrap_or_default();
    let today = now.date_naive().and_time(time).and_utc();

    if now < today {
        today
    } else {
        today.checked_add_days(Days::new(1)).unwrap_or(today)
    }
}
