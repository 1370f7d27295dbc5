use crate::world::PlayerId;
use crate::SleepRequirement;
use std::collections::HashSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipState {
    /// Has not signaled a skip this night.
    Armed,
    /// Has signaled; stays latched until the next night starts.
    Fired,
}

/// Outcome of [SleepThresholdTracker::evaluate].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SleepDecision {
    NotEnough,
    /// The threshold was reached for the first time this night. The night should be skipped.
    SkipNight,
    /// The threshold is met, but the skip has already been signaled this night.
    AlreadySkipped,
}

impl SleepDecision {
    pub fn threshold_met(self) -> bool {
        !matches!(self, SleepDecision::NotEnough)
    }
}

/// Sleeping players of one world and the one-shot skip signal for the current night.
#[derive(Debug, Clone)]
pub struct SleepThresholdTracker {
    sleeping: HashSet<PlayerId>,
    requirement: SleepRequirement,
    staged_requirement: Option<SleepRequirement>,
    state: SkipState,
}

impl SleepThresholdTracker {
    pub fn new(requirement: SleepRequirement) -> Self {
        SleepThresholdTracker {
            sleeping: HashSet::new(),
            requirement,
            staged_requirement: None,
            state: SkipState::Armed,
        }
    }

    /// Records a player as asleep. Returns false if the player was already recorded.
    pub fn player_sleep(&mut self, player_id: PlayerId) -> bool {
        self.sleeping.insert(player_id)
    }

    /// Returns false if the player was not recorded as asleep.
    pub fn player_wake(&mut self, player_id: PlayerId) -> bool {
        self.sleeping.remove(&player_id)
    }

    pub fn player_disconnect(&mut self, player_id: PlayerId) -> bool {
        self.sleeping.remove(&player_id)
    }

    pub fn is_sleeping(&self, player_id: PlayerId) -> bool {
        self.sleeping.contains(&player_id)
    }

    pub fn sleeping_count(&self) -> usize {
        self.sleeping.len()
    }

    pub fn state(&self) -> SkipState {
        self.state
    }

    pub fn requirement(&self) -> SleepRequirement {
        self.requirement
    }

    /// Stages a new requirement. It is used from the next [Self::reset_for_new_night] on,
    /// so that a night already in progress is decided by the rules it started with.
    pub fn set_requirement(&mut self, requirement: SleepRequirement) {
        if requirement == self.requirement {
            self.staged_requirement = None;
        } else {
            self.staged_requirement = Some(requirement);
        }
    }

    /// Checks the sleeping players against the online player count reported by the host.
    ///
    /// The first time the threshold is met in a night, [SleepDecision::SkipNight] is returned
    /// and the tracker latches. Later calls return [SleepDecision::AlreadySkipped] while the
    /// threshold is still met, until [Self::reset_for_new_night] is called.
    pub fn evaluate(&mut self, online_players: usize) -> SleepDecision {
        if !self.threshold_met(online_players) {
            return SleepDecision::NotEnough;
        }
        match self.state {
            SkipState::Armed => {
                self.state = SkipState::Fired;
                SleepDecision::SkipNight
            }
            SkipState::Fired => SleepDecision::AlreadySkipped,
        }
    }

    pub fn threshold_met(&self, online_players: usize) -> bool {
        if online_players == 0 {
            return false;
        }
        let sleeping = self.sleeping.len();
        match self.requirement {
            SleepRequirement::Percentage(ratio) => {
                sleeping as f64 / online_players as f64 >= ratio
            }
            SleepRequirement::Amount(amount) => sleeping >= online_players.min(amount as usize),
        }
    }

    /// Smallest number of sleeping players that meets the requirement.
    pub fn required_sleepers(&self, online_players: usize) -> usize {
        if online_players == 0 {
            return 0;
        }
        match self.requirement {
            SleepRequirement::Percentage(ratio) => {
                let online = online_players as f64;
                let mut required = ((online * ratio).ceil() as usize).min(online_players);
                // ceil of an inexact product can be off by one either way
                while required > 0 && (required - 1) as f64 / online >= ratio {
                    required -= 1;
                }
                while required < online_players && (required as f64 / online) < ratio {
                    required += 1;
                }
                required
            }
            SleepRequirement::Amount(amount) => online_players.min(amount as usize),
        }
    }

    /// Clears the sleeping players, re-arms the skip signal and applies any staged requirement.
    pub fn reset_for_new_night(&mut self) {
        self.sleeping.clear();
        self.state = SkipState::Armed;
        if let Some(requirement) = self.staged_requirement.take() {
            self.requirement = requirement;
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::tracker::{SkipState, SleepDecision, SleepThresholdTracker};
    use crate::world::PlayerId;
    use crate::SleepRequirement;

    fn tracker(ratio: f64) -> SleepThresholdTracker {
        SleepThresholdTracker::new(SleepRequirement::Percentage(ratio))
    }

    #[test]
    fn sleep_is_idempotent() {
        let mut t = tracker(0.5);
        assert!(t.player_sleep(PlayerId(1)));
        assert!(!t.player_sleep(PlayerId(1)));
        assert!(!t.player_sleep(PlayerId(1)));
        assert_eq!(t.sleeping_count(), 1);
        assert!(t.is_sleeping(PlayerId(1)));
        assert!(!t.is_sleeping(PlayerId(2)));
    }

    #[test]
    fn wake_and_disconnect_unknown_players() {
        let mut t = tracker(0.5);
        assert!(!t.player_wake(PlayerId(7)));
        assert!(!t.player_disconnect(PlayerId(7)));
        t.player_sleep(PlayerId(7));
        assert!(t.player_disconnect(PlayerId(7)));
        assert!(!t.player_wake(PlayerId(7)));
        assert_eq!(t.sleeping_count(), 0);
    }

    #[test]
    fn half_of_four_skips_and_stays_latched() {
        let mut t = tracker(0.5);
        t.player_sleep(PlayerId(1));
        assert_eq!(t.evaluate(4), SleepDecision::NotEnough);
        t.player_sleep(PlayerId(2));
        assert_eq!(t.evaluate(4), SleepDecision::SkipNight);
        assert_eq!(t.state(), SkipState::Fired);

        t.player_wake(PlayerId(2));
        assert_eq!(t.sleeping_count(), 1);
        assert_eq!(t.evaluate(4), SleepDecision::NotEnough);
        assert_eq!(t.state(), SkipState::Fired);

        // Meeting the threshold again the same night does not signal again
        t.player_sleep(PlayerId(3));
        assert_eq!(t.evaluate(4), SleepDecision::AlreadySkipped);
        assert!(t.evaluate(4).threshold_met());

        t.reset_for_new_night();
        assert_eq!(t.state(), SkipState::Armed);
        assert_eq!(t.sleeping_count(), 0);
    }

    #[test]
    fn three_quarters_of_four() {
        let mut t = tracker(0.75);
        t.player_sleep(PlayerId(1));
        t.player_sleep(PlayerId(2));
        assert!(!t.evaluate(4).threshold_met());
        t.player_sleep(PlayerId(3));
        assert_eq!(t.evaluate(4), SleepDecision::SkipNight);
    }

    #[test]
    fn nobody_online_never_skips() {
        let mut t = tracker(0.01);
        t.player_sleep(PlayerId(1));
        assert_eq!(t.evaluate(0), SleepDecision::NotEnough);
        assert_eq!(t.state(), SkipState::Armed);

        let mut t = SleepThresholdTracker::new(SleepRequirement::Amount(1));
        t.player_sleep(PlayerId(1));
        assert_eq!(t.evaluate(0), SleepDecision::NotEnough);
    }

    #[test]
    fn threshold_matches_ratio() {
        for ratio in [0.1, 0.25, 0.3, 0.5, 0.7, 0.75, 1.0] {
            for online in 1..=12usize {
                let mut t = tracker(ratio);
                for sleeping in 0..=online {
                    if sleeping > 0 {
                        t.player_sleep(PlayerId(sleeping as u64));
                    }
                    let expected = sleeping as f64 / online as f64 >= ratio;
                    assert_eq!(
                        t.threshold_met(online),
                        expected,
                        "{} {} {}",
                        ratio,
                        online,
                        sleeping
                    );
                }
            }
        }
    }

    #[test]
    fn required_sleepers_is_smallest_sufficient_count() {
        for ratio in [0.1, 0.3, 0.5, 0.7, 0.75, 1.0] {
            for online in 1..=12usize {
                let t = tracker(ratio);
                let required = t.required_sleepers(online);
                assert!(required as f64 / online as f64 >= ratio);
                assert!(required == 0 || ((required - 1) as f64 / online as f64) < ratio);
            }
        }
        assert_eq!(tracker(0.5).required_sleepers(0), 0);
    }

    #[test]
    fn amount_is_capped_at_online_players() {
        let mut t = SleepThresholdTracker::new(SleepRequirement::Amount(3));
        assert_eq!(t.required_sleepers(2), 2);
        assert_eq!(t.required_sleepers(10), 3);
        t.player_sleep(PlayerId(1));
        t.player_sleep(PlayerId(2));
        assert!(!t.threshold_met(10));
        assert_eq!(t.evaluate(2), SleepDecision::SkipNight);
    }

    #[test]
    fn requirement_change_waits_for_next_night() {
        let mut t = tracker(0.5);
        t.player_sleep(PlayerId(1));
        t.set_requirement(SleepRequirement::Percentage(0.25));
        assert_eq!(t.requirement(), SleepRequirement::Percentage(0.5));
        assert!(!t.threshold_met(4));

        t.reset_for_new_night();
        assert_eq!(t.requirement(), SleepRequirement::Percentage(0.25));
        t.player_sleep(PlayerId(1));
        assert!(t.threshold_met(4));
    }
}
