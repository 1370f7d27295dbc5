use crate::tracker::{SleepDecision, SleepThresholdTracker};
use crate::world::{wake_up_instant, PlayerId, WorldName};
use crate::SleepConfiguration;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

/// Handle to the game server hosting the plugin.
///
/// A host implements this trait and passes itself to every [SimpleSleep] callback.
pub trait SleepHost {
    /// Number of players currently in the world. Queried on every evaluation.
    fn online_player_count(&self, world: &WorldName) -> usize;

    /// Current game time of the world.
    fn game_time(&self, world: &WorldName) -> DateTime<Utc>;

    /// Called at most once per world and night, when enough players are asleep.
    ///
    /// The host is expected to set the world time to `wake_up` and wake the sleeping players.
    fn skip_night(&mut self, world: &WorldName, wake_up: DateTime<Utc>);

    /// Sends a short notification to every player in the world.
    fn broadcast(&mut self, _world: &WorldName, _message: &str) {}
}

struct WorldSleep {
    tracker: SleepThresholdTracker,
    last_announced: usize,
}

/// The plugin instance. Created on activation and owned by the host.
pub struct SimpleSleep {
    config: Arc<Mutex<SleepConfiguration>>,
    worlds: HashMap<WorldName, WorldSleep>,
}

impl SimpleSleep {
    pub fn new(config: Arc<Mutex<SleepConfiguration>>) -> Self {
        info!(
            "SimpleSleep enabled, sleep requirement {}",
            config.lock().requirement
        );
        SimpleSleep {
            config,
            worlds: HashMap::new(),
        }
    }

    pub fn config(&self) -> SleepConfiguration {
        self.config.lock().clone()
    }

    fn world_mut(&mut self, world: &WorldName) -> &mut WorldSleep {
        let requirement = self.config.lock().requirement;
        self.worlds
            .entry(world.clone())
            .or_insert_with(|| WorldSleep {
                tracker: SleepThresholdTracker::new(requirement),
                last_announced: 0,
            })
    }

    pub fn tracker(&self, world: &WorldName) -> Option<&SleepThresholdTracker> {
        self.worlds.get(world).map(|x| &x.tracker)
    }

    pub fn on_player_sleep<H: SleepHost>(
        &mut self,
        host: &mut H,
        world: &WorldName,
        player_id: PlayerId,
    ) -> SleepDecision {
        if self.world_mut(world).tracker.player_sleep(player_id) {
            info!("Player {} is sleeping in {}", player_id, world);
        }
        self.evaluate_world(host, world)
    }

    pub fn on_player_wake<H: SleepHost>(
        &mut self,
        host: &mut H,
        world: &WorldName,
        player_id: PlayerId,
    ) -> SleepDecision {
        if self.world_mut(world).tracker.player_wake(player_id) {
            info!("Player {} woke up in {}", player_id, world);
        }
        self.evaluate_world(host, world)
    }

    pub fn on_player_disconnect<H: SleepHost>(
        &mut self,
        host: &mut H,
        world: &WorldName,
        player_id: PlayerId,
    ) -> SleepDecision {
        self.world_mut(world).tracker.player_disconnect(player_id);
        self.evaluate_world(host, world)
    }

    /// A player left `from` for `to`. Their sleep in `from` no longer counts.
    pub fn on_player_change_world<H: SleepHost>(
        &mut self,
        host: &mut H,
        from: &WorldName,
        to: &WorldName,
        player_id: PlayerId,
    ) {
        self.world_mut(from).tracker.player_disconnect(player_id);
        self.evaluate_world(host, from);
        self.evaluate_world(host, to);
    }

    /// Called by the host when night falls in a world.
    ///
    /// Configuration changes to the sleep requirement take effect from here on.
    pub fn on_night_start(&mut self, world: &WorldName) {
        let requirement = self.config.lock().requirement;
        let world_sleep = self.world_mut(world);
        world_sleep.tracker.set_requirement(requirement);
        world_sleep.tracker.reset_for_new_night();
        world_sleep.last_announced = 0;
        info!("Night started in {}", world);
    }

    pub fn on_world_unloaded(&mut self, world: &WorldName) {
        self.worlds.remove(world);
    }

    /// Re-evaluates every known world. The online population can change without any sleep event.
    pub fn check_all_worlds<H: SleepHost>(&mut self, host: &mut H) {
        let worlds: Vec<WorldName> = self.worlds.keys().cloned().collect();
        for world in worlds.iter() {
            self.evaluate_world(host, world);
        }
    }

    pub fn evaluate_world<H: SleepHost>(
        &mut self,
        host: &mut H,
        world: &WorldName,
    ) -> SleepDecision {
        let config = self.config.lock().clone();
        let online = host.online_player_count(world);
        let world_sleep = self.world_mut(world);

        let sleeping = world_sleep.tracker.sleeping_count();
        if config.show_sleeping_players && sleeping != world_sleep.last_announced && sleeping > 0
        {
            let required = world_sleep.tracker.required_sleepers(online);
            let msg = format!("{}/{} players sleeping", sleeping, required);
            host.broadcast(world, &msg);
        }
        world_sleep.last_announced = sleeping;

        let decision = world_sleep.tracker.evaluate(online);
        if decision == SleepDecision::SkipNight {
            let wake_up = wake_up_instant(host.game_time(world), config.wake_up_hour);
            info!(
                "{} of {} players sleeping in {}, skipping night until {}",
                sleeping, online, world, wake_up
            );
            host.skip_night(world, wake_up);
        }
        decision
    }

    /// Clears all state. The plugin can be activated again with [SimpleSleep::new].
    pub fn deactivate(&mut self) {
        self.worlds.clear();
        info!("SimpleSleep disabled");
    }
}
