//! A stand-in host that is driven by text commands, one per line.
//!
//! It keeps track of which players are online in which world and of the game time per world,
//! which is all the plugin needs from a game server.

use crate::plugin::{SimpleSleep, SleepHost};
use crate::world::{PlayerId, WorldName};
use chrono::{DateTime, Utc};
use itertools::Itertools;
use std::collections::HashMap;
use thiserror::Error;

pub const HELP: &str = "Commands: join <player> <world>, leave <player>, sleep <player>, \
wake <player>, move <player> <world>, night <world>, unload <world>, status, quit";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    Join { player_id: PlayerId, world: WorldName },
    Leave { player_id: PlayerId },
    Sleep { player_id: PlayerId },
    Wake { player_id: PlayerId },
    Move { player_id: PlayerId, world: WorldName },
    Night { world: WorldName },
    Unload { world: WorldName },
    Status,
    Help,
    Quit,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommandError {
    #[error("Unknown command {0:?}. Type \"help\" for a list of commands")]
    Unknown(String),
    #[error("Usage: {0}")]
    Usage(&'static str),
    #[error("Invalid player id {0:?}")]
    InvalidPlayer(String),
}

/// Parses a command line. Empty lines give `Ok(None)`.
pub fn parse_command(line: &str) -> Result<Option<ConsoleCommand>, CommandError> {
    let mut parts = line.split_whitespace();
    let Some(cmd) = parts.next() else {
        return Ok(None);
    };
    let args: Vec<&str> = parts.collect();

    fn player(arg: &str) -> Result<PlayerId, CommandError> {
        arg.parse::<PlayerId>()
            .map_err(|_| CommandError::InvalidPlayer(arg.to_owned()))
    }

    let command = match (cmd.to_ascii_lowercase().as_str(), args.as_slice()) {
        ("join", [p, w]) => ConsoleCommand::Join {
            player_id: player(p)?,
            world: WorldName::from(*w),
        },
        ("join", _) => return Err(CommandError::Usage("join <player> <world>")),
        ("leave", [p]) => ConsoleCommand::Leave {
            player_id: player(p)?,
        },
        ("leave", _) => return Err(CommandError::Usage("leave <player>")),
        ("sleep", [p]) => ConsoleCommand::Sleep {
            player_id: player(p)?,
        },
        ("sleep", _) => return Err(CommandError::Usage("sleep <player>")),
        ("wake", [p]) => ConsoleCommand::Wake {
            player_id: player(p)?,
        },
        ("wake", _) => return Err(CommandError::Usage("wake <player>")),
        ("move", [p, w]) => ConsoleCommand::Move {
            player_id: player(p)?,
            world: WorldName::from(*w),
        },
        ("move", _) => return Err(CommandError::Usage("move <player> <world>")),
        ("night", [w]) => ConsoleCommand::Night {
            world: WorldName::from(*w),
        },
        ("night", _) => return Err(CommandError::Usage("night <world>")),
        ("unload", [w]) => ConsoleCommand::Unload {
            world: WorldName::from(*w),
        },
        ("unload", _) => return Err(CommandError::Usage("unload <world>")),
        ("status", _) => ConsoleCommand::Status,
        ("help", _) => ConsoleCommand::Help,
        ("quit", _) | ("exit", _) => ConsoleCommand::Quit,
        _ => return Err(CommandError::Unknown(cmd.to_owned())),
    };
    Ok(Some(command))
}

pub struct ConsoleHost {
    players: HashMap<PlayerId, WorldName>,
    world_times: HashMap<WorldName, DateTime<Utc>>,
    start_time: DateTime<Utc>,
    output: Vec<String>,
}

impl SleepHost for ConsoleHost {
    fn online_player_count(&self, world: &WorldName) -> usize {
        self.players.values().filter(|w| *w == world).count()
    }

    fn game_time(&self, world: &WorldName) -> DateTime<Utc> {
        self.world_times
            .get(world)
            .copied()
            .unwrap_or(self.start_time)
    }

    fn skip_night(&mut self, world: &WorldName, wake_up: DateTime<Utc>) {
        self.world_times.insert(world.clone(), wake_up);
        self.output.push(format!(
            "[{}] Night skipped, good morning! It is now {}",
            world,
            wake_up.format("%Y-%m-%d %H:%M")
        ));
    }

    fn broadcast(&mut self, world: &WorldName, message: &str) {
        self.output.push(format!("[{}] {}", world, message));
    }
}

impl ConsoleHost {
    pub fn new(start_time: DateTime<Utc>) -> Self {
        ConsoleHost {
            players: HashMap::new(),
            world_times: HashMap::new(),
            start_time,
            output: vec![],
        }
    }

    /// Lines produced since the last call.
    pub fn take_output(&mut self) -> Vec<String> {
        std::mem::take(&mut self.output)
    }

    fn player_world(&mut self, player_id: PlayerId) -> Option<WorldName> {
        let world = self.players.get(&player_id).cloned();
        if world.is_none() {
            self.output.push(format!("Player {} is not online", player_id));
        }
        world
    }

    /// Applies a command. Returns false when the console should stop.
    pub fn handle_command(&mut self, plugin: &mut SimpleSleep, command: ConsoleCommand) -> bool {
        match command {
            ConsoleCommand::Join { player_id, world } => {
                match self.players.insert(player_id, world.clone()) {
                    Some(old_world) if old_world != world => {
                        plugin.on_player_change_world(self, &old_world, &world, player_id);
                    }
                    _ => {
                        plugin.evaluate_world(self, &world);
                    }
                }
            }
            ConsoleCommand::Leave { player_id } => {
                if let Some(world) = self.players.remove(&player_id) {
                    plugin.on_player_disconnect(self, &world, player_id);
                } else {
                    self.output.push(format!("Player {} is not online", player_id));
                }
            }
            ConsoleCommand::Sleep { player_id } => {
                if let Some(world) = self.player_world(player_id) {
                    plugin.on_player_sleep(self, &world, player_id);
                }
            }
            ConsoleCommand::Wake { player_id } => {
                if let Some(world) = self.player_world(player_id) {
                    plugin.on_player_wake(self, &world, player_id);
                }
            }
            ConsoleCommand::Move { player_id, world } => {
                if let Some(old_world) = self.player_world(player_id) {
                    self.players.insert(player_id, world.clone());
                    plugin.on_player_change_world(self, &old_world, &world, player_id);
                }
            }
            ConsoleCommand::Night { world } => {
                let time = self.game_time(&world);
                let dusk = time
                    .date_naive()
                    .and_hms_opt(21, 0, 0)
                    .map_or(time, |x| x.and_utc());
                self.world_times.insert(world.clone(), dusk);
                plugin.on_night_start(&world);
                self.output.push(format!("[{}] Night falls", world));
            }
            ConsoleCommand::Unload { world } => {
                self.players.retain(|_, w| *w != world);
                self.world_times.remove(&world);
                plugin.on_world_unloaded(&world);
            }
            ConsoleCommand::Status => {
                let config = plugin.config();
                self.output
                    .push(format!("Sleep requirement {}", config.requirement));
                let worlds = self.players.values().cloned().unique().sorted();
                for world in worlds {
                    let online = self.online_player_count(&world);
                    let (sleeping, required) = match plugin.tracker(&world) {
                        Some(tracker) => {
                            (tracker.sleeping_count(), tracker.required_sleepers(online))
                        }
                        None => (0, 0),
                    };
                    self.output.push(format!(
                        "[{}] {} online, {} sleeping, {} required",
                        world, online, sleeping, required
                    ));
                }
            }
            ConsoleCommand::Help => {
                self.output.push(HELP.to_owned());
            }
            ConsoleCommand::Quit => return false,
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use crate::console::{parse_command, CommandError, ConsoleCommand, ConsoleHost};
    use crate::plugin::{SimpleSleep, SleepHost};
    use crate::world::{PlayerId, WorldName};
    use crate::{SleepConfiguration, SleepRequirement};
    use chrono::{TimeZone, Utc};
    use parking_lot::Mutex;
    use std::sync::Arc;

    fn run(host: &mut ConsoleHost, plugin: &mut SimpleSleep, lines: &[&str]) {
        for line in lines {
            if let Some(cmd) = parse_command(line).unwrap() {
                host.handle_command(plugin, cmd);
            }
        }
    }

    #[test]
    fn parse_commands() {
        assert_eq!(parse_command("   ").unwrap(), None);
        assert_eq!(
            parse_command("join 3 overworld").unwrap(),
            Some(ConsoleCommand::Join {
                player_id: PlayerId(3),
                world: WorldName::from("overworld")
            })
        );
        assert_eq!(
            parse_command("SLEEP 3").unwrap(),
            Some(ConsoleCommand::Sleep {
                player_id: PlayerId(3)
            })
        );
        assert_eq!(parse_command("quit").unwrap(), Some(ConsoleCommand::Quit));
        assert_eq!(
            parse_command("sleep").unwrap_err(),
            CommandError::Usage("sleep <player>")
        );
        assert_eq!(
            parse_command("sleep bob").unwrap_err(),
            CommandError::InvalidPlayer("bob".to_owned())
        );
        assert_eq!(
            parse_command("dance").unwrap_err(),
            CommandError::Unknown("dance".to_owned())
        );
    }

    #[test]
    fn night_is_skipped_from_console() {
        let config = Arc::new(Mutex::new(SleepConfiguration {
            requirement: SleepRequirement::Percentage(0.5),
            ..Default::default()
        }));
        let mut plugin = SimpleSleep::new(config);
        let start = Utc.with_ymd_and_hms(2026, 5, 1, 12, 0, 0).unwrap();
        let mut host = ConsoleHost::new(start);
        let world = WorldName::from("default");

        run(
            &mut host,
            &mut plugin,
            &[
                "join 1 default",
                "join 2 default",
                "join 3 default",
                "join 4 default",
                "night default",
            ],
        );
        assert_eq!(
            host.game_time(&world),
            Utc.with_ymd_and_hms(2026, 5, 1, 21, 0, 0).unwrap()
        );

        run(&mut host, &mut plugin, &["sleep 1", "sleep 2"]);
        assert_eq!(
            host.game_time(&world),
            Utc.with_ymd_and_hms(2026, 5, 2, 6, 0, 0).unwrap()
        );
        let output = host.take_output();
        assert!(output.contains(&"[default] 1/2 players sleeping".to_owned()));
        assert!(output
            .iter()
            .any(|x| x.starts_with("[default] Night skipped")));
    }

    #[test]
    fn leaving_players_lower_the_requirement() {
        let config = Arc::new(Mutex::new(SleepConfiguration {
            requirement: SleepRequirement::Percentage(1.0),
            ..Default::default()
        }));
        let mut plugin = SimpleSleep::new(config);
        let start = Utc.with_ymd_and_hms(2026, 5, 1, 23, 0, 0).unwrap();
        let mut host = ConsoleHost::new(start);

        run(
            &mut host,
            &mut plugin,
            &["join 1 default", "join 2 default", "sleep 1"],
        );
        assert!(!host
            .take_output()
            .iter()
            .any(|x| x.contains("Night skipped")));

        run(&mut host, &mut plugin, &["leave 2"]);
        assert!(host
            .take_output()
            .iter()
            .any(|x| x.contains("Night skipped")));
    }

    #[test]
    fn unknown_players_are_reported() {
        let mut plugin = SimpleSleep::new(Arc::new(Mutex::new(SleepConfiguration::default())));
        let mut host = ConsoleHost::new(Utc::now());
        run(&mut host, &mut plugin, &["sleep 9", "wake 9", "leave 9"]);
        assert_eq!(host.take_output().len(), 3);
        assert!(plugin.tracker(&WorldName::from("default")).is_none());
    }
}
