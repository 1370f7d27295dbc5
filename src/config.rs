use crate::{percent, OnInvalidConfig, SleepConfiguration, SleepRequirement};
use ini::{Ini, Properties};
use notify_debouncer_full::notify::{RecommendedWatcher, RecursiveMode};
use notify_debouncer_full::{
    new_debouncer, DebounceEventHandler, DebounceEventResult, Debouncer, RecommendedCache,
};
use parking_lot::Mutex;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::runtime::Handle;
use tracing::{info, warn};

const SECTION: &str = "Sleep";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not access configuration file: {0}")]
    Io(#[from] std::io::Error),

    #[error("could not parse configuration file: {0}")]
    Parse(#[from] ini::ParseError),

    #[error("{key} = {value:?} is not a number")]
    InvalidNumber { key: &'static str, value: String },

    #[error("{key} = {value} is out of range, expected {expected}")]
    OutOfRange {
        key: &'static str,
        value: String,
        expected: &'static str,
    },

    #[error("{key} = {value:?} is not one of {expected}")]
    InvalidValue {
        key: &'static str,
        value: String,
        expected: &'static str,
    },

    #[error("could not watch configuration file: {0}")]
    Watch(#[from] notify_debouncer_full::notify::Error),
}

impl From<ini::Error> for ConfigError {
    fn from(e: ini::Error) -> Self {
        match e {
            ini::Error::Io(e) => ConfigError::Io(e),
            ini::Error::Parse(e) => ConfigError::Parse(e),
        }
    }
}

fn get_optional<U, F: FnOnce(&str) -> Result<U, ConfigError>>(
    section: Option<&Properties>,
    property: &str,
    default: U,
    f: F,
) -> Result<U, ConfigError> {
    section
        .and_then(|x| x.get(property))
        .map_or(Ok(default), |x| f(x.trim()))
}

fn parse_bool(key: &'static str, s: &str) -> Result<bool, ConfigError> {
    if ["true", "on", "yes", "1"].iter().any(|x| s.eq_ignore_ascii_case(x)) {
        Ok(true)
    } else if ["false", "off", "no", "0"].iter().any(|x| s.eq_ignore_ascii_case(x)) {
        Ok(false)
    } else {
        Err(ConfigError::InvalidValue {
            key,
            value: s.to_owned(),
            expected: "true/false",
        })
    }
}

fn parse_number<T: std::str::FromStr>(key: &'static str, s: &str) -> Result<T, ConfigError> {
    s.parse::<T>().map_err(|_| ConfigError::InvalidNumber {
        key,
        value: s.to_owned(),
    })
}

/// Reads a sleep percentage, either as a ratio (`0.5`) or as a percentage (`50` or `50%`).
///
/// Plain values above 1 are read as percentages. The result is a ratio in (0, 1].
pub fn parse_percentage(key: &'static str, s: &str) -> Result<f64, ConfigError> {
    let (number, is_percent) = match s.strip_suffix('%') {
        Some(number) => (number.trim(), true),
        None => (s, false),
    };
    let value: f64 = parse_number(key, number)?;
    let ratio = if is_percent || value > 1.0 {
        value / 100.0
    } else {
        value
    };
    if ratio > 0.0 && ratio <= 1.0 {
        Ok(ratio)
    } else {
        Err(ConfigError::OutOfRange {
            key,
            value: s.to_owned(),
            expected: "a ratio in (0, 1] or a percentage in (0, 100]",
        })
    }
}

fn parse_policy(section: Option<&Properties>) -> Result<OnInvalidConfig, ConfigError> {
    get_optional(section, "on_invalid", OnInvalidConfig::UseDefault, |x| {
        if x.eq_ignore_ascii_case("default") {
            Ok(OnInvalidConfig::UseDefault)
        } else if x.eq_ignore_ascii_case("refuse") {
            Ok(OnInvalidConfig::Refuse)
        } else {
            Err(ConfigError::InvalidValue {
                key: "on_invalid",
                value: x.to_owned(),
                expected: "default/refuse",
            })
        }
    })
}

/// Finds `on_invalid` in a file the INI parser rejected.
fn scan_policy(text: &str) -> OnInvalidConfig {
    let refuse = text
        .lines()
        .filter_map(|line| line.split_once('='))
        .any(|(key, value)| {
            key.trim() == "on_invalid" && value.trim().eq_ignore_ascii_case("refuse")
        });
    if refuse {
        OnInvalidConfig::Refuse
    } else {
        OnInvalidConfig::UseDefault
    }
}

/// Builds a configuration from the `[Sleep]` section. Missing keys take their default values.
pub fn parse(conf: &Ini) -> Result<SleepConfiguration, ConfigError> {
    let section = conf.section(Some(SECTION));
    let defaults = SleepConfiguration::default();

    let on_invalid = parse_policy(section)?;

    let use_amount = get_optional(section, "mode", false, |x| {
        if x.eq_ignore_ascii_case("percentage") {
            Ok(false)
        } else if x.eq_ignore_ascii_case("amount") {
            Ok(true)
        } else {
            Err(ConfigError::InvalidValue {
                key: "mode",
                value: x.to_owned(),
                expected: "percentage/amount",
            })
        }
    })?;

    let ratio = match section.and_then(|x| x.get("sleepPercentage")) {
        Some(x) => parse_percentage("sleepPercentage", x.trim())?,
        None => get_optional(section, "sleep_percentage", 0.5, |x| {
            parse_percentage("sleep_percentage", x)
        })?,
    };

    let amount = get_optional(section, "amount_required", 3u32, |x| {
        let amount: u32 = parse_number("amount_required", x)?;
        if amount == 0 {
            return Err(ConfigError::OutOfRange {
                key: "amount_required",
                value: x.to_owned(),
                expected: "at least 1",
            });
        }
        Ok(amount)
    })?;

    let show_sleeping_players = get_optional(
        section,
        "show_sleeping_players",
        defaults.show_sleeping_players,
        |x| parse_bool("show_sleeping_players", x),
    )?;

    let wake_up_hour = get_optional(section, "wake_up_hour", defaults.wake_up_hour, |x| {
        let hour: f32 = parse_number("wake_up_hour", x)?;
        if (0.0..24.0).contains(&hour) {
            Ok(hour)
        } else {
            Err(ConfigError::OutOfRange {
                key: "wake_up_hour",
                value: x.to_owned(),
                expected: "an hour in [0, 24)",
            })
        }
    })?;

    let requirement = if use_amount {
        SleepRequirement::Amount(amount)
    } else {
        SleepRequirement::Percentage(ratio)
    };

    Ok(SleepConfiguration {
        requirement,
        show_sleeping_players,
        wake_up_hour,
        on_invalid,
    })
}

pub fn load(path: &Path) -> Result<SleepConfiguration, ConfigError> {
    let conf = Ini::load_from_file(path)?;
    parse(&conf)
}

/// Loads the configuration file, creating it with default values if it does not exist.
///
/// If the file exists but is invalid, `on_invalid` decides whether the defaults are used
/// or the error is returned. This includes files that are not valid INI; the policy is then
/// looked up line by line. A file that cannot be read at all falls back to the defaults.
pub fn load_or_create(path: &Path) -> Result<SleepConfiguration, ConfigError> {
    if !path.exists() {
        let config = SleepConfiguration::default();
        match save(&config, path) {
            Ok(()) => info!("Configuration not found, created {}", path.display()),
            Err(e) => warn!("Could not create configuration {}: {}", path.display(), e),
        }
        return Ok(config);
    }

    let conf = match Ini::load_from_file(path) {
        Ok(conf) => conf,
        Err(ini::Error::Parse(e)) => {
            let text = std::fs::read_to_string(path).unwrap_or_default();
            return match scan_policy(&text) {
                OnInvalidConfig::UseDefault => {
                    warn!("Invalid configuration: {}, using default values", e);
                    Ok(SleepConfiguration::default())
                }
                OnInvalidConfig::Refuse => Err(ConfigError::Parse(e)),
            };
        }
        Err(e) => {
            warn!("{}, using default values", ConfigError::from(e));
            return Ok(SleepConfiguration::default());
        }
    };

    match parse(&conf) {
        Ok(config) => {
            info!(
                "Configuration loaded, sleep requirement {}, show sleeping players {}",
                config.requirement, config.show_sleeping_players
            );
            Ok(config)
        }
        Err(e) => match parse_policy(conf.section(Some(SECTION))).unwrap_or_default() {
            OnInvalidConfig::UseDefault => {
                warn!("Invalid configuration: {}, using default values", e);
                Ok(SleepConfiguration::default())
            }
            OnInvalidConfig::Refuse => Err(e),
        },
    }
}

pub fn to_ini(config: &SleepConfiguration) -> Ini {
    let (mode, ratio, amount) = match config.requirement {
        SleepRequirement::Percentage(ratio) => ("percentage", ratio, 3),
        SleepRequirement::Amount(amount) => ("amount", 0.5, amount),
    };
    let on_invalid = match config.on_invalid {
        OnInvalidConfig::UseDefault => "default",
        OnInvalidConfig::Refuse => "refuse",
    };

    let mut conf = Ini::new();
    conf.with_section(Some(SECTION))
        .set("mode", mode)
        .set("sleep_percentage", percent(ratio).to_string())
        .set("amount_required", amount.to_string())
        .set(
            "show_sleeping_players",
            config.show_sleeping_players.to_string(),
        )
        .set("wake_up_hour", config.wake_up_hour.to_string())
        .set("on_invalid", on_invalid);
    conf
}

pub fn save(config: &SleepConfiguration, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    to_ini(config).write_to_file(path)?;
    Ok(())
}

async fn read_config_file(path: &Path) -> Result<SleepConfiguration, ConfigError> {
    let s = tokio::fs::read_to_string(path).await?;
    let conf = Ini::load_from_str(&s)?;
    parse(&conf)
}

/// Keeps a shared configuration in sync with its file.
///
/// The directory containing the file is watched, so that editors replacing the file are
/// picked up as well. A reload that fails keeps the previous configuration.
pub struct ConfigWatcher {
    config: Arc<Mutex<SleepConfiguration>>,
    _watcher: Debouncer<RecommendedWatcher, RecommendedCache>,
}

impl ConfigWatcher {
    /// Must be called from within a tokio runtime.
    pub fn new(
        path: PathBuf,
        config: Arc<Mutex<SleepConfiguration>>,
    ) -> Result<Self, ConfigError> {
        let handle = Handle::current();

        struct ConfigFileEventHandler {
            path: PathBuf,
            file_name: Option<OsString>,
            config: Arc<Mutex<SleepConfiguration>>,
            handle: Handle,
        }

        impl DebounceEventHandler for ConfigFileEventHandler {
            fn handle_event(&mut self, event: DebounceEventResult) {
                let Ok(events) = event else {
                    return;
                };
                let touched = events.iter().any(|e| {
                    e.event.paths.iter().any(|p| match &self.file_name {
                        Some(name) => p.file_name() == Some(name.as_os_str()),
                        None => true,
                    })
                });
                if !touched {
                    return;
                }
                let config = self.config.clone();
                let path = self.path.clone();
                self.handle.spawn(async move {
                    match read_config_file(&path).await {
                        Ok(res) => {
                            let mut config = config.lock();
                            if *config != res {
                                info!(
                                    "Configuration reloaded, sleep requirement {}",
                                    res.requirement
                                );
                                *config = res;
                            }
                        }
                        Err(e) => {
                            warn!(
                                "Could not reload configuration {}: {}, keeping previous values",
                                path.display(),
                                e
                            );
                        }
                    }
                });
            }
        }

        let file_name = path.file_name().map(|x| x.to_owned());
        let watch_path = match path.parent() {
            Some(parent) if parent.as_os_str().is_empty() => PathBuf::from("."),
            Some(parent) => parent.to_path_buf(),
            None => path.clone(),
        };

        let mut watcher = new_debouncer(
            Duration::from_secs(1),
            None,
            ConfigFileEventHandler {
                path,
                file_name,
                config: config.clone(),
                handle,
            },
        )?;
        watcher.watch(&watch_path, RecursiveMode::NonRecursive)?;
        Ok(Self {
            config,
            _watcher: watcher,
        })
    }

    pub fn config(&self) -> SleepConfiguration {
        self.config.lock().clone()
    }
}
