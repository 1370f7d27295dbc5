use std::env;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use parking_lot::Mutex;
use simple_sleep::config::{self, ConfigWatcher};
use simple_sleep::console::{parse_command, ConsoleHost, HELP};
use simple_sleep::SimpleSleep;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args: Vec<String> = env::args().collect();

    let config_path = if args.len() > 1 {
        args[1].as_str()
    } else {
        "config.ini"
    };

    let file_appender = tracing_appender::rolling::daily("log", "simple-sleep.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);
    tracing_subscriber::fmt()
        .with_line_number(false)
        .with_file(false)
        .with_target(false)
        .with_writer(non_blocking)
        .init();

    info!(
        "SimpleSleep {} ({})",
        env!("CARGO_PKG_VERSION"),
        option_env!("VERGEN_GIT_SHA").unwrap_or("unknown")
    );

    let config = match config::load_or_create(Path::new(config_path)) {
        Ok(config) => config,
        Err(e) => {
            error!("Refusing to activate: {}", e);
            println!("Could not load configuration file {}: {}", config_path, e);
            return Err(e.into());
        }
    };
    let config = Arc::new(Mutex::new(config));

    let _watcher = match ConfigWatcher::new(config_path.into(), config.clone()) {
        Ok(watcher) => Some(watcher),
        Err(e) => {
            warn!("Configuration will not be reloaded: {}", e);
            None
        }
    };

    let mut plugin = SimpleSleep::new(config);
    let mut host = ConsoleHost::new(Utc::now());

    println!("{}", HELP);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut check_timer = tokio::time::interval(Duration::from_secs(1));

    loop {
        tokio::select! {
            _ = check_timer.tick() => {
                plugin.check_all_worlds(&mut host);
            }
            line = lines.next_line() => {
                let Some(line) = line? else {
                    break;
                };
                match parse_command(&line) {
                    Ok(Some(command)) => {
                        if !host.handle_command(&mut plugin, command) {
                            break;
                        }
                    }
                    Ok(None) => {}
                    Err(e) => println!("{}", e),
                }
            }
            _ = tokio::signal::ctrl_c() => {
                break;
            }
        }
        for line in host.take_output() {
            println!("{}", line);
        }
    }

    plugin.deactivate();
    Ok(())
}
