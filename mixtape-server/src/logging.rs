use std::env;
use std::fmt::Display;

use colored::Colorize;
use log::{Level, LevelFilter};

/// Installs the global logger. Local crates log at info by default and at
/// debug when `MIXTAPE_LOG=debug` is set; external crates only get through
/// at warn and above.
pub fn init_logger() {
    let local_filter = match env::var("MIXTAPE_LOG").as_deref() {
        Ok("debug") => LevelFilter::Debug,
        Ok("trace") => LevelFilter::Trace,
        _ => LevelFilter::Info,
    };

    fern::Dispatch::new()
        .format(move |out, message, record| {
            let target = Target::from_str(record.target());
            let now = chrono::Local::now();

            out.finish(format_args!(
                "{} {} {} {}",
                now.format("%H:%M:%S").to_string().bright_black(),
                level_badge(record.level()),
                target,
                message
            ))
        })
        .filter(move |meta| {
            let target = Target::from_str(meta.target());

            if target.is_local() {
                meta.level() <= local_filter
            } else {
                meta.level() <= Level::Warn
            }
        })
        .chain(std::io::stdout())
        .apply()
        .expect("logging is initialized")
}

enum Target {
    External(String),
    Server,
    Rooms,
}

impl Target {
    fn from_str(str: &str) -> Self {
        let module = str.split("::").next().unwrap_or_default();

        match module {
            "mixtape_server" => Self::Server,
            "mixtape_rooms" => Self::Rooms,
            other => Target::External(other.to_string()),
        }
    }

    fn is_local(&self) -> bool {
        !matches!(self, Self::External(_))
    }
}

impl Display for Target {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let result = match self {
            Target::External(x) => format!("{x:<6}").normal(),
            Target::Server => "server".bright_green(),
            Target::Rooms => "rooms ".bright_purple(),
        };

        Display::fmt(&result, f)
    }
}

fn level_badge(level: Level) -> String {
    match level {
        Level::Error => "ERROR".red().bold().to_string(),
        Level::Warn => " WARN".yellow().bold().to_string(),
        Level::Info => " INFO".blue().to_string(),
        Level::Debug => "DEBUG".white().dimmed().to_string(),
        Level::Trace => "TRACE".dimmed().to_string(),
    }
}
