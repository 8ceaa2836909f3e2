use std::str::FromStr;

use tracing::{subscriber::set_global_default, Level};
use tracing_subscriber::FmtSubscriber;

/// Environment variable holding the log level (error, warn, info, debug, trace).
pub const LOG_ENV: &str = "DUALK_LOG";

/// Log to stderr so stdout carries only the report.
pub fn init_logger() {
    let level = std::env::var(LOG_ENV)
        .ok()
        .and_then(|v| parse_level(&v))
        .unwrap_or(Level::WARN);

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_ansi(false)
        .without_time()
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();

    if let Err(e) = set_global_default(subscriber) {
        eprintln!("Warning: could not install logger: {e}");
    }
}

fn parse_level(value: &str) -> Option<Level> {
    Level::from_str(value.trim()).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_level() {
        assert_eq!(parse_level("debug"), Some(Level::DEBUG));
        assert_eq!(parse_level(" WARN "), Some(Level::WARN));
        assert_eq!(parse_level("loud"), None);
    }
}
