//! Tracing setup for the CLI
//!
//! `RUST_LOG` takes precedence; otherwise the level comes from `-v`/`-q`.
//! Log lines go to stderr so stdout stays clean for `status --json`.

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

pub fn level_for(verbose: bool, quiet: bool) -> Level {
    if verbose {
        Level::DEBUG
    } else if quiet {
        Level::ERROR
    } else {
        Level::WARN
    }
}

pub fn init_tracing(level: Level) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_str()));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .try_init()
        .ok();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verbosity_flags_map_to_levels() {
        assert_eq!(level_for(false, false), Level::WARN);
        assert_eq!(level_for(true, false), Level::DEBUG);
        assert_eq!(level_for(false, true), Level::ERROR);
    }
}
