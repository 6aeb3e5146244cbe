//! `tracing` setup: same `OffsetTime` timer the daemon has always used,
//! plus an `EnvFilter` so `SYNCPAD_LOG` can scope verbosity per-module
//! without recompiling (spec.md §6).
use tracing_subscriber::{fmt, EnvFilter};

/// Installs the global subscriber. `default_level` is used when
/// `SYNCPAD_LOG` is unset; `--debug` on the CLI should pass `"debug"`.
///
/// # Panics
/// Panics if a global subscriber is already set, or if the time format
/// description fails to parse (it's a fixed literal, so this can't
/// actually happen at runtime).
pub fn initialize(default_level: &str) {
    let timer_format = time::format_description::parse("[hour]:[minute]:[second]")
        .expect("fixed time format description must parse");
    let time_offset = time::UtcOffset::current_local_offset().unwrap_or(time::UtcOffset::UTC);
    let timer = fmt::time::OffsetTime::new(time_offset, timer_format);

    let filter = EnvFilter::try_from_env("SYNCPAD_LOG").unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_thread_ids(true)
        .with_timer(timer)
        .init();
}
