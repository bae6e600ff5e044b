//! Tracing initialization.
//!
//! - `COURSEC_LOG` sets the filter (`debug`, or directives such as
//!   `info,coursec::prune=debug`). Defaults to `info`.
//! - `COURSEC_LOG_FORMAT=json` switches to JSON lines.
//!
//! Logs go to stderr so the run report on stdout stays clean.

use tracing_subscriber::EnvFilter;

pub const LOG_ENV: &str = "COURSEC_LOG";
pub const LOG_FORMAT_ENV: &str = "COURSEC_LOG_FORMAT";

pub fn init_tracing() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("info"));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr);

    match std::env::var(LOG_FORMAT_ENV).as_deref() {
        Ok("json") => builder.json().init(),
        _ => builder.init(),
    }
}
