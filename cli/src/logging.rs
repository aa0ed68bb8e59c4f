//! Log filter setup.
//!
//! `RUST_LOG` always wins. Without it the daemon starts at `warn` and
//! switches to the configured `logging.level` once configuration loads,
//! following later changes to that key.

use tracing::debug;
use tracing_subscriber::{EnvFilter, Registry, fmt, prelude::*, reload};

const BOOT_LEVEL: &str = "warn";

pub struct LogControl {
    handle: Option<reload::Handle<EnvFilter, Registry>>,
}

pub fn init() -> LogControl {
    let (filter, from_env) = match EnvFilter::try_from_default_env() {
        Ok(filter) => (filter, true),
        Err(_) => (EnvFilter::new(BOOT_LEVEL), false),
    };
    let (layer, handle) = reload::Layer::new(filter);

    tracing_subscriber::registry()
        .with(layer)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();

    LogControl {
        handle: (!from_env).then_some(handle),
    }
}

impl LogControl {
    /// Switch to the configured level unless `RUST_LOG` pinned one.
    pub fn apply_level(&self, level: &str) {
        let Some(handle) = &self.handle else {
            return;
        };
        match handle.modify(|filter| *filter = EnvFilter::new(level)) {
            Ok(()) => debug!("Log level set to {}", level),
            Err(e) => eprintln!("failed to change log level: {e}"),
        }
    }
}
