//! Tracing subscriber setup for the binary, tests and benches.
//!
//! Environment variables:
//! - `RUST_LOG`: filter directives (e.g. `kvprobe=debug,kvprobe::oracle=trace`)
//! - `KVPROBE_LOG_DIR`: when set, events are also appended as NDJSON to
//!   `<dir>/kvprobe.jsonl`
//! - `KVPROBE_LOG_CONSOLE`: set to `0` to silence the stderr layer
//!
//! ```bash
//! KVPROBE_LOG_DIR=logs RUST_LOG=kvprobe=debug kvprobe 4
//! jq 'select(.level == "WARN")' logs/kvprobe.jsonl
//! ```

use std::env;
use std::fs::{self, OpenOptions};
use std::io;
use std::path::PathBuf;
use std::sync::{Mutex, Once};

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

static INIT: Once = Once::new();

/// Install the global subscriber.
///
/// Only the first call has any effect. Failing to open the log file is
/// reported on stderr and the console layer is still installed.
pub fn init_tracing() {
    INIT.call_once(|| {
        let config = TracingConfig::from_env();
        if let Err(e) = setup_tracing(&config) {
            eprintln!("kvprobe: file logging disabled: {e}");
        }
    });
}

/// Where and how much to log.
#[derive(Debug, Clone)]
pub struct TracingConfig {
    /// Directory for the NDJSON file, `None` for console only.
    pub log_dir: Option<PathBuf>,
    /// File name inside `log_dir`.
    pub log_file: String,
    /// Emit human-readable events on stderr.
    pub console_enabled: bool,
    /// Level used when `RUST_LOG` is unset.
    pub default_level: Level,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            log_dir: None,
            log_file: "kvprobe.jsonl".to_string(),
            console_enabled: true,
            default_level: Level::INFO,
        }
    }
}

impl TracingConfig {
    /// Default config overridden by `KVPROBE_LOG_DIR` and `KVPROBE_LOG_CONSOLE`.
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(dir) = env::var("KVPROBE_LOG_DIR") {
            config.log_dir = Some(PathBuf::from(dir));
        }
        if env::var("KVPROBE_LOG_CONSOLE").is_ok_and(|v| v == "0") {
            config.console_enabled = false;
        }
        config
    }
}

fn make_filter(default_level: Level) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level.to_string()))
}

fn setup_tracing(config: &TracingConfig) -> io::Result<()> {
    let console_layer = if config.console_enabled {
        Some(
            tracing_subscriber::fmt::layer()
                .with_writer(io::stderr)
                .with_target(true)
                .compact()
                .with_filter(make_filter(config.default_level)),
        )
    } else {
        None
    };

    let (file_layer, file_err) = match open_log_file(config) {
        Ok(Some(file)) => {
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(Mutex::new(file))
                .with_target(true)
                .with_file(true)
                .with_line_number(true)
                .json()
                .with_filter(make_filter(config.default_level));
            (Some(layer), None)
        }
        Ok(None) => (None, None),
        Err(e) => (None, Some(e)),
    };

    // try_init: tests may race another subscriber into place.
    let _ = Registry::default()
        .with(console_layer)
        .with(file_layer)
        .try_init();

    file_err.map_or(Ok(()), Err)
}

fn open_log_file(config: &TracingConfig) -> io::Result<Option<fs::File>> {
    let Some(dir) = &config.log_dir else {
        return Ok(None);
    };
    fs::create_dir_all(dir)?;
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(dir.join(&config.log_file))?;
    Ok(Some(file))
}
