//! Process-wide logger behind the `log` facade.
//!
//! The logger is installed once and can be reconfigured afterwards: the
//! launcher starts logging to stderr before the configuration is known, then
//! adds the configured file and level.

use log::{LevelFilter, Log, Metadata, Record};
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;
use std::sync::Mutex;

struct LauncherLogger {
    file: Mutex<Option<File>>,
}

static LOGGER: LauncherLogger = LauncherLogger {
    file: Mutex::new(None),
};

fn level_tag(level: log::Level) -> &'static str {
    match level {
        log::Level::Error => "err",
        log::Level::Warn => "warn",
        log::Level::Info => "info",
        log::Level::Debug => "debug",
        log::Level::Trace => "trace",
    }
}

impl Log for LauncherLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let line = format!("[{}] {}\n", level_tag(record.level()), record.args());
        let _ = io::stderr().write_all(line.as_bytes());
        if let Ok(mut file) = self.file.lock() {
            if let Some(file) = file.as_mut() {
                let _ = file.write_all(line.as_bytes());
            }
        }
    }

    fn flush(&self) {
        let _ = io::stderr().flush();
        if let Ok(mut file) = self.file.lock() {
            if let Some(file) = file.as_mut() {
                let _ = file.flush();
            }
        }
    }
}

/// Map a configured level name to a filter. Unknown names fall back to `Info`.
pub fn parse_level(name: &str) -> LevelFilter {
    match name.trim().to_ascii_lowercase().as_str() {
        "trace" => LevelFilter::Trace,
        "debug" => LevelFilter::Debug,
        "info" => LevelFilter::Info,
        "warn" | "warning" => LevelFilter::Warn,
        "err" | "error" => LevelFilter::Error,
        "none" | "off" => LevelFilter::Off,
        _ => LevelFilter::Info,
    }
}

/// Install (or reconfigure) the process logger.
///
/// Without `file` only stderr is written. A log file that cannot be opened is
/// reported on stderr and otherwise ignored.
pub fn init(file: Option<&Path>, level: Option<&str>) {
    // Only the first call installs; later calls just reconfigure.
    let _ = log::set_logger(&LOGGER);
    log::set_max_level(level.map(parse_level).unwrap_or(LevelFilter::Info));

    let opened = file.and_then(|path| {
        match OpenOptions::new().create(true).append(true).open(path) {
            Ok(f) => Some(f),
            Err(e) => {
                let _ = writeln!(io::stderr(), "[warn] cannot open log file {}: {e}", path.display());
                None
            }
        }
    });
    if let Ok(mut sink) = LOGGER.file.lock() {
        *sink = opened;
    }
}

/// Flush and detach the log file.
pub fn close() {
    LOGGER.flush();
    if let Ok(mut sink) = LOGGER.file.lock() {
        *sink = None;
    }
}

/// Serializes tests that reconfigure the process-wide logger.
#[cfg(test)]
pub(crate) fn test_guard() -> std::sync::MutexGuard<'static, ()> {
    static GUARD: Mutex<()> = Mutex::new(());
    GUARD.lock().unwrap_or_else(|e| e.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_parse_level_names() {
        assert_eq!(parse_level("warning"), LevelFilter::Warn);
        assert_eq!(parse_level(" ERROR "), LevelFilter::Error);
        assert_eq!(parse_level("none"), LevelFilter::Off);
        assert_eq!(parse_level("bogus"), LevelFilter::Info);
    }

    #[test]
    fn test_file_sink_receives_tagged_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("launcher.log");
        let _guard = test_guard();
        init(Some(&path), Some("info"));
        log::info!("Registering .fte");
        close();

        let text = fs::read_to_string(&path).unwrap();
        assert!(text.contains("[info] Registering .fte"), "{text}");
    }
}
