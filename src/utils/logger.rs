// src/utils/logger.rs

use log::{Level, LevelFilter, Metadata, Record, SetLoggerError};
use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};

static LOGGER: StderrLogger = StderrLogger;
static MAX_LEVEL: AtomicUsize = AtomicUsize::new(0);

struct StderrLogger;

/// Installs a plain stderr logger. Fails if another logger is already set.
pub fn init(level: LevelFilter) -> Result<(), SetLoggerError> {
  log::set_logger(&LOGGER)?;
  MAX_LEVEL.store(level as usize, Ordering::Relaxed);
  log::set_max_level(level);
  Ok(())
}

fn tag(level: Level) -> &'static str {
  match level {
    Level::Error => "[error]",
    Level::Warn => "[warn] ",
    Level::Info => "[info] ",
    Level::Debug => "[debug]",
    Level::Trace => "[trace]",
  }
}

impl log::Log for StderrLogger {
  fn enabled(&self, metadata: &Metadata) -> bool {
    (metadata.level() as usize) <= MAX_LEVEL.load(Ordering::Relaxed)
  }

  fn log(&self, record: &Record) {
    if self.enabled(record.metadata()) {
      // Format: "[info]  atomsys::physics::neighbors: 512 atoms, ..."
      let mut err = std::io::stderr().lock();
      let _ = writeln!(err, "{} {}: {}", tag(record.level()), record.target(), record.args());
    }
  }

  fn flush(&self) {
    let _ = std::io::stderr().flush();
  }
}
