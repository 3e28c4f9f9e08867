// In-memory log sink for the `log` facade
//
// Keeps the last MAX_LOG_ENTRIES records so a frontend without a console
// (or a test) can show what the engine did.

use alloc::collections::VecDeque;
use alloc::format;
use alloc::string::String;
use alloc::vec::Vec;

use log::{Level, LevelFilter, Log, Metadata, Record, SetLoggerError};
use spin::Mutex;

const MAX_LOG_ENTRIES: usize = 64;

pub struct MemoryLogger {
    entries: Mutex<VecDeque<(Level, String)>>,
}

impl MemoryLogger {
    pub const fn new() -> Self {
        Self {
            entries: Mutex::new(VecDeque::new()),
        }
    }

    /// Copy of the retained records, oldest first.
    pub fn entries(&self) -> Vec<(Level, String)> {
        self.entries.lock().iter().cloned().collect()
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    fn push(&self, level: Level, message: String) {
        let mut entries = self.entries.lock();
        if entries.len() == MAX_LOG_ENTRIES {
            entries.pop_front();
        }
        entries.push_back((level, message));
    }
}

impl Log for MemoryLogger {
    fn enabled(&self, metadata: &Metadata<'_>) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record<'_>) {
        if self.enabled(record.metadata()) {
            self.push(record.level(), format!("{}", record.args()));
        }
    }

    fn flush(&self) {}
}

static LOGGER: MemoryLogger = MemoryLogger::new();

/// Install the global in-memory logger. Fails if another logger is
/// already set.
pub fn init(level: LevelFilter) -> Result<(), SetLoggerError> {
    log::set_logger(&LOGGER)?;
    log::set_max_level(level);
    Ok(())
}

pub fn get_logs() -> Vec<(Level, String)> {
    LOGGER.entries()
}

pub fn log_count() -> usize {
    LOGGER.entries.lock().len()
}

pub fn clear_logs() {
    LOGGER.clear();
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::string::ToString;

    #[test]
    fn test_ring_keeps_latest() {
        let logger = MemoryLogger::new();
        for i in 0..MAX_LOG_ENTRIES + 3 {
            logger.push(Level::Info, format!("line {}", i));
        }
        let entries = logger.entries();
        assert_eq!(entries.len(), MAX_LOG_ENTRIES);
        assert_eq!(entries[0].1, "line 3");
        assert_eq!(entries[MAX_LOG_ENTRIES - 1].1, format!("line {}", MAX_LOG_ENTRIES + 2));

        logger.clear();
        assert!(logger.entries().is_empty());
    }

    #[test]
    fn test_global_logger_captures_records() {
        // Another test may have installed it already
        let _ = init(LevelFilter::Error);
        log::error!("captured {}", 42);
        assert!(get_logs()
            .iter()
            .any(|(level, msg)| *level == Level::Error && *msg == "captured 42".to_string()));
        assert!(log_count() > 0);
    }
}
