//! Per-cast log file.
//!
//! Each processed cast appends to `<logs>/<base>.log` so reruns keep the
//! history of earlier attempts. Lines can also be forwarded to a callback.

use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::Local;
use parking_lot::Mutex;

use super::types::{LineCallback, LogConfig, LogLevel, MessagePrefix};

/// Per-cast logger with file and optional callback output.
pub struct CastLogger {
    cast_name: String,
    log_path: PathBuf,
    file_writer: Mutex<Option<BufWriter<File>>>,
    callback: Option<LineCallback>,
    config: LogConfig,
}

impl CastLogger {
    /// Open (or create) the log file for a cast.
    pub fn new(
        cast_name: impl Into<String>,
        log_dir: impl AsRef<Path>,
        config: LogConfig,
        callback: Option<LineCallback>,
    ) -> std::io::Result<Self> {
        let cast_name = cast_name.into();
        let log_dir = log_dir.as_ref();

        fs::create_dir_all(log_dir)?;
        let log_path = log_dir.join(format!("{}.log", sanitize_filename(&cast_name)));
        let file = OpenOptions::new().create(true).append(true).open(&log_path)?;

        Ok(Self {
            cast_name,
            log_path,
            file_writer: Mutex::new(Some(BufWriter::new(file))),
            callback,
            config,
        })
    }

    pub fn cast_name(&self) -> &str {
        &self.cast_name
    }

    pub fn log_path(&self) -> &Path {
        &self.log_path
    }

    /// Log a message at the specified level.
    pub fn log(&self, level: LogLevel, message: &str) {
        if level < self.config.level {
            return;
        }
        let formatted = self.format_message(message);
        self.output(&formatted);
    }

    pub fn info(&self, message: &str) {
        self.log(LogLevel::Info, message);
    }

    pub fn debug(&self, message: &str) {
        self.log(LogLevel::Debug, message);
    }

    pub fn warn(&self, message: &str) {
        self.log(LogLevel::Warn, &MessagePrefix::Warning.format(message));
    }

    pub fn error(&self, message: &str) {
        self.log(LogLevel::Error, &MessagePrefix::Error.format(message));
    }

    /// Log an external command line.
    pub fn command(&self, command: &str) {
        self.log(LogLevel::Info, &MessagePrefix::Command.format(command));
    }

    /// Log a phase marker.
    pub fn phase(&self, phase_name: &str) {
        self.log(LogLevel::Info, &MessagePrefix::Phase.format(phase_name));
    }

    pub fn success(&self, message: &str) {
        self.log(LogLevel::Info, &MessagePrefix::Success.format(message));
    }

    pub fn flush(&self) {
        if let Some(ref mut writer) = *self.file_writer.lock() {
            let _ = writer.flush();
        }
    }

    /// Flush and release the file.
    pub fn close(&self) {
        self.flush();
        *self.file_writer.lock() = None;
    }

    fn format_message(&self, message: &str) -> String {
        if self.config.show_timestamps {
            let timestamp = Local::now().format("%Y-%m-%d %H:%M:%S");
            format!("[{}] {}", timestamp, message)
        } else {
            message.to_string()
        }
    }

    fn output(&self, formatted: &str) {
        if let Some(ref mut writer) = *self.file_writer.lock() {
            let _ = writeln!(writer, "{}", formatted);
        }
        if let Some(ref callback) = self.callback {
            callback(formatted);
        }
    }
}

impl Drop for CastLogger {
    fn drop(&mut self) {
        self.close();
    }
}

/// Sanitize a string to be safe for use as a filename.
fn sanitize_filename(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            _ => c,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tempfile::tempdir;

    fn quiet() -> LogConfig {
        LogConfig {
            level: LogLevel::Info,
            show_timestamps: false,
        }
    }

    #[test]
    fn appends_across_runs() {
        let dir = tempdir().unwrap();
        {
            let logger = CastLogger::new("WQP143", dir.path(), quiet(), None).unwrap();
            logger.phase("Setup");
        }
        {
            let logger = CastLogger::new("WQP143", dir.path(), quiet(), None).unwrap();
            logger.command("FilterW /s");
            logger.debug("hidden");
        }

        let content = fs::read_to_string(dir.path().join("WQP143.log")).unwrap();
        assert_eq!(content, "=== Setup ===\n$ FilterW /s\n");
    }

    #[test]
    fn forwards_lines_to_callback() {
        let dir = tempdir().unwrap();
        let count = Arc::new(AtomicUsize::new(0));
        let counter = count.clone();
        let callback: LineCallback = Box::new(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let logger = CastLogger::new("c1", dir.path(), quiet(), Some(callback)).unwrap();
        logger.info("one");
        logger.error("two");
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn sanitizes_filename() {
        assert_eq!(sanitize_filename("trip_6169"), "trip_6169");
        assert_eq!(sanitize_filename("a/b:c"), "a_b_c");
    }
}
