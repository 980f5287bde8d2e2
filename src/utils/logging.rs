//! Logging Utilities
//!
//! File-based and console logging.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use log::{Level, LevelFilter, Log, Metadata, Record};
use parking_lot::Mutex;

const CRATE_TARGET: &str = "stream_renderer";

/// Get the log file path
pub fn get_log_file_path() -> PathBuf {
    super::get_app_data_dir().join("renderer.log")
}

/// Logger writing to a file and optionally the console
///
/// The presentation thread logs from the frame path, so external crates are
/// held to WARN and this crate to DEBUG.
pub struct FileLogger {
    file: Mutex<Option<File>>,
    console: bool,
}

impl FileLogger {
    pub fn new(console: bool) -> Self {
        Self::with_path(&get_log_file_path(), console)
    }

    pub fn with_path(path: &Path, console: bool) -> Self {
        Self {
            file: Mutex::new(Self::open_log_file(path)),
            console,
        }
    }

    fn open_log_file(path: &Path) -> Option<File> {
        if let Some(parent) = path.parent() {
            let _ = super::ensure_dir(parent);
        }

        OpenOptions::new().create(true).append(true).open(path).ok()
    }

    fn allowed(target: &str, level: Level) -> bool {
        if target.starts_with(CRATE_TARGET) {
            level <= Level::Debug
        } else {
            level <= Level::Warn
        }
    }

    fn format_line(record: &Record) -> String {
        let timestamp = chrono::Local::now().format("%Y-%m-%d %H:%M:%S%.3f");
        format!("[{}] {} {} - {}\n", timestamp, record.level(), record.target(), record.args())
    }
}

impl Log for FileLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        Self::allowed(metadata.target(), metadata.level())
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }

        let line = Self::format_line(record);

        if let Some(ref mut file) = *self.file.lock() {
            let _ = file.write_all(line.as_bytes());
        }

        if self.console {
            print!("{}", line);
        }
    }

    fn flush(&self) {
        if let Some(ref mut file) = *self.file.lock() {
            let _ = file.flush();
        }
    }
}

/// Initialize logging to file and console
pub fn init_logging_with_console() -> Result<(), log::SetLoggerError> {
    log::set_boxed_logger(Box::new(FileLogger::new(true)))?;
    log::set_max_level(LevelFilter::Debug);
    Ok(())
}

/// Clear log file
pub fn clear_logs() -> std::io::Result<()> {
    let path = get_log_file_path();
    if path.exists() {
        std::fs::write(&path, "")?;
    }
    Ok(())
}

/// Export logs to a specific path
pub fn export_logs(dest: &Path) -> std::io::Result<()> {
    let src = get_log_file_path();
    if src.exists() {
        std::fs::copy(&src, dest)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_target_filtering() {
        assert!(FileLogger::allowed("stream_renderer::media::renderer", Level::Debug));
        assert!(!FileLogger::allowed("stream_renderer", Level::Trace));
        assert!(FileLogger::allowed("openh264", Level::Warn));
        assert!(!FileLogger::allowed("openh264", Level::Info));
    }

    #[test]
    fn test_writes_to_file() {
        let path = std::env::temp_dir().join(format!("stream-renderer-log-{}.log", std::process::id()));
        let _ = std::fs::remove_file(&path);
        let logger = FileLogger::with_path(&path, false);

        logger.log(
            &Record::builder()
                .args(format_args!("queue interrupted"))
                .level(Level::Info)
                .target("stream_renderer::media::queue")
                .build(),
        );
        logger.flush();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.contains("INFO stream_renderer::media::queue - queue interrupted"));
        let _ = std::fs::remove_file(&path);
    }
}
