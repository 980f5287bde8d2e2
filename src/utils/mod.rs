//! Utility Functions
//!
//! Logging, timing and filesystem locations.

mod logging;
mod time;

pub use logging::*;
pub use time::*;

use std::path::{Path, PathBuf};

/// Get the application data directory
pub fn get_app_data_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("stream-renderer")
}

/// Ensure a directory exists
pub fn ensure_dir(path: &Path) -> std::io::Result<()> {
    if !path.exists() {
        std::fs::create_dir_all(path)?;
    }
    Ok(())
}
