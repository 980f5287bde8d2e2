//! Application Configuration
//!
//! Persistent stream settings, stored as JSON in the platform config directory.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::media::VideoFormat;

/// Stream settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    // === Video ===
    /// Target bitrate in kbps
    pub bitrate_kbps: u32,

    /// Target frame rate, also the display refresh rate handed to the decoder
    pub framerate: u32,

    pub height: u32,
    pub width: u32,

    /// Prefer HEVC when the decoder supports it
    pub use_hevc: bool,

    /// Request HDR (HEVC Main10)
    pub enable_hdr: bool,

    /// Pace presentation to display refresh
    pub use_vsync: bool,

    /// Decoded frames allowed to wait for presentation (0 = unbounded)
    pub max_pending_frames: usize,

    // === Session ===
    pub optimize_games: bool,
    pub multi_controller: bool,
    pub audio_on_pc: bool,

    // === Input ===
    pub onscreen_controls: OnscreenControls,
    pub bt_mouse_support: bool,
    pub absolute_touch_mode: bool,

    // === Overlay ===
    /// Show pipeline statistics
    pub stats_overlay: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            bitrate_kbps: 10_000,
            framerate: 60,
            height: 720,
            width: 1280,
            use_hevc: false,
            enable_hdr: false,
            use_vsync: true,
            max_pending_frames: 8,
            optimize_games: true,
            multi_controller: true,
            audio_on_pc: false,
            onscreen_controls: OnscreenControls::Auto,
            bt_mouse_support: false,
            absolute_touch_mode: false,
            stats_overlay: false,
        }
    }
}

impl Settings {
    /// Get settings file path
    fn file_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("stream-renderer").join("settings.json"))
    }

    /// Load settings from the platform config directory
    pub fn load() -> Result<Self> {
        let path = Self::file_path().ok_or_else(|| anyhow::anyhow!("No config directory"))?;
        Self::load_from(&path)
    }

    /// Save settings to the platform config directory
    pub fn save(&self) -> Result<()> {
        let path = Self::file_path().ok_or_else(|| anyhow::anyhow!("No config directory"))?;
        self.save_to(&path)
    }

    /// Load settings from `path`; a missing file yields defaults
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings from {}", path.display()))?;
        let settings: Settings = serde_json::from_str(&content)
            .with_context(|| format!("Invalid settings file {}", path.display()))?;
        Ok(settings)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write settings to {}", path.display()))?;

        Ok(())
    }

    /// Codec to request from the host. HDR implies HEVC Main10.
    pub fn video_format(&self) -> VideoFormat {
        match (self.use_hevc, self.enable_hdr) {
            (_, true) => VideoFormat::H265Main10,
            (true, false) => VideoFormat::H265,
            (false, false) => VideoFormat::H264,
        }
    }

    pub fn refresh_rate(&self) -> u32 {
        self.framerate.max(1)
    }

    pub fn resolution(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

/// On-screen controller overlay mode
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OnscreenControls {
    Off,
    #[default]
    Auto,
    Simple,
    Full,
}
