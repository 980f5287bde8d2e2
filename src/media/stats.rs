//! Pipeline Statistics
//!
//! Lock-free counters shared by the submission, decode and presentation
//! threads, plus the text shown by the stats overlay.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

/// Live counters, updated from any pipeline thread
#[derive(Debug, Default)]
pub struct PipelineStats {
    received: AtomicU64,
    submitted: AtomicU64,
    rejected: AtomicU64,
    decoded: AtomicU64,
    decode_failures: AtomicU64,
    dropped: AtomicU64,
    presented: AtomicU64,
    key_frames_presented: AtomicU64,
    /// Sum of decode latencies in microseconds
    decode_time_us: AtomicU64,
    /// Render FPS * 100, written by the presentation thread
    render_fps_centi: AtomicU32,
}

impl PipelineStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_received(&self) {
        self.received.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_submitted(&self) {
        self.submitted.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_rejected(&self) {
        self.rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_decoded(&self, decode_time_us: u64) {
        self.decoded.fetch_add(1, Ordering::Relaxed);
        self.decode_time_us.fetch_add(decode_time_us, Ordering::Relaxed);
    }

    pub(crate) fn record_decode_failure(&self) {
        self.decode_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_dropped(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_presented(&self, key_frame: bool) {
        self.presented.fetch_add(1, Ordering::Relaxed);
        if key_frame {
            self.key_frames_presented.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub(crate) fn set_render_fps(&self, fps: f32) {
        self.render_fps_centi
            .store((fps.max(0.0) * 100.0).round() as u32, Ordering::Relaxed);
    }

    pub fn presented(&self) -> u64 {
        self.presented.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self, queue_depth: usize) -> StatsSnapshot {
        let decoded = self.decoded.load(Ordering::Relaxed);
        let decode_time_us = self.decode_time_us.load(Ordering::Relaxed);
        StatsSnapshot {
            frames_received: self.received.load(Ordering::Relaxed),
            frames_submitted: self.submitted.load(Ordering::Relaxed),
            frames_rejected: self.rejected.load(Ordering::Relaxed),
            frames_decoded: decoded,
            decode_failures: self.decode_failures.load(Ordering::Relaxed),
            frames_dropped: self.dropped.load(Ordering::Relaxed),
            frames_presented: self.presented.load(Ordering::Relaxed),
            key_frames_presented: self.key_frames_presented.load(Ordering::Relaxed),
            avg_decode_time_ms: if decoded > 0 {
                decode_time_us as f32 / decoded as f32 / 1000.0
            } else {
                0.0
            },
            render_fps: self.render_fps_centi.load(Ordering::Relaxed) as f32 / 100.0,
            queue_depth,
        }
    }
}

/// Point-in-time copy of the counters
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatsSnapshot {
    pub frames_received: u64,
    pub frames_submitted: u64,
    pub frames_rejected: u64,
    pub frames_decoded: u64,
    pub decode_failures: u64,
    /// Frames lost after decode (backlog eviction, empty decoder output)
    pub frames_dropped: u64,
    pub frames_presented: u64,
    pub key_frames_presented: u64,
    pub avg_decode_time_ms: f32,
    pub render_fps: f32,
    /// Frames waiting for presentation when the snapshot was taken
    pub queue_depth: usize,
}

impl StatsSnapshot {
    /// Percentage of received frames that never reached the display
    pub fn loss_percent(&self) -> f32 {
        if self.frames_received == 0 {
            return 0.0;
        }
        let lost = self.frames_received.saturating_sub(self.frames_presented);
        lost as f32 * 100.0 / self.frames_received as f32
    }

    /// Multi-line text for the stats overlay
    pub fn format_overlay(&self) -> String {
        format!(
            "Rendering: {:.2} FPS\n\
             Frames dropped by decoder: {} ({} failures)\n\
             Frames lost: {:.2}%\n\
             Average decode time: {:.2} ms\n\
             Pending frames: {}",
            self.render_fps,
            self.frames_dropped,
            self.decode_failures,
            self.loss_percent(),
            self.avg_decode_time_ms,
            self.queue_depth,
        )
    }
}
