//! Display Capability
//!
//! Where presented frames end up. Platform compositors implement
//! [`DisplaySink`]; [`StatsSink`] is a headless sink that only tracks timing.

use std::sync::Arc;
use std::time::Duration;

use log::{debug, info};

use super::DecodedSample;
use crate::utils::FrameTimer;

/// Display/compositor capability
pub trait DisplaySink: Send {
    /// Hand a decoded sample to the compositor for display at `presentation_time`
    fn schedule(&mut self, sample: Arc<DecodedSample>, presentation_time: Duration);

    /// Drop anything still held for display. Called when presentation stops.
    fn flush(&mut self) {}
}

/// Headless sink that measures presentation cadence and logs it periodically
pub struct StatsSink {
    timer: FrameTimer,
    log_interval: u64,
    last_size: Option<(u32, u32)>,
    last_presentation_time: Duration,
}

impl StatsSink {
    /// Log a summary every `log_interval` frames (0 disables the summary)
    pub fn new(log_interval: u64) -> Self {
        Self {
            timer: FrameTimer::new(),
            log_interval,
            last_size: None,
            last_presentation_time: Duration::ZERO,
        }
    }

    pub fn frames(&self) -> u64 {
        self.timer.frame_count()
    }

    pub fn fps(&self) -> f32 {
        self.timer.fps()
    }

    pub fn last_presentation_time(&self) -> Duration {
        self.last_presentation_time
    }
}

impl DisplaySink for StatsSink {
    fn schedule(&mut self, sample: Arc<DecodedSample>, presentation_time: Duration) {
        self.timer.tick();
        self.last_presentation_time = presentation_time;

        let size = (sample.width, sample.height);
        if self.last_size != Some(size) {
            info!("Presenting {}x{} frames", size.0, size.1);
            self.last_size = Some(size);
        }

        let frames = self.timer.frame_count();
        if self.log_interval > 0 && frames % self.log_interval == 0 {
            info!(
                "Presented {} frames, {:.1} fps, {:.2} ms avg frame time",
                frames,
                self.timer.fps(),
                self.timer.avg_frame_time_ms()
            );
        }
    }

    fn flush(&mut self) {
        debug!("StatsSink flushed after {} frames", self.timer.frame_count());
    }
}
