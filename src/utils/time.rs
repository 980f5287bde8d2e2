//! Time Utilities
//!
//! Frame pacing measurements and stream-relative timestamps.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Number of frame intervals kept for the rolling FPS average
const FRAME_WINDOW: usize = 120;

/// Rolling frame-interval timer
pub struct FrameTimer {
    last_frame: Option<Instant>,
    frame_count: u64,
    frame_times: VecDeque<Duration>,
}

impl FrameTimer {
    pub fn new() -> Self {
        Self {
            last_frame: None,
            frame_count: 0,
            frame_times: VecDeque::with_capacity(FRAME_WINDOW),
        }
    }

    /// Mark a new frame and return the delta to the previous one
    pub fn tick(&mut self) -> Duration {
        let now = Instant::now();
        self.frame_count += 1;

        let Some(last) = self.last_frame.replace(now) else {
            return Duration::ZERO;
        };
        let delta = now - last;

        self.frame_times.push_back(delta);
        if self.frame_times.len() > FRAME_WINDOW {
            self.frame_times.pop_front();
        }

        delta
    }

    /// Current FPS based on recent frame intervals
    pub fn fps(&self) -> f32 {
        let avg = self.avg_frame_time_ms();
        if avg > 0.0 {
            1000.0 / avg
        } else {
            0.0
        }
    }

    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    /// Average frame interval in milliseconds
    pub fn avg_frame_time_ms(&self) -> f32 {
        if self.frame_times.is_empty() {
            return 0.0;
        }

        let total: Duration = self.frame_times.iter().sum();
        total.as_secs_f32() * 1000.0 / self.frame_times.len() as f32
    }
}

impl Default for FrameTimer {
    fn default() -> Self {
        Self::new()
    }
}

/// Stream clock starting at zero
pub struct RelativeTimer {
    start: Instant,
}

impl RelativeTimer {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    /// Milliseconds since start, wrapping like a 32-bit presentation timestamp
    pub fn elapsed_ms_u32(&self) -> u32 {
        self.start.elapsed().as_millis() as u32
    }
}

impl Default for RelativeTimer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_timer_window() {
        let mut timer = FrameTimer::new();
        assert_eq!(timer.tick(), Duration::ZERO);
        assert_eq!(timer.fps(), 0.0);

        for _ in 0..3 {
            std::thread::sleep(Duration::from_millis(5));
            timer.tick();
        }
        assert_eq!(timer.frame_count(), 4);
        assert!(timer.avg_frame_time_ms() >= 5.0);
        assert!(timer.fps() > 0.0 && timer.fps() <= 200.0);
    }
}
