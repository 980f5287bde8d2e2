//! Vsync Signal
//!
//! Latched display-refresh signal. Each tick bumps a counter; the presenter
//! waits for a counter value newer than the last one it consumed, so a tick
//! that fires while it is busy presenting is never lost.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use log::{debug, info, warn};
use parking_lot::{Condvar, Mutex};

/// Outcome of a bounded vsync wait
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VsyncWait {
    Tick(u64),
    TimedOut,
    Interrupted,
}

struct VsyncState {
    tick: u64,
    interrupted: bool,
}

pub struct VsyncSignal {
    state: Mutex<VsyncState>,
    cond: Condvar,
}

impl VsyncSignal {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(VsyncState {
                tick: 0,
                interrupted: false,
            }),
            cond: Condvar::new(),
        }
    }

    /// Record a display refresh and wake the waiting presenter
    pub fn tick(&self) {
        self.state.lock().tick += 1;
        self.cond.notify_all();
    }

    pub fn current_tick(&self) -> u64 {
        self.state.lock().tick
    }

    /// Block until the counter passes `last_consumed`.
    /// Returns the counter value to consume, or `None` when interrupted.
    pub fn wait_after(&self, last_consumed: u64) -> Option<u64> {
        let mut state = self.state.lock();
        loop {
            if state.interrupted {
                return None;
            }
            if state.tick > last_consumed {
                return Some(state.tick);
            }
            self.cond.wait(&mut state);
        }
    }

    /// Like [`wait_after`](Self::wait_after) with an upper bound
    pub fn wait_after_timeout(&self, last_consumed: u64, timeout: Duration) -> VsyncWait {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();
        loop {
            if state.interrupted {
                return VsyncWait::Interrupted;
            }
            if state.tick > last_consumed {
                return VsyncWait::Tick(state.tick);
            }
            if self.cond.wait_until(&mut state, deadline).timed_out() {
                return if state.interrupted {
                    VsyncWait::Interrupted
                } else if state.tick > last_consumed {
                    VsyncWait::Tick(state.tick)
                } else {
                    VsyncWait::TimedOut
                };
            }
        }
    }

    /// Release any waiter; subsequent waits return immediately until `reset`
    pub fn interrupt(&self) {
        self.state.lock().interrupted = true;
        self.cond.notify_all();
    }

    /// Re-arm after an interrupt. The tick counter keeps counting.
    pub fn reset(&self) {
        self.state.lock().interrupted = false;
    }

    pub fn is_interrupted(&self) -> bool {
        self.state.lock().interrupted
    }
}

impl Default for VsyncSignal {
    fn default() -> Self {
        Self::new()
    }
}

/// Software vsync source ticking at a fixed refresh rate
///
/// Stands in for a display link on platforms without one.
pub struct VsyncTicker {
    running: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl VsyncTicker {
    pub fn start(signal: Arc<VsyncSignal>, refresh_rate: u32) -> std::io::Result<Self> {
        let refresh_rate = if refresh_rate == 0 {
            warn!("Refresh rate 0 requested, ticking at 60 Hz");
            60
        } else {
            refresh_rate
        };
        let interval = Duration::from_secs_f64(1.0 / refresh_rate as f64);
        let running = Arc::new(AtomicBool::new(true));
        let thread_running = running.clone();

        let thread = thread::Builder::new()
            .name("vsync-ticker".into())
            .spawn(move || {
                info!("Vsync ticker started at {} Hz", refresh_rate);
                let mut next = Instant::now() + interval;
                while thread_running.load(Ordering::Relaxed) {
                    let now = Instant::now();
                    if next > now {
                        thread::sleep(next - now);
                    }
                    signal.tick();
                    next += interval;

                    // Fell far behind (suspended, debugger): resync instead of bursting
                    let now = Instant::now();
                    if now > next + interval * 4 {
                        debug!("Vsync ticker resyncing after {:?} stall", now - next);
                        next = now + interval;
                    }
                }
                debug!("Vsync ticker stopped");
            })?;

        Ok(Self {
            running,
            thread: Some(thread),
        })
    }

    pub fn stop(&mut self) {
        self.running.store(false, Ordering::Relaxed);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for VsyncTicker {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missed_tick_still_counts() {
        let signal = VsyncSignal::new();
        signal.tick();
        // Tick happened before the wait started; it must not be lost
        assert_eq!(signal.wait_after(0), Some(1));
        assert_eq!(
            signal.wait_after_timeout(1, Duration::from_millis(10)),
            VsyncWait::TimedOut
        );
    }

    #[test]
    fn test_interrupt_releases_waiter() {
        let signal = Arc::new(VsyncSignal::new());
        let waiter = {
            let signal = signal.clone();
            thread::spawn(move || signal.wait_after(0))
        };
        thread::sleep(Duration::from_millis(20));
        signal.interrupt();
        assert_eq!(waiter.join().unwrap(), None);

        signal.reset();
        assert!(!signal.is_interrupted());
        signal.tick();
        assert_eq!(signal.wait_after(0), Some(1));
    }

    #[test]
    fn test_ticker_advances() {
        let signal = Arc::new(VsyncSignal::new());
        let mut ticker = VsyncTicker::start(signal.clone(), 200).unwrap();
        assert!(matches!(
            signal.wait_after_timeout(0, Duration::from_secs(1)),
            VsyncWait::Tick(_)
        ));
        ticker.stop();
        let stopped_at = signal.current_tick();
        thread::sleep(Duration::from_millis(30));
        assert_eq!(signal.current_tick(), stopped_at);
    }
}
