//! Test doubles for the decoder and display capabilities

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use super::decoder::{DecodeBuffer, DecodeCallback, DecoderConfig, DecoderError, DecoderSession, HardwareDecoder};
use super::{DecodedSample, DisplaySink, SamplePayload, VideoFormat, VsyncSignal};

/// Poll `cond` until it holds or `timeout` elapses
pub(crate) fn wait_until(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(2));
    }
    cond()
}

/// Stands in for a decoded platform surface; counts releases
struct SurfaceGuard(Arc<AtomicUsize>);

impl Drop for SurfaceGuard {
    fn drop(&mut self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

#[derive(Default)]
struct MockState {
    submissions: Vec<DecodeBuffer>,
    pending: VecDeque<(DecodeBuffer, DecodeCallback)>,
    deferred: bool,
    fail_next: Option<DecoderError>,
    reject_submit: Option<DecoderError>,
    configs: Vec<DecoderConfig>,
    sessions_released: usize,
}

/// Handle the test keeps to steer and inspect a [`MockDecoder`]
#[derive(Clone)]
pub(crate) struct MockControl {
    state: Arc<Mutex<MockState>>,
    samples_released: Arc<AtomicUsize>,
}

impl MockControl {
    /// Hold completions until `complete_next`/`complete_all`
    pub fn set_deferred(&self, deferred: bool) {
        self.state.lock().deferred = deferred;
    }

    /// Fail the next completion with `error`
    pub fn fail_next(&self, error: DecoderError) {
        self.state.lock().fail_next = Some(error);
    }

    /// Refuse submissions synchronously while set
    pub fn reject_submissions(&self, error: Option<DecoderError>) {
        self.state.lock().reject_submit = error;
    }

    pub fn submissions(&self) -> Vec<DecodeBuffer> {
        self.state.lock().submissions.clone()
    }

    pub fn configs(&self) -> Vec<DecoderConfig> {
        self.state.lock().configs.clone()
    }

    pub fn pending(&self) -> usize {
        self.state.lock().pending.len()
    }

    pub fn sessions_released(&self) -> usize {
        self.state.lock().sessions_released
    }

    pub fn samples_released(&self) -> usize {
        self.samples_released.load(Ordering::SeqCst)
    }

    pub fn complete_next(&self) -> bool {
        let next = self.state.lock().pending.pop_front();
        match next {
            Some((buffer, callback)) => {
                let result = self.outcome(&buffer);
                callback(result);
                true
            }
            None => false,
        }
    }

    pub fn complete_all(&self) {
        while self.complete_next() {}
    }

    fn outcome(&self, buffer: &DecodeBuffer) -> Result<DecodedSample, DecoderError> {
        if let Some(error) = self.state.lock().fail_next.take() {
            return Err(error);
        }
        Ok(DecodedSample {
            width: 1280,
            height: 720,
            pts: buffer.pts,
            decode_latency: buffer.submitted_at.elapsed(),
            payload: SamplePayload::Surface(Arc::new(SurfaceGuard(self.samples_released.clone()))),
            attachments: None,
        })
    }
}

pub(crate) struct MockDecoder {
    formats: Vec<VideoFormat>,
    control: MockControl,
}

impl MockDecoder {
    pub fn new() -> (Self, MockControl) {
        Self::with_formats(vec![VideoFormat::H264, VideoFormat::H265, VideoFormat::H265Main10])
    }

    pub fn with_formats(formats: Vec<VideoFormat>) -> (Self, MockControl) {
        let control = MockControl {
            state: Arc::new(Mutex::new(MockState::default())),
            samples_released: Arc::new(AtomicUsize::new(0)),
        };
        (
            Self {
                formats,
                control: control.clone(),
            },
            control,
        )
    }
}

impl HardwareDecoder for MockDecoder {
    fn name(&self) -> &str {
        "mock"
    }

    fn supports(&self, format: VideoFormat) -> bool {
        self.formats.contains(&format)
    }

    fn configure(&mut self, config: &DecoderConfig) -> Result<Box<dyn DecoderSession>, DecoderError> {
        self.control.state.lock().configs.push(config.clone());
        Ok(Box::new(MockSession {
            control: self.control.clone(),
        }))
    }
}

struct MockSession {
    control: MockControl,
}

impl DecoderSession for MockSession {
    fn submit(&mut self, buffer: DecodeBuffer, on_complete: DecodeCallback) -> Result<(), DecoderError> {
        {
            let mut state = self.control.state.lock();
            if let Some(error) = state.reject_submit.clone() {
                return Err(error);
            }
            state.submissions.push(buffer.clone());
            if state.deferred {
                state.pending.push_back((buffer, on_complete));
                return Ok(());
            }
        }

        let result = self.control.outcome(&buffer);
        on_complete(result);
        Ok(())
    }
}

impl Drop for MockSession {
    fn drop(&mut self) {
        self.control.state.lock().sessions_released += 1;
    }
}

/// One presentation as seen by [`RecordingSink`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Presented {
    pub presentation_time: Duration,
    /// Vsync counter value when the frame was scheduled
    pub tick: u64,
}

/// Display sink recording every scheduled frame
pub(crate) struct RecordingSink {
    log: Arc<Mutex<Vec<Presented>>>,
    vsync: Option<Arc<VsyncSignal>>,
}

impl RecordingSink {
    pub fn new(vsync: Option<Arc<VsyncSignal>>) -> (Self, Arc<Mutex<Vec<Presented>>>) {
        let log = Arc::new(Mutex::new(Vec::new()));
        (
            Self {
                log: log.clone(),
                vsync,
            },
            log,
        )
    }
}

impl DisplaySink for RecordingSink {
    fn schedule(&mut self, sample: Arc<DecodedSample>, presentation_time: Duration) {
        let tick = self.vsync.as_ref().map(|v| v.current_tick()).unwrap_or(0);
        self.log.lock().push(Presented {
            presentation_time,
            tick,
        });
        drop(sample);
    }
}
