//! Decoder Renderer
//!
//! Owns the decode/present pipeline for one stream:
//!
//! ```text
//! transport ──► submit_decode_buffer ──► DecoderSession (async)
//!                                              │ completion (decoder thread)
//!                                              ▼
//!                         BlockingQueue<FrameUnit> ──► presentation thread ──► DisplaySink
//!                                                          ▲
//!                                                     VsyncSignal
//! ```
//!
//! `setup` and `cleanup` replace the whole session. Callers serialize them
//! against `submit_decode_buffer`; the session lock here only keeps Rust
//! sharing sound, it does not order reconfiguration against in-flight decodes.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use bytes::Bytes;
use log::{debug, info, warn};
use parking_lot::Mutex;
use tokio::sync::mpsc as tokio_mpsc;

use super::decoder::{
    DecodeBuffer, DecodeCallback, DecodeResult, DecoderConfig, DecoderError, DecoderSession, HardwareDecoder,
};
use super::error::{MalformedInput, RendererError, SubmitError, SubmitStatus};
use super::nal::validate_length_prefixed;
use super::queue::{BlockingQueue, EnqueueResult};
use super::stats::{PipelineStats, StatsSnapshot};
use super::vsync::VsyncSignal;
use super::{AttachmentKey, AttachmentValue, BufferType, DisplaySink, FrameType, FrameUnit, VideoFormat};
use crate::app::Settings;
use crate::utils::FrameTimer;

/// Capacity of the event channel; events are dropped when nobody drains it
const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Renderer behaviour fixed at construction
#[derive(Debug, Clone, PartialEq)]
pub struct RendererOptions {
    /// Pace presentation to vsync ticks
    pub vsync: bool,
    /// Request 10-bit surfaces for HDR formats
    pub hdr: bool,
    /// Presentation backlog before the oldest frame is dropped (0 = unbounded)
    pub max_pending_frames: usize,
}

impl RendererOptions {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            vsync: settings.use_vsync,
            hdr: settings.enable_hdr,
            max_pending_frames: settings.max_pending_frames,
        }
    }
}

impl Default for RendererOptions {
    fn default() -> Self {
        Self {
            vsync: false,
            hdr: false,
            max_pending_frames: 8,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RendererState {
    Uninitialized,
    /// Decoder live, nothing submitted yet
    Configured,
    /// At least one buffer handed to the decoder
    Running,
    CleanedUp,
}

/// Asynchronous notifications for the transport / UI layer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RendererEvent {
    /// Decoder failed a frame; deltas are refused until the next key frame
    DecodeFailed {
        frame_number: u64,
        frame_type: FrameType,
        error: DecoderError,
    },
    /// Presentation fell behind and the oldest pending frame was dropped
    BacklogOverflow { frame_number: u64 },
}

/// Parameter sets waiting for the next key frame
#[derive(Default)]
struct ParameterSetCache {
    pending: Vec<(BufferType, Bytes)>,
    applied: Vec<(BufferType, Bytes)>,
}

impl ParameterSetCache {
    /// Replace any pending set of the same type
    fn store(&mut self, buffer_type: BufferType, data: Bytes) {
        match self.pending.iter_mut().find(|(t, _)| *t == buffer_type) {
            Some(entry) => entry.1 = data,
            None => self.pending.push((buffer_type, data)),
        }
    }

    fn pending(&self) -> &[(BufferType, Bytes)] {
        &self.pending
    }

    fn differs_from_applied(&self) -> bool {
        !self.pending.is_empty() && self.pending != self.applied
    }

    /// Pending sets reached the decoder
    fn commit(&mut self) {
        if !self.pending.is_empty() {
            self.applied = std::mem::take(&mut self.pending);
        }
    }
}

struct Session {
    format: VideoFormat,
    refresh_rate: u32,
    decoder: Box<dyn DecoderSession>,
    queue: Arc<BlockingQueue<FrameUnit>>,
    presenter: Option<JoinHandle<()>>,
    parameter_sets: ParameterSetCache,
    /// Latched after a decoder error, cleared by the next accepted key frame
    need_key_frame: Arc<AtomicBool>,
}

struct Inner {
    state: RendererState,
    backend: Box<dyn HardwareDecoder>,
    session: Option<Session>,
    next_frame_number: u64,
}

pub struct DecoderRenderer {
    inner: Mutex<Inner>,
    display: Arc<Mutex<Box<dyn DisplaySink>>>,
    vsync: Arc<VsyncSignal>,
    options: RendererOptions,
    stats: Arc<PipelineStats>,
    events_tx: tokio_mpsc::Sender<RendererEvent>,
    events_rx: Mutex<Option<tokio_mpsc::Receiver<RendererEvent>>>,
}

impl DecoderRenderer {
    pub fn new(backend: Box<dyn HardwareDecoder>, display: Box<dyn DisplaySink>, options: RendererOptions) -> Self {
        Self::with_vsync_signal(backend, display, options, Arc::new(VsyncSignal::new()))
    }

    /// Use a vsync signal owned by an existing display link.
    ///
    /// Tearing a session down interrupts `vsync` to stop the presenter, then
    /// re-arms it once the presenter has exited. Other waiters on the signal
    /// see `None` from `wait_after` during that window.
    pub fn with_vsync_signal(
        backend: Box<dyn HardwareDecoder>,
        display: Box<dyn DisplaySink>,
        options: RendererOptions,
        vsync: Arc<VsyncSignal>,
    ) -> Self {
        let (events_tx, events_rx) = tokio_mpsc::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            inner: Mutex::new(Inner {
                state: RendererState::Uninitialized,
                backend,
                session: None,
                next_frame_number: 0,
            }),
            display: Arc::new(Mutex::new(display)),
            vsync,
            options,
            stats: Arc::new(PipelineStats::new()),
            events_tx,
            events_rx: Mutex::new(Some(events_rx)),
        }
    }

    /// Configure the decoder for `format` and start presenting.
    /// A live session is torn down first.
    pub fn setup(&self, format: VideoFormat, refresh_rate: u32) -> Result<(), RendererError> {
        let previous = self.inner.lock().session.take();
        if let Some(old) = previous {
            info!("Reconfiguring decoder, tearing down {} session", old.format);
            self.teardown(old);
            self.inner.lock().state = RendererState::CleanedUp;
        }

        let mut inner = self.inner.lock();

        if !inner.backend.supports(format) {
            warn!("{} decoder does not support {}", inner.backend.name(), format);
            return Err(RendererError::UnsupportedFormat(format, inner.backend.name().to_string()));
        }

        let config = DecoderConfig {
            format,
            refresh_rate,
            hdr: self.options.hdr && format.is_hdr(),
        };
        let decoder = inner.backend.configure(&config)?;

        let queue = Arc::new(BlockingQueue::with_limit(self.options.max_pending_frames));
        self.vsync.reset();

        let presenter = Presenter {
            queue: queue.clone(),
            vsync: self.vsync.clone(),
            display: self.display.clone(),
            stats: self.stats.clone(),
            vsync_enabled: self.options.vsync,
        };
        let handle = thread::Builder::new()
            .name("video-present".into())
            .spawn(move || presenter.run())?;

        info!(
            "Video pipeline configured: {} @ {} Hz via {} (vsync {}, HDR {})",
            format,
            refresh_rate,
            inner.backend.name(),
            if self.options.vsync { "on" } else { "off" },
            if config.hdr { "on" } else { "off" },
        );

        inner.session = Some(Session {
            format,
            refresh_rate,
            decoder,
            queue,
            presenter: Some(handle),
            parameter_sets: ParameterSetCache::default(),
            need_key_frame: Arc::new(AtomicBool::new(false)),
        });
        inner.state = RendererState::Configured;
        Ok(())
    }

    /// Stop presentation and release the decoder. Safe to call repeatedly.
    pub fn cleanup(&self) {
        let session = {
            let mut inner = self.inner.lock();
            inner.state = RendererState::CleanedUp;
            inner.session.take()
        };

        match session {
            Some(session) => self.teardown(session),
            None => debug!("Cleanup with no active session"),
        }
    }

    fn teardown(&self, session: Session) {
        let Session {
            format,
            refresh_rate,
            decoder,
            queue,
            presenter,
            parameter_sets,
            ..
        } = session;

        // Marks the session retired for its pending completions
        queue.interrupt();
        self.vsync.interrupt();

        drop(decoder);

        if let Some(handle) = presenter {
            if handle.thread().id() == thread::current().id() {
                warn!("Cleanup called from the presentation thread, not joining");
            } else if handle.join().is_err() {
                warn!("Presentation thread panicked");
            }
        }

        // The signal may be shared with a display link that outlives this session
        self.vsync.reset();

        if !parameter_sets.pending.is_empty() {
            debug!(
                "Discarding {} parameter sets never followed by a key frame",
                parameter_sets.pending.len()
            );
        }

        info!("Video pipeline for {} @ {} Hz cleaned up", format, refresh_rate);
    }

    /// Hand one length-prefixed buffer to the pipeline.
    ///
    /// Parameter sets are held and merged into the next key frame; slice data
    /// is copied into a decoder-ready buffer and decoded asynchronously.
    /// `Accepted` means handed to the decoder, not decoded.
    pub fn submit_decode_buffer(
        &self,
        data: &[u8],
        offset: usize,
        length: i32,
        buffer_type: BufferType,
        frame_type: FrameType,
        pts: u32,
    ) -> SubmitStatus {
        if !buffer_type.is_parameter_set() {
            self.stats.record_received();
        }

        match self.try_submit(data, offset, length, buffer_type, frame_type, pts) {
            Ok(()) => SubmitStatus::Accepted,
            Err(error) => {
                self.stats.record_rejected();
                match &error {
                    SubmitError::NotReady | SubmitError::NeedKeyFrame => {
                        debug!("{:?} {:?} buffer rejected: {}", buffer_type, frame_type, error)
                    }
                    _ => warn!("{:?} {:?} buffer rejected: {}", buffer_type, frame_type, error),
                }
                SubmitStatus::Rejected(error)
            }
        }
    }

    fn try_submit(
        &self,
        data: &[u8],
        offset: usize,
        length: i32,
        buffer_type: BufferType,
        frame_type: FrameType,
        pts: u32,
    ) -> Result<(), SubmitError> {
        if length <= 0 {
            return Err(MalformedInput::NonPositiveLength(length as i64).into());
        }
        let length = length as usize;

        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        let session = inner.session.as_mut().ok_or(SubmitError::NotReady)?;

        let end = offset
            .checked_add(length)
            .filter(|&end| end <= data.len())
            .ok_or(MalformedInput::OutOfBounds {
                offset,
                length,
                available: data.len(),
            })?;
        let unit = &data[offset..end];
        validate_length_prefixed(unit)?;

        if buffer_type.is_parameter_set() {
            let copy = copy_buffer(&[unit])?;
            debug!("Caching {:?} ({} bytes) for next key frame", buffer_type, copy.len());
            session.parameter_sets.store(buffer_type, copy);
            return Ok(());
        }

        let key_frame = frame_type.is_key_frame();
        if key_frame {
            // Cleared before submitting so a failure reported synchronously by the decoder sticks
            session.need_key_frame.store(false, Ordering::Release);
        } else if session.need_key_frame.load(Ordering::Acquire) {
            return Err(SubmitError::NeedKeyFrame);
        }

        let (parameter_sets, parameter_sets_changed) = if key_frame {
            (
                session.parameter_sets.pending().to_vec(),
                session.parameter_sets.differs_from_applied(),
            )
        } else {
            (Vec::new(), false)
        };

        let mut parts: Vec<&[u8]> = parameter_sets.iter().map(|(_, d)| d.as_ref()).collect();
        parts.push(unit);
        let buffer_data = copy_buffer(&parts)?;

        let frame_number = inner.next_frame_number;
        inner.next_frame_number += 1;

        let on_complete = self.completion_handler(session, frame_type, frame_number, buffer_data.clone());
        let buffer = DecodeBuffer {
            data: buffer_data,
            frame_type,
            pts: Duration::from_millis(pts as u64),
            frame_number,
            parameter_sets,
            parameter_sets_changed,
            submitted_at: Instant::now(),
        };

        if let Err(error) = session.decoder.submit(buffer, on_complete) {
            session.need_key_frame.store(true, Ordering::Release);
            return Err(SubmitError::DecoderRejected(error));
        }

        if key_frame {
            session.parameter_sets.commit();
        }
        inner.state = RendererState::Running;
        self.stats.record_submitted();
        Ok(())
    }

    /// Builds the decode completion handler. It runs on the decoder's thread
    /// and only touches `session`'s queue and latch plus shared counters.
    /// Once the session is torn down the handler just releases the result.
    fn completion_handler(
        &self,
        session: &Session,
        frame_type: FrameType,
        frame_number: u64,
        compressed: Bytes,
    ) -> DecodeCallback {
        let completion = Completion {
            queue: session.queue.clone(),
            need_key_frame: session.need_key_frame.clone(),
            stats: self.stats.clone(),
            events: self.events_tx.clone(),
            display_immediately: !self.options.vsync,
            frame_type,
            frame_number,
            compressed,
        };
        Box::new(move |result: DecodeResult| completion.finish(result))
    }

    pub fn state(&self) -> RendererState {
        self.inner.lock().state
    }

    pub fn options(&self) -> &RendererOptions {
        &self.options
    }

    /// Frames waiting for presentation (advisory)
    pub fn queue_depth(&self) -> usize {
        self.inner
            .lock()
            .session
            .as_ref()
            .map(|s| s.queue.count())
            .unwrap_or(0)
    }

    /// Queue of the live session
    pub fn frame_queue(&self) -> Option<Arc<BlockingQueue<FrameUnit>>> {
        self.inner.lock().session.as_ref().map(|s| s.queue.clone())
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot(self.queue_depth())
    }

    pub fn vsync_signal(&self) -> Arc<VsyncSignal> {
        self.vsync.clone()
    }

    /// Display refresh notification from the platform display link
    pub fn vsync_tick(&self) {
        self.vsync.tick();
    }

    /// Take the event receiver (only the first call gets it)
    pub fn take_events(&self) -> Option<tokio_mpsc::Receiver<RendererEvent>> {
        self.events_rx.lock().take()
    }
}

impl Drop for DecoderRenderer {
    fn drop(&mut self) {
        self.cleanup();
    }
}

/// Copy `parts` into one exactly-sized buffer, reporting allocation failure
fn copy_buffer(parts: &[&[u8]]) -> Result<Bytes, SubmitError> {
    let total: usize = parts.iter().map(|p| p.len()).sum();
    let mut backing = Vec::new();
    backing
        .try_reserve_exact(total)
        .map_err(|_| SubmitError::AllocationFailure { requested: total })?;
    for part in parts {
        backing.extend_from_slice(part);
    }
    Ok(Bytes::from(backing))
}

/// Everything one decode completion needs, captured at submission
struct Completion {
    queue: Arc<BlockingQueue<FrameUnit>>,
    need_key_frame: Arc<AtomicBool>,
    stats: Arc<PipelineStats>,
    events: tokio_mpsc::Sender<RendererEvent>,
    display_immediately: bool,
    frame_type: FrameType,
    frame_number: u64,
    compressed: Bytes,
}

impl Completion {
    fn finish(self, result: DecodeResult) {
        let frame_number = self.frame_number;
        let frame_type = self.frame_type;

        // A retired session's results are only released
        if self.queue.is_interrupted() {
            debug!("Frame {} completed after its session was torn down, releasing", frame_number);
            return;
        }

        match result {
            Ok(mut sample) => {
                self.stats.record_decoded(sample.decode_latency.as_micros() as u64);

                let mut attachments = sample.attachments.take().unwrap_or_default();
                if self.display_immediately {
                    attachments.insert(AttachmentKey::DisplayImmediately, AttachmentValue::Flag(true));
                }
                if !self.frame_type.is_key_frame() {
                    attachments.insert(AttachmentKey::NotSync, AttachmentValue::Flag(true));
                }
                let attachments = (!attachments.is_empty()).then_some(attachments);

                let unit = FrameUnit::new(self.frame_type, self.frame_number, self.compressed, sample, attachments);
                match self.queue.enqueue(unit) {
                    EnqueueResult::Queued => {}
                    EnqueueResult::QueuedDroppingOldest => {
                        self.stats.record_dropped();
                        debug!("Presentation backlog full at frame {}, dropped oldest", frame_number);
                        let _ = self.events.try_send(RendererEvent::BacklogOverflow { frame_number });
                    }
                    EnqueueResult::Interrupted => {
                        debug!("Frame {} decoded after shutdown, releasing", frame_number);
                    }
                }
            }
            Err(DecoderError::NoFrame) => {
                self.stats.record_dropped();
                debug!("Frame {} produced no output", frame_number);
            }
            Err(error) => {
                warn!("Decode failed for frame {} ({:?}): {}", frame_number, frame_type, error);
                self.stats.record_decode_failure();
                self.need_key_frame.store(true, Ordering::Release);
                let _ = self.events.try_send(RendererEvent::DecodeFailed {
                    frame_number,
                    frame_type,
                    error,
                });
            }
        }
    }
}

/// Presentation thread state
struct Presenter {
    queue: Arc<BlockingQueue<FrameUnit>>,
    vsync: Arc<VsyncSignal>,
    display: Arc<Mutex<Box<dyn DisplaySink>>>,
    stats: Arc<PipelineStats>,
    vsync_enabled: bool,
}

impl Presenter {
    fn run(self) {
        debug!("Presentation thread started (vsync {})", self.vsync_enabled);

        let mut timer = FrameTimer::new();
        let mut last_tick = self.vsync.current_tick();
        let mut last_scheduled: Option<(u64, Duration)> = None;

        while let Some(unit) = self.queue.dequeue() {
            if self.vsync_enabled {
                match self.vsync.wait_after(last_tick) {
                    Some(tick) => last_tick = tick,
                    None => break,
                }
            }

            let presentation_time = unit.presentation_time();
            if let Some((last_number, last_time)) = last_scheduled {
                if unit.frame_number() < last_number {
                    warn!(
                        "Frame {} presented after frame {}; decoder completed out of order",
                        unit.frame_number(),
                        last_number
                    );
                } else if presentation_time < last_time {
                    warn!(
                        "Presentation time went backwards ({:?} < {:?})",
                        presentation_time, last_time
                    );
                }
            }

            self.display
                .lock()
                .schedule(unit.decoded_sample().clone(), presentation_time);
            last_scheduled = Some((unit.frame_number(), presentation_time));

            timer.tick();
            self.stats.record_presented(unit.frame_type().is_key_frame());
            self.stats.set_render_fps(timer.fps());
        }

        self.display.lock().flush();
        debug!("Presentation thread exiting after {} frames", timer.frame_count());
    }
}
