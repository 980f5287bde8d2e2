//! Decoder Capability
//!
//! The renderer drives whatever decoder the platform offers through these
//! traits: configure a session for a format, submit decoder-ready buffers,
//! and receive decoded samples on the decoder's own thread. Releasing a
//! session is dropping it.

use std::time::{Duration, Instant};

use bytes::Bytes;
use thiserror::Error;

use super::{BufferType, DecodedSample, FrameType, VideoFormat};

/// Errors reported by a decoder backend
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecoderError {
    #[error("unsupported video format {0}")]
    UnsupportedFormat(VideoFormat),

    #[error("failed to configure decoder: {0}")]
    Configure(String),

    #[error("decoder rejected frame: {0}")]
    Rejected(String),

    /// Input consumed without producing a picture
    #[error("no frame produced")]
    NoFrame,

    #[error("decoder closed")]
    Closed,
}

/// Parameters a decoder session is created with
#[derive(Debug, Clone, PartialEq)]
pub struct DecoderConfig {
    pub format: VideoFormat,
    pub refresh_rate: u32,
    /// Request 10-bit output surfaces
    pub hdr: bool,
}

/// One decoder-ready access unit
#[derive(Debug, Clone)]
pub struct DecodeBuffer {
    /// Contiguous length-prefixed NAL units; parameter sets first on key frames
    pub data: Bytes,
    pub frame_type: FrameType,
    pub pts: Duration,
    /// Submission sequence number
    pub frame_number: u64,
    /// Parameter sets merged into `data`, for backends that build a format
    /// description from them
    pub parameter_sets: Vec<(BufferType, Bytes)>,
    /// Parameter sets differ from the ones previously sent to this session
    pub parameter_sets_changed: bool,
    pub submitted_at: Instant,
}

pub type DecodeResult = Result<DecodedSample, DecoderError>;

/// Completion handler, invoked exactly once per accepted buffer
pub type DecodeCallback = Box<dyn FnOnce(DecodeResult) + Send + 'static>;

/// Factory for decoder sessions
pub trait HardwareDecoder: Send {
    fn name(&self) -> &str;

    fn supports(&self, format: VideoFormat) -> bool;

    fn configure(&mut self, config: &DecoderConfig) -> Result<Box<dyn DecoderSession>, DecoderError>;
}

/// A configured decoder instance
pub trait DecoderSession: Send {
    /// Queue `buffer` for asynchronous decode. On `Err` the callback is
    /// dropped without being called.
    fn submit(&mut self, buffer: DecodeBuffer, on_complete: DecodeCallback) -> Result<(), DecoderError>;
}
