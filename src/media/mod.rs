//! Media Pipeline
//!
//! Compressed video ingestion, decoding, and vsync-paced presentation.

mod decoder;
mod display;
mod elementary;
mod error;
mod frame;
mod nal;
mod queue;
mod renderer;
mod software;
mod stats;
mod vsync;

#[cfg(test)]
pub(crate) mod testing;

pub use decoder::{DecodeBuffer, DecodeCallback, DecodeResult, DecoderConfig, DecoderError, DecoderSession, HardwareDecoder};
pub use display::{DisplaySink, StatsSink};
pub use elementary::{split_annex_b, StreamUnit};
pub use error::{MalformedInput, RendererError, SubmitError, SubmitStatus, DR_NEED_IDR, DR_OK, DR_REJECTED};
pub use frame::FrameUnit;
pub use nal::{annex_b_to_length_prefixed, length_prefixed_to_annex_b, validate_length_prefixed, LengthPrefixedUnits, NAL_LENGTH_PREFIX_SIZE};
pub use queue::{BlockingQueue, Dequeue, EnqueueResult};
pub use renderer::{DecoderRenderer, RendererEvent, RendererOptions, RendererState};
pub use software::SoftwareDecoder;
pub use stats::{PipelineStats, StatsSnapshot};
pub use vsync::{VsyncSignal, VsyncTicker, VsyncWait};

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Negotiated video stream format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum VideoFormat {
    /// H.264/AVC
    #[default]
    H264,
    /// H.265/HEVC Main profile
    H265,
    /// H.265/HEVC Main10 profile (HDR)
    H265Main10,
}

impl VideoFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            VideoFormat::H264 => "H264",
            VideoFormat::H265 => "HEVC",
            VideoFormat::H265Main10 => "HEVC Main10",
        }
    }

    pub fn is_hevc(&self) -> bool {
        matches!(self, VideoFormat::H265 | VideoFormat::H265Main10)
    }

    pub fn is_hdr(&self) -> bool {
        matches!(self, VideoFormat::H265Main10)
    }

    /// Matrix coefficients decoded frames of this format are expected to use
    pub fn color_space(&self) -> ColorSpace {
        if self.is_hdr() {
            ColorSpace::BT2020
        } else {
            ColorSpace::BT709
        }
    }
}

impl std::fmt::Display for VideoFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classification of a compressed or decoded frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameType {
    /// IDR / IRAP frame, decodable on its own
    KeyFrame,
    /// Predicted frame that references earlier frames
    DeltaFrame,
}

impl FrameType {
    pub fn is_key_frame(&self) -> bool {
        matches!(self, FrameType::KeyFrame)
    }
}

/// Kind of data carried by a submitted buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferType {
    /// HEVC video parameter set
    Vps,
    /// Sequence parameter set
    Sps,
    /// Picture parameter set
    Pps,
    /// Slice data of an access unit
    PicData,
}

impl BufferType {
    pub fn is_parameter_set(&self) -> bool {
        !matches!(self, BufferType::PicData)
    }
}

/// Pixel format of decoded video frame
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum PixelFormat {
    /// YUV 4:2:0 planar (Y, U, V separate planes)
    #[default]
    YUV420P,
}

/// Video color range
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum ColorRange {
    /// Limited range (16-235 for Y, 16-240 for UV)
    #[default]
    Limited,
    /// Full range (0-255)
    Full,
}

/// Video color space (matrix coefficients)
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum ColorSpace {
    #[default]
    BT709,
    BT2020,
}

/// CPU-resident decoded picture
#[derive(Debug, Clone)]
pub struct VideoFrame {
    pub width: u32,
    pub height: u32,
    /// Y plane (luma) - full resolution
    pub y_plane: Vec<u8>,
    /// U plane (Cb chroma) - quarter resolution
    pub u_plane: Vec<u8>,
    /// V plane (Cr chroma) - quarter resolution
    pub v_plane: Vec<u8>,
    pub y_stride: u32,
    pub u_stride: u32,
    pub v_stride: u32,
    pub format: PixelFormat,
    pub color_range: ColorRange,
    pub color_space: ColorSpace,
}

impl VideoFrame {
    /// Create empty frame (YUV420P format)
    pub fn empty(width: u32, height: u32) -> Self {
        let y_size = (width * height) as usize;
        let uv_size = y_size / 4;

        Self {
            width,
            height,
            y_plane: vec![0; y_size],
            u_plane: vec![128; uv_size],
            v_plane: vec![128; uv_size],
            y_stride: width,
            u_stride: width / 2,
            v_stride: width / 2,
            format: PixelFormat::YUV420P,
            color_range: ColorRange::Limited,
            color_space: ColorSpace::BT709,
        }
    }

    /// Total bytes held by the planes
    pub fn byte_len(&self) -> usize {
        self.y_plane.len() + self.u_plane.len() + self.v_plane.len()
    }
}

/// Keys of the per-sample presentation hints
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttachmentKey {
    /// Present as soon as possible instead of at the sample timestamp
    DisplayImmediately,
    /// Replaces the sample timestamp as the presentation time
    DisplayTimeOverride,
    /// Sample is not a sync point
    NotSync,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AttachmentValue {
    Flag(bool),
    Time(Duration),
}

/// Auxiliary key/value map attached to a decoded sample
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SampleAttachments {
    entries: HashMap<AttachmentKey, AttachmentValue>,
}

impl SampleAttachments {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: AttachmentKey, value: AttachmentValue) {
        self.entries.insert(key, value);
    }

    pub fn get(&self, key: AttachmentKey) -> Option<AttachmentValue> {
        self.entries.get(&key).copied()
    }

    /// Boolean attachment, `false` when absent or not a flag
    pub fn flag(&self, key: AttachmentKey) -> bool {
        matches!(self.get(key), Some(AttachmentValue::Flag(true)))
    }

    pub fn time(&self, key: AttachmentKey) -> Option<Duration> {
        match self.get(key) {
            Some(AttachmentValue::Time(t)) => Some(t),
            _ => None,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Decoder output storage
pub enum SamplePayload {
    /// Planes copied to system memory
    Planes(VideoFrame),
    /// Platform surface that stays on the GPU (pixel buffer, texture, ...)
    Surface(Arc<dyn Any + Send + Sync>),
}

impl std::fmt::Debug for SamplePayload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SamplePayload::Planes(frame) => f
                .debug_struct("Planes")
                .field("width", &frame.width)
                .field("height", &frame.height)
                .field("format", &frame.format)
                .finish(),
            SamplePayload::Surface(_) => f.write_str("Surface(..)"),
        }
    }
}

/// Decoded sample as returned by a decoder session
#[derive(Debug)]
pub struct DecodedSample {
    pub width: u32,
    pub height: u32,
    /// Presentation timestamp carried over from submission
    pub pts: Duration,
    /// Time between submission and decode completion
    pub decode_latency: Duration,
    pub payload: SamplePayload,
    /// Hints supplied by decoders that support per-frame display timing
    pub attachments: Option<SampleAttachments>,
}

impl DecodedSample {
    pub fn planes(&self) -> Option<&VideoFrame> {
        match &self.payload {
            SamplePayload::Planes(frame) => Some(frame),
            SamplePayload::Surface(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_color_space() {
        assert_eq!(VideoFormat::H264.color_space(), ColorSpace::BT709);
        assert_eq!(VideoFormat::H265.color_space(), ColorSpace::BT709);
        assert_eq!(VideoFormat::H265Main10.color_space(), ColorSpace::BT2020);
    }

    #[test]
    fn test_empty_frame_planes() {
        let frame = VideoFrame::empty(64, 32);
        assert_eq!(frame.y_plane.len(), 64 * 32);
        assert_eq!(frame.byte_len(), 64 * 32 * 3 / 2);

        let sample = DecodedSample {
            width: 64,
            height: 32,
            pts: Duration::ZERO,
            decode_latency: Duration::ZERO,
            payload: SamplePayload::Planes(frame),
            attachments: None,
        };
        assert_eq!(sample.planes().map(|f| f.byte_len()), Some(3072));
    }
}
