//! Frame Unit
//!
//! A decoded frame travelling from the decode callback to the presentation
//! thread. Built once, never mutated; its buffers are released when the last
//! owner drops it.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;

use super::{AttachmentKey, DecodedSample, FrameType, SampleAttachments};

#[derive(Debug)]
pub struct FrameUnit {
    frame_type: FrameType,
    frame_number: u64,
    compressed_buffer: Bytes,
    decoded_sample: Arc<DecodedSample>,
    attachments: Option<SampleAttachments>,
}

impl FrameUnit {
    pub fn new(
        frame_type: FrameType,
        frame_number: u64,
        compressed_buffer: Bytes,
        decoded_sample: DecodedSample,
        attachments: Option<SampleAttachments>,
    ) -> Self {
        Self {
            frame_type,
            frame_number,
            compressed_buffer,
            decoded_sample: Arc::new(decoded_sample),
            attachments,
        }
    }

    pub fn frame_type(&self) -> FrameType {
        self.frame_type
    }

    pub fn frame_number(&self) -> u64 {
        self.frame_number
    }

    pub fn compressed_buffer(&self) -> &Bytes {
        &self.compressed_buffer
    }

    pub fn decoded_sample(&self) -> &Arc<DecodedSample> {
        &self.decoded_sample
    }

    pub fn attachments(&self) -> Option<&SampleAttachments> {
        self.attachments.as_ref()
    }

    pub fn display_immediately(&self) -> bool {
        self.attachments
            .as_ref()
            .map(|a| a.flag(AttachmentKey::DisplayImmediately))
            .unwrap_or(false)
    }

    /// Override from the attachments if present, else the sample timestamp
    pub fn presentation_time(&self) -> Duration {
        self.attachments
            .as_ref()
            .and_then(|a| a.time(AttachmentKey::DisplayTimeOverride))
            .unwrap_or(self.decoded_sample.pts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::{AttachmentValue, SamplePayload, VideoFrame};

    fn sample(pts_ms: u64) -> DecodedSample {
        DecodedSample {
            width: 16,
            height: 16,
            pts: Duration::from_millis(pts_ms),
            decode_latency: Duration::ZERO,
            payload: SamplePayload::Planes(VideoFrame::empty(16, 16)),
            attachments: None,
        }
    }

    #[test]
    fn test_presentation_time_override() {
        let unit = FrameUnit::new(FrameType::KeyFrame, 0, Bytes::from_static(&[1]), sample(40), None);
        assert_eq!(unit.presentation_time(), Duration::from_millis(40));
        assert!(!unit.display_immediately());

        let mut attachments = SampleAttachments::new();
        attachments.insert(AttachmentKey::DisplayTimeOverride, AttachmentValue::Time(Duration::from_millis(55)));
        attachments.insert(AttachmentKey::DisplayImmediately, AttachmentValue::Flag(true));
        let unit = FrameUnit::new(FrameType::DeltaFrame, 1, Bytes::new(), sample(40), Some(attachments));
        assert_eq!(unit.presentation_time(), Duration::from_millis(55));
        assert!(unit.display_immediately());
        assert_eq!(unit.frame_type(), FrameType::DeltaFrame);
    }
}
