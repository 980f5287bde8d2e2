//! Software Decoder
//!
//! H.264 decoding with OpenH264 on a dedicated decoder thread. Completion
//! callbacks run on that thread, the same way a hardware decoder delivers
//! its output asynchronously.

use std::sync::mpsc;
use std::thread::{self, JoinHandle};

use log::{debug, info, warn};
use openh264::decoder::Decoder;
use openh264::formats::YUVSource;

use super::decoder::{DecodeBuffer, DecodeCallback, DecoderConfig, DecoderError, DecoderSession, HardwareDecoder};
use super::nal::length_prefixed_to_annex_b;
use super::{ColorSpace, DecodedSample, PixelFormat, SamplePayload, VideoFormat, VideoFrame};

/// Commands sent to the decoder thread
enum DecoderCommand {
    Decode {
        buffer: DecodeBuffer,
        on_complete: DecodeCallback,
    },
    Stop,
}

/// OpenH264-backed decoder factory
#[derive(Debug, Default)]
pub struct SoftwareDecoder {
    sessions_created: u64,
}

impl SoftwareDecoder {
    pub fn new() -> Self {
        Self::default()
    }
}

impl HardwareDecoder for SoftwareDecoder {
    fn name(&self) -> &str {
        "openh264"
    }

    fn supports(&self, format: VideoFormat) -> bool {
        format == VideoFormat::H264
    }

    fn configure(&mut self, config: &DecoderConfig) -> Result<Box<dyn DecoderSession>, DecoderError> {
        if !self.supports(config.format) {
            return Err(DecoderError::UnsupportedFormat(config.format));
        }

        self.sessions_created += 1;
        info!(
            "Creating OpenH264 decoder session #{} ({} @ {} Hz)",
            self.sessions_created, config.format, config.refresh_rate
        );

        let session = SoftwareSession::spawn(config.format.color_space())?;
        Ok(Box::new(session))
    }
}

struct SoftwareSession {
    cmd_tx: mpsc::Sender<DecoderCommand>,
    thread: Option<JoinHandle<()>>,
}

impl SoftwareSession {
    fn spawn(color_space: ColorSpace) -> Result<Self, DecoderError> {
        let (cmd_tx, cmd_rx) = mpsc::channel::<DecoderCommand>();
        let (ready_tx, ready_rx) = mpsc::sync_channel::<Result<(), DecoderError>>(1);

        let thread = thread::Builder::new()
            .name("video-decode".into())
            .spawn(move || {
                // Created on the decoder thread; the handle never crosses threads
                let mut decoder = match Decoder::new() {
                    Ok(d) => {
                        let _ = ready_tx.send(Ok(()));
                        d
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(DecoderError::Configure(e.to_string())));
                        return;
                    }
                };

                let mut frames_decoded = 0u64;
                while let Ok(cmd) = cmd_rx.recv() {
                    match cmd {
                        DecoderCommand::Decode { buffer, on_complete } => {
                            let result = Self::decode(&mut decoder, &buffer, color_space);
                            if let Ok(sample) = &result {
                                frames_decoded += 1;
                                if frames_decoded == 1 {
                                    let bytes = sample.planes().map(|f| f.byte_len()).unwrap_or(0);
                                    info!(
                                        "First frame decoded: {}x{} ({} bytes per frame)",
                                        sample.width, sample.height, bytes
                                    );
                                }
                            }
                            on_complete(result);
                        }
                        DecoderCommand::Stop => break,
                    }
                }
                debug!("Decoder thread exiting after {} frames", frames_decoded);
            })
            .map_err(|e| DecoderError::Configure(e.to_string()))?;

        match ready_rx.recv() {
            Ok(Ok(())) => Ok(Self {
                cmd_tx,
                thread: Some(thread),
            }),
            Ok(Err(e)) => {
                let _ = thread.join();
                Err(e)
            }
            Err(_) => {
                let _ = thread.join();
                Err(DecoderError::Closed)
            }
        }
    }

    fn decode(
        decoder: &mut Decoder,
        buffer: &DecodeBuffer,
        color_space: ColorSpace,
    ) -> Result<DecodedSample, DecoderError> {
        // OpenH264 wants Annex B start codes
        let annex_b = length_prefixed_to_annex_b(&buffer.data)
            .map_err(|e| DecoderError::Rejected(e.to_string()))?;

        let yuv = match decoder.decode(&annex_b) {
            Ok(Some(yuv)) => yuv,
            Ok(None) => return Err(DecoderError::NoFrame),
            Err(e) => {
                warn!("OpenH264 decode error on frame {}: {}", buffer.frame_number, e);
                return Err(DecoderError::Rejected(e.to_string()));
            }
        };

        let (width, height) = yuv.dimensions();
        let (y_stride, u_stride, v_stride) = yuv.strides();
        let frame = VideoFrame {
            width: width as u32,
            height: height as u32,
            y_plane: yuv.y().to_vec(),
            u_plane: yuv.u().to_vec(),
            v_plane: yuv.v().to_vec(),
            y_stride: y_stride as u32,
            u_stride: u_stride as u32,
            v_stride: v_stride as u32,
            format: PixelFormat::YUV420P,
            color_range: Default::default(),
            color_space,
        };

        Ok(DecodedSample {
            width: frame.width,
            height: frame.height,
            pts: buffer.pts,
            decode_latency: buffer.submitted_at.elapsed(),
            payload: SamplePayload::Planes(frame),
            attachments: None,
        })
    }
}

impl DecoderSession for SoftwareSession {
    fn submit(&mut self, buffer: DecodeBuffer, on_complete: DecodeCallback) -> Result<(), DecoderError> {
        self.cmd_tx
            .send(DecoderCommand::Decode { buffer, on_complete })
            .map_err(|_| DecoderError::Closed)
    }
}

impl Drop for SoftwareSession {
    fn drop(&mut self) {
        // Signal decoder thread to stop; queued decodes ahead of it still complete
        let _ = self.cmd_tx.send(DecoderCommand::Stop);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_h264_supported() {
        let mut decoder = SoftwareDecoder::new();
        assert!(decoder.supports(VideoFormat::H264));
        assert!(!decoder.supports(VideoFormat::H265));

        let config = DecoderConfig {
            format: VideoFormat::H265Main10,
            refresh_rate: 60,
            hdr: true,
        };
        assert!(matches!(
            decoder.configure(&config),
            Err(DecoderError::UnsupportedFormat(VideoFormat::H265Main10))
        ));
    }
}
