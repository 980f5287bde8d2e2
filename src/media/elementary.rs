//! Elementary Stream Splitting
//!
//! Turns an Annex B H.264/HEVC elementary stream into the submissions a
//! transport would make: one buffer per parameter set and one length-prefixed
//! buffer per access unit.

use super::nal::{annex_b_units, h264_nal_type, h265_nal_type};
use super::{BufferType, FrameType, VideoFormat};

/// One buffer ready for `submit_decode_buffer`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamUnit {
    pub buffer_type: BufferType,
    pub frame_type: FrameType,
    /// Length-prefixed NAL units
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NalKind {
    ParameterSet(BufferType),
    /// Slice data; `first` marks the first slice of a picture
    Slice { key: bool, first: bool },
    /// AUD, SEI and anything else that precedes the slices
    Prefix,
}

fn classify(nal: &[u8], format: VideoFormat) -> NalKind {
    if format.is_hevc() {
        if nal.len() < 3 {
            return NalKind::Prefix;
        }
        match h265_nal_type(nal[0]) {
            32 => NalKind::ParameterSet(BufferType::Vps),
            33 => NalKind::ParameterSet(BufferType::Sps),
            34 => NalKind::ParameterSet(BufferType::Pps),
            t @ 0..=31 => NalKind::Slice {
                // IRAP pictures (BLA, IDR, CRA)
                key: (16..=21).contains(&t),
                // first_slice_segment_in_pic_flag
                first: nal[2] & 0x80 != 0,
            },
            _ => NalKind::Prefix,
        }
    } else {
        if nal.len() < 2 {
            return NalKind::Prefix;
        }
        match h264_nal_type(nal[0]) {
            7 => NalKind::ParameterSet(BufferType::Sps),
            8 => NalKind::ParameterSet(BufferType::Pps),
            t @ (1 | 5) => NalKind::Slice {
                key: t == 5,
                // first_mb_in_slice == 0 is a single '1' bit in ue(v)
                first: nal[1] & 0x80 != 0,
            },
            _ => NalKind::Prefix,
        }
    }
}

fn push_prefixed(out: &mut Vec<u8>, nal: &[u8]) {
    out.extend_from_slice(&(nal.len() as u32).to_be_bytes());
    out.extend_from_slice(nal);
}

#[derive(Default)]
struct AccessUnit {
    data: Vec<u8>,
    has_slice: bool,
    key: bool,
}

impl AccessUnit {
    fn flush_into(&mut self, units: &mut Vec<StreamUnit>) {
        if !self.has_slice {
            return;
        }
        let au = std::mem::take(self);
        units.push(StreamUnit {
            buffer_type: BufferType::PicData,
            frame_type: if au.key { FrameType::KeyFrame } else { FrameType::DeltaFrame },
            data: au.data,
        });
    }
}

/// Split an Annex B stream into parameter-set and access-unit submissions
pub fn split_annex_b(data: &[u8], format: VideoFormat) -> Vec<StreamUnit> {
    let mut units = Vec::new();
    let mut current = AccessUnit::default();

    for nal in annex_b_units(data) {
        match classify(nal, format) {
            NalKind::ParameterSet(buffer_type) => {
                current.flush_into(&mut units);
                let mut prefixed = Vec::with_capacity(nal.len() + 4);
                push_prefixed(&mut prefixed, nal);
                units.push(StreamUnit {
                    buffer_type,
                    frame_type: FrameType::KeyFrame,
                    data: prefixed,
                });
            }
            NalKind::Prefix => {
                current.flush_into(&mut units);
                push_prefixed(&mut current.data, nal);
            }
            NalKind::Slice { key, first } => {
                if first {
                    current.flush_into(&mut units);
                }
                push_prefixed(&mut current.data, nal);
                current.has_slice = true;
                current.key |= key;
            }
        }
    }
    current.flush_into(&mut units);

    units
}
