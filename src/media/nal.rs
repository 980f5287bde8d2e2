//! Length-Prefixed NAL Units
//!
//! Access units handed over by the transport carry a 4-byte big-endian
//! length in front of every contained NAL unit. This is also the layout
//! hardware decoders consume, so it is preserved byte for byte. Software
//! decoders want Annex B start codes instead; conversions both ways live here.

use super::error::MalformedInput;

/// Size of the big-endian length in front of each NAL unit
pub const NAL_LENGTH_PREFIX_SIZE: usize = 4;

const START_CODE: [u8; 4] = [0x00, 0x00, 0x00, 0x01];

/// Iterator over the NAL payloads of a length-prefixed buffer
///
/// Yields `Err` once and then stops if the framing is broken.
pub struct LengthPrefixedUnits<'a> {
    data: &'a [u8],
    offset: usize,
    failed: bool,
}

impl<'a> LengthPrefixedUnits<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            offset: 0,
            failed: false,
        }
    }
}

impl<'a> Iterator for LengthPrefixedUnits<'a> {
    type Item = Result<&'a [u8], MalformedInput>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.offset >= self.data.len() {
            return None;
        }

        let remaining = self.data.len() - self.offset;
        if remaining < NAL_LENGTH_PREFIX_SIZE {
            self.failed = true;
            return Some(Err(MalformedInput::TruncatedPrefix { offset: self.offset }));
        }

        let prefix = &self.data[self.offset..self.offset + NAL_LENGTH_PREFIX_SIZE];
        let nal_len = u32::from_be_bytes([prefix[0], prefix[1], prefix[2], prefix[3]]) as usize;
        let start = self.offset + NAL_LENGTH_PREFIX_SIZE;

        if nal_len == 0 {
            self.failed = true;
            return Some(Err(MalformedInput::EmptyUnit { offset: self.offset }));
        }
        if nal_len > self.data.len() - start {
            self.failed = true;
            return Some(Err(MalformedInput::LengthOverrun {
                offset: self.offset,
                declared: nal_len,
                available: self.data.len() - start,
            }));
        }

        self.offset = start + nal_len;
        Some(Ok(&self.data[start..start + nal_len]))
    }
}

/// Check that `data` is exactly a sequence of length-prefixed units.
/// Returns the number of units.
pub fn validate_length_prefixed(data: &[u8]) -> Result<usize, MalformedInput> {
    if data.is_empty() {
        return Err(MalformedInput::Empty);
    }
    let mut count = 0;
    for unit in LengthPrefixedUnits::new(data) {
        unit?;
        count += 1;
    }
    Ok(count)
}

/// Replace each length prefix with an Annex B start code
pub fn length_prefixed_to_annex_b(data: &[u8]) -> Result<Vec<u8>, MalformedInput> {
    let mut out = Vec::with_capacity(data.len());
    for unit in LengthPrefixedUnits::new(data) {
        out.extend_from_slice(&START_CODE);
        out.extend_from_slice(unit?);
    }
    Ok(out)
}

/// Rewrite an Annex B buffer (3- or 4-byte start codes) as length-prefixed units
pub fn annex_b_to_length_prefixed(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len() + 16);
    for nal in annex_b_units(data) {
        out.extend_from_slice(&(nal.len() as u32).to_be_bytes());
        out.extend_from_slice(nal);
    }
    out
}

/// Split an Annex B buffer into NAL payloads (start codes removed)
pub(crate) fn annex_b_units(data: &[u8]) -> Vec<&[u8]> {
    let mut units = Vec::new();
    let mut start: Option<usize> = None;
    let mut i = 0;

    while i + 3 <= data.len() {
        if data[i] == 0 && data[i + 1] == 0 && data[i + 2] == 1 {
            if let Some(s) = start {
                // A 4-byte start code leaves one trailing zero on the previous unit
                let mut end = i;
                while end > s && data[end - 1] == 0 {
                    end -= 1;
                }
                if end > s {
                    units.push(&data[s..end]);
                }
            }
            i += 3;
            start = Some(i);
        } else {
            i += 1;
        }
    }

    if let Some(s) = start {
        if s < data.len() {
            units.push(&data[s..]);
        }
    }

    units
}

/// H.264 nal_unit_type
pub(crate) fn h264_nal_type(header: u8) -> u8 {
    header & 0x1F
}

/// H.265 nal_unit_type (bits 1-6 of the first header byte)
pub(crate) fn h265_nal_type(header: u8) -> u8 {
    (header >> 1) & 0x3F
}
