//! Pipeline Errors
//!
//! Submission results and setup failures. Interruption during teardown is
//! deliberately absent: it is a normal shutdown signal, not an error.

use thiserror::Error;

use super::decoder::DecoderError;
use super::VideoFormat;

/// Status code: buffer handed to the decoder (or cached)
pub const DR_OK: i32 = 0;
/// Status code: transport should request a key frame
pub const DR_NEED_IDR: i32 = -1;
/// Status code: buffer rejected, no resync needed
pub const DR_REJECTED: i32 = -2;

/// Why a submitted buffer failed validation
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MalformedInput {
    #[error("non-positive length {0}")]
    NonPositiveLength(i64),

    #[error("range {offset}+{length} exceeds buffer of {available} bytes")]
    OutOfBounds {
        offset: usize,
        length: usize,
        available: usize,
    },

    #[error("empty access unit")]
    Empty,

    #[error("truncated length prefix at offset {offset}")]
    TruncatedPrefix { offset: usize },

    #[error("zero-length NAL unit at offset {offset}")]
    EmptyUnit { offset: usize },

    #[error("NAL at offset {offset} declares {declared} bytes, {available} available")]
    LengthOverrun {
        offset: usize,
        declared: usize,
        available: usize,
    },
}

/// Reason a submission was rejected
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SubmitError {
    #[error("decoder not configured")]
    NotReady,

    #[error("malformed input: {0}")]
    MalformedInput(#[from] MalformedInput),

    #[error("failed to allocate {requested} byte decode buffer")]
    AllocationFailure { requested: usize },

    #[error("decoder rejected buffer: {0}")]
    DecoderRejected(DecoderError),

    #[error("waiting for key frame after decoder error")]
    NeedKeyFrame,
}

/// Result of `submit_decode_buffer`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitStatus {
    Accepted,
    Rejected(SubmitError),
}

impl SubmitStatus {
    pub fn is_accepted(&self) -> bool {
        matches!(self, SubmitStatus::Accepted)
    }

    pub fn error(&self) -> Option<&SubmitError> {
        match self {
            SubmitStatus::Accepted => None,
            SubmitStatus::Rejected(e) => Some(e),
        }
    }

    /// Integer code for the transport layer
    pub fn code(&self) -> i32 {
        match self {
            SubmitStatus::Accepted => DR_OK,
            SubmitStatus::Rejected(SubmitError::NeedKeyFrame)
            | SubmitStatus::Rejected(SubmitError::DecoderRejected(_)) => DR_NEED_IDR,
            SubmitStatus::Rejected(_) => DR_REJECTED,
        }
    }
}

/// Setup failures
#[derive(Debug, Error)]
pub enum RendererError {
    #[error("video format {0} not supported by {1}")]
    UnsupportedFormat(VideoFormat, String),

    #[error("decoder configuration failed: {0}")]
    Decoder(#[from] DecoderError),

    #[error("failed to start presentation thread: {0}")]
    Spawn(#[from] std::io::Error),
}
