//! Error type shared by the session, muxer and configuration layers.

use rsmpeg::error::RsmpegError;
use thiserror::Error;

/// Errors that can occur while configuring, feeding or running an encoder session.
#[derive(Debug, Error)]
pub enum EncodeError {
    #[error("FFmpeg error: {0}")]
    Ffmpeg(#[from] RsmpegError),

    #[error("{call} failed with code {code}")]
    Call { call: &'static str, code: i32 },

    #[error("Codec not found: {0}")]
    CodecNotFound(String),

    #[error("Unable to deduce a container format for codec {0}")]
    ContainerFormat(String),

    #[error("Unable to create scaling context from {src} to {dst}")]
    Scaler { src: i32, dst: i32 },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid JSON configuration: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Slice holds {actual} samples, expected {expected}")]
    SliceSize { expected: usize, actual: usize },

    #[error("Slice has {actual}-bit samples but the session encodes {expected}-bit samples")]
    BitDepthMismatch { expected: u32, actual: u32 },

    #[error("Session has already been encoded")]
    AlreadyEncoded,

    #[error("Failed to write output: {0}")]
    Io(#[from] std::io::Error),
}

impl EncodeError {
    /// Map a negative FFmpeg return code into an error naming the failed call.
    pub(crate) fn check(call: &'static str, code: i32) -> Result<i32, EncodeError> {
        if code < 0 {
            Err(EncodeError::Call { call, code })
        } else {
            Ok(code)
        }
    }

    /// True for errors caused by the caller rather than by FFmpeg or the OS.
    pub fn is_usage_error(&self) -> bool {
        matches!(
            self,
            EncodeError::InvalidConfig(_)
                | EncodeError::Json(_)
                | EncodeError::SliceSize { .. }
                | EncodeError::BitDepthMismatch { .. }
                | EncodeError::AlreadyEncoded
                | EncodeError::CodecNotFound(_)
        )
    }
}
