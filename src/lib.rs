//! H5J Encoder
//!
//! Encodes stacks of grayscale slices (8-bit or 16-bit samples) into an
//! in-memory video container through FFmpeg, for hosts that store image
//! volumes as compressed video.
//!
//! # Features
//!
//! - Borrowed slice submission, no copy until encode
//! - swscale conversion to the codec pixel format (GRAY8 / GRAY12)
//! - Any FFmpeg encoder by name; x264/x265 option strings forwarded
//! - MOV for FFV1, MP4 otherwise, finalized in memory
//! - C ABI (`h5jenc_*`) when built as a cdylib

pub mod ffi;
pub mod video;

pub use video::{
    copy_to_strided, BitDepth, ContainerFormat, EncodeError, EncodedOutput, EncoderConfig,
    EncoderSession,
};

/// Install the `env_logger` backend once; later calls are no-ops.
///
/// Verbosity is controlled by `RUST_LOG` and defaults to warnings.
pub fn init_logging() {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"))
        .try_init();
}
