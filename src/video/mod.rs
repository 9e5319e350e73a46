//! Grayscale stack encoding using FFmpeg via rsmpeg.
//!
//! Slices go through three stages:
//! - copy into a raw GRAY8/GRAY16 frame (`layout`)
//! - swscale conversion into the codec pixel format (GRAY8/GRAY12)
//! - encode and mux into an in-memory MOV/MP4 container (`muxer`)

pub mod config;
pub mod error;
pub mod layout;
mod muxer;
pub mod session;

pub use config::{BitDepth, ContainerFormat, EncoderConfig};
pub use error::EncodeError;
pub use layout::{copy_to_strided, Sample};
pub use session::{EncodedOutput, EncoderSession};
