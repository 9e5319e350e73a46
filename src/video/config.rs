//! Session configuration and container selection.

use std::ffi::CStr;

use rsmpeg::ffi;
use serde::{Deserialize, Serialize};

use super::error::EncodeError;

#[cfg(target_endian = "little")]
const GRAY16_NE: ffi::AVPixelFormat = ffi::AV_PIX_FMT_GRAY16LE;
#[cfg(target_endian = "big")]
const GRAY16_NE: ffi::AVPixelFormat = ffi::AV_PIX_FMT_GRAY16BE;

#[cfg(target_endian = "little")]
const GRAY12_NE: ffi::AVPixelFormat = ffi::AV_PIX_FMT_GRAY12LE;
#[cfg(target_endian = "big")]
const GRAY12_NE: ffi::AVPixelFormat = ffi::AV_PIX_FMT_GRAY12BE;

/// Sample width of submitted slices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub enum BitDepth {
    /// One byte per sample.
    Eight,
    /// Two bytes per sample, native endian.
    Sixteen,
}

impl BitDepth {
    pub fn from_bits(bits: u32) -> Option<Self> {
        match bits {
            8 => Some(BitDepth::Eight),
            16 => Some(BitDepth::Sixteen),
            _ => None,
        }
    }

    pub fn bits(self) -> u32 {
        match self {
            BitDepth::Eight => 8,
            BitDepth::Sixteen => 16,
        }
    }

    /// Raw grayscale layout the caller's samples are copied into.
    pub(crate) fn source_pixel_format(self) -> ffi::AVPixelFormat {
        match self {
            BitDepth::Eight => ffi::AV_PIX_FMT_GRAY8,
            BitDepth::Sixteen => GRAY16_NE,
        }
    }

    /// Pixel format handed to the codec.
    pub(crate) fn codec_pixel_format(self) -> ffi::AVPixelFormat {
        match self {
            BitDepth::Eight => ffi::AV_PIX_FMT_GRAY8,
            BitDepth::Sixteen => GRAY12_NE,
        }
    }
}

impl TryFrom<u32> for BitDepth {
    type Error = String;

    fn try_from(bits: u32) -> Result<Self, Self::Error> {
        BitDepth::from_bits(bits).ok_or_else(|| format!("unsupported bit depth {bits}"))
    }
}

impl From<BitDepth> for u32 {
    fn from(depth: BitDepth) -> Self {
        depth.bits()
    }
}

/// Output container wrapping the encoded stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerFormat {
    /// QuickTime MOV, used for FFV1.
    Mov,
    /// ISO MP4, used for every other codec.
    Mp4,
    /// MPEG program stream, fallback when the preferred muxer is missing.
    Mpeg,
}

impl ContainerFormat {
    /// FFmpeg muxer short name.
    pub fn short_name(self) -> &'static CStr {
        match self {
            ContainerFormat::Mov => c"mov",
            ContainerFormat::Mp4 => c"mp4",
            ContainerFormat::Mpeg => c"mpeg",
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ContainerFormat::Mov => "mov",
            ContainerFormat::Mp4 => "mp4",
            ContainerFormat::Mpeg => "mpeg",
        }
    }

    /// Muxers to try for a codec, in order of preference.
    pub fn candidates_for(codec_id: ffi::AVCodecID) -> &'static [ContainerFormat] {
        if codec_id == ffi::AV_CODEC_ID_FFV1 {
            &[ContainerFormat::Mov, ContainerFormat::Mpeg]
        } else {
            &[ContainerFormat::Mp4, ContainerFormat::Mpeg]
        }
    }
}

/// Encoder session configuration.
///
/// Immutable once a session has been constructed from it. Width, height, bit
/// depth and codec are required; the remaining fields default to the values
/// the H5J writer has always used.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncoderConfig {
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// Sample width of every submitted slice.
    pub bit_depth: BitDepth,
    /// FFmpeg encoder name, e.g. `libx265` or `ffv1`.
    pub codec: String,
    /// Codec-specific option string, e.g. `crf=15:psy-rd=1.0` for libx265.
    #[serde(default)]
    pub options: String,
    /// Encoder preset, applied to x264/x265.
    #[serde(default = "default_preset")]
    pub preset: String,
    /// Frames per second; the codec time base is its reciprocal.
    #[serde(default = "default_fps")]
    pub fps: u32,
    #[serde(default = "default_gop_size")]
    pub gop_size: u32,
    /// Bit rate in bits per second. `None` uses `width * height * 4`.
    #[serde(default)]
    pub bit_rate: Option<i64>,
}

fn default_preset() -> String {
    "medium".to_string()
}

fn default_fps() -> u32 {
    25
}

fn default_gop_size() -> u32 {
    12
}

impl EncoderConfig {
    pub fn new(
        width: u32,
        height: u32,
        bit_depth: BitDepth,
        codec: impl Into<String>,
        options: impl Into<String>,
    ) -> Self {
        Self {
            width,
            height,
            bit_depth,
            codec: codec.into(),
            options: options.into(),
            preset: default_preset(),
            fps: default_fps(),
            gop_size: default_gop_size(),
            bit_rate: None,
        }
    }

    /// Parse and validate a JSON document.
    ///
    /// `width`, `height`, `bit_depth` and `codec` must be present; the other
    /// fields take their defaults when missing.
    pub fn from_json(json: &str) -> Result<Self, EncodeError> {
        let config: EncoderConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Number of samples every slice must hold.
    pub fn samples_per_slice(&self) -> usize {
        self.width as usize * self.height as usize
    }

    pub fn bit_rate(&self) -> i64 {
        self.bit_rate
            .unwrap_or(self.width as i64 * self.height as i64 * 4)
    }

    /// Some codecs refuse odd frame sizes, others accept them.
    pub fn has_odd_dimensions(&self) -> bool {
        self.width % 2 != 0 || self.height % 2 != 0
    }

    /// Reject configurations FFmpeg cannot be handed. Logs nothing, so it
    /// can run on every path that builds a config.
    pub fn validate(&self) -> Result<(), EncodeError> {
        if self.width == 0 || self.height == 0 {
            return Err(EncodeError::InvalidConfig(format!(
                "frame size {}x{} is empty",
                self.width, self.height
            )));
        }
        if i32::try_from(self.width).is_err() || i32::try_from(self.height).is_err() {
            return Err(EncodeError::InvalidConfig(format!(
                "frame size {}x{} exceeds the codec limit",
                self.width, self.height
            )));
        }
        if self.fps == 0 || i32::try_from(self.fps).is_err() {
            return Err(EncodeError::InvalidConfig(format!(
                "frame rate {} is out of range",
                self.fps
            )));
        }
        if i32::try_from(self.gop_size).is_err() {
            return Err(EncodeError::InvalidConfig(format!(
                "GOP size {} is out of range",
                self.gop_size
            )));
        }
        if let Some(bit_rate) = self.bit_rate {
            if bit_rate < 0 {
                return Err(EncodeError::InvalidConfig(format!(
                    "bit rate {bit_rate} is negative"
                )));
            }
        }
        if self.codec.is_empty() {
            return Err(EncodeError::InvalidConfig("codec name is empty".into()));
        }
        if self.codec.contains('\0') || self.options.contains('\0') || self.preset.contains('\0')
        {
            return Err(EncodeError::InvalidConfig(
                "codec name, options and preset must not contain NUL".into(),
            ));
        }
        Ok(())
    }
}
