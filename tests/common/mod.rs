//! Helpers shared by the integration tests: container inspection and decoding
//! written output back into frames.

#![allow(dead_code)]

use std::ffi::CString;
use std::path::Path;

use rsmpeg::{
    avcodec::AVCodecContext,
    avformat::AVFormatContextInput,
    avutil::AVFrame,
    error::RsmpegError,
    ffi,
};

pub fn find_box(bytes: &[u8], tag: &[u8; 4]) -> Option<usize> {
    bytes.windows(4).position(|w| w == tag)
}

/// Sample count from the MOV/MP4 `stsz` box: tag, version/flags, sample size, count.
pub fn stsz_sample_count(bytes: &[u8]) -> Option<u32> {
    let pos = find_box(bytes, b"stsz")?;
    let count = bytes.get(pos + 12..pos + 16)?;
    Some(u32::from_be_bytes(count.try_into().ok()?))
}

/// One decoded picture with its first plane packed row by row.
#[derive(Debug)]
pub struct DecodedFrame {
    pub width: usize,
    pub height: usize,
    pub format: i32,
    pub plane: Vec<u8>,
}

impl DecodedFrame {
    pub fn gray8(&self) -> &[u8] {
        assert_eq!(self.format, ffi::AV_PIX_FMT_GRAY8);
        &self.plane
    }

    pub fn gray16(&self) -> Vec<u16> {
        assert_eq!(self.plane.len(), self.width * self.height * 2);
        self.plane
            .chunks_exact(2)
            .map(|b| u16::from_ne_bytes([b[0], b[1]]))
            .collect()
    }

    fn from_frame(frame: &AVFrame) -> Self {
        let width = frame.width as usize;
        let height = frame.height as usize;
        let bytes_per_sample = if frame.format == ffi::AV_PIX_FMT_GRAY8 { 1 } else { 2 };
        let row_bytes = width * bytes_per_sample;
        let stride = frame.linesize[0] as usize;

        let mut plane = Vec::with_capacity(row_bytes * height);
        for y in 0..height {
            let row = unsafe { std::slice::from_raw_parts(frame.data[0].add(y * stride), row_bytes) };
            plane.extend_from_slice(row);
        }

        Self {
            width,
            height,
            format: frame.format,
            plane,
        }
    }
}

/// Decode every frame of the best video stream in `path`, in presentation order.
pub fn decode_frames(path: &Path) -> Result<Vec<DecodedFrame>, RsmpegError> {
    let url = CString::new(path.to_string_lossy().as_bytes()).expect("path without NUL");
    let mut input = AVFormatContextInput::open(&url)?;
    let (stream_index, decoder) = input
        .find_best_stream(ffi::AVMEDIA_TYPE_VIDEO)?
        .expect("container has a video stream");

    let mut decode_ctx = AVCodecContext::new(&decoder);
    decode_ctx.apply_codecpar(&input.streams()[stream_index].codecpar())?;
    decode_ctx.open(None)?;

    let mut frames = Vec::new();
    while let Some(packet) = input.read_packet()? {
        if packet.stream_index as usize != stream_index {
            continue;
        }
        decode_ctx.send_packet(Some(&packet))?;
        receive_frames(&mut decode_ctx, &mut frames)?;
    }
    decode_ctx.send_packet(None)?;
    receive_frames(&mut decode_ctx, &mut frames)?;

    Ok(frames)
}

fn receive_frames(
    decode_ctx: &mut AVCodecContext,
    frames: &mut Vec<DecodedFrame>,
) -> Result<(), RsmpegError> {
    loop {
        match decode_ctx.receive_frame() {
            Ok(frame) => frames.push(DecodedFrame::from_frame(&frame)),
            Err(RsmpegError::DecoderDrainError) | Err(RsmpegError::DecoderFlushedError) => {
                return Ok(())
            }
            Err(e) => return Err(e),
        }
    }
}
