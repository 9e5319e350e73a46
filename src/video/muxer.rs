//! Output format context writing into an FFmpeg dynamic memory buffer.
//!
//! `AVFormatContextOutput` in rsmpeg always opens a URL, so the context and its
//! `AVIOContext` are driven through `ffi` here and released on drop.

use std::ptr;

use rsmpeg::{
    avcodec::{AVCodecContext, AVPacket},
    avutil::AVRational,
    ffi,
};

use super::config::ContainerFormat;
use super::error::EncodeError;

/// Code reported when FFmpeg returns a null allocation.
fn alloc_failed() -> i32 {
    ffi::AVERROR(ffi::ENOMEM)
}

/// Single-stream muxer whose output lands in memory.
pub(crate) struct MemoryMuxer {
    ctx: *mut ffi::AVFormatContext,
    format: ContainerFormat,
    stream_index: i32,
}

impl MemoryMuxer {
    /// Allocate a muxer for the first container in `candidates` FFmpeg knows.
    pub fn new(candidates: &[ContainerFormat], codec_name: &str) -> Result<Self, EncodeError> {
        let (format, oformat) = candidates
            .iter()
            .find_map(|&format| {
                let oformat = unsafe {
                    ffi::av_guess_format(format.short_name().as_ptr(), ptr::null(), ptr::null())
                };
                (!oformat.is_null()).then_some((format, oformat))
            })
            .ok_or_else(|| EncodeError::ContainerFormat(codec_name.to_string()))?;

        let mut ctx = ptr::null_mut();
        EncodeError::check("avformat_alloc_output_context2", unsafe {
            ffi::avformat_alloc_output_context2(&mut ctx, oformat, ptr::null(), ptr::null())
        })?;
        if ctx.is_null() {
            return Err(EncodeError::Call {
                call: "avformat_alloc_output_context2",
                code: alloc_failed(),
            });
        }

        let muxer = Self {
            ctx,
            format,
            stream_index: -1,
        };

        if unsafe { (*oformat).flags } & ffi::AVFMT_NOFILE as i32 == 0 {
            EncodeError::check("avio_open_dyn_buf", unsafe {
                ffi::avio_open_dyn_buf(&mut (*muxer.ctx).pb)
            })?;
        }

        log::debug!("Allocated {} muxer", format.name());
        Ok(muxer)
    }

    pub fn format(&self) -> ContainerFormat {
        self.format
    }

    /// Whether codecs must emit their headers out-of-band for this container.
    pub fn needs_global_header(&self) -> bool {
        unsafe { (*(*self.ctx).oformat).flags & ffi::AVFMT_GLOBALHEADER as i32 != 0 }
    }

    /// Create the video stream from an opened codec context.
    pub fn add_stream(&mut self, codec_ctx: &AVCodecContext) -> Result<(), EncodeError> {
        let stream = unsafe { ffi::avformat_new_stream(self.ctx, ptr::null()) };
        if stream.is_null() {
            return Err(EncodeError::Call {
                call: "avformat_new_stream",
                code: alloc_failed(),
            });
        }

        EncodeError::check("avcodec_parameters_from_context", unsafe {
            ffi::avcodec_parameters_from_context((*stream).codecpar, codec_ctx.as_ptr())
        })?;

        unsafe {
            (*stream).id = (*self.ctx).nb_streams as i32 - 1;
            (*stream).time_base = codec_ctx.time_base;
            self.stream_index = (*stream).index;
        }
        Ok(())
    }

    pub fn stream_index(&self) -> i32 {
        self.stream_index
    }

    /// Stream time base. Muxers may change it while writing the header.
    pub fn time_base(&self) -> AVRational {
        unsafe {
            let stream = *(*self.ctx).streams.add(self.stream_index as usize);
            (*stream).time_base
        }
    }

    pub fn write_header(&mut self) -> Result<(), EncodeError> {
        EncodeError::check("avformat_write_header", unsafe {
            ffi::avformat_write_header(self.ctx, ptr::null_mut())
        })?;
        Ok(())
    }

    pub fn write_packet(&mut self, packet: &mut AVPacket) -> Result<(), EncodeError> {
        EncodeError::check("av_interleaved_write_frame", unsafe {
            ffi::av_interleaved_write_frame(self.ctx, packet.as_mut_ptr())
        })?;
        Ok(())
    }

    /// Flush interleaving queues, write the trailer and hand back the bytes.
    pub fn finish(mut self) -> Result<Vec<u8>, EncodeError> {
        EncodeError::check("av_write_frame", unsafe {
            ffi::av_write_frame(self.ctx, ptr::null_mut())
        })?;
        EncodeError::check("av_write_trailer", unsafe { ffi::av_write_trailer(self.ctx) })?;
        Ok(self.take_buffer())
    }

    fn take_buffer(&mut self) -> Vec<u8> {
        unsafe {
            let pb = (*self.ctx).pb;
            if pb.is_null() {
                return Vec::new();
            }
            let mut buffer: *mut u8 = ptr::null_mut();
            let size = ffi::avio_close_dyn_buf(pb, &mut buffer);
            (*self.ctx).pb = ptr::null_mut();

            let bytes = if buffer.is_null() || size <= 0 {
                Vec::new()
            } else {
                std::slice::from_raw_parts(buffer, size as usize).to_vec()
            };
            ffi::av_free(buffer.cast());
            bytes
        }
    }
}

impl Drop for MemoryMuxer {
    fn drop(&mut self) {
        if self.ctx.is_null() {
            return;
        }
        self.take_buffer();
        unsafe { ffi::avformat_free_context(self.ctx) };
        self.ctx = ptr::null_mut();
    }
}
