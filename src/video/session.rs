//! Encoder session: collects grayscale slices and encodes them into an
//! in-memory container.

use std::ffi::{CStr, CString};
use std::path::Path;

use rsmpeg::{
    avcodec::{AVCodec, AVCodecContext},
    avutil::{AVFrame, AVRational},
    error::RsmpegError,
    ffi,
    swscale::SwsContext,
};

use super::config::{ContainerFormat, EncoderConfig};
use super::error::EncodeError;
use super::layout::{copy_to_strided, Sample};
use super::muxer::MemoryMuxer;

/// A caller-owned slice, borrowed until encode consumes it.
#[derive(Debug, Clone, Copy)]
enum Slice<'a> {
    Gray8(&'a [u8]),
    Gray16(&'a [u16]),
}

/// Finalized container bytes plus what went into them.
#[derive(Debug, Clone)]
pub struct EncodedOutput {
    bytes: Vec<u8>,
    container: ContainerFormat,
    frames: usize,
    packets: usize,
}

impl EncodedOutput {
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn container(&self) -> ContainerFormat {
        self.container
    }

    /// Number of slices that were encoded.
    pub fn frame_count(&self) -> usize {
        self.frames
    }

    /// Number of packets handed to the muxer, flush included.
    pub fn packet_count(&self) -> usize {
        self.packets
    }

    /// Write the container bytes to a file.
    pub fn write_to<P: AsRef<Path>>(&self, path: P) -> std::io::Result<()> {
        std::fs::write(path, &self.bytes)
    }
}

/// FFmpeg state that lives from construction until encode finishes.
struct Pipeline {
    codec_ctx: AVCodecContext,
    scaler: SwsContext,
    source: AVFrame,
    target: AVFrame,
    muxer: MemoryMuxer,
    has_delay: bool,
    frames_sent: i64,
    packets_written: usize,
}

/// Encoder session over a stack of grayscale slices.
///
/// Slices are borrowed, not copied, so they must outlive the session's call
/// to [`EncoderSession::encode`]. Encode runs once; afterwards the session only
/// serves its output.
pub struct EncoderSession<'a> {
    config: EncoderConfig,
    container: ContainerFormat,
    slices: Vec<Slice<'a>>,
    pipeline: Option<Pipeline>,
    output: Option<EncodedOutput>,
}

impl<'a> EncoderSession<'a> {
    /// Open the codec, the muxer and the scaling path for `config`.
    pub fn new(config: EncoderConfig) -> Result<Self, EncodeError> {
        config.validate()?;
        if config.has_odd_dimensions() {
            log::warn!(
                "Video size {}x{} is not a multiple of 2",
                config.width,
                config.height
            );
        }

        let codec_name = to_cstring(&config.codec)?;
        let codec = AVCodec::find_encoder_by_name(&codec_name)
            .ok_or_else(|| EncodeError::CodecNotFound(config.codec.clone()))?;

        let mut muxer = MemoryMuxer::new(ContainerFormat::candidates_for(codec.id), &config.codec)?;

        let width = config.width as i32;
        let height = config.height as i32;
        let fps = config.fps as i32;

        let mut codec_ctx = AVCodecContext::new(&codec);
        codec_ctx.set_width(width);
        codec_ctx.set_height(height);
        codec_ctx.set_bit_rate(config.bit_rate());
        codec_ctx.set_gop_size(config.gop_size as i32);
        codec_ctx.set_time_base(AVRational { num: 1, den: fps });
        codec_ctx.set_framerate(AVRational { num: fps, den: 1 });
        codec_ctx.set_pix_fmt(config.bit_depth.codec_pixel_format());
        unsafe {
            let raw = codec_ctx.as_mut_ptr();
            if muxer.needs_global_header() {
                (*raw).flags |= ffi::AV_CODEC_FLAG_GLOBAL_HEADER as i32;
            }
            (*raw).strict_std_compliance = ffi::FF_COMPLIANCE_EXPERIMENTAL as i32;
        }

        apply_codec_options(&mut codec_ctx, &config)?;

        codec_ctx.open(None)?;
        muxer.add_stream(&codec_ctx)?;

        let source_format = config.bit_depth.source_pixel_format();
        let target_format = codec_ctx.pix_fmt;
        let source = alloc_frame(width, height, source_format)?;
        let target = alloc_frame(width, height, target_format)?;

        let scaler = SwsContext::get_context(
            width,
            height,
            source_format,
            width,
            height,
            target_format,
            ffi::SWS_BICUBIC,
            None,
            None,
            None,
        )
        .ok_or(EncodeError::Scaler {
            src: source_format,
            dst: target_format,
        })?;

        muxer.write_header()?;

        let has_delay = codec.capabilities & ffi::AV_CODEC_CAP_DELAY as i32 != 0;
        let container = muxer.format();
        log::debug!(
            "Opened {} session {}x{} {}-bit into {}",
            config.codec,
            config.width,
            config.height,
            config.bit_depth.bits(),
            container.name()
        );

        Ok(Self {
            config,
            container,
            slices: Vec::new(),
            pipeline: Some(Pipeline {
                codec_ctx,
                scaler,
                source,
                target,
                muxer,
                has_delay,
                frames_sent: 0,
                packets_written: 0,
            }),
            output: None,
        })
    }

    pub fn config(&self) -> &EncoderConfig {
        &self.config
    }

    /// Container the output will be wrapped in.
    pub fn container(&self) -> ContainerFormat {
        self.container
    }

    /// Number of slices waiting for encode.
    pub fn slice_count(&self) -> usize {
        self.slices.len()
    }

    /// Whether encode has been attempted, successfully or not.
    pub fn is_closed(&self) -> bool {
        self.pipeline.is_none()
    }

    /// Queue an 8-bit slice of `width * height` samples.
    pub fn submit_slice8(&mut self, slice: &'a [u8]) -> Result<(), EncodeError> {
        self.submit::<u8>(slice.len(), Slice::Gray8(slice))
    }

    /// Queue a 16-bit slice of `width * height` samples.
    pub fn submit_slice16(&mut self, slice: &'a [u16]) -> Result<(), EncodeError> {
        self.submit::<u16>(slice.len(), Slice::Gray16(slice))
    }

    fn submit<S: Sample>(&mut self, len: usize, slice: Slice<'a>) -> Result<(), EncodeError> {
        if self.pipeline.is_none() {
            return Err(EncodeError::AlreadyEncoded);
        }
        let expected_bits = self.config.bit_depth.bits();
        if S::BITS != expected_bits {
            return Err(EncodeError::BitDepthMismatch {
                expected: expected_bits,
                actual: S::BITS,
            });
        }
        let expected = self.config.samples_per_slice();
        if len != expected {
            return Err(EncodeError::SliceSize {
                expected,
                actual: len,
            });
        }
        self.slices.push(slice);
        Ok(())
    }

    /// Encode every queued slice in order, flush the encoder and finalize the
    /// container.
    ///
    /// Codec, scaler, frames and the slice list are released whether or not
    /// encoding succeeds. A failed session produces no output.
    pub fn encode(&mut self) -> Result<&EncodedOutput, EncodeError> {
        let mut pipeline = self.pipeline.take().ok_or(EncodeError::AlreadyEncoded)?;
        let slices = std::mem::take(&mut self.slices);
        let width = self.config.width as usize;
        let height = self.config.height as usize;

        log::debug!("Encoding {} slices", slices.len());
        for slice in &slices {
            pipeline.encode_slice(slice, width, height)?;
        }
        pipeline.flush()?;

        let packets = pipeline.packets_written;
        let bytes = pipeline.finish()?;
        log::debug!(
            "Finalized {} container: {} frames, {} packets, {} bytes",
            self.container.name(),
            slices.len(),
            packets,
            bytes.len()
        );

        Ok(&*self.output.insert(EncodedOutput {
            bytes,
            container: self.container,
            frames: slices.len(),
            packets,
        }))
    }

    /// Finalized output, present only after a successful encode.
    pub fn output(&self) -> Option<&EncodedOutput> {
        self.output.as_ref()
    }

    /// Output size in bytes; zero before encode and after release.
    pub fn output_size(&self) -> usize {
        self.output.as_ref().map_or(0, EncodedOutput::len)
    }

    /// Drop the output buffer. Calling it again is a no-op.
    pub fn release_output(&mut self) {
        self.output = None;
    }
}

impl Pipeline {
    fn encode_slice(
        &mut self,
        slice: &Slice<'_>,
        width: usize,
        height: usize,
    ) -> Result<(), EncodeError> {
        match *slice {
            Slice::Gray8(samples) => self.fill_source(samples, width, height)?,
            Slice::Gray16(samples) => self.fill_source(samples, width, height)?,
        }

        // The encoder may still reference the previous frame's buffer.
        EncodeError::check("av_frame_make_writable", unsafe {
            ffi::av_frame_make_writable(self.target.as_mut_ptr())
        })?;
        self.scaler
            .scale_frame(&self.source, 0, height as i32, &mut self.target)?;

        self.target.set_pts(self.frames_sent);
        self.frames_sent += 1;

        self.codec_ctx.send_frame(Some(&self.target))?;
        self.drain_packets()
    }

    fn fill_source<S: Sample>(
        &mut self,
        samples: &[S],
        width: usize,
        height: usize,
    ) -> Result<(), EncodeError> {
        let stride = self.source.linesize[0] as usize / std::mem::size_of::<S>();
        let plane = unsafe {
            std::slice::from_raw_parts_mut(self.source.data[0].cast::<S>(), stride * height)
        };
        copy_to_strided(samples, width, height, plane, stride)
    }

    fn flush(&mut self) -> Result<(), EncodeError> {
        self.codec_ctx.send_frame(None)?;
        self.drain_packets()
    }

    fn drain_packets(&mut self) -> Result<(), EncodeError> {
        loop {
            let mut packet = match self.codec_ctx.receive_packet() {
                Ok(p) => p,
                Err(RsmpegError::EncoderDrainError) | Err(RsmpegError::EncoderFlushedError) => {
                    break
                }
                Err(e) => return Err(e.into()),
            };

            let pts = packet_pts(packet.pts, self.has_delay, self.packets_written);
            packet.set_pts(pts);
            packet.set_stream_index(self.muxer.stream_index());
            packet.set_duration(1);
            packet.rescale_ts(self.codec_ctx.time_base, self.muxer.time_base());

            self.muxer.write_packet(&mut packet)?;
            self.packets_written += 1;
        }
        Ok(())
    }

    fn finish(self) -> Result<Vec<u8>, EncodeError> {
        let Pipeline {
            codec_ctx,
            scaler,
            source,
            target,
            muxer,
            ..
        } = self;
        drop((codec_ctx, scaler, source, target));
        muxer.finish()
    }
}

fn alloc_frame(width: i32, height: i32, format: ffi::AVPixelFormat) -> Result<AVFrame, EncodeError> {
    let mut frame = AVFrame::new();
    frame.set_format(format);
    frame.set_width(width);
    frame.set_height(height);
    frame.alloc_buffer()?;
    Ok(frame)
}

/// Private option that carries the free-form option string for a codec family.
fn params_option_for(codec_id: ffi::AVCodecID) -> Option<&'static CStr> {
    match codec_id {
        ffi::AV_CODEC_ID_HEVC => Some(c"x265-params"),
        ffi::AV_CODEC_ID_H264 => Some(c"x264-params"),
        _ => None,
    }
}

/// Presentation timestamp for a packet leaving the encoder.
///
/// Codecs without encoder delay may hand back unstamped packets; those are
/// numbered by output order.
fn packet_pts(pts: i64, has_delay: bool, packets_written: usize) -> i64 {
    if pts == ffi::AV_NOPTS_VALUE && !has_delay {
        packets_written as i64
    } else {
        pts
    }
}

/// Route the option string to the codec family that understands it.
fn apply_codec_options(
    codec_ctx: &mut AVCodecContext,
    config: &EncoderConfig,
) -> Result<(), EncodeError> {
    let Some(params_key) = params_option_for(codec_ctx.codec_id) else {
        if !config.options.is_empty() {
            log::warn!(
                "Ignoring options {:?}: {} takes no option string",
                config.options,
                config.codec
            );
        }
        return Ok(());
    };

    if !config.preset.is_empty() {
        set_codec_option(codec_ctx, c"preset", &config.preset)?;
    }
    if !config.options.is_empty() {
        set_codec_option(codec_ctx, params_key, &config.options)?;
    }
    Ok(())
}

fn set_codec_option(
    codec_ctx: &mut AVCodecContext,
    key: &CStr,
    value: &str,
) -> Result<(), EncodeError> {
    let value = to_cstring(value)?;
    let ret = unsafe {
        ffi::av_opt_set(
            codec_ctx.as_mut_ptr() as *mut _,
            key.as_ptr(),
            value.as_ptr(),
            ffi::AV_OPT_SEARCH_CHILDREN as i32,
        )
    };
    if ret < 0 {
        log::warn!(
            "Encoder does not accept option {}={:?} (code {})",
            key.to_string_lossy(),
            value,
            ret
        );
    }
    Ok(())
}

fn to_cstring(value: &str) -> Result<CString, EncodeError> {
    CString::new(value).map_err(|_| EncodeError::InvalidConfig(format!("{value:?} contains NUL")))
}
