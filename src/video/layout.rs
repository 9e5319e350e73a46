//! Copying row-major slices into strided frame planes.
//!
//! FFmpeg pads each frame row to its own alignment, so a plane's stride can be
//! wider than the frame. Caller slices are always tightly packed.

use super::error::EncodeError;

/// A grayscale sample type a session accepts.
pub trait Sample: Copy + 'static {
    const BITS: u32;
}

impl Sample for u8 {
    const BITS: u32 = 8;
}

impl Sample for u16 {
    const BITS: u32 = 16;
}

/// Copy a packed `width * height` slice into `dst`, whose rows start every
/// `dst_stride` samples. Padding at the end of each destination row is left
/// untouched.
pub fn copy_to_strided<S: Sample>(
    src: &[S],
    width: usize,
    height: usize,
    dst: &mut [S],
    dst_stride: usize,
) -> Result<(), EncodeError> {
    let expected = width * height;
    if src.len() != expected {
        return Err(EncodeError::SliceSize {
            expected,
            actual: src.len(),
        });
    }
    if dst_stride < width {
        return Err(EncodeError::InvalidConfig(format!(
            "plane stride {dst_stride} is narrower than frame width {width}"
        )));
    }
    if height == 0 || width == 0 {
        return Ok(());
    }
    let needed = dst_stride * (height - 1) + width;
    if dst.len() < needed {
        return Err(EncodeError::InvalidConfig(format!(
            "plane holds {} samples, {needed} needed",
            dst.len()
        )));
    }

    for (src_row, dst_row) in src.chunks_exact(width).zip(dst.chunks_mut(dst_stride)) {
        dst_row[..width].copy_from_slice(src_row);
    }
    Ok(())
}
