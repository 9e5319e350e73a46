// FFI cdylib surface: every public function is an unsafe extern "C" entry point.
#![allow(clippy::missing_safety_doc)]

//! C ABI for hosts that load the library dynamically.
//!
//! A session is an opaque `H5jEncoder` pointer obtained from `h5jenc_create`
//! and released with `h5jenc_destroy`. Slice pointers are borrowed, not
//! copied: each must stay valid until `h5jenc_encode` returns.

use std::ffi::{c_char, c_int, CStr};

use crate::video::{BitDepth, EncodeError, EncoderConfig, EncoderSession};

/// Success.
pub const H5JENC_OK: c_int = 0;
/// Null handle or argument, or an argument that is not valid UTF-8.
pub const H5JENC_ERR_ARGUMENT: c_int = -1;
/// The session rejected the call: bad slice, bad config, already encoded.
pub const H5JENC_ERR_REJECTED: c_int = -2;
/// FFmpeg or the filesystem failed.
pub const H5JENC_ERR_FAILED: c_int = -3;

/// Opaque session handle.
pub struct H5jEncoder {
    session: EncoderSession<'static>,
}

fn status(result: Result<(), EncodeError>) -> c_int {
    match result {
        Ok(()) => H5JENC_OK,
        Err(e) => {
            log::error!("[h5jenc] {}", e);
            if e.is_usage_error() {
                H5JENC_ERR_REJECTED
            } else {
                H5JENC_ERR_FAILED
            }
        }
    }
}

unsafe fn c_str_to_str<'a>(ptr: *const c_char) -> Option<&'a str> {
    if ptr.is_null() {
        return None;
    }
    CStr::from_ptr(ptr).to_str().ok()
}

fn into_handle(result: Result<EncoderSession<'static>, EncodeError>) -> *mut H5jEncoder {
    match result {
        Ok(session) => Box::into_raw(Box::new(H5jEncoder { session })),
        Err(e) => {
            log::error!("[h5jenc] Failed to create encoder: {}", e);
            std::ptr::null_mut()
        }
    }
}

// ============================================================================
// Lifecycle
// ============================================================================

/// Create a session. `options` may be null.
///
/// Returns null on failure; the reason is logged.
#[no_mangle]
pub unsafe extern "C" fn h5jenc_create(
    width: c_int,
    height: c_int,
    bit_depth: c_int,
    codec_name: *const c_char,
    options: *const c_char,
) -> *mut H5jEncoder {
    crate::init_logging();

    let Some(codec) = c_str_to_str(codec_name) else {
        log::error!("[h5jenc] Codec name is null or not UTF-8");
        return std::ptr::null_mut();
    };
    let options = if options.is_null() {
        ""
    } else {
        match c_str_to_str(options) {
            Some(o) => o,
            None => {
                log::error!("[h5jenc] Codec options are not UTF-8");
                return std::ptr::null_mut();
            }
        }
    };
    let (Ok(width), Ok(height)) = (u32::try_from(width), u32::try_from(height)) else {
        log::error!("[h5jenc] Negative frame size {}x{}", width, height);
        return std::ptr::null_mut();
    };
    let Some(bit_depth) = u32::try_from(bit_depth).ok().and_then(BitDepth::from_bits) else {
        log::error!("[h5jenc] Unsupported bit depth {}", bit_depth);
        return std::ptr::null_mut();
    };

    into_handle(EncoderSession::new(EncoderConfig::new(
        width, height, bit_depth, codec, options,
    )))
}

/// Create a session from a JSON-encoded `EncoderConfig`.
#[no_mangle]
pub unsafe extern "C" fn h5jenc_create_from_json(json: *const c_char) -> *mut H5jEncoder {
    crate::init_logging();

    let Some(json) = c_str_to_str(json) else {
        log::error!("[h5jenc] Config JSON is null or not UTF-8");
        return std::ptr::null_mut();
    };
    into_handle(EncoderConfig::from_json(json).and_then(EncoderSession::new))
}

/// Destroy a session and any output it still holds.
#[no_mangle]
pub unsafe extern "C" fn h5jenc_destroy(enc: *mut H5jEncoder) {
    if !enc.is_null() {
        drop(Box::from_raw(enc));
    }
}

// ============================================================================
// Slices
// ============================================================================

/// Queue an 8-bit slice of `width * height` samples.
#[no_mangle]
pub unsafe extern "C" fn h5jenc_send_slice8(enc: *mut H5jEncoder, slice: *const u8) -> c_int {
    let Some(enc) = enc.as_mut() else {
        return H5JENC_ERR_ARGUMENT;
    };
    if slice.is_null() {
        return H5JENC_ERR_ARGUMENT;
    }
    let len = enc.session.config().samples_per_slice();
    let samples = std::slice::from_raw_parts(slice, len);
    status(enc.session.submit_slice8(samples))
}

/// Queue a 16-bit slice of `width * height` native-endian samples.
#[no_mangle]
pub unsafe extern "C" fn h5jenc_send_slice16(enc: *mut H5jEncoder, slice: *const u16) -> c_int {
    let Some(enc) = enc.as_mut() else {
        return H5JENC_ERR_ARGUMENT;
    };
    if slice.is_null() {
        return H5JENC_ERR_ARGUMENT;
    }
    let len = enc.session.config().samples_per_slice();
    let samples = std::slice::from_raw_parts(slice, len);
    status(enc.session.submit_slice16(samples))
}

// ============================================================================
// Encode and output
// ============================================================================

/// Encode all queued slices and finalize the container.
#[no_mangle]
pub unsafe extern "C" fn h5jenc_encode(enc: *mut H5jEncoder) -> c_int {
    let Some(enc) = enc.as_mut() else {
        return H5JENC_ERR_ARGUMENT;
    };
    status(enc.session.encode().map(|_| ()))
}

/// Size of the finalized container in bytes, 0 before encode.
#[no_mangle]
pub unsafe extern "C" fn h5jenc_output_size(enc: *const H5jEncoder) -> usize {
    enc.as_ref().map_or(0, |enc| enc.session.output_size())
}

/// Pointer to the finalized container bytes, null before encode.
///
/// Valid until `h5jenc_release_output` or `h5jenc_destroy`.
#[no_mangle]
pub unsafe extern "C" fn h5jenc_output(enc: *const H5jEncoder) -> *const u8 {
    enc.as_ref()
        .and_then(|enc| enc.session.output())
        .map_or(std::ptr::null(), |output| output.as_bytes().as_ptr())
}

/// Write the finalized container to `path`.
#[no_mangle]
pub unsafe extern "C" fn h5jenc_write_output(enc: *const H5jEncoder, path: *const c_char) -> c_int {
    let Some(enc) = enc.as_ref() else {
        return H5JENC_ERR_ARGUMENT;
    };
    let Some(path) = c_str_to_str(path) else {
        return H5JENC_ERR_ARGUMENT;
    };
    let Some(output) = enc.session.output() else {
        log::error!("[h5jenc] No output to write; encode has not completed");
        return H5JENC_ERR_REJECTED;
    };
    status(output.write_to(path).map_err(EncodeError::from))
}

/// Release the output buffer. Safe to call repeatedly.
#[no_mangle]
pub unsafe extern "C" fn h5jenc_release_output(enc: *mut H5jEncoder) {
    if let Some(enc) = enc.as_mut() {
        enc.session.release_output();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_handles() {
        unsafe {
            assert_eq!(h5jenc_encode(std::ptr::null_mut()), H5JENC_ERR_ARGUMENT);
            assert_eq!(
                h5jenc_send_slice8(std::ptr::null_mut(), [0u8; 4].as_ptr()),
                H5JENC_ERR_ARGUMENT
            );
            assert_eq!(h5jenc_output_size(std::ptr::null()), 0);
            assert!(h5jenc_output(std::ptr::null()).is_null());
            h5jenc_release_output(std::ptr::null_mut());
            h5jenc_destroy(std::ptr::null_mut());
        }
    }

    #[test]
    fn test_create_rejects_bad_arguments() {
        unsafe {
            assert!(h5jenc_create(16, 16, 8, std::ptr::null(), std::ptr::null()).is_null());
            assert!(h5jenc_create(-16, 16, 8, c"ffv1".as_ptr(), std::ptr::null()).is_null());
            assert!(h5jenc_create(16, 16, 12, c"ffv1".as_ptr(), std::ptr::null()).is_null());
            assert!(h5jenc_create(16, 16, 8, c"no-such-codec".as_ptr(), c"".as_ptr()).is_null());
            assert!(h5jenc_create_from_json(c"{not json".as_ptr()).is_null());
        }
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(status(Ok(())), H5JENC_OK);
        assert_eq!(status(Err(EncodeError::AlreadyEncoded)), H5JENC_ERR_REJECTED);
        assert_eq!(
            status(Err(EncodeError::Call {
                call: "av_write_trailer",
                code: -5
            })),
            H5JENC_ERR_FAILED
        );
    }
}
