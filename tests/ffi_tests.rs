//! Integration tests for the C ABI, driven the way a host runtime calls it.

use h5j_encoder::ffi::*;
use tempfile::TempDir;

const WIDTH: usize = 32;
const HEIGHT: usize = 32;

#[test]
fn test_lifecycle_through_c_abi() {
    let stack: Vec<u8> = (0..4 * WIDTH * HEIGHT).map(|i| (i % 251) as u8).collect();

    unsafe {
        let enc = h5jenc_create(
            WIDTH as i32,
            HEIGHT as i32,
            8,
            c"ffv1".as_ptr(),
            std::ptr::null(),
        );
        assert!(!enc.is_null());
        assert_eq!(h5jenc_output_size(enc), 0);
        assert!(h5jenc_output(enc).is_null());

        for slice in stack.chunks_exact(WIDTH * HEIGHT) {
            assert_eq!(h5jenc_send_slice8(enc, slice.as_ptr()), H5JENC_OK);
        }
        assert_eq!(h5jenc_encode(enc), H5JENC_OK);

        let size = h5jenc_output_size(enc);
        let data = h5jenc_output(enc);
        assert!(size > 0);
        assert!(!data.is_null());
        let bytes = std::slice::from_raw_parts(data, size);
        assert!(bytes.windows(4).any(|w| w == b"moov"));

        assert_eq!(h5jenc_encode(enc), H5JENC_ERR_REJECTED);

        h5jenc_release_output(enc);
        h5jenc_release_output(enc);
        assert_eq!(h5jenc_output_size(enc), 0);
        assert!(h5jenc_output(enc).is_null());

        h5jenc_destroy(enc);
    }
}

#[test]
fn test_sixteen_bit_slices_through_c_abi() {
    let slice: Vec<u16> = (0..WIDTH * HEIGHT).map(|i| (i * 3) as u16 & 0x0FFF).collect();

    unsafe {
        let enc = h5jenc_create(
            WIDTH as i32,
            HEIGHT as i32,
            16,
            c"ffv1".as_ptr(),
            c"".as_ptr(),
        );
        assert!(!enc.is_null());

        assert_eq!(h5jenc_send_slice8(enc, [0u8; WIDTH * HEIGHT].as_ptr()), H5JENC_ERR_REJECTED);
        assert_eq!(h5jenc_send_slice16(enc, slice.as_ptr()), H5JENC_OK);
        assert_eq!(h5jenc_send_slice16(enc, std::ptr::null()), H5JENC_ERR_ARGUMENT);
        assert_eq!(h5jenc_encode(enc), H5JENC_OK);
        assert!(h5jenc_output_size(enc) > 0);

        h5jenc_destroy(enc);
    }
}

#[test]
fn test_create_from_json_and_write_output() {
    let temp_dir = TempDir::new().unwrap();
    let output_path = temp_dir.path().join("stack.mov");
    let output_path_c = std::ffi::CString::new(output_path.to_str().unwrap()).unwrap();
    let slice = vec![200u8; 16 * 8];

    unsafe {
        let enc = h5jenc_create_from_json(
            cr#"{"width": 16, "height": 8, "bit_depth": 8, "codec": "ffv1", "fps": 30}"#.as_ptr(),
        );
        assert!(!enc.is_null());

        assert_eq!(h5jenc_write_output(enc, output_path_c.as_ptr()), H5JENC_ERR_REJECTED);

        assert_eq!(h5jenc_send_slice8(enc, slice.as_ptr()), H5JENC_OK);
        assert_eq!(h5jenc_encode(enc), H5JENC_OK);
        assert_eq!(h5jenc_write_output(enc, output_path_c.as_ptr()), H5JENC_OK);

        let written = std::fs::read(&output_path).unwrap();
        assert_eq!(written.len(), h5jenc_output_size(enc));

        h5jenc_destroy(enc);
    }
}

#[test]
fn test_repeated_create_destroy() {
    for _ in 0..50 {
        unsafe {
            let enc = h5jenc_create(16, 16, 8, c"ffv1".as_ptr(), std::ptr::null());
            assert!(!enc.is_null());
            h5jenc_destroy(enc);
        }
    }
}
