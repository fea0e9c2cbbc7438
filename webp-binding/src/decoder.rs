use crate::error::{Error, Result};
use crate::sys;
use crate::types::RGBA_BYTES_PER_PIXEL;
use log::debug;
use std::ffi::c_void;
use std::ops::Deref;
use std::os::raw::c_int;
use std::ptr::{self, NonNull};
use std::{fmt, mem, slice};

/// RGBA pixels allocated by `WebPDecodeRGBA`, released through `WebPFree`.
pub struct DecodedRgba {
    ptr: NonNull<u8>,
    width: u32,
    height: u32,
}

// SAFETY: the buffer is uniquely owned and libwebp's allocator is thread-agnostic.
unsafe impl Send for DecodedRgba {}

impl DecodedRgba {
    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn as_slice(&self) -> &[u8] {
        let len = self.width as usize * self.height as usize * RGBA_BYTES_PER_PIXEL;
        // SAFETY: libwebp allocated `width * height * 4` bytes for the RGBA output.
        unsafe { slice::from_raw_parts(self.ptr.as_ptr(), len) }
    }

    /// Give up ownership; the pointer must later reach [`free_decoded`].
    pub fn into_raw(self) -> *mut u8 {
        let ptr = self.ptr.as_ptr();
        mem::forget(self);
        ptr
    }
}

impl Deref for DecodedRgba {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        self.as_slice()
    }
}

impl fmt::Debug for DecodedRgba {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DecodedRgba")
            .field("width", &self.width)
            .field("height", &self.height)
            .finish_non_exhaustive()
    }
}

impl Drop for DecodedRgba {
    fn drop(&mut self) {
        // SAFETY: the pointer came from WebPDecodeRGBA and is freed exactly once.
        unsafe { free_decoded(self.ptr.as_ptr()) }
    }
}

/// Decode a complete WebP bitstream into packed RGBA.
pub fn decode_rgba(data: &[u8]) -> Result<DecodedRgba> {
    if data.is_empty() {
        return Err(Error::Decode);
    }
    let mut width: c_int = 0;
    let mut height: c_int = 0;
    // SAFETY: `data` is a valid slice; width/height are valid out-pointers.
    let raw = unsafe { sys::WebPDecodeRGBA(data.as_ptr(), data.len(), &mut width, &mut height) };
    let ptr = NonNull::new(raw).ok_or(Error::Decode)?;
    debug!("decoded {width}x{height} RGBA from {} bytes", data.len());
    Ok(DecodedRgba {
        ptr,
        width: width as u32,
        height: height as u32,
    })
}

/// Decode straight from a raw buffer, leaving dimensions to the caller.
///
/// Returns null for malformed, truncated, empty or null input.
///
/// # Safety
/// `data` must be null or readable for `size` bytes.
pub unsafe fn decode_rgba_raw(data: *const u8, size: usize) -> *mut u8 {
    if data.is_null() || size == 0 {
        return ptr::null_mut();
    }
    // SAFETY: caller guarantees the input range; null out-pointers are allowed.
    unsafe { sys::WebPDecodeRGBA(data, size, ptr::null_mut(), ptr::null_mut()) }
}

/// Release a buffer produced by the decoder. Null is ignored.
///
/// # Safety
/// `ptr` must come from [`decode_rgba_raw`] or [`DecodedRgba::into_raw`] and
/// must not be freed twice.
pub unsafe fn free_decoded(ptr: *mut u8) {
    if ptr.is_null() {
        return;
    }
    // SAFETY: see the function contract.
    unsafe { sys::WebPFree(ptr as *mut c_void) }
}

/// Width and height from the bitstream headers, without decoding pixels.
pub fn probe_dimensions(data: &[u8]) -> Result<(u32, u32)> {
    if data.is_empty() {
        return Err(Error::Decode);
    }
    let mut width: c_int = 0;
    let mut height: c_int = 0;
    // SAFETY: as in `decode_rgba`.
    let ok = unsafe { sys::WebPGetInfo(data.as_ptr(), data.len(), &mut width, &mut height) };
    if ok == 0 {
        return Err(Error::Decode);
    }
    Ok((width as u32, height as u32))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoder::tests::gradient;
    use crate::encoder::{EncodeOptions, encode_rgba};

    #[test]
    fn lossless_exact_round_trip_is_bit_exact() {
        let px = gradient(13, 7);
        let webp = encode_rgba(&px, 13, 7, &EncodeOptions::lossless(6)).unwrap();
        let decoded = decode_rgba(&webp).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (13, 7));
        assert_eq!(decoded.len(), 13 * 7 * 4);
        assert_eq!(&decoded[..], &px[..]);
    }

    #[test]
    fn lossy_round_trip_stays_close() {
        let px: Vec<u8> = (0..32 * 32).flat_map(|_| [90u8, 160, 40, 255]).collect();
        let webp = encode_rgba(&px, 32, 32, &EncodeOptions::lossy(90.0)).unwrap();
        let decoded = decode_rgba(&webp).unwrap();
        assert_eq!(decoded.len(), px.len());
        let worst = decoded
            .iter()
            .zip(&px)
            .map(|(a, b)| a.abs_diff(*b))
            .max()
            .unwrap();
        assert!(worst <= 16, "max channel error {worst}");
    }

    #[test]
    fn probe_reads_dimensions() {
        let px = gradient(21, 5);
        let webp = encode_rgba(&px, 21, 5, &EncodeOptions::default()).unwrap();
        assert_eq!(probe_dimensions(&webp).unwrap(), (21, 5));
    }

    #[test]
    fn garbage_and_empty_input_fail() {
        assert!(matches!(decode_rgba(&[]), Err(Error::Decode)));
        assert!(matches!(decode_rgba(b"RIFF\0\0\0\0WEBPVP8 "), Err(Error::Decode)));
        assert!(probe_dimensions(&[1, 2, 3]).is_err());
        unsafe {
            assert!(decode_rgba_raw(ptr::null(), 0).is_null());
            let junk = [0u8; 32];
            assert!(decode_rgba_raw(junk.as_ptr(), junk.len()).is_null());
            free_decoded(ptr::null_mut());
        }
    }

    #[test]
    fn truncated_stream_fails() {
        let px = gradient(16, 16);
        let webp = encode_rgba(&px, 16, 16, &EncodeOptions::lossless(1)).unwrap();
        assert!(decode_rgba(&webp[..webp.len() / 2]).is_err());
    }

    #[test]
    fn raw_pointer_ownership_transfer() {
        let px = gradient(3, 3);
        let webp = encode_rgba(&px, 3, 3, &EncodeOptions::lossless(1)).unwrap();
        let raw = decode_rgba(&webp).unwrap().into_raw();
        assert!(!raw.is_null());
        unsafe { free_decoded(raw) };
    }
}
