//! Flat `extern "C"` surface over [`webp_binding`] for host runtimes.
//!
//! A host (typically JavaScript driving a wasm build) holds encoder sessions as
//! opaque pointers and moves pixel data through buffers it obtains from
//! [`allocBuffer`]. Every call tolerates a null handle and reports failure
//! through its return value; nothing unwinds across the boundary.
//!
//! Ownership transfer points:
//! - [`encoderCreate`] → [`encoderDestroy`], exactly once per handle.
//! - [`encoderGetResult`] stays valid until the next [`encoderReset`] or
//!   [`encoderDestroy`].
//! - [`decodeRGBA`] → [`decodeFree`].
//! - [`allocBuffer`] → [`destroyBuffer`].
//!
//! Breaking these rules (use after reset, double free, foreign pointers) is
//! undefined behavior, not a reported error.

#![allow(non_snake_case)]

use log::trace;
use std::ptr;
use webp_binding::{Encoder, Error, Result, STATUS_NOT_READY, buffer};

/// Opaque session handle as seen by the host.
pub type EncoderHandle = *mut Encoder;

/// # Safety
/// `enc` must be null or a live handle from [`encoderCreate`].
unsafe fn session<'a>(enc: EncoderHandle) -> Option<&'a mut Encoder> {
    // SAFETY: see the function contract; the host serializes calls per handle.
    unsafe { enc.as_mut() }
}

/// Session calls report `false` only for a session in the wrong state; library
/// rejections of their arguments surface later through `encoderRun`.
fn accepted(result: Result<()>) -> bool {
    !matches!(result, Err(Error::NotReady | Error::AlreadyReady))
}

#[unsafe(no_mangle)]
pub extern "C" fn encoderCreate() -> EncoderHandle {
    let enc = Box::into_raw(Box::new(Encoder::new()));
    trace!("encoderCreate -> {enc:p}");
    enc
}

/// Reset the session and release it.
///
/// # Safety
/// `enc` must be null or a live handle; it is dangling afterwards.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn encoderDestroy(enc: EncoderHandle) {
    trace!("encoderDestroy({enc:p})");
    if enc.is_null() {
        return;
    }
    // SAFETY: the handle came from `Box::into_raw` in `encoderCreate`. Drop resets.
    drop(unsafe { Box::from_raw(enc) });
}

/// # Safety
/// `enc` must be null or a live handle.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn encoderInit(enc: EncoderHandle) -> bool {
    trace!("encoderInit({enc:p})");
    let s = unsafe { session(enc) };
    s.is_some_and(|s| s.init().is_ok())
}

/// # Safety
/// `enc` must be null or a live handle.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn encoderReset(enc: EncoderHandle) {
    trace!("encoderReset({enc:p})");
    if let Some(s) = unsafe { session(enc) } {
        s.reset();
    }
}

/// # Safety
/// `enc` must be null or a live handle; `input` must be readable for
/// `width * height * 4` bytes.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn encoderLoadRGBA(
    enc: EncoderHandle,
    input: *const u8,
    width: i32,
    height: i32,
) -> bool {
    trace!("encoderLoadRGBA({enc:p}, {input:p}, {width}, {height})");
    let Some(s) = (unsafe { session(enc) }) else {
        return false;
    };
    // SAFETY: the host guarantees the pixel buffer.
    accepted(unsafe { s.load_rgba_raw(input, width, height) })
}

/// Any `level > 0` selects ARGB input, even a level the lossless preset
/// rejects; the previous configuration is kept in that case.
///
/// # Safety
/// `enc` must be null or a live handle.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn encoderSetLossless(enc: EncoderHandle, level: i32) -> bool {
    trace!("encoderSetLossless({enc:p}, {level})");
    let s = unsafe { session(enc) };
    s.is_some_and(|s| accepted(s.set_lossless(level)))
}

/// # Safety
/// `enc` must be null or a live handle.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn encoderSetQuality(enc: EncoderHandle, quality: f32) -> bool {
    trace!("encoderSetQuality({enc:p}, {quality})");
    let s = unsafe { session(enc) };
    s.is_some_and(|s| s.set_quality(quality).is_ok())
}

/// # Safety
/// `enc` must be null or a live handle.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn encoderSetMethod(enc: EncoderHandle, method: i32) -> bool {
    trace!("encoderSetMethod({enc:p}, {method})");
    let s = unsafe { session(enc) };
    s.is_some_and(|s| s.set_method(method).is_ok())
}

/// # Safety
/// `enc` must be null or a live handle.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn encoderSetExact(enc: EncoderHandle, exact: bool) -> bool {
    trace!("encoderSetExact({enc:p}, {exact})");
    let s = unsafe { session(enc) };
    s.is_some_and(|s| s.set_exact(exact).is_ok())
}

/// `0` on success, `-1` when not initialized, `-2` for an invalid
/// configuration, otherwise libwebp's positive `WebPEncodingError`.
///
/// # Safety
/// `enc` must be null or a live handle.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn encoderRun(enc: EncoderHandle) -> i32 {
    let status = match unsafe { session(enc) } {
        Some(s) => s.run(),
        None => STATUS_NOT_READY,
    };
    trace!("encoderRun({enc:p}) -> {status}");
    status
}

/// # Safety
/// `enc` must be null or a live handle.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn encoderGetResult(enc: EncoderHandle) -> *const u8 {
    let s = unsafe { session(enc) };
    s.map_or(ptr::null(), |s| s.output_ptr())
}

/// # Safety
/// `enc` must be null or a live handle.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn encoderGetResultSize(enc: EncoderHandle) -> usize {
    let s = unsafe { session(enc) };
    s.map_or(0, |s| s.output_len())
}

/// Decode a whole WebP buffer to RGBA; null on failure. Free with [`decodeFree`].
///
/// # Safety
/// `data` must be null or readable for `size` bytes.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn decodeRGBA(data: *const u8, size: usize) -> *mut u8 {
    // SAFETY: forwarded contract.
    let out = unsafe { webp_binding::decode_rgba_raw(data, size) };
    trace!("decodeRGBA({data:p}, {size}) -> {out:p}");
    out
}

/// # Safety
/// `data` must be null or a pointer from [`decodeRGBA`] not yet freed.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn decodeFree(data: *mut u8) {
    trace!("decodeFree({data:p})");
    // SAFETY: forwarded contract.
    unsafe { webp_binding::free_decoded(data) }
}

#[unsafe(no_mangle)]
pub extern "C" fn allocBuffer(size: usize) -> *mut u8 {
    let out = buffer::allocate(size);
    trace!("allocBuffer({size}) -> {out:p}");
    out
}

/// # Safety
/// `p` must be null or a pointer from [`allocBuffer`] not yet freed.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn destroyBuffer(p: *mut u8) {
    trace!("destroyBuffer({p:p})");
    // SAFETY: forwarded contract.
    unsafe { buffer::free(p) }
}
