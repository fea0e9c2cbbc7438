use crate::error::{Error, Result};
use crate::sys;
use crate::types::{EncoderConfig, RGBA_BYTES_PER_PIXEL, rgba_len};
use log::{debug, warn};
use std::ffi::c_void;
use std::{mem, ptr, slice};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Idle,
    Ready { picture_loaded: bool },
}

/// One WebP encode session: picture descriptor, in-memory writer and config.
///
/// The session is either idle or ready. Only [`Encoder::init`] moves it to
/// ready; [`Encoder::reset`] (and `Drop`) release everything libwebp allocated
/// and move it back to idle. Every other operation fails on an idle session
/// without touching its state.
///
/// Encoded bytes accumulate in the session's writer until the next reset, so
/// running [`Encoder::encode`] twice without a reset appends a second stream.
pub struct Encoder {
    state: State,
    config: sys::WebPConfig,
    picture: sys::WebPPicture,
    writer: sys::WebPMemoryWriter,
}

// SAFETY: every pointer inside the picture and writer is exclusively owned by
// the session and only touched through `&mut self`.
unsafe impl Send for Encoder {}

impl Encoder {
    /// Create an idle session; call [`Encoder::init`] before anything else.
    pub fn new() -> Self {
        // SAFETY: all three are plain C structs for which all-zero is a valid
        // (if meaningless) value; `init` fills them in properly.
        unsafe {
            Self {
                state: State::Idle,
                config: mem::zeroed(),
                picture: mem::zeroed(),
                writer: mem::zeroed(),
            }
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self.state, State::Ready { .. })
    }

    /// Whether libwebp holds pixel buffers for this session.
    pub fn is_picture_loaded(&self) -> bool {
        matches!(
            self.state,
            State::Ready {
                picture_loaded: true
            }
        )
    }

    /// Initialize picture, writer and library-default configuration.
    pub fn init(&mut self) -> Result<()> {
        if self.is_ready() {
            return Err(Error::AlreadyReady);
        }
        // SAFETY: the structs are owned by `self`; the init helpers only write into them.
        unsafe {
            if !sys::WebPPictureInit(&mut self.picture) {
                return Err(Error::AbiMismatch);
            }
            sys::WebPMemoryWriterInit(&mut self.writer);
            if !sys::WebPInitConfig(&mut self.config) {
                return Err(Error::AbiMismatch);
            }
        }
        self.picture.writer = Some(sys::WebPMemoryWrite);
        self.attach_writer();
        self.state = State::Ready {
            picture_loaded: false,
        };
        debug!("encoder session initialized");
        Ok(())
    }

    /// Release picture buffers and encoded output, returning to idle.
    ///
    /// Does nothing on an idle session, so calling it repeatedly is harmless.
    pub fn reset(&mut self) {
        let State::Ready { picture_loaded } = self.state else {
            return;
        };
        // SAFETY: the session is ready, so picture and writer were initialized by `init`.
        unsafe {
            if picture_loaded {
                sys::WebPPictureFree(&mut self.picture);
            }
            sys::WebPMemoryWriterClear(&mut self.writer);
        }
        self.state = State::Idle;
        debug!("encoder session reset");
    }

    /// Import packed RGBA pixels (stride `width * 4`) into the picture.
    pub fn load_rgba(&mut self, rgba: &[u8], width: u32, height: u32) -> Result<()> {
        self.ensure_ready()?;
        let expected = rgba_len(width, height)?;
        if rgba.len() < expected {
            return Err(Error::invalid_param("buffer smaller than width*height*4"));
        }
        let width = i32::try_from(width).map_err(|_| Error::invalid_param("width too large"))?;
        let height =
            i32::try_from(height).map_err(|_| Error::invalid_param("height too large"))?;
        // SAFETY: `rgba` covers `width * height * 4` bytes, checked above.
        unsafe { self.load_rgba_raw(rgba.as_ptr(), width, height) }
    }

    /// Import packed RGBA pixels from a raw pointer.
    ///
    /// # Safety
    /// `rgba` must be readable for `width * height * 4` bytes.
    pub unsafe fn load_rgba_raw(
        &mut self,
        rgba: *const u8,
        width: i32,
        height: i32,
    ) -> Result<()> {
        self.ensure_ready()?;
        self.picture.width = width;
        self.picture.height = height;
        let stride = width.saturating_mul(RGBA_BYTES_PER_PIXEL as i32);
        // SAFETY: caller guarantees the pixel buffer; the picture is initialized.
        let ok = unsafe { sys::WebPPictureImportRGBA(&mut self.picture, rgba, stride) };
        // Import may have allocated before failing, so the buffers are freed either way.
        self.state = State::Ready {
            picture_loaded: true,
        };
        if ok == 0 {
            let code = self.picture.error_code as i32;
            warn!("WebPPictureImportRGBA failed for {width}x{height}: code {code}");
            return Err(Error::Encode(code));
        }
        debug!("loaded {width}x{height} RGBA picture");
        Ok(())
    }

    /// `level > 0` applies the lossless preset for `level` and switches the
    /// picture to ARGB; `level <= 0` restores the library defaults and YUV.
    ///
    /// Both branches replace the whole configuration, so quality, method and
    /// exact set earlier are lost. Callers depend on that ordering.
    ///
    /// A level above 9 is rejected by the preset and leaves the configuration
    /// as it was, but the picture still switches to ARGB.
    pub fn set_lossless(&mut self, level: i32) -> Result<()> {
        self.ensure_ready()?;
        if level > 0 {
            self.picture.use_argb = 1;
            // SAFETY: config is initialized while ready.
            if unsafe { sys::WebPConfigLosslessPreset(&mut self.config, level) } == 0 {
                return Err(Error::invalid_param(format!(
                    "lossless level {level} outside 0..=9"
                )));
            }
        } else {
            // SAFETY: as above.
            if !unsafe { sys::WebPInitConfig(&mut self.config) } {
                return Err(Error::AbiMismatch);
            }
            self.picture.use_argb = 0;
        }
        Ok(())
    }

    /// Whether the picture is imported as ARGB (lossless) rather than YUV.
    pub fn uses_argb(&self) -> bool {
        self.picture.use_argb != 0
    }

    pub fn set_quality(&mut self, quality: f32) -> Result<()> {
        self.ensure_ready()?;
        self.config.quality = quality;
        Ok(())
    }

    pub fn set_method(&mut self, method: i32) -> Result<()> {
        self.ensure_ready()?;
        self.config.method = method;
        Ok(())
    }

    pub fn set_exact(&mut self, exact: bool) -> Result<()> {
        self.ensure_ready()?;
        self.config.exact = exact as i32;
        Ok(())
    }

    /// Current configuration, or `None` on an idle session.
    pub fn config(&self) -> Option<EncoderConfig> {
        self.is_ready().then(|| EncoderConfig::from_sys(&self.config))
    }

    /// Validate the configuration and run `WebPEncode`, appending to the output.
    pub fn encode(&mut self) -> Result<()> {
        self.ensure_ready()?;
        // SAFETY: config is initialized while ready.
        if unsafe { sys::WebPValidateConfig(&self.config) } == 0 {
            let cfg = EncoderConfig::from_sys(&self.config);
            warn!("rejected encoder configuration: {cfg:?}");
            return Err(Error::InvalidConfig);
        }
        self.attach_writer();
        // SAFETY: picture and config are initialized; the writer pointer was refreshed above.
        if unsafe { sys::WebPEncode(&self.config, &mut self.picture) } == 0 {
            let code = self.picture.error_code as i32;
            warn!("WebPEncode failed: code {code}");
            return Err(Error::Encode(code));
        }
        debug!("encoded {} bytes", self.writer.size);
        Ok(())
    }

    /// `encode` folded into the integer status of the flat ABI.
    pub fn run(&mut self) -> i32 {
        match self.encode() {
            Ok(()) => 0,
            Err(err) => err.status(),
        }
    }

    /// Encoded output accumulated since the last reset.
    pub fn output(&self) -> &[u8] {
        if self.writer.mem.is_null() || self.writer.size == 0 {
            return &[];
        }
        // SAFETY: the writer owns `size` initialized bytes at `mem` until cleared.
        unsafe { slice::from_raw_parts(self.writer.mem, self.writer.size) }
    }

    /// Raw output pointer; only meaningful after a successful encode and
    /// before the next reset.
    pub fn output_ptr(&self) -> *const u8 {
        self.writer.mem
    }

    pub fn output_len(&self) -> usize {
        self.writer.size
    }

    fn ensure_ready(&self) -> Result<()> {
        if self.is_ready() {
            Ok(())
        } else {
            Err(Error::NotReady)
        }
    }

    fn attach_writer(&mut self) {
        // keep the custom pointer up to date (in case of moves).
        self.picture.custom_ptr = ptr::addr_of_mut!(self.writer) as *mut c_void;
    }
}

impl Default for Encoder {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Encoder {
    fn drop(&mut self) {
        self.reset();
    }
}

/// Encode a packed RGBA buffer in one call.
///
/// Options are applied in the same order as the host wrapper: lossless first
/// (which replaces the configuration), then quality, method and exact.
pub fn encode_rgba(
    rgba: &[u8],
    width: u32,
    height: u32,
    opts: &EncodeOptions,
) -> Result<Vec<u8>> {
    let mut enc = Encoder::new();
    enc.init()?;
    if let Some(level) = opts.lossless {
        enc.set_lossless(level)?;
    }
    if let Some(quality) = opts.quality {
        enc.set_quality(quality)?;
    }
    if let Some(method) = opts.method {
        enc.set_method(method)?;
    }
    if let Some(exact) = opts.exact {
        enc.set_exact(exact)?;
    }
    enc.load_rgba(rgba, width, height)?;
    enc.encode()?;
    Ok(enc.output().to_vec())
}

/// Optional settings for [`encode_rgba`]; `None` leaves the library default.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct EncodeOptions {
    pub lossless: Option<i32>,
    pub quality: Option<f32>,
    pub method: Option<i32>,
    pub exact: Option<bool>,
}

impl EncodeOptions {
    pub fn lossless(level: i32) -> Self {
        Self {
            lossless: Some(level),
            exact: Some(true),
            ..Self::default()
        }
    }

    pub fn lossy(quality: f32) -> Self {
        Self {
            quality: Some(quality),
            ..Self::default()
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::error::{STATUS_INVALID_CONFIG, STATUS_NOT_READY};
    use crate::types::{DEFAULT_METHOD, DEFAULT_QUALITY};

    pub(crate) fn gradient(width: u32, height: u32) -> Vec<u8> {
        let mut out = Vec::with_capacity((width * height * 4) as usize);
        for y in 0..height {
            for x in 0..width {
                out.push((x * 255 / width.max(1)) as u8);
                out.push((y * 255 / height.max(1)) as u8);
                out.push(((x + y) % 256) as u8);
                out.push(if (x + y) % 3 == 0 { 128 } else { 255 });
            }
        }
        out
    }

    #[test]
    fn operations_before_init_fail_without_mutation() {
        let mut enc = Encoder::new();
        let px = gradient(4, 4);
        assert_eq!(enc.set_quality(10.0), Err(Error::NotReady));
        assert_eq!(enc.set_method(1), Err(Error::NotReady));
        assert_eq!(enc.set_exact(true), Err(Error::NotReady));
        assert_eq!(enc.set_lossless(5), Err(Error::NotReady));
        assert_eq!(enc.load_rgba(&px, 4, 4), Err(Error::NotReady));
        assert_eq!(enc.encode(), Err(Error::NotReady));
        assert_eq!(enc.run(), STATUS_NOT_READY);
        assert!(!enc.is_ready());
        assert!(!enc.is_picture_loaded());
        assert!(enc.config().is_none());
        assert!(enc.output().is_empty());
    }

    #[test]
    fn init_twice_keeps_existing_state() {
        let mut enc = Encoder::new();
        enc.init().unwrap();
        enc.set_quality(33.0).unwrap();
        assert_eq!(enc.init(), Err(Error::AlreadyReady));
        assert_eq!(enc.config().unwrap().quality, 33.0);
    }

    #[test]
    fn init_installs_library_defaults() {
        let mut enc = Encoder::new();
        enc.init().unwrap();
        let cfg = enc.config().unwrap();
        assert_eq!(cfg.quality, DEFAULT_QUALITY);
        assert_eq!(cfg.method, DEFAULT_METHOD);
        assert!(!cfg.lossless);
        assert!(!cfg.exact);
    }

    #[test]
    fn reset_is_idempotent() {
        let mut enc = Encoder::new();
        enc.init().unwrap();
        enc.load_rgba(&gradient(8, 8), 8, 8).unwrap();
        assert!(enc.is_picture_loaded());
        enc.reset();
        assert!(!enc.is_ready());
        assert!(!enc.is_picture_loaded());
        enc.reset();
        assert!(!enc.is_ready());
        assert_eq!(enc.set_quality(1.0), Err(Error::NotReady));
        // a reset session can be initialized again
        enc.init().unwrap();
        assert!(enc.is_ready());
    }

    #[test]
    fn encode_produces_output() {
        let mut enc = Encoder::new();
        enc.init().unwrap();
        enc.load_rgba(&gradient(16, 12), 16, 12).unwrap();
        assert_eq!(enc.run(), 0);
        assert!(enc.output_len() > 0);
        assert_eq!(&enc.output()[..4], b"RIFF");
        assert_eq!(&enc.output()[8..12], b"WEBP");
    }

    #[test]
    fn lossless_zero_clobbers_quality() {
        let mut enc = Encoder::new();
        enc.init().unwrap();
        enc.set_quality(12.5).unwrap();
        enc.set_method(6).unwrap();
        enc.set_exact(true).unwrap();
        enc.set_lossless(0).unwrap();
        let cfg = enc.config().unwrap();
        assert_eq!(cfg.quality, DEFAULT_QUALITY);
        assert_eq!(cfg.method, DEFAULT_METHOD);
        assert!(!cfg.exact);
    }

    #[test]
    fn lossless_level_switches_preset() {
        let mut enc = Encoder::new();
        enc.init().unwrap();
        enc.set_lossless(9).unwrap();
        assert!(enc.config().unwrap().lossless);
        assert!(enc.uses_argb());
        enc.set_lossless(-3).unwrap();
        assert!(!enc.config().unwrap().lossless);
        assert!(!enc.uses_argb());
    }

    #[test]
    fn rejected_lossless_level_still_selects_argb() {
        let mut enc = Encoder::new();
        enc.init().unwrap();
        enc.set_quality(42.0).unwrap();
        assert!(matches!(enc.set_lossless(10), Err(Error::InvalidParam(_))));
        assert!(enc.uses_argb());
        let cfg = enc.config().unwrap();
        assert!(!cfg.lossless);
        assert_eq!(cfg.quality, 42.0);
    }

    #[test]
    fn invalid_config_is_reported_before_encoding() {
        let mut enc = Encoder::new();
        enc.init().unwrap();
        enc.load_rgba(&gradient(4, 4), 4, 4).unwrap();
        enc.set_quality(250.0).unwrap();
        assert_eq!(enc.encode(), Err(Error::InvalidConfig));
        assert_eq!(enc.run(), STATUS_INVALID_CONFIG);
        enc.set_quality(80.0).unwrap();
        enc.set_method(7).unwrap();
        assert_eq!(enc.run(), STATUS_INVALID_CONFIG);
    }

    #[test]
    fn encode_without_pixels_reports_library_code() {
        let mut enc = Encoder::new();
        enc.init().unwrap();
        let status = enc.run();
        assert!(status > 0, "expected a libwebp error code, got {status}");
    }

    #[test]
    fn load_rejects_short_buffers() {
        let mut enc = Encoder::new();
        enc.init().unwrap();
        let px = gradient(4, 4);
        assert!(matches!(
            enc.load_rgba(&px[..10], 4, 4),
            Err(Error::InvalidParam(_))
        ));
        assert!(matches!(enc.load_rgba(&px, 0, 4), Err(Error::InvalidParam(_))));
        assert!(!enc.is_picture_loaded());
    }

    #[test]
    fn session_survives_a_move() {
        let mut enc = Encoder::new();
        enc.init().unwrap();
        enc.load_rgba(&gradient(8, 8), 8, 8).unwrap();
        let mut moved = Box::new(enc);
        moved.encode().unwrap();
        assert!(!moved.output().is_empty());
    }

    #[test]
    fn one_shot_encode_matches_session() {
        let px = gradient(10, 10);
        let bytes = encode_rgba(&px, 10, 10, &EncodeOptions::lossy(60.0)).unwrap();
        assert_eq!(&bytes[..4], b"RIFF");
    }
}
