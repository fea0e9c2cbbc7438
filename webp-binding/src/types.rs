use crate::error::{Error, Result};
use crate::sys;

/// Bytes per pixel for the only pixel layout crossing the boundary (RGBA8888).
pub const RGBA_BYTES_PER_PIXEL: usize = 4;

/// Quality `WebPInitConfig` installs.
pub const DEFAULT_QUALITY: f32 = 75.0;
/// Method `WebPInitConfig` installs.
pub const DEFAULT_METHOD: i32 = 4;

/// Snapshot of the encoder options this crate lets callers change.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EncoderConfig {
    /// 0..=100; for lossless this is the effort spent on compression.
    pub quality: f32,
    /// 0 (fast) ..= 6 (slower, better).
    pub method: i32,
    pub lossless: bool,
    /// Keep RGB values under fully transparent pixels.
    pub exact: bool,
}

impl EncoderConfig {
    pub(crate) fn from_sys(config: &sys::WebPConfig) -> Self {
        Self {
            quality: config.quality,
            method: config.method,
            lossless: config.lossless != 0,
            exact: config.exact != 0,
        }
    }
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            quality: DEFAULT_QUALITY,
            method: DEFAULT_METHOD,
            lossless: false,
            exact: false,
        }
    }
}

/// Byte length of a packed RGBA buffer, rejecting empty or overflowing sizes.
pub fn rgba_len(width: u32, height: u32) -> Result<usize> {
    if width == 0 || height == 0 {
        return Err(Error::invalid_param("width and height must be non-zero"));
    }
    (width as usize)
        .checked_mul(height as usize)
        .and_then(|v| v.checked_mul(RGBA_BYTES_PER_PIXEL))
        .ok_or_else(|| Error::invalid_param("buffer size overflow"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rgba_len_is_four_bytes_per_pixel() {
        assert_eq!(rgba_len(3, 2).unwrap(), 24);
        assert!(matches!(rgba_len(0, 2), Err(Error::InvalidParam(_))));
        assert!(matches!(rgba_len(7, 0), Err(Error::InvalidParam(_))));
    }
}
