//! Safe Rust bindings for Google's [`libwebp`](https://chromium.googlesource.com/webm/libwebp)
//! shaped for host runtimes that drive an encoder through opaque handles.
//!
//! The crate keeps libwebp's stateful encode flow while handling memory
//! ownership and validation for you:
//! - [`Encoder`] is one encode session (picture, in-memory writer, config) with an
//!   explicit idle/ready lifecycle.
//! - [`decode_rgba`] is the one-shot whole-buffer RGBA decoder; [`DecodedRgba`]
//!   releases libwebp's allocation on drop.
//! - [`buffer`] hands out raw scratch blocks a host can write input into.
//! - [`container`] reads RIFF structure (kind, dimensions, metadata, frames)
//!   without decoding pixels, and re-wraps single animation frames.
//!
//! The flat `extern "C"` surface lives in the companion `webp-binding-abi` crate.

/// Low-level bindings to `libwebp`. Most users should favor the safe wrappers
/// re-exported from this crate.
pub use libwebp_sys as sys;

pub mod buffer;
pub mod container;
mod decoder;
mod encoder;
mod error;
mod types;

pub use buffer::RawBuffer;
pub use container::{ImageInfo, ImageKind, extract_frame, inspect};
pub use decoder::{DecodedRgba, decode_rgba, decode_rgba_raw, free_decoded, probe_dimensions};
pub use encoder::{EncodeOptions, Encoder, encode_rgba};
pub use error::{
    Error, Result, STATUS_INVALID_CONFIG, STATUS_NOT_READY, encoding_error_label,
};
pub use types::*;
