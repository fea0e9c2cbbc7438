use thiserror::Error as ThisError;

/// Status returned across the flat ABI when a session is used in the wrong state.
pub const STATUS_NOT_READY: i32 = -1;
/// Status returned across the flat ABI when the configuration fails validation.
pub const STATUS_INVALID_CONFIG: i32 = -2;

/// Error produced by the safe wrappers around `libwebp`.
#[derive(Debug, Clone, PartialEq, Eq, ThisError)]
pub enum Error {
    /// The encoder session has not been initialized (or was reset).
    #[error("encoder session is not initialized")]
    NotReady,
    /// `init` was called on a session that is already initialized.
    #[error("encoder session is already initialized")]
    AlreadyReady,
    /// `WebPValidateConfig` rejected the session configuration.
    #[error("encoder configuration failed validation")]
    InvalidConfig,
    /// `libwebp` reported a `WebPEncodingError`; the raw code is kept.
    #[error("{}: libwebp encoding error {}", encoding_error_label(*.0), .0)]
    Encode(i32),
    /// `libwebp` could not decode the input.
    #[error("input is not a decodable WebP bitstream")]
    Decode,
    #[error("allocation failed")]
    Alloc,
    /// The linked libwebp was built for a different encoder ABI version.
    #[error("libwebp encoder ABI version mismatch")]
    AbiMismatch,
    #[error("invalid parameter: {0}")]
    InvalidParam(String),
    /// The RIFF container could not be parsed.
    #[error("malformed WebP container: {0}")]
    Container(String),
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub(crate) fn alloc() -> Self {
        Self::Alloc
    }

    pub(crate) fn invalid_param(msg: impl Into<String>) -> Self {
        Self::InvalidParam(msg.into())
    }

    pub(crate) fn container(msg: impl Into<String>) -> Self {
        Self::Container(msg.into())
    }

    /// Integer status as reported by `encoderRun`: `-1` for state violations,
    /// `-2` for an invalid configuration, the positive libwebp code otherwise.
    pub fn status(&self) -> i32 {
        match self {
            Error::InvalidConfig => STATUS_INVALID_CONFIG,
            Error::Encode(code) => *code,
            _ => STATUS_NOT_READY,
        }
    }
}

/// Human-readable name of a `WebPEncodingError` code.
pub fn encoding_error_label(code: i32) -> &'static str {
    match code {
        0 => "ok",
        1 => "out of memory",
        2 => "bitstream out of memory",
        3 => "null parameter",
        4 => "invalid configuration",
        5 => "bad dimension",
        6 => "partition 0 overflow",
        7 => "partition overflow",
        8 => "bad write",
        9 => "file too big",
        10 => "user abort",
        _ => "unknown",
    }
}
