//! Codec error types

use thiserror::Error;

/// Errors raised while decoding edge intervals from their binary form.
///
/// These indicate a malformed or truncated record and are only expected
/// when reading a corrupt block; a healthy file never produces them.
#[derive(Debug, Error)]
pub enum CodecError {
    /// The discriminator byte is not a known interval variant.
    #[error("unknown edge interval tag {0:#04x}")]
    UnknownTag(u8),

    /// A qualifier string is not valid UTF-8.
    #[error("edge qualifier is not valid UTF-8: {0}")]
    InvalidQualifier(#[from] std::string::FromUtf8Error),

    /// The underlying reader failed or ran out of bytes.
    #[error("I/O error while decoding interval: {0}")]
    Io(#[from] std::io::Error),
}
