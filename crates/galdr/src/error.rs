//! Result and Error types for the crate.
use thiserror::Error;

/// Result containing an error variant from this crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Serialization error variants.
///
/// Every variant is terminal for the current encode/decode call; the engine
/// never retries internally.
#[derive(Error, Debug)]
pub enum Error {
    /// The byte source was exhausted before the expected field or width
    /// was fully read.
    #[error("input ended before the expected data could be read")]
    TruncatedInput,

    /// IO error other than an unexpected end of input.
    #[error(transparent)]
    Io(std::io::Error),

    /// A variable-length integer ran past the 64-bit range without
    /// reaching a terminating byte.
    #[error("variable-length integer exceeds 64 bits")]
    MalformedVarInt,

    /// Invalid string, this can occur while decoding a string.
    #[error(transparent)]
    InvalidString(#[from] std::string::FromUtf8Error),

    /// A decoded `char` value was not a valid Unicode scalar value.
    #[error("{0:#x} is not a valid unicode scalar value")]
    InvalidChar(u32),

    /// A scalar value cannot be represented in its wire encoding.
    #[error("scalar value out of encodable range: {0}")]
    ScalarOutOfRange(&'static str),

    /// A polymorphic type identifier did not resolve to a registered,
    /// constructible concrete type.
    #[error("no registered concrete type matches identifier `{0}`")]
    UnresolvableType(String),

    /// A type cannot be classified into any recognized shape, or was used
    /// where a different shape was required.
    #[error("type cannot be classified for serialization: {0}")]
    UnsupportedShape(&'static str),

    /// Construction of a decoded instance failed.
    #[error("failed to construct an instance of `{0}`")]
    ConstructionFailure(&'static str),

    /// A value handed to a codec did not match the type the codec was
    /// derived for.
    #[error("value does not match the expected type `{0}`")]
    ValueAccess(&'static str),
}

impl From<std::io::Error> for Error {
    fn from(error: std::io::Error) -> Self {
        // Short reads surface as the dedicated truncation variant so callers
        // can distinguish them from real IO failures.
        if error.kind() == std::io::ErrorKind::UnexpectedEof {
            Error::TruncatedInput
        } else {
            Error::Io(error)
        }
    }
}
