use crate::tag::{DataType, Tag};

/// Errors raised while building or validating an envelope.
#[derive(Debug, thiserror::Error)]
pub enum EnvelopeError {
    /// The tag's type byte does not match the value being stored.
    #[error("tag {tag} is not of type {expected}")]
    TypeMismatch { tag: Tag, expected: DataType },

    /// String values are NUL-terminated on the wire and cannot contain NUL.
    #[error("string value for {tag} contains a NUL byte")]
    InteriorNul { tag: Tag },

    /// A single payload cannot be described by a u32 size.
    #[error("payload for {tag} too large ({size} bytes)")]
    PayloadTooLarge { tag: Tag, size: usize },

    /// Growing the buffer failed.
    #[error("envelope allocation failed: {0}")]
    Alloc(#[from] std::collections::TryReserveError),

    /// The envelope has no header field to update.
    #[error("envelope has no header")]
    MissingHeader,

    /// Shorter than a single field header.
    #[error("envelope too short ({len} bytes)")]
    TooShort { len: usize },

    /// The header field is not RAW-typed.
    #[error("envelope header has wrong type (tag {tag:#010x})")]
    HeaderType { tag: u32 },

    /// The header size disagrees with the bytes that follow it.
    #[error("envelope header declares {declared} bytes but {actual} follow")]
    HeaderSize { declared: u32, actual: usize },

    /// A field's declared size runs past the end of the buffer.
    #[error("field {tag:#010x} at offset {offset} overruns the envelope ({size} bytes, {len} total)")]
    FieldOverrun {
        tag: u32,
        offset: usize,
        size: u32,
        len: usize,
    },

    /// A payload could not be decoded as its declared type.
    #[error("field {tag} has a malformed {expected} payload")]
    MalformedPayload { tag: Tag, expected: DataType },
}

pub type Result<T> = std::result::Result<T, EnvelopeError>;
