//! Tagged binary envelope for mbgate requests and responses.
//!
//! An envelope is a header field followed by any number of fields:
//!
//! ```text
//! Envelope := Header Field*
//! Header   := tag:u32 (RAW) size:u32      size = bytes of all following fields
//! Field    := tag:u32 size:u32 payload:u8[size]
//! tag      := (id << 8) | type            type: 1 = raw, 2 = u32, 3 = string
//! ```
//!
//! All integers are little-endian. String payloads carry a trailing NUL
//! that is counted in `size`. The header size is kept current on every
//! append, so an envelope is always ready to send.
//!
//! Received bytes are not trusted until [`Envelope::validate`] accepts them.

pub mod enums;
pub mod envelope;
pub mod error;
pub mod response;
pub mod tag;
pub mod tags;

pub use enums::{
    ActivationState, AuthProtocol, BackendKind, ParseEnumError, PinStatus, QmiRegisterState,
    RegisterState, RequestType, Status,
};
pub use envelope::{Envelope, Field, FieldRef, Fields, Value, CHUNK_SIZE, FIELD_HEADER_SIZE};
pub use error::{EnvelopeError, Result};
pub use tag::{DataType, Tag};
