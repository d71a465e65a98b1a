//! Length-prefixed message framing for the mbgate request/reply channel.
//!
//! Every message travels as one frame:
//! - A 2-byte magic number ("MB") for stream synchronization
//! - A 4-byte little-endian payload length
//! - The payload (one envelope)
//!
//! Readers buffer partial input across timeouts, so callers only ever see
//! complete messages.

pub mod codec;
pub mod error;
pub mod reader;
pub mod writer;

pub use codec::{decode_message, encode_message, FrameConfig, DEFAULT_MAX_PAYLOAD, HEADER_SIZE};
pub use error::{FrameError, Result};
pub use reader::FrameReader;
pub use writer::FrameWriter;
