//! Local transport for the mbgate request/reply channel.
//!
//! A filesystem Unix domain socket carries every request and reply. This is
//! the lowest layer of mbgate; message framing, the envelope codec and the
//! router all build on the [`IpcStream`] and [`UnixDomainSocket`] types here.

pub mod error;
pub mod stream;

#[cfg(unix)]
pub mod uds;

pub use error::{Result, TransportError};
pub use stream::{IpcStream, PeerCredentials};

#[cfg(unix)]
pub use uds::UnixDomainSocket;
