//! Local IPC gateway for MBIM and QMI modem control.
//!
//! Clients send one tagged binary envelope per request over a Unix domain
//! socket; the gateway opens a session on the selected modem backend, runs
//! the requested operation and answers with one envelope.
//!
//! # Crate Structure
//!
//! - [`transport`]: Unix domain socket listener and stream
//! - [`frame`]: length-prefixed message framing
//! - [`envelope`]: envelope codec and request vocabulary
//! - [`session`]: backend session controller, handlers and tool backends
//! - [`router`]: request router, reply endpoint, request client

/// Re-export transport types.
pub mod transport {
    pub use mbgate_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use mbgate_frame::*;
}

/// Re-export envelope types.
pub mod envelope {
    pub use mbgate_envelope::*;
}

/// Re-export session types.
pub mod session {
    pub use mbgate_session::*;
}

/// Re-export router types.
pub mod router {
    pub use mbgate_router::*;
}
