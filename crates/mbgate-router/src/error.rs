use std::time::Duration;

/// Errors surfaced by the router, the reply endpoint and the request client.
#[derive(Debug, thiserror::Error)]
pub enum RouterError {
    /// Transport-level error. On the server side this is fatal to the
    /// listening endpoint.
    #[error("transport error: {0}")]
    Transport(#[from] mbgate_transport::TransportError),

    /// Frame-level error.
    #[error("frame error: {0}")]
    Frame(#[from] mbgate_frame::FrameError),

    /// Envelope encoding error.
    #[error("envelope error: {0}")]
    Envelope(#[from] mbgate_envelope::EnvelopeError),

    /// The listening endpoint could not be bound after every retry.
    #[error("failed to bind after {attempts} attempts: {source}")]
    BindExhausted {
        attempts: u32,
        source: mbgate_transport::TransportError,
    },

    /// The server closed the connection without replying.
    #[error("server closed the connection")]
    Disconnected,

    /// No reply arrived within the receive timeout.
    #[error("no reply within {0:?}")]
    Timeout(Duration),

    /// The reply failed envelope validation.
    #[error("invalid reply: {0}")]
    InvalidReply(mbgate_envelope::EnvelopeError),
}

pub type Result<T> = std::result::Result<T, RouterError>;
