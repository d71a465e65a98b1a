use std::path::PathBuf;
use std::time::Duration;

use mbgate_envelope::{BackendKind, EnvelopeError, RequestType};

/// Failures reported by a backend while opening a session or running a command.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    /// The session could not be opened.
    #[error("Couldn't open {device}: {reason}")]
    Open { device: PathBuf, reason: String },

    /// The backend ran the command and reported failure. Carries the
    /// backend's own message.
    #[error("{0}")]
    Failed(String),

    /// The command did not finish within its timeout.
    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),

    /// The command was aborted through the cancellation token.
    #[error("Operation cancelled")]
    Cancelled,

    /// The backend has no implementation for this command.
    #[error("Unsupported command {0}")]
    Unsupported(&'static str),

    /// The backend's output could not be understood.
    #[error("Couldn't parse response message: {0}")]
    Parse(String),

    /// Starting the backend tool failed.
    #[error("failed to run {program}: {source}")]
    Spawn {
        program: PathBuf,
        source: std::io::Error,
    },

    #[error("backend I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A request input is missing or unusable. The message is returned to the
/// client verbatim.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FieldError {
    #[error("You must provide {what} ({tag})")]
    Missing { what: &'static str, tag: &'static str },

    #[error("Unknown {what} {value}")]
    Unknown { what: &'static str, value: u32 },
}

/// Everything that can end a request before a successful response.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// Device inaccessible; no session was opened.
    #[error("No {backend} device file")]
    Unavailable { backend: BackendKind },

    /// No handler registered for this request/backend pair.
    #[error("Unsupported request")]
    Unsupported {
        request: RequestType,
        backend: BackendKind,
    },

    /// No backend registered for this selector.
    #[error("Server : Unknown protocol {0}")]
    NoBackend(BackendKind),

    #[error(transparent)]
    Field(#[from] FieldError),

    #[error(transparent)]
    Backend(#[from] BackendError),

    /// The backend answered, but the answer is a refusal (e.g. unsupported
    /// PIN type, no SIM card).
    #[error("{0}")]
    Rejected(String),

    #[error("response encoding failed: {0}")]
    Envelope(#[from] EnvelopeError),
}

impl SessionError {
    pub fn rejected(message: impl Into<String>) -> Self {
        SessionError::Rejected(message.into())
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, SessionError::Backend(BackendError::Cancelled))
    }
}

pub type Result<T> = std::result::Result<T, SessionError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_facing_messages() {
        let missing = FieldError::Missing {
            what: "an APN",
            tag: "MB_APN",
        };
        assert_eq!(missing.to_string(), "You must provide an APN (MB_APN)");

        let unavailable = SessionError::Unavailable {
            backend: BackendKind::Qmi,
        };
        assert_eq!(unavailable.to_string(), "No qmi device file");

        let failed = SessionError::from(BackendError::Failed("SIM not inserted".into()));
        assert_eq!(failed.to_string(), "SIM not inserted");
    }

    #[test]
    fn cancellation_is_detectable() {
        assert!(SessionError::from(BackendError::Cancelled).is_cancelled());
        assert!(!SessionError::rejected("No card found").is_cancelled());
    }
}
