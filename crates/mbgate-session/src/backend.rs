use std::path::Path;
use std::time::Duration;

use mbgate_envelope::BackendKind;

use crate::cancel::CancelToken;
use crate::command::{Command, Timeouts};
use crate::error::BackendError;
use crate::reply::Reply;

/// Options applied when opening a session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OpenOptions {
    /// Transaction id from the request; 0 means "no session continuity".
    pub tid: u32,
}

/// A device-control capability provider. One instance serves every request
/// for its backend kind; each request gets its own [`Session`].
pub trait Backend: Send + Sync {
    fn kind(&self) -> BackendKind;

    fn timeouts(&self) -> Timeouts;

    /// Open a session against `device`. Blocks until the session is ready,
    /// the open timeout expires, or `cancel` fires.
    fn open(
        &self,
        device: &Path,
        options: &OpenOptions,
        cancel: &CancelToken,
    ) -> Result<Box<dyn Session>, BackendError>;
}

/// One open device handle plus its command context.
pub trait Session {
    /// Device path as reported back to clients in `MB_DEVICE`.
    fn device_display(&self) -> String;

    /// Run one command to completion. Returns once the result or a terminal
    /// error is available.
    fn invoke(
        &mut self,
        command: &Command,
        timeout: Duration,
        cancel: &CancelToken,
    ) -> Result<Reply, BackendError>;

    /// Release the command context and the device handle. Must be safe to
    /// call more than once.
    fn close(&mut self) -> Result<(), BackendError>;
}
