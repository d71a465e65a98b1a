//! Response conventions: an error string (only on failure) followed by the
//! status field, which always comes last.

use std::borrow::Cow;

use crate::enums::Status;
use crate::envelope::Envelope;
use crate::error::Result;
use crate::tags::{MB_ERROR, MB_RESPONSE};

impl Envelope {
    /// Fresh response carrying only an error.
    pub fn error_response(message: &str) -> Result<Self> {
        let mut response = Self::new();
        response.set_error(message)?;
        Ok(response)
    }

    /// Append `MB_ERROR` and `MB_RESPONSE = Error`.
    ///
    /// NUL bytes in `message` become spaces. The status is appended even
    /// when the message cannot be.
    pub fn set_error(&mut self, message: &str) -> Result<()> {
        let message = if message.contains('\0') {
            Cow::Owned(message.replace('\0', " "))
        } else {
            Cow::Borrowed(message)
        };
        let written = self.append_string(MB_ERROR, &message);
        self.append_uint(MB_RESPONSE, Status::Error.as_u32())?;
        written.map(|_| ())
    }

    /// Append `MB_RESPONSE = Ok`.
    pub fn set_ok(&mut self) -> Result<()> {
        self.append_uint(MB_RESPONSE, Status::Ok.as_u32())?;
        Ok(())
    }

    /// Response status, `None` if absent or not a known value.
    pub fn status(&self) -> Option<Status> {
        self.get_uint(MB_RESPONSE).and_then(Status::from_u32)
    }

    pub fn error_message(&self) -> Option<&str> {
        self.get_string(MB_ERROR)
    }

    pub fn is_ok(&self) -> bool {
        self.status() == Some(Status::Ok)
    }
}
