//! Backend session controller for mbgate.
//!
//! A request is served by a [`Handler`] registered for its (request type,
//! backend) pair. The [`SessionController`] checks the device, validates the
//! request inputs, opens a [`Session`] on the selected [`Backend`], lets the
//! handler run one or two commands, and always closes the session before
//! returning:
//!
//! ```text
//! IDLE -> OPENING -> READY -> COMMAND_IN_FLIGHT -> SUCCESS | FAILED -> CLOSED
//! ```
//!
//! The shipped backends drive `mbimcli` and `qmicli` as subprocesses
//! ([`MbimBackend`], [`QmiBackend`]).

pub mod backend;
pub mod cancel;
pub mod command;
pub mod controller;
pub mod error;
pub mod handler;
pub mod handlers;
pub mod mbim;
pub mod qmi;
pub mod reply;
pub mod state;
pub mod tool;

pub use backend::{Backend, OpenOptions, Session};
pub use cancel::CancelToken;
pub use command::{Command, CommandClass, Timeouts};
pub use controller::{
    ControllerConfig, RequestContext, SessionController, SessionReport, DEFAULT_DEVICE,
};
pub use error::{BackendError, FieldError, Result, SessionError};
pub use handler::{Handler, HandlerContext, HandlerRegistry};
pub use mbim::MbimBackend;
pub use qmi::QmiBackend;
pub use reply::{keys, Reply, ReplyValue};
pub use state::{SessionState, StateTrail};
pub use tool::{ToolBackend, ToolDialect, ToolRunner};
