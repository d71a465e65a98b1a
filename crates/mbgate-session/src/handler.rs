use std::collections::HashMap;

use mbgate_envelope::{BackendKind, Envelope, RequestType};
use tracing::debug;

use crate::backend::Session;
use crate::cancel::CancelToken;
use crate::command::{Command, Timeouts};
use crate::error::{BackendError, FieldError, SessionError};
use crate::handlers;
use crate::reply::Reply;
use crate::state::{SessionState, StateTrail};

/// One request type on one backend.
///
/// The controller calls the three steps in order: `validate_inputs` before any
/// session is opened, `invoke` with the open session, `extract_outputs` into a
/// staging envelope that is merged into the response only on success.
pub trait Handler: Send + Sync {
    fn validate_inputs(&self, request: &Envelope) -> Result<Command, FieldError>;

    /// Run the command. The default issues exactly one backend command;
    /// handlers that need a preliminary query override this.
    fn invoke(
        &self,
        ctx: &mut HandlerContext<'_>,
        command: &Command,
    ) -> Result<Reply, SessionError> {
        Ok(ctx.run(command)?)
    }

    fn extract_outputs(&self, reply: &Reply, response: &mut Envelope)
        -> Result<(), SessionError>;
}

/// What a handler may touch while a session is open.
pub struct HandlerContext<'a> {
    session: &'a mut dyn Session,
    timeouts: Timeouts,
    cancel: &'a CancelToken,
    trail: &'a mut StateTrail,
    commands_run: usize,
}

impl<'a> HandlerContext<'a> {
    pub fn new(
        session: &'a mut dyn Session,
        timeouts: Timeouts,
        cancel: &'a CancelToken,
        trail: &'a mut StateTrail,
    ) -> Self {
        Self {
            session,
            timeouts,
            cancel,
            trail,
            commands_run: 0,
        }
    }

    /// Invoke one backend command with the timeout of its class.
    pub fn run(&mut self, command: &Command) -> Result<Reply, BackendError> {
        self.trail.advance(SessionState::CommandInFlight);
        let timeout = self.timeouts.for_class(command.class());
        debug!(
            command = %command,
            timeout_ms = timeout.as_millis() as u64,
            "invoking backend command"
        );
        self.commands_run += 1;
        self.session.invoke(command, timeout, self.cancel)
    }

    pub fn commands_run(&self) -> usize {
        self.commands_run
    }
}

/// Table from (request type, backend) to handler.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<(RequestType, BackendKind), Box<dyn Handler>>,
}

impl HandlerRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every built-in handler.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        for backend in BackendKind::ALL.iter().copied() {
            registry.register(RequestType::PinStatus, backend, handlers::PinStatus { backend });
            registry.register(RequestType::PinEnter, backend, handlers::PinEnter { backend });
            registry.register(RequestType::Register, backend, handlers::Register { backend });
            registry.register(RequestType::Attach, backend, handlers::Attach { backend });
            registry.register(RequestType::Connect, backend, handlers::Connect);
            registry.register(RequestType::Ip, backend, handlers::IpConfig);
            registry.register(RequestType::Status, backend, handlers::Status { backend });
            registry.register(
                RequestType::PacketService,
                backend,
                handlers::PacketService { backend },
            );
            registry.register(RequestType::Signal, backend, handlers::Signal { backend });
        }
        registry.register(
            RequestType::Subscriber,
            BackendKind::Mbim,
            handlers::Subscriber,
        );
        registry.register(
            RequestType::DeviceCaps,
            BackendKind::Mbim,
            handlers::DeviceCaps,
        );
        registry
    }

    /// Add or replace the handler for a pair.
    pub fn register(
        &mut self,
        request: RequestType,
        backend: BackendKind,
        handler: impl Handler + 'static,
    ) {
        self.handlers.insert((request, backend), Box::new(handler));
    }

    pub fn get(&self, request: RequestType, backend: BackendKind) -> Option<&dyn Handler> {
        self.handlers
            .get(&(request, backend))
            .map(|handler| handler.as_ref())
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}
