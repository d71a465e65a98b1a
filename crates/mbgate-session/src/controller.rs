//! Per-request session lifecycle: check, open, run, extract, close.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use mbgate_envelope::tags::MB_DEVICE;
use mbgate_envelope::{BackendKind, Envelope, RequestType};
use tracing::{debug, info, warn};

use crate::backend::{Backend, OpenOptions, Session};
use crate::cancel::CancelToken;
use crate::command::Command;
use crate::error::SessionError;
use crate::handler::{Handler, HandlerContext, HandlerRegistry};
use crate::state::{SessionState, StateTrail};

/// Default modem control device.
pub const DEFAULT_DEVICE: &str = "/dev/cdc-wdm0";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerConfig {
    /// Control device every session is opened against.
    pub device: PathBuf,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            device: PathBuf::from(DEFAULT_DEVICE),
        }
    }
}

/// What the router extracted from a validated request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestContext {
    pub request: RequestType,
    pub backend: BackendKind,
    pub tid: u32,
}

/// How one request went.
#[derive(Debug, Clone)]
pub struct SessionReport {
    pub trail: StateTrail,
    /// A session was opened (and therefore closed).
    pub opened: bool,
    /// The request ended because the cancellation token fired.
    pub cancelled: bool,
    pub commands_run: usize,
}

/// Runs one request at a time against the registered backends.
pub struct SessionController {
    config: ControllerConfig,
    registry: HandlerRegistry,
    backends: HashMap<BackendKind, Box<dyn Backend>>,
    in_flight: Mutex<()>,
}

impl SessionController {
    /// Controller with the built-in handlers and no backends.
    pub fn new(config: ControllerConfig) -> Self {
        Self {
            config,
            registry: HandlerRegistry::with_defaults(),
            backends: HashMap::new(),
            in_flight: Mutex::new(()),
        }
    }

    /// Register (or replace) the backend for its kind.
    pub fn with_backend(mut self, backend: impl Backend + 'static) -> Self {
        self.backends.insert(backend.kind(), Box::new(backend));
        self
    }

    pub fn with_registry(mut self, registry: HandlerRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    pub fn registry(&self) -> &HandlerRegistry {
        &self.registry
    }

    /// Handle one request and populate `response`.
    ///
    /// Concurrent callers are serialized: at most one session exists at any
    /// time. Every path ends with the trail in `CLOSED` and `response`
    /// carrying `MB_RESPONSE`.
    pub fn perform(
        &self,
        ctx: &RequestContext,
        request: &Envelope,
        response: &mut Envelope,
        cancel: &CancelToken,
    ) -> SessionReport {
        let _flight = self
            .in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        info!(
            request = %ctx.request,
            backend = %ctx.backend,
            tid = ctx.tid,
            "handling request"
        );

        let mut report = SessionReport {
            trail: StateTrail::new(),
            opened: false,
            cancelled: false,
            commands_run: 0,
        };
        let mut staging = Envelope::new();
        let result = self.run(ctx, request, response, &mut staging, cancel, &mut report);
        report.trail.advance(SessionState::Closed);

        let written = match &result {
            Ok(()) => response
                .extend_from(&staging)
                .map(|_| ())
                .and_then(|()| response.set_ok()),
            Err(err) => {
                report.cancelled = err.is_cancelled();
                warn!(
                    request = %ctx.request,
                    backend = %ctx.backend,
                    error = %err,
                    "request failed"
                );
                response.set_error(&err.to_string())
            }
        };
        if let Err(err) = written {
            warn!(error = %err, "failed to encode response");
            if response.status().is_none() {
                let _ = response.set_error("Server : Couldn't encode response");
            }
        }

        debug!(
            request = %ctx.request,
            opened = report.opened,
            commands = report.commands_run,
            "request finished"
        );
        report
    }

    /// Everything up to and including the session close. The trail is left in
    /// `SUCCESS` or `FAILED`.
    fn run(
        &self,
        ctx: &RequestContext,
        request: &Envelope,
        response: &mut Envelope,
        staging: &mut Envelope,
        cancel: &CancelToken,
        report: &mut SessionReport,
    ) -> Result<(), SessionError> {
        let prepared = self.prepare(ctx, request);
        let (handler, backend, command) = match prepared {
            Ok(prepared) => prepared,
            Err(err) => {
                report.trail.advance(SessionState::Failed);
                return Err(err);
            }
        };

        report.trail.advance(SessionState::Opening);
        let options = OpenOptions { tid: ctx.tid };
        let session = match backend.open(&self.config.device, &options, cancel) {
            Ok(session) => session,
            Err(err) => {
                report.trail.advance(SessionState::Failed);
                return Err(err.into());
            }
        };
        report.opened = true;
        report.trail.advance(SessionState::Ready);

        let mut guard = SessionGuard::new(session);
        let result = response
            .append_string(MB_DEVICE, &guard.session().device_display())
            .map_err(SessionError::from)
            .and_then(|_| {
                let mut hctx = HandlerContext::new(
                    guard.session(),
                    backend.timeouts(),
                    cancel,
                    &mut report.trail,
                );
                let outcome = handler.invoke(&mut hctx, &command);
                report.commands_run = hctx.commands_run();
                let reply = outcome?;
                handler.extract_outputs(&reply, staging)
            });

        report.trail.advance(match result {
            Ok(()) => SessionState::Success,
            Err(_) => SessionState::Failed,
        });
        guard.close();
        result
    }

    fn prepare(
        &self,
        ctx: &RequestContext,
        request: &Envelope,
    ) -> Result<(&dyn Handler, &dyn Backend, Command), SessionError> {
        if !device_accessible(&self.config.device) {
            debug!(device = %self.config.device.display(), "device not accessible");
            return Err(SessionError::Unavailable {
                backend: ctx.backend,
            });
        }

        let handler =
            self.registry
                .get(ctx.request, ctx.backend)
                .ok_or(SessionError::Unsupported {
                    request: ctx.request,
                    backend: ctx.backend,
                })?;
        let command = handler.validate_inputs(request)?;
        let backend = self
            .backends
            .get(&ctx.backend)
            .map(|backend| backend.as_ref())
            .ok_or(SessionError::NoBackend(ctx.backend))?;
        Ok((handler, backend, command))
    }
}

/// Closes the session exactly once, on the normal path or on unwind.
struct SessionGuard {
    session: Box<dyn Session>,
    closed: bool,
}

impl SessionGuard {
    fn new(session: Box<dyn Session>) -> Self {
        Self {
            session,
            closed: false,
        }
    }

    fn session(&mut self) -> &mut dyn Session {
        self.session.as_mut()
    }

    fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        if let Err(err) = self.session.close() {
            warn!(error = %err, "session close failed");
        }
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(unix)]
fn device_accessible(path: &Path) -> bool {
    use std::ffi::CString;
    use std::os::unix::ffi::OsStrExt;

    let Ok(c_path) = CString::new(path.as_os_str().as_bytes()) else {
        return false;
    };
    // SAFETY: `c_path` is a valid NUL-terminated string for the call's duration.
    unsafe { libc::access(c_path.as_ptr(), libc::R_OK) == 0 }
}

#[cfg(not(unix))]
fn device_accessible(path: &Path) -> bool {
    path.exists()
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    use mbgate_envelope::tags::*;
    use mbgate_envelope::{Field, PinStatus, Status};

    use super::*;
    use crate::command::Timeouts;
    use crate::error::BackendError;
    use crate::reply::{keys, Reply};

    #[derive(Default)]
    struct Calls {
        opens: AtomicUsize,
        invokes: AtomicUsize,
        closes: AtomicUsize,
        active: AtomicUsize,
        max_active: AtomicUsize,
    }

    /// Backend double answering every command with a fixed reply.
    struct FakeBackend {
        kind: BackendKind,
        reply: Reply,
        failure: Option<String>,
        delay: Duration,
        calls: Arc<Calls>,
    }

    impl FakeBackend {
        fn new(kind: BackendKind, reply: Reply) -> (Self, Arc<Calls>) {
            let calls = Arc::new(Calls::default());
            let backend = Self {
                kind,
                reply,
                failure: None,
                delay: Duration::ZERO,
                calls: Arc::clone(&calls),
            };
            (backend, calls)
        }
    }

    struct FakeSession {
        reply: Reply,
        failure: Option<String>,
        delay: Duration,
        calls: Arc<Calls>,
    }

    impl Backend for FakeBackend {
        fn kind(&self) -> BackendKind {
            self.kind
        }

        fn timeouts(&self) -> Timeouts {
            Timeouts::for_backend(self.kind)
        }

        fn open(
            &self,
            _device: &Path,
            _options: &OpenOptions,
            _cancel: &CancelToken,
        ) -> Result<Box<dyn Session>, BackendError> {
            self.calls.opens.fetch_add(1, Ordering::SeqCst);
            let active = self.calls.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.calls.max_active.fetch_max(active, Ordering::SeqCst);
            Ok(Box::new(FakeSession {
                reply: self.reply.clone(),
                failure: self.failure.clone(),
                delay: self.delay,
                calls: Arc::clone(&self.calls),
            }))
        }
    }

    impl Session for FakeSession {
        fn device_display(&self) -> String {
            "/dev/fake0".into()
        }

        fn invoke(
            &mut self,
            _command: &Command,
            _timeout: Duration,
            cancel: &CancelToken,
        ) -> Result<Reply, BackendError> {
            self.calls.invokes.fetch_add(1, Ordering::SeqCst);
            if cancel.wait(self.delay) {
                return Err(BackendError::Cancelled);
            }
            match &self.failure {
                Some(message) => Err(BackendError::Failed(message.clone())),
                None => Ok(self.reply.clone()),
            }
        }

        fn close(&mut self) -> Result<(), BackendError> {
            self.calls.closes.fetch_add(1, Ordering::SeqCst);
            self.calls.active.fetch_sub(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn readable_device() -> ControllerConfig {
        ControllerConfig {
            device: std::env::temp_dir(),
        }
    }

    fn context(request: RequestType, backend: BackendKind) -> RequestContext {
        RequestContext {
            request,
            backend,
            tid: 0,
        }
    }

    fn unlocked() -> Reply {
        Reply::new()
            .with_text(keys::PIN_TYPE, "pin1")
            .with_text(keys::PIN_STATE, "unlocked")
    }

    #[test]
    fn pin_status_happy_path() {
        let (backend, calls) = FakeBackend::new(BackendKind::Mbim, unlocked());
        let controller = SessionController::new(readable_device()).with_backend(backend);

        let mut response = Envelope::new();
        let report = controller.perform(
            &context(RequestType::PinStatus, BackendKind::Mbim),
            &Envelope::new(),
            &mut response,
            &CancelToken::new(),
        );

        assert!(response.is_valid());
        assert_eq!(response.status(), Some(Status::Ok));
        assert_eq!(
            response.get_uint(MB_PIN_STATUS),
            Some(PinStatus::Unlocked.as_u32())
        );
        assert_eq!(response.get_string(MB_DEVICE), Some("/dev/fake0"));
        assert_eq!(
            report.trail.states(),
            &[
                SessionState::Idle,
                SessionState::Opening,
                SessionState::Ready,
                SessionState::CommandInFlight,
                SessionState::Success,
                SessionState::Closed,
            ]
        );
        assert_eq!(calls.opens.load(Ordering::SeqCst), 1);
        assert_eq!(calls.closes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn missing_apn_opens_nothing() {
        let (backend, calls) = FakeBackend::new(BackendKind::Mbim, Reply::new());
        let controller = SessionController::new(readable_device()).with_backend(backend);

        let mut response = Envelope::new();
        let report = controller.perform(
            &context(RequestType::Connect, BackendKind::Mbim),
            &Envelope::new(),
            &mut response,
            &CancelToken::new(),
        );

        assert_eq!(response.status(), Some(Status::Error));
        assert_eq!(
            response.error_message(),
            Some("You must provide an APN (MB_APN)")
        );
        assert!(!report.opened);
        assert_eq!(calls.opens.load(Ordering::SeqCst), 0);
        assert_eq!(
            report.trail.states(),
            &[SessionState::Idle, SessionState::Failed, SessionState::Closed]
        );
    }

    #[test]
    fn unsupported_pair_is_rejected() {
        let (backend, calls) = FakeBackend::new(BackendKind::Qmi, Reply::new());
        let controller = SessionController::new(readable_device()).with_backend(backend);

        let mut response = Envelope::new();
        controller.perform(
            &context(RequestType::DeviceCaps, BackendKind::Qmi),
            &Envelope::new(),
            &mut response,
            &CancelToken::new(),
        );

        assert_eq!(response.error_message(), Some("Unsupported request"));
        assert_eq!(calls.opens.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn unavailable_device_opens_nothing() {
        let (backend, calls) = FakeBackend::new(BackendKind::Qmi, unlocked());
        let controller = SessionController::new(ControllerConfig {
            device: PathBuf::from("/nonexistent/cdc-wdm0"),
        })
        .with_backend(backend);

        let mut response = Envelope::new();
        let report = controller.perform(
            &context(RequestType::PinStatus, BackendKind::Qmi),
            &Envelope::new(),
            &mut response,
            &CancelToken::new(),
        );

        assert_eq!(response.error_message(), Some("No qmi device file"));
        assert!(!report.opened);
        assert_eq!(calls.opens.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn backend_failure_still_closes() {
        let (mut backend, calls) = FakeBackend::new(BackendKind::Mbim, Reply::new());
        backend.failure = Some("Failure".into());
        let controller = SessionController::new(readable_device()).with_backend(backend);

        let mut response = Envelope::new();
        let report = controller.perform(
            &context(RequestType::Signal, BackendKind::Mbim),
            &Envelope::new(),
            &mut response,
            &CancelToken::new(),
        );

        assert_eq!(response.error_message(), Some("Failure"));
        assert!(response.get_uint(MB_SIGNAL_RSSI).is_none());
        assert!(report.trail.visited(SessionState::Failed));
        assert_eq!(report.trail.current(), SessionState::Closed);
        assert_eq!(calls.closes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn backend_error_with_nul_still_reports_status() {
        let (mut backend, _calls) = FakeBackend::new(BackendKind::Mbim, Reply::new());
        backend.failure = Some("modem said \0 garbage".into());
        let controller = SessionController::new(readable_device()).with_backend(backend);

        let mut response = Envelope::new();
        controller.perform(
            &context(RequestType::Signal, BackendKind::Mbim),
            &Envelope::new(),
            &mut response,
            &CancelToken::new(),
        );

        assert!(response.is_valid());
        assert_eq!(response.status(), Some(Status::Error));
        assert_eq!(response.error_message(), Some("modem said   garbage"));
        let tags: Vec<_> = response.fields().map(|f| f.tag).collect();
        assert_eq!(tags, vec![MB_DEVICE, MB_ERROR, MB_RESPONSE]);
    }

    #[test]
    fn outputs_precede_status() {
        let reply = Reply::new()
            .with_text(keys::IPV4_ADDRESS, "10.0.0.2/30")
            .with_text(keys::IPV4_ADDRESS, "10.0.0.6/30");
        let (backend, _calls) = FakeBackend::new(BackendKind::Mbim, reply);
        let controller = SessionController::new(readable_device()).with_backend(backend);

        let mut response = Envelope::new();
        controller.perform(
            &context(RequestType::Ip, BackendKind::Mbim),
            &Envelope::new(),
            &mut response,
            &CancelToken::new(),
        );

        let tags: Vec<_> = response.fields().map(|field| field.tag).collect();
        assert_eq!(tags.first(), Some(&MB_DEVICE));
        assert_eq!(tags.last(), Some(&MB_RESPONSE));
        let addresses: Vec<&str> = response.strings(MB_IPV4_ADDR).collect();
        assert_eq!(addresses, vec!["10.0.0.2/30", "10.0.0.6/30"]);
    }

    #[test]
    fn pin_enter_skips_entry_when_unlocked() {
        let (backend, calls) = FakeBackend::new(BackendKind::Mbim, unlocked());
        let controller = SessionController::new(readable_device()).with_backend(backend);

        let request = Envelope::from_fields(&[Field::string(MB_PIN_CODE, "1234")]).unwrap();
        let mut response = Envelope::new();
        let report = controller.perform(
            &context(RequestType::PinEnter, BackendKind::Mbim),
            &request,
            &mut response,
            &CancelToken::new(),
        );

        assert!(response.is_ok());
        assert_eq!(report.commands_run, 1);
        assert_eq!(calls.invokes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn pin_enter_runs_both_commands_when_locked() {
        let locked = Reply::new()
            .with_text(keys::PIN_TYPE, "pin1")
            .with_text(keys::PIN_STATE, "locked");
        let (backend, _calls) = FakeBackend::new(BackendKind::Mbim, locked);
        let controller = SessionController::new(readable_device()).with_backend(backend);

        let request = Envelope::from_fields(&[Field::string(MB_PIN_CODE, "1234")]).unwrap();
        let mut response = Envelope::new();
        let report = controller.perform(
            &context(RequestType::PinEnter, BackendKind::Mbim),
            &request,
            &mut response,
            &CancelToken::new(),
        );

        assert_eq!(report.commands_run, 2);
        assert_eq!(
            report
                .trail
                .states()
                .iter()
                .filter(|state| **state == SessionState::CommandInFlight)
                .count(),
            2
        );
    }

    #[test]
    fn cancellation_closes_and_reports() {
        let (mut backend, calls) = FakeBackend::new(BackendKind::Mbim, unlocked());
        backend.delay = Duration::from_secs(10);
        let controller = SessionController::new(readable_device()).with_backend(backend);

        let cancel = CancelToken::new();
        let trigger = cancel.clone();
        let canceller = thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            trigger.cancel();
        });

        let mut response = Envelope::new();
        let report = controller.perform(
            &context(RequestType::Status, BackendKind::Mbim),
            &Envelope::new(),
            &mut response,
            &cancel,
        );
        canceller.join().unwrap();

        assert!(report.cancelled);
        assert_eq!(response.error_message(), Some("Operation cancelled"));
        assert_eq!(report.trail.current(), SessionState::Closed);
        assert_eq!(calls.closes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn requests_are_single_flight() {
        let (mut backend, calls) = FakeBackend::new(BackendKind::Mbim, unlocked());
        backend.delay = Duration::from_millis(100);
        let controller =
            Arc::new(SessionController::new(readable_device()).with_backend(backend));

        let workers: Vec<_> = (0..2)
            .map(|_| {
                let controller = Arc::clone(&controller);
                thread::spawn(move || {
                    let mut response = Envelope::new();
                    controller.perform(
                        &context(RequestType::PinStatus, BackendKind::Mbim),
                        &Envelope::new(),
                        &mut response,
                        &CancelToken::new(),
                    );
                    response.is_ok()
                })
            })
            .collect();

        for worker in workers {
            assert!(worker.join().unwrap());
        }
        assert_eq!(calls.opens.load(Ordering::SeqCst), 2);
        assert_eq!(calls.max_active.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn missing_backend_is_reported() {
        let controller = SessionController::new(readable_device());
        let mut response = Envelope::new();
        controller.perform(
            &context(RequestType::PinStatus, BackendKind::Qmi),
            &Envelope::new(),
            &mut response,
            &CancelToken::new(),
        );
        assert_eq!(response.status(), Some(Status::Error));
    }
}
