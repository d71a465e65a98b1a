//! Running the vendor control tools and reading their `label: 'value'` output.

use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, Command as Process, Stdio};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::{debug, trace, warn};

use mbgate_envelope::BackendKind;

use crate::backend::{Backend, OpenOptions, Session};
use crate::cancel::CancelToken;
use crate::command::{Command, Timeouts};
use crate::error::BackendError;
use crate::reply::Reply;

const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Captured result of one tool invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolOutput {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
}

impl ToolOutput {
    /// The tool's own error text: the last non-empty stderr line, or stdout
    /// if stderr was silent.
    pub fn error_message(&self) -> String {
        let pick = |text: &str| {
            text.lines()
                .rev()
                .map(str::trim)
                .find(|line| !line.is_empty())
                .map(|line| line.trim_start_matches("error:").trim().to_string())
        };
        pick(&self.stderr)
            .or_else(|| pick(&self.stdout))
            .unwrap_or_else(|| "command failed".to_string())
    }
}

/// Launches one control tool binary.
#[derive(Debug, Clone)]
pub struct ToolRunner {
    program: PathBuf,
}

impl ToolRunner {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Run the tool with `args`, killing it when `timeout` expires or
    /// `cancel` fires.
    pub fn run(
        &self,
        args: &[String],
        timeout: Duration,
        cancel: &CancelToken,
    ) -> Result<ToolOutput, BackendError> {
        if cancel.is_cancelled() {
            return Err(BackendError::Cancelled);
        }

        debug!(
            program = %self.program.display(),
            args = args.len(),
            "spawning tool"
        );
        let mut child = Process::new(&self.program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| BackendError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        let stdout = capture(child.stdout.take());
        let stderr = capture(child.stderr.take());

        let started = Instant::now();
        let status = loop {
            match child.try_wait() {
                Ok(Some(status)) => break status,
                Ok(None) => {}
                Err(err) => {
                    terminate(&mut child);
                    return Err(BackendError::Io(err));
                }
            }
            if cancel.is_cancelled() {
                terminate(&mut child);
                return Err(BackendError::Cancelled);
            }
            if started.elapsed() >= timeout {
                warn!(
                    program = %self.program.display(),
                    timeout_ms = timeout.as_millis() as u64,
                    "tool timed out"
                );
                terminate(&mut child);
                return Err(BackendError::Timeout(timeout));
            }
            thread::sleep(POLL_INTERVAL);
        };

        let output = ToolOutput {
            success: status.success(),
            stdout: join_capture(stdout),
            stderr: join_capture(stderr),
        };
        trace!(status = ?status, stdout = %output.stdout, "tool finished");
        Ok(output)
    }
}

fn capture<R: Read + Send + 'static>(pipe: Option<R>) -> Option<JoinHandle<String>> {
    pipe.map(|mut pipe| {
        thread::spawn(move || {
            let mut bytes = Vec::new();
            let _ = pipe.read_to_end(&mut bytes);
            String::from_utf8_lossy(&bytes).into_owned()
        })
    })
}

fn join_capture(handle: Option<JoinHandle<String>>) -> String {
    handle
        .and_then(|handle| handle.join().ok())
        .unwrap_or_default()
}

/// Open `device` for reading and close it again, giving up after `timeout`
/// or when `cancel` fires. The outer result carries timeout and
/// cancellation, the inner one the open itself.
fn probe_device(
    device: &Path,
    timeout: Duration,
    cancel: &CancelToken,
) -> Result<std::io::Result<()>, BackendError> {
    if cancel.is_cancelled() {
        return Err(BackendError::Cancelled);
    }

    let (tx, rx) = mpsc::channel();
    let path = device.to_path_buf();
    // A wedged character device can block `open` indefinitely; the probe
    // thread is left behind in that case.
    thread::spawn(move || {
        let _ = tx.send(File::open(&path).map(drop));
    });

    let started = Instant::now();
    loop {
        match rx.recv_timeout(POLL_INTERVAL) {
            Ok(result) => return Ok(result),
            Err(RecvTimeoutError::Disconnected) => {
                return Ok(Err(std::io::Error::other("device probe aborted")));
            }
            Err(RecvTimeoutError::Timeout) => {}
        }
        if cancel.is_cancelled() {
            return Err(BackendError::Cancelled);
        }
        if started.elapsed() >= timeout {
            warn!(
                device = %device.display(),
                timeout_ms = timeout.as_millis() as u64,
                "device open timed out"
            );
            return Err(BackendError::Timeout(timeout));
        }
    }
}

fn terminate(child: &mut Child) {
    let _ = child.kill();
    let _ = child.wait();
}

/// Maps one normalized tool label to a canonical reply key. A label with a
/// `section` only matches inside that section.
#[derive(Debug, Clone, Copy)]
pub struct LabelRule {
    pub section: Option<&'static str>,
    pub label: &'static str,
    pub key: &'static str,
}

impl LabelRule {
    pub const fn any(label: &'static str, key: &'static str) -> Self {
        Self {
            section: None,
            label,
            key,
        }
    }

    pub const fn within(section: &'static str, label: &'static str, key: &'static str) -> Self {
        Self {
            section: Some(section),
            label,
            key,
        }
    }
}

/// Lowercase, bracketed qualifiers removed, only ASCII alphanumerics kept:
/// `"IPv4 address [0]"` becomes `"ipv4address"`.
pub fn normalize_label(label: &str) -> String {
    let mut out = String::with_capacity(label.len());
    let mut depth = 0usize;
    for c in label.chars() {
        match c {
            '[' | '(' => depth += 1,
            ']' | ')' => depth = depth.saturating_sub(1),
            c if depth == 0 && c.is_ascii_alphanumeric() => out.push(c.to_ascii_lowercase()),
            _ => {}
        }
    }
    out
}

fn unquote(value: &str) -> &str {
    let value = value.trim();
    match (value.find('\''), value.rfind('\'')) {
        (Some(first), Some(last)) if last > first => &value[first + 1..last],
        _ => value,
    }
}

/// Parse tool output into a [`Reply`] using `rules`.
///
/// Lines look like `Label: 'value'` (or unquoted). A line whose normalized
/// label matches one of `sections` opens that section until the next marker.
pub fn parse_labels(output: &str, sections: &[(&str, &'static str)], rules: &[LabelRule]) -> Reply {
    let mut reply = Reply::new();
    let mut section: Option<&'static str> = None;

    for line in output.lines() {
        let Some((label, value)) = line.split_once(':') else {
            continue;
        };
        let label = normalize_label(label);
        if label.is_empty() {
            continue;
        }
        if let Some((_, name)) = sections.iter().find(|(marker, _)| *marker == label) {
            section = Some(*name);
            continue;
        }

        let value = unquote(value);
        if value.is_empty() {
            continue;
        }

        let rule = rules.iter().find(|rule| {
            rule.label == label && rule.section.is_none_or(|wanted| section == Some(wanted))
        });
        if let Some(rule) = rule {
            reply.push_text(rule.key, value);
        }
    }
    reply
}

/// How one control tool spells commands and labels its output.
pub trait ToolDialect: Send + Sync + 'static {
    const KIND: BackendKind;
    const DEFAULT_PROGRAM: &'static str;

    /// Arguments selecting the device and session, placed before the command.
    fn session_args(device: &Path, options: &OpenOptions) -> Vec<String>;

    /// Command-specific arguments. These end up in the tool's argv and are
    /// never logged.
    fn command_args(command: &Command) -> Result<Vec<String>, BackendError>;

    /// Section markers as (normalized label, section name).
    fn sections() -> &'static [(&'static str, &'static str)];

    fn rules() -> &'static [LabelRule];
}

/// [`Backend`] that drives a control tool subprocess per command.
pub struct ToolBackend<D> {
    runner: ToolRunner,
    timeouts: Timeouts,
    _dialect: std::marker::PhantomData<fn() -> D>,
}

impl<D: ToolDialect> ToolBackend<D> {
    /// Backend using the tool found on `PATH`.
    pub fn new() -> Self {
        Self::with_program(D::DEFAULT_PROGRAM)
    }

    pub fn with_program(program: impl Into<PathBuf>) -> Self {
        Self {
            runner: ToolRunner::new(program),
            timeouts: Timeouts::for_backend(D::KIND),
            _dialect: std::marker::PhantomData,
        }
    }

    pub fn with_timeouts(mut self, timeouts: Timeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    pub fn program(&self) -> &Path {
        self.runner.program()
    }
}

impl<D: ToolDialect> Default for ToolBackend<D> {
    fn default() -> Self {
        Self::new()
    }
}

impl<D: ToolDialect> Backend for ToolBackend<D> {
    fn kind(&self) -> BackendKind {
        D::KIND
    }

    fn timeouts(&self) -> Timeouts {
        self.timeouts
    }

    fn open(
        &self,
        device: &Path,
        options: &OpenOptions,
        cancel: &CancelToken,
    ) -> Result<Box<dyn Session>, BackendError> {
        let open_error = |reason: String| BackendError::Open {
            device: device.to_path_buf(),
            reason,
        };

        probe_device(device, self.timeouts.open, cancel)?
            .map_err(|err| open_error(err.to_string()))?;

        debug!(
            backend = %D::KIND,
            device = %device.display(),
            tid = options.tid,
            "session opened"
        );
        Ok(Box::new(ToolSession::<D> {
            runner: self.runner.clone(),
            device: device.to_path_buf(),
            prefix: D::session_args(device, options),
            closed: false,
            _dialect: std::marker::PhantomData,
        }))
    }
}

struct ToolSession<D> {
    runner: ToolRunner,
    device: PathBuf,
    prefix: Vec<String>,
    closed: bool,
    _dialect: std::marker::PhantomData<fn() -> D>,
}

impl<D: ToolDialect> Session for ToolSession<D> {
    fn device_display(&self) -> String {
        self.device.display().to_string()
    }

    fn invoke(
        &mut self,
        command: &Command,
        timeout: Duration,
        cancel: &CancelToken,
    ) -> Result<Reply, BackendError> {
        if self.closed {
            return Err(BackendError::Failed("session closed".into()));
        }

        let mut args = self.prefix.clone();
        args.extend(D::command_args(command)?);
        debug!(backend = %D::KIND, command = ?command, "running tool command");
        let output = self.runner.run(&args, timeout, cancel)?;
        if !output.success {
            return Err(BackendError::Failed(output.error_message()));
        }
        Ok(parse_labels(&output.stdout, D::sections(), D::rules()))
    }

    fn close(&mut self) -> Result<(), BackendError> {
        if !self.closed {
            self.closed = true;
            debug!(backend = %D::KIND, device = %self.device.display(), "session closed");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RULES: &[LabelRule] = &[
        LabelRule::any("state", "state"),
        LabelRule::within("ipv4", "ip", "ipv4.ip"),
        LabelRule::within("ipv6", "ip", "ipv6.ip"),
    ];
    const SECTIONS: &[(&str, &str)] = &[
        ("ipv4configurationavailable", "ipv4"),
        ("ipv6configurationavailable", "ipv6"),
    ];

    #[test]
    fn normalizes_labels() {
        assert_eq!(normalize_label("  IPv4 address [0]"), "ipv4address");
        assert_eq!(normalize_label("PIN1 state"), "pin1state");
        assert_eq!(normalize_label("Error rate (BER)"), "errorrate");
    }

    #[test]
    fn unquotes_values() {
        assert_eq!(unquote(" 'home'"), "home");
        assert_eq!(unquote(" 'it's here'"), "it's here");
        assert_eq!(unquote(" 42"), "42");
        assert_eq!(unquote(" ''"), "");
    }

    #[test]
    fn section_scoped_labels() {
        let output = "\
[/dev/cdc-wdm0] IPv4 configuration available: 'address, gateway'
     IP [0]: '10.0.0.2/30'
[/dev/cdc-wdm0] IPv6 configuration available: 'address'
     IP [0]: '2001:db8::2/64'
State: 'ok'
";
        let reply = parse_labels(output, SECTIONS, RULES);
        assert_eq!(reply.text("ipv4.ip"), Some("10.0.0.2/30"));
        assert_eq!(reply.text("ipv6.ip"), Some("2001:db8::2/64"));
        assert_eq!(reply.text("state"), Some("ok"));
    }

    #[test]
    fn error_message_prefers_stderr() {
        let output = ToolOutput {
            success: false,
            stdout: "partial\n".into(),
            stderr: "error: couldn't open the MbimDevice: timed out\n\n".into(),
        };
        assert_eq!(
            output.error_message(),
            "couldn't open the MbimDevice: timed out"
        );
    }

    #[cfg(unix)]
    #[test]
    fn run_captures_output() {
        let runner = ToolRunner::new("sh");
        let output = runner
            .run(
                &["-c".into(), "echo 'State: up'; echo oops >&2; exit 3".into()],
                Duration::from_secs(5),
                &CancelToken::new(),
            )
            .unwrap();
        assert!(!output.success);
        assert_eq!(output.stdout.trim(), "State: up");
        assert_eq!(output.error_message(), "oops");
    }

    #[cfg(unix)]
    #[test]
    fn run_kills_on_timeout() {
        let runner = ToolRunner::new("sleep");
        let started = Instant::now();
        let err = runner
            .run(&["5".into()], Duration::from_millis(100), &CancelToken::new())
            .unwrap_err();
        assert!(matches!(err, BackendError::Timeout(_)));
        assert!(started.elapsed() < Duration::from_secs(4));
    }

    #[cfg(unix)]
    #[test]
    fn run_honours_cancellation() {
        let runner = ToolRunner::new("sleep");
        let cancel = CancelToken::new();
        let trigger = cancel.clone();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            trigger.cancel();
        });
        let err = runner
            .run(&["5".into()], Duration::from_secs(10), &cancel)
            .unwrap_err();
        handle.join().unwrap();
        assert!(matches!(err, BackendError::Cancelled));
    }

    /// Dialect whose "tool" is a shell script echoing canned output.
    struct Scripted;

    impl ToolDialect for Scripted {
        const KIND: BackendKind = BackendKind::Mbim;
        const DEFAULT_PROGRAM: &'static str = "sh";

        fn session_args(_device: &Path, _options: &OpenOptions) -> Vec<String> {
            vec!["-c".into()]
        }

        fn command_args(command: &Command) -> Result<Vec<String>, BackendError> {
            match command {
                Command::PinQuery => Ok(vec!["echo \"State: 'unlocked'\"".into()]),
                Command::SignalQuery => Ok(vec!["echo 'device busy' >&2; exit 1".into()]),
                _ => Err(BackendError::Unsupported(command.name())),
            }
        }

        fn sections() -> &'static [(&'static str, &'static str)] {
            SECTIONS
        }

        fn rules() -> &'static [LabelRule] {
            RULES
        }
    }

    #[cfg(unix)]
    #[test]
    fn tool_session_lifecycle() {
        let backend = ToolBackend::<Scripted>::new();
        let cancel = CancelToken::new();
        let mut session = backend
            .open(Path::new("/"), &OpenOptions::default(), &cancel)
            .unwrap();
        assert_eq!(session.device_display(), "/");

        let reply = session
            .invoke(&Command::PinQuery, Duration::from_secs(5), &cancel)
            .unwrap();
        assert_eq!(reply.text("state"), Some("unlocked"));

        let err = session
            .invoke(&Command::SignalQuery, Duration::from_secs(5), &cancel)
            .unwrap_err();
        assert_eq!(err.to_string(), "device busy");

        session.close().unwrap();
        session.close().unwrap();
        assert!(session
            .invoke(&Command::PinQuery, Duration::from_secs(5), &cancel)
            .is_err());
    }

    #[test]
    fn open_rejects_missing_device() {
        let backend = ToolBackend::<Scripted>::new();
        let err = backend
            .open(
                Path::new("/nonexistent/cdc-wdm9"),
                &OpenOptions::default(),
                &CancelToken::new(),
            )
            .err()
            .unwrap();
        assert!(matches!(err, BackendError::Open { .. }));
    }

    /// A FIFO with no writer: opening it for reading blocks.
    #[cfg(unix)]
    fn blocking_device(tag: &str) -> PathBuf {
        use std::os::unix::ffi::OsStrExt;

        let dir = std::env::temp_dir().join(format!(
            "mbgs-{tag}-{}-{}",
            std::process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap()
                .as_nanos()
        ));
        std::fs::create_dir_all(&dir).unwrap();
        let fifo = dir.join("cdc-wdm0");
        let c_path = std::ffi::CString::new(fifo.as_os_str().as_bytes()).unwrap();
        // SAFETY: `c_path` is a valid NUL-terminated path.
        assert_eq!(unsafe { libc::mkfifo(c_path.as_ptr(), 0o600) }, 0);
        fifo
    }

    /// Let the probe thread's pending open complete, then remove the FIFO.
    #[cfg(unix)]
    fn release_device(fifo: &Path) {
        use std::os::unix::fs::OpenOptionsExt;

        let _ = std::fs::OpenOptions::new()
            .write(true)
            .custom_flags(libc::O_NONBLOCK)
            .open(fifo);
        if let Some(dir) = fifo.parent() {
            let _ = std::fs::remove_dir_all(dir);
        }
    }

    #[cfg(unix)]
    #[test]
    fn open_gives_up_after_open_timeout() {
        let fifo = blocking_device("open-timeout");
        let backend = ToolBackend::<Scripted>::new().with_timeouts(Timeouts {
            open: Duration::from_millis(100),
            ..Timeouts::MBIM
        });

        let started = Instant::now();
        let err = backend
            .open(&fifo, &OpenOptions::default(), &CancelToken::new())
            .err()
            .unwrap();
        assert!(matches!(err, BackendError::Timeout(t) if t == Duration::from_millis(100)));
        assert!(started.elapsed() < Duration::from_secs(3));

        release_device(&fifo);
    }

    #[cfg(unix)]
    #[test]
    fn open_honours_cancellation() {
        let fifo = blocking_device("open-cancel");
        let backend = ToolBackend::<Scripted>::new();
        let cancel = CancelToken::new();
        let trigger = cancel.clone();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            trigger.cancel();
        });

        let err = backend
            .open(&fifo, &OpenOptions::default(), &cancel)
            .err()
            .unwrap();
        handle.join().unwrap();
        assert!(matches!(err, BackendError::Cancelled));

        release_device(&fifo);
    }

    #[test]
    fn missing_program_is_spawn_error() {
        let runner = ToolRunner::new("/nonexistent/mbgate-tool");
        let err = runner
            .run(&[], Duration::from_secs(1), &CancelToken::new())
            .unwrap_err();
        assert!(matches!(err, BackendError::Spawn { .. }));
    }
}
