use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Subcommand};
use mbgate_envelope::{AuthProtocol, BackendKind, RequestType};

use crate::exit::{CliError, CliResult, USAGE};
use crate::output::OutputFormat;

pub mod doctor;
pub mod request;
pub mod serve;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the gateway until SIGINT/SIGTERM.
    Serve(ServeArgs),
    /// Send one request and print the response.
    Request(RequestArgs),
    /// Run local environment health checks.
    Doctor(DoctorArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Serve(args) => serve::run(args),
        Command::Request(args) => request::run(args, format),
        Command::Doctor(args) => doctor::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Socket path to bind.
    #[arg(long, env = "MBGATE_SOCKET", default_value = mbgate_router::DEFAULT_SOCKET_PATH)]
    pub socket: PathBuf,
    /// Modem control device.
    #[arg(long, env = "MBGATE_DEVICE", default_value = mbgate_session::DEFAULT_DEVICE)]
    pub device: PathBuf,
    /// MBIM control tool.
    #[arg(long, env = "MBGATE_MBIM_TOOL", default_value = "mbimcli")]
    pub mbim_tool: PathBuf,
    /// QMI control tool.
    #[arg(long, env = "MBGATE_QMI_TOOL", default_value = "qmicli")]
    pub qmi_tool: PathBuf,
    /// Bind attempts after the first failure.
    #[arg(long, default_value = "3")]
    pub bind_retries: u32,
    /// Base delay between bind attempts (e.g. 200ms, 1s).
    #[arg(long, default_value = "200ms")]
    pub bind_delay: String,
    /// Pause between receive polls when nothing is ready (e.g. 100ms).
    #[arg(long, default_value = "100ms")]
    pub poll_interval: String,
}

#[derive(Args, Debug)]
pub struct RequestArgs {
    /// Request type (pin-status, pin-enter, subscriber, register, attach,
    /// connect, ip, status, device-caps, packet-service, signal).
    pub request: RequestType,
    /// Socket path to connect to.
    #[arg(long, env = "MBGATE_SOCKET", default_value = mbgate_router::DEFAULT_SOCKET_PATH)]
    pub socket: PathBuf,
    /// Backend to use.
    #[arg(long, default_value = "mbim")]
    pub backend: BackendKind,
    /// Transaction id (0 = none).
    #[arg(long, default_value = "0")]
    pub tid: u32,
    /// Access point name (connect).
    #[arg(long)]
    pub apn: Option<String>,
    /// Username (connect).
    #[arg(long)]
    pub username: Option<String>,
    /// Password (connect).
    #[arg(long)]
    pub password: Option<String>,
    /// Authentication protocol (connect).
    #[arg(long)]
    pub auth: Option<AuthProtocol>,
    /// SIM PIN code (pin-enter).
    #[arg(long)]
    pub pin: Option<String>,
    /// How long to wait for the response (e.g. 10s, 500ms).
    #[arg(long, default_value = "10s")]
    pub timeout: String,
}

#[derive(Args, Debug, Default)]
pub struct DoctorArgs {
    /// Modem control device to check.
    #[arg(long, env = "MBGATE_DEVICE", default_value = mbgate_session::DEFAULT_DEVICE)]
    pub device: PathBuf,
    /// Socket path whose directory must be writable.
    #[arg(long, env = "MBGATE_SOCKET", default_value = mbgate_router::DEFAULT_SOCKET_PATH)]
    pub socket: PathBuf,
    /// MBIM control tool.
    #[arg(long, env = "MBGATE_MBIM_TOOL", default_value = "mbimcli")]
    pub mbim_tool: PathBuf,
    /// QMI control tool.
    #[arg(long, env = "MBGATE_QMI_TOOL", default_value = "qmicli")]
    pub qmi_tool: PathBuf,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

/// Parse `500ms`, `2s` or a bare number of seconds.
pub fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, millis) = if let Some(num) = input.strip_suffix("ms") {
        (num, true)
    } else if let Some(num) = input.strip_suffix('s') {
        (num, false)
    } else {
        (input, false)
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;
    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    Ok(if millis {
        Duration::from_millis(value)
    } else {
        Duration::from_secs(value)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_duration_seconds_and_millis() {
        assert_eq!(parse_duration("2s").unwrap(), Duration::from_secs(2));
        assert_eq!(parse_duration("150ms").unwrap(), Duration::from_millis(150));
        assert_eq!(parse_duration("3").unwrap(), Duration::from_secs(3));
    }

    #[test]
    fn parse_duration_rejects_invalid_values() {
        assert!(parse_duration("0s").is_err());
        assert!(parse_duration("bad").is_err());
        assert!(parse_duration("").is_err());
    }
}
