mod cmd;
mod exit;
mod logging;
mod output;

use clap::Parser;

use crate::cmd::Command;
use crate::logging::{init_logging, LogFormat, LogLevel};
use crate::output::OutputFormat;

#[derive(Parser, Debug)]
#[command(name = "mbgate", version, about = "Local IPC gateway for MBIM and QMI modems")]
struct Cli {
    /// Output format.
    #[arg(long, value_name = "FORMAT", global = true)]
    format: Option<OutputFormat>,

    /// Log output format (stderr).
    #[arg(long, value_name = "FORMAT", default_value = "text", global = true)]
    log_format: LogFormat,

    /// Minimum log level (stderr).
    #[arg(long, value_name = "LEVEL", default_value = "info", global = true)]
    log_level: LogLevel,

    #[command(subcommand)]
    command: Command,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.log_format, cli.log_level);

    let format = cli.format.unwrap_or_else(OutputFormat::default_for_stdout);
    let result = cmd::run(cli.command, format);

    match result {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("error: {err}");
            std::process::exit(err.code);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mbgate_envelope::{AuthProtocol, BackendKind, RequestType};

    #[test]
    fn parses_connect_request() {
        let cli = Cli::try_parse_from([
            "mbgate",
            "request",
            "connect",
            "--backend",
            "qmi",
            "--apn",
            "internet",
            "--auth",
            "chap",
        ])
        .expect("request args should parse");

        match cli.command {
            Command::Request(args) => {
                assert_eq!(args.request, RequestType::Connect);
                assert_eq!(args.backend, BackendKind::Qmi);
                assert_eq!(args.apn.as_deref(), Some("internet"));
                assert_eq!(args.auth, Some(AuthProtocol::Chap));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn rejects_unknown_request_type() {
        let err = Cli::try_parse_from(["mbgate", "request", "reboot"])
            .expect_err("unknown request type should fail");
        assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation);
    }

    #[test]
    fn parses_serve_subcommand() {
        let cli = Cli::try_parse_from([
            "mbgate",
            "serve",
            "--socket",
            "/tmp/test.sock",
            "--bind-retries",
            "5",
        ])
        .expect("serve args should parse");
        match cli.command {
            Command::Serve(args) => assert_eq!(args.bind_retries, 5),
            other => panic!("unexpected command: {other:?}"),
        }
    }
}
