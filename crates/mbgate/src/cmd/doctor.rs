use std::path::Path;

use serde::Serialize;

use crate::cmd::DoctorArgs;
use crate::exit::{CliResult, HEALTH_CHECK_FAILED, SUCCESS};
use crate::output::OutputFormat;

#[derive(Clone, Copy, Debug, Serialize)]
#[serde(rename_all = "lowercase")]
enum CheckStatus {
    Pass,
    Fail,
    Skip,
}

#[derive(Debug, Serialize)]
struct CheckResult {
    name: String,
    status: CheckStatus,
    detail: String,
}

#[derive(Debug, Serialize)]
struct DoctorOutput {
    schema_id: &'static str,
    checks: Vec<CheckResult>,
    overall: &'static str,
}

pub fn run(args: DoctorArgs, format: OutputFormat) -> CliResult<i32> {
    let checks = vec![
        device_readable_check(&args.device),
        tool_check("mbim_tool", &args.mbim_tool),
        tool_check("qmi_tool", &args.qmi_tool),
        socket_dir_check(&args.socket),
    ];

    let has_fail = checks.iter().any(|c| matches!(c.status, CheckStatus::Fail));
    let overall = if has_fail { "fail" } else { "pass" };

    let output = DoctorOutput {
        schema_id: "https://schemas.3leaps.dev/mbgate/cli/v1/doctor-report.schema.json",
        checks,
        overall,
    };

    print_doctor(&output, format);

    if has_fail {
        Ok(HEALTH_CHECK_FAILED)
    } else {
        Ok(SUCCESS)
    }
}

fn print_doctor(output: &DoctorOutput, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::to_string(output).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table | OutputFormat::Pretty => {
            println!("mbgate doctor\n");
            for c in &output.checks {
                println!(
                    "  [{:>4}] {:<16} {}",
                    status_text(c.status),
                    c.name,
                    c.detail
                );
            }
            if output.overall == "pass" {
                println!("\n  Result: all checks passed");
            } else {
                println!("\n  Result: one or more checks failed");
            }
        }
        OutputFormat::Raw => {
            println!("{}", output.overall);
        }
    }
}

fn status_text(status: CheckStatus) -> &'static str {
    match status {
        CheckStatus::Pass => "PASS",
        CheckStatus::Fail => "FAIL",
        CheckStatus::Skip => "SKIP",
    }
}

fn device_readable_check(device: &Path) -> CheckResult {
    let (status, detail) = match std::fs::File::open(device) {
        Ok(_) => (CheckStatus::Pass, format!("{} is readable", device.display())),
        Err(err) => (CheckStatus::Fail, format!("{}: {err}", device.display())),
    };
    CheckResult {
        name: "device".to_string(),
        status,
        detail,
    }
}

/// Resolve `program` the way `Command::new` would: as given when it has a
/// path separator, otherwise through `PATH`.
fn find_program(program: &Path) -> Option<std::path::PathBuf> {
    if program.components().count() > 1 {
        return program.is_file().then(|| program.to_path_buf());
    }
    let paths = std::env::var_os("PATH")?;
    std::env::split_paths(&paths)
        .map(|dir| dir.join(program))
        .find(|candidate| candidate.is_file())
}

fn tool_check(name: &str, program: &Path) -> CheckResult {
    match find_program(program) {
        Some(found) => CheckResult {
            name: name.to_string(),
            status: CheckStatus::Pass,
            detail: found.display().to_string(),
        },
        None => CheckResult {
            name: name.to_string(),
            status: CheckStatus::Fail,
            detail: format!("{} not found", program.display()),
        },
    }
}

fn socket_dir_check(socket: &Path) -> CheckResult {
    #[cfg(unix)]
    {
        use mbgate_transport::UnixDomainSocket;

        let dir = match socket.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => std::path::PathBuf::from("."),
        };
        let probe = dir.join(format!(".mbgate-doctor-{}.sock", std::process::id()));
        match UnixDomainSocket::bind(&probe) {
            Ok(_) => CheckResult {
                name: "socket_dir".to_string(),
                status: CheckStatus::Pass,
                detail: format!("{} accepts sockets", dir.display()),
            },
            Err(err) => CheckResult {
                name: "socket_dir".to_string(),
                status: CheckStatus::Fail,
                detail: format!("{}: {err}", dir.display()),
            },
        }
    }

    #[cfg(not(unix))]
    {
        CheckResult {
            name: "socket_dir".to_string(),
            status: CheckStatus::Skip,
            detail: format!("{}: unix sockets unavailable", socket.display()),
        }
    }
}
