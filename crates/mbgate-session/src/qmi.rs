//! QMI backend driven by `qmicli`.

use std::path::Path;

use mbgate_envelope::{AuthProtocol, BackendKind};

use crate::backend::OpenOptions;
use crate::command::Command;
use crate::error::BackendError;
use crate::reply::keys;
use crate::tool::{LabelRule, ToolBackend, ToolDialect};

pub type QmiBackend = ToolBackend<Qmi>;

/// `qmicli` command spelling and output labels.
pub struct Qmi;

const RULES: &[LabelRule] = &[
    LabelRule::any("cardstate", keys::CARD_STATE),
    LabelRule::any("pin1state", keys::PIN_STATE),
    LabelRule::any("registrationstate", keys::REGISTER_STATE),
    LabelRule::any("ps", keys::PS_ATTACH_STATE),
    LabelRule::any("mcc", keys::MCC),
    LabelRule::any("mnc", keys::MNC),
    LabelRule::any("description", keys::PLMN_DESCRIPTION),
    LabelRule::any("ipv4address", keys::IPV4_ADDRESS),
    LabelRule::any("ipv4subnetmask", keys::IPV4_SUBNET_MASK),
    LabelRule::any("ipv4gatewayaddress", keys::IPV4_GATEWAY),
    LabelRule::any("ipv6address", keys::IPV6_ADDRESS),
    LabelRule::any("ipv6gatewayaddress", keys::IPV6_GATEWAY),
    LabelRule::any("connectionstatus", keys::CONNECTION_STATUS),
    LabelRule::any("rssi", keys::RSSI),
    LabelRule::any("rsrq", keys::RSRQ),
    LabelRule::any("rsrp", keys::RSRP),
    LabelRule::any("snr", keys::RSSNR),
];

// qmicli takes the password (and `--uim-verify-pin` the PIN) only on its
// command line, so both are readable through /proc/<pid>/cmdline while it runs.
fn start_network_arg(
    apn: &str,
    username: Option<&str>,
    password: Option<&str>,
    auth: AuthProtocol,
) -> String {
    let mut parts = vec![format!("apn={apn}")];
    let auth = match auth {
        AuthProtocol::None => None,
        AuthProtocol::Pap => Some("PAP"),
        AuthProtocol::Chap | AuthProtocol::MsChapV2 => Some("CHAP"),
    };
    if let Some(auth) = auth {
        parts.push(format!("auth={auth}"));
    }
    if let Some(username) = username {
        parts.push(format!("username={username}"));
    }
    if let Some(password) = password {
        parts.push(format!("password={password}"));
    }
    format!("--wds-start-network={}", parts.join(","))
}

impl ToolDialect for Qmi {
    const KIND: BackendKind = BackendKind::Qmi;
    const DEFAULT_PROGRAM: &'static str = "qmicli";

    fn session_args(device: &Path, _options: &OpenOptions) -> Vec<String> {
        vec!["-d".to_string(), device.display().to_string(), "-p".to_string()]
    }

    fn command_args(command: &Command) -> Result<Vec<String>, BackendError> {
        let args = match command {
            Command::PinQuery => vec!["--uim-get-card-status".to_string()],
            Command::PinEnter { pin } => vec![format!("--uim-verify-pin=PIN1,{pin}")],
            Command::ServingSystem => vec!["--nas-get-serving-system".to_string()],
            Command::SetRawIp => vec!["--set-expected-data-format=raw-ip".to_string()],
            Command::Connect {
                apn,
                username,
                password,
                auth,
            } => vec![
                start_network_arg(apn, username.as_deref(), password.as_deref(), *auth),
                "--client-no-release-cid".to_string(),
            ],
            Command::IpConfiguration => vec!["--wds-get-current-settings".to_string()],
            Command::ConnectionStatus => vec!["--wds-get-packet-service-status".to_string()],
            Command::SignalQuery => vec!["--nas-get-signal-info".to_string()],
            Command::SubscriberStatus
            | Command::RegistrationState
            | Command::PacketServiceAttach
            | Command::PacketServiceQuery
            | Command::DeviceCaps => return Err(BackendError::Unsupported(command.name())),
        };
        Ok(args)
    }

    fn sections() -> &'static [(&'static str, &'static str)] {
        &[]
    }

    fn rules() -> &'static [LabelRule] {
        RULES
    }
}
