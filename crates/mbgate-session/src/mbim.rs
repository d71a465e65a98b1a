//! MBIM backend driven by `mbimcli`.

use std::path::Path;

use mbgate_envelope::{AuthProtocol, BackendKind};

use crate::backend::OpenOptions;
use crate::command::Command;
use crate::error::BackendError;
use crate::reply::keys;
use crate::tool::{LabelRule, ToolBackend, ToolDialect};

pub type MbimBackend = ToolBackend<Mbim>;

/// `mbimcli` command spelling and output labels.
pub struct Mbim;

const SECTIONS: &[(&str, &str)] = &[
    ("ipv4configurationavailable", "ipv4"),
    ("ipv6configurationavailable", "ipv6"),
];

const RULES: &[LabelRule] = &[
    LabelRule::any("pintype", keys::PIN_TYPE),
    LabelRule::any("pinstate", keys::PIN_STATE),
    LabelRule::any("remainingattempts", keys::REMAINING_ATTEMPTS),
    LabelRule::any("readystate", keys::READY_STATE),
    LabelRule::any("subscriberid", keys::SUBSCRIBER_ID),
    LabelRule::any("simiccid", keys::SIM_ICCID),
    LabelRule::any("readyinfo", keys::READY_INFO),
    LabelRule::any("telephonenumbers", keys::TELEPHONE_NUMBERS),
    LabelRule::any("networkerror", keys::NETWORK_ERROR),
    LabelRule::any("registerstate", keys::REGISTER_STATE),
    LabelRule::any("registermode", keys::REGISTER_MODE),
    LabelRule::any("availabledataclasses", keys::DATA_CLASS),
    LabelRule::any("highestavailabledataclass", keys::DATA_CLASS),
    LabelRule::any("currentcellularclass", keys::CELLULAR_CLASS),
    LabelRule::any("providerid", keys::PROVIDER_ID),
    LabelRule::any("providername", keys::PROVIDER_NAME),
    LabelRule::any("roamingtext", keys::ROAMING_TEXT),
    LabelRule::any("registrationflags", keys::REGISTRATION_FLAGS),
    LabelRule::any("packetservicestate", keys::PACKET_SERVICE_STATE),
    LabelRule::any("uplinkspeed", keys::UPLINK_SPEED),
    LabelRule::any("downlinkspeed", keys::DOWNLINK_SPEED),
    LabelRule::any("sessionid", keys::SESSION_ID),
    LabelRule::any("activationstate", keys::ACTIVATION_STATE),
    LabelRule::any("voicecallstate", keys::VOICE_CALL_STATE),
    LabelRule::any("iptype", keys::IP_TYPE),
    LabelRule::any("contexttype", keys::CONTEXT_TYPE),
    LabelRule::within("ipv4", "ip", keys::IPV4_ADDRESS),
    LabelRule::within("ipv4", "gateway", keys::IPV4_GATEWAY),
    LabelRule::within("ipv6", "ip", keys::IPV6_ADDRESS),
    LabelRule::within("ipv6", "gateway", keys::IPV6_GATEWAY),
    LabelRule::any("devicetype", keys::DEVICE_TYPE),
    LabelRule::any("cellularclass", keys::CELLULAR_CLASS),
    LabelRule::any("voiceclass", keys::VOICE_CLASS),
    LabelRule::any("simclass", keys::SIM_CLASS),
    LabelRule::any("dataclass", keys::DATA_CLASS),
    LabelRule::any("smscaps", keys::SMS_CAPS),
    LabelRule::any("controlcaps", keys::CONTROL_CAPS),
    LabelRule::any("maxsessions", keys::MAX_SESSIONS),
    LabelRule::any("customdataclass", keys::CUSTOM_DATA_CLASS),
    LabelRule::any("deviceid", keys::DEVICE_ID),
    LabelRule::any("firmwareinfo", keys::FIRMWARE_INFO),
    LabelRule::any("hardwareinfo", keys::HARDWARE_INFO),
    LabelRule::any("rssi", keys::RSSI),
    LabelRule::any("errorrate", keys::ERROR_RATE),
    LabelRule::any("ber", keys::ERROR_RATE),
    LabelRule::any("rscp", keys::RSCP),
    LabelRule::any("ecno", keys::ECNO),
    LabelRule::any("rsrq", keys::RSRQ),
    LabelRule::any("rsrp", keys::RSRP),
    LabelRule::any("rssnr", keys::RSSNR),
];

// mbimcli takes the password (and `--enter-pin` the PIN) only on its command
// line, so both are readable through /proc/<pid>/cmdline while it runs.
fn connect_arg(
    apn: &str,
    username: Option<&str>,
    password: Option<&str>,
    auth: AuthProtocol,
) -> String {
    let mut parts = vec![format!("apn='{apn}'")];
    let auth = match auth {
        AuthProtocol::None => None,
        AuthProtocol::Pap => Some("PAP"),
        AuthProtocol::Chap => Some("CHAP"),
        AuthProtocol::MsChapV2 => Some("MSCHAPV2"),
    };
    if let Some(auth) = auth {
        parts.push(format!("auth='{auth}'"));
    }
    if let Some(username) = username {
        parts.push(format!("username='{username}'"));
    }
    if let Some(password) = password {
        parts.push(format!("password='{password}'"));
    }
    format!("--connect={}", parts.join(","))
}

impl ToolDialect for Mbim {
    const KIND: BackendKind = BackendKind::Mbim;
    const DEFAULT_PROGRAM: &'static str = "mbimcli";

    fn session_args(device: &Path, options: &OpenOptions) -> Vec<String> {
        let mut args = vec!["-d".to_string(), device.display().to_string(), "-p".to_string()];
        if options.tid != 0 {
            args.push(format!("--no-open={}", options.tid));
            args.push("--no-close".to_string());
        }
        args
    }

    fn command_args(command: &Command) -> Result<Vec<String>, BackendError> {
        let arg = match command {
            Command::PinQuery => "--query-pin-state".to_string(),
            Command::PinEnter { pin } => format!("--enter-pin={pin}"),
            Command::SubscriberStatus => "--query-subscriber-ready-status".to_string(),
            Command::RegistrationState => "--query-registration-state".to_string(),
            Command::PacketServiceAttach => "--attach-packet-service".to_string(),
            Command::PacketServiceQuery => "--query-packet-service-state".to_string(),
            Command::Connect {
                apn,
                username,
                password,
                auth,
            } => connect_arg(apn, username.as_deref(), password.as_deref(), *auth),
            Command::IpConfiguration => "--query-ip-configuration".to_string(),
            Command::ConnectionStatus => "--query-connection-state".to_string(),
            Command::DeviceCaps => "--query-device-caps".to_string(),
            Command::SignalQuery => "--atds-query-signal".to_string(),
            Command::ServingSystem | Command::SetRawIp => {
                return Err(BackendError::Unsupported(command.name()))
            }
        };
        Ok(vec![arg])
    }

    fn sections() -> &'static [(&'static str, &'static str)] {
        SECTIONS
    }

    fn rules() -> &'static [LabelRule] {
        RULES
    }
}
