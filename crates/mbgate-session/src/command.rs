use std::fmt;
use std::time::Duration;

use mbgate_envelope::{AuthProtocol, BackendKind};

/// One backend command. Handlers map a request to one (occasionally two)
/// of these.
#[derive(Clone, PartialEq, Eq)]
pub enum Command {
    PinQuery,
    PinEnter {
        pin: String,
    },
    SubscriberStatus,
    RegistrationState,
    /// QMI view of registration and packet service.
    ServingSystem,
    PacketServiceAttach,
    PacketServiceQuery,
    Connect {
        apn: String,
        username: Option<String>,
        password: Option<String>,
        auth: AuthProtocol,
    },
    IpConfiguration,
    ConnectionStatus,
    DeviceCaps,
    SignalQuery,
    /// Switch the QMI data path to raw-ip.
    SetRawIp,
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Command::PinQuery => "pin-query",
            Command::PinEnter { .. } => "pin-enter",
            Command::SubscriberStatus => "subscriber-status",
            Command::RegistrationState => "registration-state",
            Command::ServingSystem => "serving-system",
            Command::PacketServiceAttach => "packet-service-attach",
            Command::PacketServiceQuery => "packet-service-query",
            Command::Connect { .. } => "connect",
            Command::IpConfiguration => "ip-configuration",
            Command::ConnectionStatus => "connection-status",
            Command::DeviceCaps => "device-caps",
            Command::SignalQuery => "signal-query",
            Command::SetRawIp => "set-raw-ip",
        }
    }

    pub fn class(&self) -> CommandClass {
        match self {
            Command::PacketServiceAttach | Command::Connect { .. } => CommandClass::Network,
            Command::IpConfiguration => CommandClass::Configuration,
            _ => CommandClass::Query,
        }
    }
}

// Secrets stay out of logs.
impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::PinEnter { .. } => f
                .debug_struct("PinEnter")
                .field("pin", &"<redacted>")
                .finish(),
            Command::Connect {
                apn,
                username,
                password,
                auth,
            } => f
                .debug_struct("Connect")
                .field("apn", apn)
                .field("username", username)
                .field("password", &password.as_ref().map(|_| "<redacted>"))
                .field("auth", auth)
                .finish(),
            other => f.write_str(other.name()),
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Timeout class of a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandClass {
    /// Opening the device.
    Open,
    /// Status queries and PIN entry.
    Query,
    /// IP configuration readout.
    Configuration,
    /// Network attach and connect.
    Network,
}

/// Per-class timeouts for one backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    pub open: Duration,
    pub query: Duration,
    pub configuration: Duration,
    pub network: Duration,
}

impl Timeouts {
    pub const MBIM: Timeouts = Timeouts {
        open: Duration::from_secs(5),
        query: Duration::from_secs(40),
        configuration: Duration::from_secs(60),
        network: Duration::from_secs(120),
    };

    pub const QMI: Timeouts = Timeouts {
        open: Duration::from_secs(15),
        query: Duration::from_secs(10),
        configuration: Duration::from_secs(10),
        network: Duration::from_secs(180),
    };

    pub fn for_backend(kind: BackendKind) -> Self {
        match kind {
            BackendKind::Mbim => Self::MBIM,
            BackendKind::Qmi => Self::QMI,
        }
    }

    pub fn for_class(&self, class: CommandClass) -> Duration {
        match class {
            CommandClass::Open => self.open,
            CommandClass::Query => self.query,
            CommandClass::Configuration => self.configuration,
            CommandClass::Network => self.network,
        }
    }
}
