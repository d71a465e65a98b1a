//! Enumerations carried in UInt fields.

use std::fmt;
use std::str::FromStr;

/// Error returned when parsing an enum from its name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind} '{value}' (expected one of: {expected})")]
pub struct ParseEnumError {
    pub kind: &'static str,
    pub value: String,
    pub expected: String,
}

macro_rules! wire_enum {
    (
        $(#[$meta:meta])*
        $name:ident, $kind:literal {
            $( $(#[$vmeta:meta])* $variant:ident = $value:literal => $text:literal, )*
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum $name {
            $( $(#[$vmeta])* $variant, )*
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant,)*];

            pub fn from_u32(value: u32) -> Option<Self> {
                match value {
                    $( $value => Some($name::$variant), )*
                    _ => None,
                }
            }

            pub fn as_u32(self) -> u32 {
                match self {
                    $( $name::$variant => $value, )*
                }
            }

            pub fn as_str(self) -> &'static str {
                match self {
                    $( $name::$variant => $text, )*
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = ParseEnumError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let lowered = s.trim().to_ascii_lowercase();
                Self::ALL
                    .iter()
                    .copied()
                    .find(|v| v.as_str() == lowered)
                    .ok_or_else(|| ParseEnumError {
                        kind: $kind,
                        value: s.to_string(),
                        expected: Self::ALL
                            .iter()
                            .map(|v| v.as_str())
                            .collect::<Vec<_>>()
                            .join(", "),
                    })
            }
        }
    };
}

wire_enum! {
    /// Request type carried in `MB_REQUEST`.
    RequestType, "request type" {
        PinStatus = 0 => "pin-status",
        PinEnter = 1 => "pin-enter",
        Subscriber = 2 => "subscriber",
        Register = 3 => "register",
        Attach = 4 => "attach",
        Connect = 5 => "connect",
        Ip = 6 => "ip",
        Status = 7 => "status",
        DeviceCaps = 8 => "device-caps",
        PacketService = 9 => "packet-service",
        Signal = 10 => "signal",
    }
}

wire_enum! {
    /// Backend selector carried in `MB_PROTOCOL`.
    BackendKind, "backend" {
        Mbim = 0 => "mbim",
        Qmi = 1 => "qmi",
    }
}

wire_enum! {
    /// Response status carried in `MB_RESPONSE`.
    Status, "status" {
        Ok = 0 => "ok",
        Error = 1 => "error",
    }
}

wire_enum! {
    PinStatus, "pin status" {
        Unlocked = 0 => "unlocked",
        Locked = 1 => "locked",
    }
}

wire_enum! {
    AuthProtocol, "auth protocol" {
        None = 0 => "none",
        Pap = 1 => "pap",
        Chap = 2 => "chap",
        MsChapV2 = 3 => "mschapv2",
    }
}

wire_enum! {
    /// Registration state reported by MBIM backends.
    RegisterState, "register state" {
        Unknown = 0 => "unknown",
        Deregistered = 1 => "deregistered",
        Searching = 2 => "searching",
        Home = 3 => "home",
        Roaming = 4 => "roaming",
        Partner = 5 => "partner",
        Denied = 6 => "denied",
    }
}

wire_enum! {
    /// Registration state reported by QMI backends (different numbering).
    QmiRegisterState, "qmi register state" {
        NotRegistered = 0 => "not-registered",
        Registered = 1 => "registered",
        Searching = 2 => "searching",
        Denied = 3 => "registration-denied",
        Unknown = 4 => "unknown",
    }
}

wire_enum! {
    ActivationState, "activation state" {
        Unknown = 0 => "unknown",
        Activated = 1 => "activated",
        Activating = 2 => "activating",
        Deactivated = 3 => "deactivated",
        Deactivating = 4 => "deactivating",
    }
}
