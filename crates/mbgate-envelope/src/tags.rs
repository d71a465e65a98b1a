//! The mbgate field vocabulary.
//!
//! Ids are grouped by request family; gaps between groups are reserved.

use crate::tag::{DataType, Tag};

macro_rules! vocabulary {
    ($( $(#[$meta:meta])* $name:ident = ($id:expr, $ty:ident); )*) => {
        $(
            $(#[$meta])*
            pub const $name: Tag = Tag::new($id, DataType::$ty);
        )*

        /// Every known tag with its name, in id order.
        pub const ALL: &[(Tag, &str)] = &[$(($name, stringify!($name)),)*];
    };
}

vocabulary! {
    /// Error message, present only when `MB_RESPONSE` is `Error`.
    MB_ERROR = (1, String);
    /// Request type, see [`crate::RequestType`].
    MB_REQUEST = (2, UInt);
    /// Response status, see [`crate::Status`].
    MB_RESPONSE = (3, UInt);
    /// Transaction id forwarded to the backend (default 0).
    MB_SESSION_TID = (4, UInt);
    MB_APN = (5, String);
    MB_USERNAME = (6, String);
    MB_PASSWORD = (7, String);
    /// See [`crate::AuthProtocol`].
    MB_AUTH = (8, UInt);
    /// Device path of the session that served the request.
    MB_DEVICE = (9, String);

    /// See [`crate::PinStatus`].
    MB_PIN_STATUS = (10, UInt);
    MB_PIN_CODE = (11, String);
    /// Backend selector, see [`crate::BackendKind`].
    MB_PROTOCOL = (12, UInt);

    MB_SUB_STATE = (20, String);
    MB_SUB_ID = (21, String);
    MB_SUB_SIM_ICCD = (22, String);
    MB_SUB_READY_INFO = (23, String);
    MB_SUB_TEL_NB = (24, UInt);
    /// Repeated, one per telephone number.
    MB_SUB_TEL_NUM = (25, String);

    /// See [`crate::RegisterState`] / [`crate::QmiRegisterState`].
    MB_REGISTER_STATE = (30, UInt);
    MB_REGISTER_NET_ERROR = (31, String);
    MB_REGISTER_STATE_STR = (32, String);
    MB_REGISTER_MODE = (33, String);
    MB_REGISTER_DATA_CLASS = (34, String);
    MB_REGISTER_CLASS = (35, String);
    MB_REGISTER_PROVIDER_ID = (36, String);
    MB_REGISTER_PROVIDER_NAME = (37, String);
    MB_REGISTER_ROAMING = (38, String);
    MB_REGISTER_FLAGS = (39, String);

    MB_ATTACH_NET_ERROR = (50, String);
    MB_ATTACH_PCK_SERVICE_STATE = (51, String);
    MB_ATTACH_DATA_CLASS = (52, String);
    MB_ATTACH_UP_SPEED = (53, UInt);
    MB_ATTACH_DOWN_SPEED = (54, UInt);
    MB_ATTACH_UP_SPEED_STR = (55, String);
    MB_ATTACH_DOWN_SPEED_STR = (56, String);

    /// See [`crate::ActivationState`].
    MB_STATE_ACTIVATION = (60, UInt);
    MB_STATE_ACTIVATION_STR = (61, String);
    MB_STATE_SESSION_ID = (62, UInt);
    MB_STATE_VOICE_CALL_STATE = (63, String);
    MB_STATE_IP_TYPE = (64, String);
    MB_STATE_CONTEXT_TYPE = (65, String);
    MB_STATE_NETWORK_ERROR = (66, String);

    MB_IPV4_NB = (70, UInt);
    MB_IPV6_NB = (71, UInt);
    MB_IPV4_GW = (72, String);
    MB_IPV6_GW = (73, String);
    /// Repeated, one CIDR string per address.
    MB_IPV4_ADDR = (74, String);
    /// Repeated, one CIDR string per address.
    MB_IPV6_ADDR = (75, String);

    MB_DEV_TYPE = (80, String);
    MB_DEV_CELL_CLASS = (81, String);
    MB_DEV_VOICE_CLASS = (82, String);
    MB_DEV_SIM_CLASS = (83, String);
    MB_DEV_DATA_CLASS = (84, String);
    MB_DEV_SMS_CAPS = (85, String);
    MB_DEV_CTRL_CAPS = (86, String);
    MB_DEV_MAX_SESSION = (87, UInt);
    MB_DEV_CUST_DATA_CLASS = (88, String);
    MB_DEV_ID = (89, String);
    MB_DEV_FMW_INFO = (90, String);
    MB_DEV_HW_INFO = (91, String);

    MB_SIGNAL_RSSI = (100, UInt);
    MB_SIGNAL_ERROR_RATE = (101, UInt);
    MB_SIGNAL_RSCP = (102, UInt);
    MB_SIGNAL_ECNO = (103, UInt);
    MB_SIGNAL_RSRQ = (104, UInt);
    MB_SIGNAL_RSRP = (105, UInt);
    MB_SIGNAL_RSSNR = (106, UInt);
}

/// Name of a known tag.
pub fn name(tag: Tag) -> Option<&'static str> {
    ALL.iter().find(|(known, _)| *known == tag).map(|(_, name)| *name)
}

/// Look up a tag by name. Accepts the name with or without the `MB_` prefix,
/// in any case.
pub fn by_name(name: &str) -> Option<Tag> {
    let upper = name.trim().to_ascii_uppercase();
    let wanted = upper.strip_prefix("MB_").unwrap_or(upper.as_str());
    ALL.iter()
        .find(|(_, known)| known.strip_prefix("MB_") == Some(wanted))
        .map(|(tag, _)| *tag)
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn tags_are_unique() {
        let raw: HashSet<u32> = ALL.iter().map(|(tag, _)| tag.raw()).collect();
        assert_eq!(raw.len(), ALL.len());
    }

    #[test]
    fn ids_match_wire_values() {
        assert_eq!(MB_ERROR.raw(), 0x0103);
        assert_eq!(MB_REQUEST.raw(), 0x0202);
        assert_eq!(MB_PROTOCOL.raw(), 0x0c02);
        assert_eq!(MB_IPV6_ADDR.raw(), (75 << 8) | 3);
        assert_eq!(MB_SIGNAL_RSSNR.raw(), (106 << 8) | 2);
    }

    #[test]
    fn lookup_by_name() {
        assert_eq!(by_name("MB_APN"), Some(MB_APN));
        assert_eq!(by_name("ipv4_addr"), Some(MB_IPV4_ADDR));
        assert_eq!(by_name("nope"), None);
        assert_eq!(name(MB_SUB_TEL_NUM), Some("MB_SUB_TEL_NUM"));
    }
}
