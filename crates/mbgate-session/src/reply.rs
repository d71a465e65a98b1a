//! Backend results as an ordered multimap of canonical keys.

/// Canonical result keys shared by every backend.
pub mod keys {
    pub const PIN_TYPE: &str = "pin_type";
    pub const PIN_STATE: &str = "pin_state";
    pub const REMAINING_ATTEMPTS: &str = "remaining_attempts";
    pub const CARD_STATE: &str = "card_state";

    pub const READY_STATE: &str = "ready_state";
    pub const SUBSCRIBER_ID: &str = "subscriber_id";
    pub const SIM_ICCID: &str = "sim_iccid";
    pub const READY_INFO: &str = "ready_info";
    pub const TELEPHONE_NUMBERS: &str = "telephone_numbers";

    pub const NETWORK_ERROR: &str = "network_error";
    pub const REGISTER_STATE: &str = "register_state";
    pub const REGISTER_MODE: &str = "register_mode";
    pub const DATA_CLASS: &str = "data_class";
    pub const CELLULAR_CLASS: &str = "cellular_class";
    pub const PROVIDER_ID: &str = "provider_id";
    pub const PROVIDER_NAME: &str = "provider_name";
    pub const ROAMING_TEXT: &str = "roaming_text";
    pub const REGISTRATION_FLAGS: &str = "registration_flags";
    pub const PS_ATTACH_STATE: &str = "ps_attach_state";
    pub const MCC: &str = "mcc";
    pub const MNC: &str = "mnc";
    pub const PLMN_DESCRIPTION: &str = "plmn_description";

    pub const PACKET_SERVICE_STATE: &str = "packet_service_state";
    pub const UPLINK_SPEED: &str = "uplink_speed";
    pub const DOWNLINK_SPEED: &str = "downlink_speed";

    pub const SESSION_ID: &str = "session_id";
    pub const ACTIVATION_STATE: &str = "activation_state";
    pub const VOICE_CALL_STATE: &str = "voice_call_state";
    pub const IP_TYPE: &str = "ip_type";
    pub const CONTEXT_TYPE: &str = "context_type";
    pub const CONNECTION_STATUS: &str = "connection_status";

    pub const IPV4_ADDRESS: &str = "ipv4_address";
    pub const IPV4_SUBNET_MASK: &str = "ipv4_subnet_mask";
    pub const IPV4_GATEWAY: &str = "ipv4_gateway";
    pub const IPV6_ADDRESS: &str = "ipv6_address";
    pub const IPV6_GATEWAY: &str = "ipv6_gateway";

    pub const DEVICE_TYPE: &str = "device_type";
    pub const VOICE_CLASS: &str = "voice_class";
    pub const SIM_CLASS: &str = "sim_class";
    pub const SMS_CAPS: &str = "sms_caps";
    pub const CONTROL_CAPS: &str = "control_caps";
    pub const MAX_SESSIONS: &str = "max_sessions";
    pub const CUSTOM_DATA_CLASS: &str = "custom_data_class";
    pub const DEVICE_ID: &str = "device_id";
    pub const FIRMWARE_INFO: &str = "firmware_info";
    pub const HARDWARE_INFO: &str = "hardware_info";

    pub const RSSI: &str = "rssi";
    pub const ERROR_RATE: &str = "error_rate";
    pub const RSCP: &str = "rscp";
    pub const ECNO: &str = "ecno";
    pub const RSRQ: &str = "rsrq";
    pub const RSRP: &str = "rsrp";
    pub const RSSNR: &str = "rssnr";
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplyValue {
    Text(String),
    UInt(u32),
}

/// Result data of one command. Keys may repeat; insertion order is kept.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Reply {
    entries: Vec<(String, ReplyValue)>,
}

impl Reply {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_text(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.entries
            .push((key.into(), ReplyValue::Text(value.into())));
    }

    pub fn push_uint(&mut self, key: impl Into<String>, value: u32) {
        self.entries.push((key.into(), ReplyValue::UInt(value)));
    }

    pub fn with_text(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.push_text(key, value);
        self
    }

    pub fn with_uint(mut self, key: impl Into<String>, value: u32) -> Self {
        self.push_uint(key, value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&ReplyValue> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, value)| value)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// First text value under `key`. Integer values are not converted.
    pub fn text(&self, key: &str) -> Option<&str> {
        match self.get(key)? {
            ReplyValue::Text(text) => Some(text),
            ReplyValue::UInt(_) => None,
        }
    }

    /// Every text value under `key`, in order.
    pub fn texts<'a>(&'a self, key: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.entries.iter().filter_map(move |(k, value)| match value {
            ReplyValue::Text(text) if k == key => Some(text.as_str()),
            _ => None,
        })
    }

    /// First value under `key` as an integer. Text values are read up to the
    /// first non-numeric character (`"-65 dBm"` is -65); negative numbers are
    /// carried as two's complement.
    pub fn uint(&self, key: &str) -> Option<u32> {
        match self.get(key)? {
            ReplyValue::UInt(value) => Some(*value),
            ReplyValue::Text(text) => parse_leading_int(text),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ReplyValue)> {
        self.entries.iter().map(|(k, value)| (k.as_str(), value))
    }
}

fn parse_leading_int(text: &str) -> Option<u32> {
    let text = text.trim();
    let end = text
        .char_indices()
        .find(|(i, c)| !(c.is_ascii_digit() || (*i == 0 && (*c == '-' || *c == '+'))))
        .map(|(i, _)| i)
        .unwrap_or(text.len());
    let value: i64 = text[..end].parse().ok()?;
    if value < i64::from(i32::MIN) || value > i64::from(u32::MAX) {
        return None;
    }
    Some(value as u32)
}
