//! Built-in request handlers.

use std::net::Ipv4Addr;

use mbgate_envelope::tags::*;
use mbgate_envelope::{
    ActivationState, AuthProtocol, BackendKind, Envelope, PinStatus as PinLock,
    QmiRegisterState, RegisterState, Tag,
};
use tracing::{debug, warn};

use crate::command::Command;
use crate::error::{BackendError, FieldError, SessionError};
use crate::handler::{Handler, HandlerContext};
use crate::reply::{keys, Reply};

const UNKNOWN: &str = "unknown";

fn required_string(request: &Envelope, tag: Tag, what: &'static str) -> Result<String, FieldError> {
    request
        .get_string(tag)
        .map(str::to_string)
        .ok_or(FieldError::Missing {
            what,
            tag: tag.name().unwrap_or("?"),
        })
}

fn optional_string(request: &Envelope, tag: Tag) -> Option<String> {
    request
        .get_string(tag)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

fn text_or_unknown<'a>(reply: &'a Reply, key: &str) -> &'a str {
    match reply.text(key) {
        Some(text) if !text.is_empty() => text,
        _ => UNKNOWN,
    }
}

fn put_text(
    response: &mut Envelope,
    tag: Tag,
    reply: &Reply,
    key: &str,
) -> Result<(), SessionError> {
    response.append_string(tag, text_or_unknown(reply, key))?;
    Ok(())
}

fn put_uint(
    response: &mut Envelope,
    tag: Tag,
    reply: &Reply,
    key: &str,
) -> Result<(), SessionError> {
    response.append_uint(tag, reply.uint(key).unwrap_or(0))?;
    Ok(())
}

/// Decide the PIN lock state from a PIN query reply.
fn classify_pin(backend: BackendKind, reply: &Reply) -> Result<PinLock, SessionError> {
    let Some(state) = reply.text(keys::PIN_STATE) else {
        return Err(match backend {
            BackendKind::Qmi => match reply.text(keys::CARD_STATE) {
                Some(card) if card != "absent" => SessionError::rejected("No card app"),
                _ => SessionError::rejected("No card found"),
            },
            BackendKind::Mbim => BackendError::Parse("missing PIN state".into()).into(),
        });
    };

    let state = state.to_ascii_lowercase();
    let pin_type = reply
        .text(keys::PIN_TYPE)
        .unwrap_or("pin1")
        .to_ascii_lowercase();

    if matches!(state.as_str(), "unlocked" | "disabled" | "enabled-verified") || pin_type == "pin2"
    {
        return Ok(PinLock::Unlocked);
    }
    if pin_type == "pin1" && matches!(state.as_str(), "locked" | "enabled-not-verified") {
        return Ok(PinLock::Locked);
    }
    Err(SessionError::rejected("Only PIN1 is supported"))
}

pub struct PinStatus {
    pub backend: BackendKind,
}

impl Handler for PinStatus {
    fn validate_inputs(&self, _request: &Envelope) -> Result<Command, FieldError> {
        Ok(Command::PinQuery)
    }

    fn extract_outputs(&self, reply: &Reply, response: &mut Envelope) -> Result<(), SessionError> {
        let status = classify_pin(self.backend, reply)?;
        response.append_uint(MB_PIN_STATUS, status.as_u32())?;
        Ok(())
    }
}

/// Query the lock state first; enter the PIN only when the SIM is locked.
pub struct PinEnter {
    pub backend: BackendKind,
}

impl Handler for PinEnter {
    fn validate_inputs(&self, request: &Envelope) -> Result<Command, FieldError> {
        let pin = required_string(request, MB_PIN_CODE, "a pin code")?;
        Ok(Command::PinEnter { pin })
    }

    fn invoke(
        &self,
        ctx: &mut HandlerContext<'_>,
        command: &Command,
    ) -> Result<Reply, SessionError> {
        let current = ctx.run(&Command::PinQuery)?;
        if classify_pin(self.backend, &current)? == PinLock::Unlocked {
            debug!("SIM already unlocked, not entering PIN");
            return Ok(current);
        }

        let entered = ctx.run(command).map_err(|err| match err {
            BackendError::Cancelled | BackendError::Timeout(_) => SessionError::Backend(err),
            other => {
                warn!(error = %other, "PIN entry failed");
                SessionError::rejected("Unlock SIM failed")
            }
        })?;

        Ok(Reply::new()
            .with_text(keys::PIN_TYPE, "pin1")
            .with_text(
                keys::PIN_STATE,
                entered.text(keys::PIN_STATE).unwrap_or("unlocked"),
            ))
    }

    fn extract_outputs(&self, reply: &Reply, response: &mut Envelope) -> Result<(), SessionError> {
        let status = classify_pin(self.backend, reply)?;
        response.append_uint(MB_PIN_STATUS, status.as_u32())?;
        Ok(())
    }
}

pub struct Subscriber;

impl Handler for Subscriber {
    fn validate_inputs(&self, _request: &Envelope) -> Result<Command, FieldError> {
        Ok(Command::SubscriberStatus)
    }

    fn extract_outputs(&self, reply: &Reply, response: &mut Envelope) -> Result<(), SessionError> {
        put_text(response, MB_SUB_STATE, reply, keys::READY_STATE)?;
        put_text(response, MB_SUB_ID, reply, keys::SUBSCRIBER_ID)?;
        put_text(response, MB_SUB_SIM_ICCD, reply, keys::SIM_ICCID)?;
        put_text(response, MB_SUB_READY_INFO, reply, keys::READY_INFO)?;

        let numbers: Vec<&str> = reply
            .texts(keys::TELEPHONE_NUMBERS)
            .flat_map(|list| list.split(','))
            .map(str::trim)
            .filter(|number| !number.is_empty() && *number != UNKNOWN)
            .collect();
        response.append_uint(MB_SUB_TEL_NB, numbers.len() as u32)?;
        for number in numbers {
            response.append_string(MB_SUB_TEL_NUM, number)?;
        }
        Ok(())
    }
}

fn serving_system_outputs(reply: &Reply, response: &mut Envelope) -> Result<(), SessionError> {
    let state = reply
        .text(keys::REGISTER_STATE)
        .and_then(|text| text.parse::<QmiRegisterState>().ok())
        .unwrap_or(QmiRegisterState::Unknown);
    response.append_uint(MB_REGISTER_STATE, state.as_u32())?;
    put_text(response, MB_REGISTER_STATE_STR, reply, keys::REGISTER_STATE)?;

    let attached = reply.text(keys::PS_ATTACH_STATE) == Some("attached");
    response.append_string(
        MB_ATTACH_PCK_SERVICE_STATE,
        if attached { "attached" } else { "detached" },
    )?;

    if let (Some(mcc), Some(mnc)) = (reply.text(keys::MCC), reply.text(keys::MNC)) {
        put_text(response, MB_REGISTER_PROVIDER_NAME, reply, keys::PLMN_DESCRIPTION)?;
        response.append_string(MB_REGISTER_PROVIDER_ID, &format!("{mcc}{mnc}"))?;
    }
    Ok(())
}

fn packet_service_outputs(reply: &Reply, response: &mut Envelope) -> Result<(), SessionError> {
    put_text(response, MB_ATTACH_NET_ERROR, reply, keys::NETWORK_ERROR)?;
    put_text(response, MB_ATTACH_PCK_SERVICE_STATE, reply, keys::PACKET_SERVICE_STATE)?;
    put_text(response, MB_ATTACH_DATA_CLASS, reply, keys::DATA_CLASS)?;
    put_text(response, MB_ATTACH_UP_SPEED_STR, reply, keys::UPLINK_SPEED)?;
    put_text(response, MB_ATTACH_DOWN_SPEED_STR, reply, keys::DOWNLINK_SPEED)?;
    put_uint(response, MB_ATTACH_UP_SPEED, reply, keys::UPLINK_SPEED)?;
    put_uint(response, MB_ATTACH_DOWN_SPEED, reply, keys::DOWNLINK_SPEED)?;
    Ok(())
}

pub struct Register {
    pub backend: BackendKind,
}

impl Handler for Register {
    fn validate_inputs(&self, _request: &Envelope) -> Result<Command, FieldError> {
        Ok(match self.backend {
            BackendKind::Mbim => Command::RegistrationState,
            BackendKind::Qmi => Command::ServingSystem,
        })
    }

    fn extract_outputs(&self, reply: &Reply, response: &mut Envelope) -> Result<(), SessionError> {
        if self.backend == BackendKind::Qmi {
            return serving_system_outputs(reply, response);
        }

        let state = reply
            .text(keys::REGISTER_STATE)
            .and_then(|text| text.parse::<RegisterState>().ok())
            .unwrap_or(RegisterState::Unknown);
        response.append_uint(MB_REGISTER_STATE, state.as_u32())?;
        put_text(response, MB_REGISTER_NET_ERROR, reply, keys::NETWORK_ERROR)?;
        put_text(response, MB_REGISTER_STATE_STR, reply, keys::REGISTER_STATE)?;
        put_text(response, MB_REGISTER_MODE, reply, keys::REGISTER_MODE)?;
        put_text(response, MB_REGISTER_DATA_CLASS, reply, keys::DATA_CLASS)?;
        put_text(response, MB_REGISTER_CLASS, reply, keys::CELLULAR_CLASS)?;
        put_text(response, MB_REGISTER_PROVIDER_ID, reply, keys::PROVIDER_ID)?;
        put_text(response, MB_REGISTER_PROVIDER_NAME, reply, keys::PROVIDER_NAME)?;
        put_text(response, MB_REGISTER_ROAMING, reply, keys::ROAMING_TEXT)?;
        put_text(response, MB_REGISTER_FLAGS, reply, keys::REGISTRATION_FLAGS)?;
        Ok(())
    }
}

/// MBIM attaches the packet service; QMI switches the data path to raw-ip.
pub struct Attach {
    pub backend: BackendKind,
}

impl Handler for Attach {
    fn validate_inputs(&self, _request: &Envelope) -> Result<Command, FieldError> {
        Ok(match self.backend {
            BackendKind::Mbim => Command::PacketServiceAttach,
            BackendKind::Qmi => Command::SetRawIp,
        })
    }

    fn extract_outputs(&self, reply: &Reply, response: &mut Envelope) -> Result<(), SessionError> {
        match self.backend {
            BackendKind::Mbim => packet_service_outputs(reply, response),
            BackendKind::Qmi => Ok(()),
        }
    }
}

pub struct PacketService {
    pub backend: BackendKind,
}

impl Handler for PacketService {
    fn validate_inputs(&self, _request: &Envelope) -> Result<Command, FieldError> {
        Ok(match self.backend {
            BackendKind::Mbim => Command::PacketServiceQuery,
            BackendKind::Qmi => Command::ServingSystem,
        })
    }

    fn extract_outputs(&self, reply: &Reply, response: &mut Envelope) -> Result<(), SessionError> {
        match self.backend {
            BackendKind::Mbim => packet_service_outputs(reply, response),
            BackendKind::Qmi => serving_system_outputs(reply, response),
        }
    }
}

pub struct Connect;

impl Handler for Connect {
    fn validate_inputs(&self, request: &Envelope) -> Result<Command, FieldError> {
        let apn = required_string(request, MB_APN, "an APN")?;
        let auth = request.get_uint(MB_AUTH).ok_or(FieldError::Missing {
            what: "a auth protocol",
            tag: "MB_AUTH",
        })?;
        let auth = AuthProtocol::from_u32(auth).ok_or(FieldError::Unknown {
            what: "auth protocol",
            value: auth,
        })?;

        Ok(Command::Connect {
            apn,
            username: optional_string(request, MB_USERNAME),
            password: optional_string(request, MB_PASSWORD),
            auth,
        })
    }

    fn extract_outputs(&self, _reply: &Reply, _response: &mut Envelope) -> Result<(), SessionError> {
        Ok(())
    }
}

fn prefix_len(mask: &str) -> Option<u32> {
    let mask: Ipv4Addr = mask.trim().parse().ok()?;
    Some(u32::from(mask).count_ones())
}

/// Address list in CIDR form. Bare IPv4 addresses take their prefix from
/// the subnet mask and are dropped when no usable mask was reported.
fn cidr_addresses<'a>(reply: &'a Reply, key: &'a str, mask: Option<u32>) -> Vec<String> {
    reply
        .texts(key)
        .filter_map(|address| {
            if address.contains('/') {
                Some(address.to_string())
            } else {
                match mask {
                    Some(prefix) if prefix > 0 => Some(format!("{address}/{prefix}")),
                    _ => None,
                }
            }
        })
        .collect()
}

pub struct IpConfig;

impl Handler for IpConfig {
    fn validate_inputs(&self, _request: &Envelope) -> Result<Command, FieldError> {
        Ok(Command::IpConfiguration)
    }

    fn extract_outputs(&self, reply: &Reply, response: &mut Envelope) -> Result<(), SessionError> {
        let mask = reply.text(keys::IPV4_SUBNET_MASK).and_then(prefix_len);
        let ipv4 = cidr_addresses(reply, keys::IPV4_ADDRESS, mask);
        let ipv6 = cidr_addresses(reply, keys::IPV6_ADDRESS, None);

        response.append_uint(MB_IPV4_NB, ipv4.len() as u32)?;
        response.append_uint(MB_IPV6_NB, ipv6.len() as u32)?;
        if let Some(gateway) = reply.text(keys::IPV4_GATEWAY) {
            response.append_string(MB_IPV4_GW, gateway)?;
        }
        if let Some(gateway) = reply.text(keys::IPV6_GATEWAY) {
            response.append_string(MB_IPV6_GW, gateway)?;
        }
        for address in &ipv4 {
            response.append_string(MB_IPV4_ADDR, address)?;
        }
        for address in &ipv6 {
            response.append_string(MB_IPV6_ADDR, address)?;
        }
        Ok(())
    }
}

pub struct Status {
    pub backend: BackendKind,
}

impl Handler for Status {
    fn validate_inputs(&self, _request: &Envelope) -> Result<Command, FieldError> {
        Ok(Command::ConnectionStatus)
    }

    fn extract_outputs(&self, reply: &Reply, response: &mut Envelope) -> Result<(), SessionError> {
        if self.backend == BackendKind::Qmi {
            let status = text_or_unknown(reply, keys::CONNECTION_STATUS);
            let activation = match status {
                "connected" => ActivationState::Activated,
                "authenticating" => ActivationState::Activating,
                "disconnected" => ActivationState::Deactivated,
                _ => ActivationState::Unknown,
            };
            response.append_uint(MB_STATE_ACTIVATION, activation.as_u32())?;
            response.append_string(MB_STATE_ACTIVATION_STR, status)?;
            return Ok(());
        }

        let activation = reply
            .text(keys::ACTIVATION_STATE)
            .and_then(|text| text.parse::<ActivationState>().ok())
            .unwrap_or(ActivationState::Unknown);
        put_text(response, MB_STATE_ACTIVATION_STR, reply, keys::ACTIVATION_STATE)?;
        put_text(response, MB_STATE_VOICE_CALL_STATE, reply, keys::VOICE_CALL_STATE)?;
        put_text(response, MB_STATE_IP_TYPE, reply, keys::IP_TYPE)?;
        put_text(response, MB_STATE_CONTEXT_TYPE, reply, keys::CONTEXT_TYPE)?;
        put_text(response, MB_STATE_NETWORK_ERROR, reply, keys::NETWORK_ERROR)?;
        response.append_uint(MB_STATE_ACTIVATION, activation.as_u32())?;
        put_uint(response, MB_STATE_SESSION_ID, reply, keys::SESSION_ID)?;
        Ok(())
    }
}

pub struct DeviceCaps;

impl Handler for DeviceCaps {
    fn validate_inputs(&self, _request: &Envelope) -> Result<Command, FieldError> {
        Ok(Command::DeviceCaps)
    }

    fn extract_outputs(&self, reply: &Reply, response: &mut Envelope) -> Result<(), SessionError> {
        put_uint(response, MB_DEV_MAX_SESSION, reply, keys::MAX_SESSIONS)?;
        put_text(response, MB_DEV_TYPE, reply, keys::DEVICE_TYPE)?;
        put_text(response, MB_DEV_CELL_CLASS, reply, keys::CELLULAR_CLASS)?;
        put_text(response, MB_DEV_VOICE_CLASS, reply, keys::VOICE_CLASS)?;
        put_text(response, MB_DEV_SIM_CLASS, reply, keys::SIM_CLASS)?;
        put_text(response, MB_DEV_DATA_CLASS, reply, keys::DATA_CLASS)?;
        put_text(response, MB_DEV_SMS_CAPS, reply, keys::SMS_CAPS)?;
        put_text(response, MB_DEV_CTRL_CAPS, reply, keys::CONTROL_CAPS)?;
        put_text(response, MB_DEV_CUST_DATA_CLASS, reply, keys::CUSTOM_DATA_CLASS)?;
        put_text(response, MB_DEV_ID, reply, keys::DEVICE_ID)?;
        put_text(response, MB_DEV_FMW_INFO, reply, keys::FIRMWARE_INFO)?;
        put_text(response, MB_DEV_HW_INFO, reply, keys::HARDWARE_INFO)?;
        Ok(())
    }
}

/// MBIM reports every metric (0 when absent); QMI only what the current
/// radio technology provides.
pub struct Signal {
    pub backend: BackendKind,
}

impl Handler for Signal {
    fn validate_inputs(&self, _request: &Envelope) -> Result<Command, FieldError> {
        Ok(Command::SignalQuery)
    }

    fn extract_outputs(&self, reply: &Reply, response: &mut Envelope) -> Result<(), SessionError> {
        let metrics = [
            (MB_SIGNAL_RSSI, keys::RSSI),
            (MB_SIGNAL_ERROR_RATE, keys::ERROR_RATE),
            (MB_SIGNAL_RSCP, keys::RSCP),
            (MB_SIGNAL_ECNO, keys::ECNO),
            (MB_SIGNAL_RSRQ, keys::RSRQ),
            (MB_SIGNAL_RSRP, keys::RSRP),
            (MB_SIGNAL_RSSNR, keys::RSSNR),
        ];
        for (tag, key) in metrics {
            match self.backend {
                BackendKind::Mbim => put_uint(response, tag, reply, key)?,
                BackendKind::Qmi => {
                    if let Some(value) = reply.uint(key) {
                        response.append_uint(tag, value)?;
                    }
                }
            }
        }
        Ok(())
    }
}
