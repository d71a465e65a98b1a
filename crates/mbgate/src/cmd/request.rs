use mbgate_envelope::tags::{
    MB_APN, MB_AUTH, MB_PASSWORD, MB_PIN_CODE, MB_PROTOCOL, MB_REQUEST, MB_SESSION_TID,
    MB_USERNAME,
};
use mbgate_envelope::{Envelope, Field};
use mbgate_router::{ClientConfig, RequestClient};

use crate::cmd::{parse_duration, RequestArgs};
use crate::exit::{router_error, CliError, CliResult, DATA_INVALID, FAILURE, SUCCESS};
use crate::output::{print_response, OutputFormat};

/// Request fields for the given arguments, in wire order.
fn request_fields(args: &RequestArgs) -> Vec<Field> {
    let mut fields = vec![
        Field::uint(MB_REQUEST, args.request.as_u32()),
        Field::uint(MB_PROTOCOL, args.backend.as_u32()),
    ];
    if args.tid != 0 {
        fields.push(Field::uint(MB_SESSION_TID, args.tid));
    }
    if let Some(apn) = &args.apn {
        fields.push(Field::string(MB_APN, apn.as_str()));
    }
    if let Some(username) = &args.username {
        fields.push(Field::string(MB_USERNAME, username.as_str()));
    }
    if let Some(password) = &args.password {
        fields.push(Field::string(MB_PASSWORD, password.as_str()));
    }
    if let Some(auth) = args.auth {
        fields.push(Field::uint(MB_AUTH, auth.as_u32()));
    }
    if let Some(pin) = &args.pin {
        fields.push(Field::string(MB_PIN_CODE, pin.as_str()));
    }
    fields
}

pub fn run(args: RequestArgs, format: OutputFormat) -> CliResult<i32> {
    let timeout = parse_duration(&args.timeout)?;
    let request = Envelope::from_fields(&request_fields(&args))
        .map_err(|err| CliError::new(DATA_INVALID, format!("invalid request: {err}")))?;

    let mut client = RequestClient::connect_with_config(
        &args.socket,
        ClientConfig {
            timeout,
            ..ClientConfig::default()
        },
    )
    .map_err(|err| router_error("connect failed", err))?;
    let response = client
        .request(&request)
        .map_err(|err| router_error("request failed", err))?;

    let fields = response
        .to_fields()
        .map_err(|err| CliError::new(DATA_INVALID, format!("invalid response: {err}")))?;
    print_response(&response, &fields, format);

    if response.is_ok() {
        Ok(SUCCESS)
    } else {
        Ok(FAILURE)
    }
}
