use mbgate_router::{BindPolicy, EndpointConfig, Router};
use mbgate_session::{
    CancelToken, ControllerConfig, MbimBackend, QmiBackend, SessionController,
};
use tracing::info;

use crate::cmd::{parse_duration, ServeArgs};
use crate::exit::{router_error, CliError, CliResult, INTERNAL, SUCCESS};

pub fn run(args: ServeArgs) -> CliResult<i32> {
    let policy = BindPolicy {
        retries: args.bind_retries,
        base_delay: parse_duration(&args.bind_delay)?,
    };
    let endpoint_config = EndpointConfig {
        poll_interval: parse_duration(&args.poll_interval)?,
        ..EndpointConfig::default()
    };

    let shutdown = CancelToken::new();
    install_shutdown_handler(shutdown.clone())?;

    let controller = SessionController::new(ControllerConfig {
        device: args.device.clone(),
    })
    .with_backend(MbimBackend::with_program(&args.mbim_tool))
    .with_backend(QmiBackend::with_program(&args.qmi_tool));
    let router = Router::new(controller, shutdown);

    info!(
        socket = %args.socket.display(),
        device = %args.device.display(),
        "starting gateway"
    );
    mbgate_router::run(&args.socket, &policy, &endpoint_config, &router)
        .map_err(|err| router_error("serve failed", err))?;
    Ok(SUCCESS)
}

fn install_shutdown_handler(shutdown: CancelToken) -> CliResult<()> {
    ctrlc::set_handler(move || {
        shutdown.cancel();
    })
    .map_err(|err| CliError::new(INTERNAL, format!("signal handler setup failed: {err}")))
}
