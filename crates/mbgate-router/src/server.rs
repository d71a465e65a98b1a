//! Bind/serve cycle of the gateway process.

use std::path::Path;
use std::thread;

use tracing::{error, info, warn};

use crate::config::{BindPolicy, EndpointConfig};
use crate::endpoint::ReplyEndpoint;
use crate::error::{Result, RouterError};
use crate::router::Router;

/// Bind the reply endpoint, retrying with linear backoff.
pub fn bind_with_retry(
    path: &Path,
    policy: &BindPolicy,
    config: &EndpointConfig,
) -> Result<ReplyEndpoint> {
    let mut attempt = 0;
    loop {
        match ReplyEndpoint::bind(path, config.clone()) {
            Ok(endpoint) => return Ok(endpoint),
            Err(RouterError::Transport(err)) if attempt < policy.retries => {
                attempt += 1;
                let delay = policy.delay_for(attempt);
                warn!(
                    path = %path.display(),
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "bind failed, retrying"
                );
                thread::sleep(delay);
            }
            Err(RouterError::Transport(source)) => {
                return Err(RouterError::BindExhausted {
                    attempts: attempt + 1,
                    source,
                })
            }
            Err(other) => return Err(other),
        }
    }
}

/// Run the gateway until shutdown.
///
/// Each cycle binds a fresh endpoint and serves on it. When the listening
/// endpoint fails the cycle starts over from the bind; only a bind that
/// exhausts its retries ends the run with an error.
pub fn run(
    path: &Path,
    policy: &BindPolicy,
    config: &EndpointConfig,
    router: &Router,
) -> Result<()> {
    loop {
        let mut endpoint = bind_with_retry(path, policy, config).inspect_err(|err| {
            error!(path = %path.display(), error = %err, "giving up on binding");
        })?;

        match router.serve(&mut endpoint) {
            Ok(()) => {
                info!("gateway stopped");
                return Ok(());
            }
            Err(err) => {
                warn!(error = %err, "listening endpoint failed, rebinding");
                drop(endpoint);
                if router.shutdown_token().is_cancelled() {
                    return Ok(());
                }
            }
        }
    }
}
