use mbgate_envelope::tags::{MB_PROTOCOL, MB_REQUEST, MB_SESSION_TID};
use mbgate_envelope::{BackendKind, Envelope, RequestType};
use mbgate_session::{CancelToken, RequestContext, SessionController};
use tracing::{debug, warn};

#[cfg(unix)]
use crate::endpoint::ReplyEndpoint;
#[cfg(unix)]
use crate::error::Result;

const SERVER_PREFIX: &str = "Server : ";

/// Why a request never reached the session controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestRejection {
    Malformed,
    MissingRequestType,
    UnknownRequestType(u32),
    MissingProtocol,
    UnknownProtocol(u32),
}

impl RequestRejection {
    /// Client-facing error text.
    pub fn message(&self) -> String {
        let detail = match self {
            RequestRejection::Malformed => "Invalid request".to_string(),
            RequestRejection::MissingRequestType => "Missing request type (MB_REQUEST)".to_string(),
            RequestRejection::UnknownRequestType(value) => format!("Unknown request type {value}"),
            RequestRejection::MissingProtocol => "Missing protocol (MB_PROTOCOL)".to_string(),
            RequestRejection::UnknownProtocol(value) => format!("Unknown protocol {value}"),
        };
        format!("{SERVER_PREFIX}{detail}")
    }
}

/// Check a received envelope and pull out what the controller needs.
pub fn parse_request(request: &Envelope) -> std::result::Result<RequestContext, RequestRejection> {
    if let Err(err) = request.validate() {
        warn!(error = %err, "rejecting malformed request");
        return Err(RequestRejection::Malformed);
    }

    let raw_request = request
        .get_uint(MB_REQUEST)
        .ok_or(RequestRejection::MissingRequestType)?;
    let request_type = RequestType::from_u32(raw_request)
        .ok_or(RequestRejection::UnknownRequestType(raw_request))?;

    let raw_backend = request
        .get_uint(MB_PROTOCOL)
        .ok_or(RequestRejection::MissingProtocol)?;
    let backend =
        BackendKind::from_u32(raw_backend).ok_or(RequestRejection::UnknownProtocol(raw_backend))?;

    Ok(RequestContext {
        request: request_type,
        backend,
        tid: request.get_uint(MB_SESSION_TID).unwrap_or(0),
    })
}

/// Result of handling one message.
#[derive(Debug)]
pub struct Handled {
    pub response: Envelope,
    /// Handling was cut short by the cancellation token.
    pub cancelled: bool,
}

/// Validates requests and dispatches them to the session controller.
pub struct Router {
    controller: SessionController,
    shutdown: CancelToken,
}

impl Router {
    /// `shutdown` both stops [`serve`](Self::serve) and cancels the request
    /// in flight.
    pub fn new(controller: SessionController, shutdown: CancelToken) -> Self {
        Self {
            controller,
            shutdown,
        }
    }

    pub fn controller(&self) -> &SessionController {
        &self.controller
    }

    pub fn shutdown_token(&self) -> &CancelToken {
        &self.shutdown
    }

    /// Turn one received message into its response.
    pub fn handle(&self, inbound: &[u8]) -> Handled {
        let mut request = Envelope::new();
        request.adopt(inbound.to_vec());

        let ctx = match parse_request(&request) {
            Ok(ctx) => ctx,
            Err(rejection) => {
                let message = rejection.message();
                debug!(%message, "request rejected");
                return Handled {
                    response: rejection_response(&message),
                    cancelled: false,
                };
            }
        };

        let mut response = Envelope::new();
        let report = self
            .controller
            .perform(&ctx, &request, &mut response, &self.shutdown);
        Handled {
            response,
            cancelled: report.cancelled,
        }
    }

    /// Serve requests from `endpoint` until shutdown is requested.
    ///
    /// Returns `Ok(())` on shutdown; an error means the listening endpoint
    /// failed and must be rebound.
    #[cfg(unix)]
    pub fn serve(&self, endpoint: &mut ReplyEndpoint) -> Result<()> {
        let poll_interval = endpoint.config().poll_interval;
        tracing::info!(path = %endpoint.path().display(), "serving requests");

        while !self.shutdown.is_cancelled() {
            let Some(message) = endpoint.poll_recv()? else {
                self.shutdown.wait(poll_interval);
                continue;
            };

            let handled = self.handle(&message);
            if !endpoint.send(handled.response.as_bytes()) {
                debug!("reply not delivered");
            }
            if handled.cancelled {
                break;
            }
        }

        tracing::info!("shutdown requested, leaving serve loop");
        Ok(())
    }
}

fn rejection_response(message: &str) -> Envelope {
    match Envelope::error_response(message) {
        Ok(response) => response,
        Err(err) => {
            warn!(error = %err, "failed to encode error response");
            Envelope::new()
        }
    }
}
