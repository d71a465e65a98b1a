//! Request routing for mbgate.
//!
//! The [`Router`] takes one framed envelope at a time from a
//! [`ReplyEndpoint`], rejects anything malformed or incomplete with an error
//! response, and hands the rest to the session controller. [`server::run`]
//! owns the bind/serve/rebind cycle; [`RequestClient`] is the other end of
//! the channel.

#[cfg(unix)]
pub mod client;
pub mod config;
#[cfg(unix)]
pub mod endpoint;
pub mod error;
pub mod router;
#[cfg(unix)]
pub mod server;

#[cfg(unix)]
pub use client::RequestClient;
pub use config::{BindPolicy, ClientConfig, EndpointConfig, DEFAULT_SOCKET_PATH};
#[cfg(unix)]
pub use endpoint::ReplyEndpoint;
pub use error::{Result, RouterError};
pub use router::{parse_request, Handled, RequestRejection, Router};
#[cfg(unix)]
pub use server::{bind_with_retry, run};
