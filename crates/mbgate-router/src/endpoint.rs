use std::collections::VecDeque;
use std::path::Path;

use bytes::Bytes;
use mbgate_frame::{FrameReader, FrameWriter};
use mbgate_transport::{IpcStream, UnixDomainSocket};
use tracing::{debug, warn};

use crate::config::EndpointConfig;
use crate::error::Result;

struct Connection {
    reader: FrameReader<IpcStream>,
    writer: FrameWriter<IpcStream>,
}

impl Connection {
    /// Write one reply. The stream is switched to blocking for the write so
    /// the write timeout applies, then back to non-blocking for polling.
    fn deliver(&mut self, reply: &[u8]) -> Result<()> {
        self.writer.get_ref().set_nonblocking(false)?;
        self.writer.send(reply)?;
        self.writer.get_ref().set_nonblocking(true)?;
        Ok(())
    }
}

/// Server side of the request/reply channel.
///
/// Every connected client is polled in turn, oldest first; a client that
/// was just answered moves to the back of the line. Each received message
/// is answered with exactly one [`send`](Self::send) before the next
/// message is read from any client.
pub struct ReplyEndpoint {
    socket: UnixDomainSocket,
    clients: VecDeque<Connection>,
    replying: Option<Connection>,
    config: EndpointConfig,
}

impl ReplyEndpoint {
    pub fn bind(path: impl AsRef<Path>, config: EndpointConfig) -> Result<Self> {
        let socket = UnixDomainSocket::bind(path)?;
        socket.set_nonblocking(true)?;
        Ok(Self {
            socket,
            clients: VecDeque::new(),
            replying: None,
            config,
        })
    }

    pub fn path(&self) -> &Path {
        self.socket.path()
    }

    pub fn config(&self) -> &EndpointConfig {
        &self.config
    }

    /// Number of connected clients.
    pub fn clients(&self) -> usize {
        self.clients.len() + usize::from(self.replying.is_some())
    }

    /// Receive the next request without blocking.
    ///
    /// `Ok(None)` means no client has a complete request ready. Client-side
    /// problems (hang-up, garbage framing) drop that client and are not
    /// errors; only a failure of the listening socket is.
    pub fn poll_recv(&mut self) -> Result<Option<Bytes>> {
        if let Some(unanswered) = self.replying.take() {
            warn!("previous request left unanswered");
            self.clients.push_back(unanswered);
        }

        while self.clients.len() < self.config.max_clients {
            let Some(stream) = self.socket.try_accept()? else {
                break;
            };
            match self.attach(stream) {
                Ok(connection) => self.clients.push_back(connection),
                Err(err) => warn!(error = %err, "failed to set up client"),
            }
        }

        for _ in 0..self.clients.len() {
            let Some(mut connection) = self.clients.pop_front() else {
                break;
            };
            match connection.reader.read_message() {
                Ok(message) => {
                    self.replying = Some(connection);
                    return Ok(Some(message));
                }
                Err(err) if err.is_timeout() => self.clients.push_back(connection),
                Err(err) if err.is_disconnect() => debug!("client disconnected"),
                Err(err) => warn!(error = %err, "dropping client after framing error"),
            }
        }
        Ok(None)
    }

    /// Send the reply to the client whose request was last received.
    /// Returns `false` (and drops that client) when it could not be
    /// delivered.
    pub fn send(&mut self, reply: &[u8]) -> bool {
        let Some(mut connection) = self.replying.take() else {
            warn!("no client to reply to");
            return false;
        };
        match connection.deliver(reply) {
            Ok(()) => {
                self.clients.push_back(connection);
                true
            }
            Err(err) => {
                warn!(error = %err, "failed to send reply");
                false
            }
        }
    }

    fn attach(&self, stream: IpcStream) -> Result<Connection> {
        if let Some(creds) = stream.peer_credentials() {
            debug!(uid = creds.uid, gid = creds.gid, pid = creds.pid, "client connected");
        } else {
            debug!("client connected");
        }
        let frame_config = self.config.frame_config();
        let reader_stream = stream.try_clone()?;
        let reader = FrameReader::with_config_ipc(reader_stream, frame_config.clone())?;
        let writer = FrameWriter::with_config_ipc(stream, frame_config)?;
        reader.get_ref().set_nonblocking(true)?;
        Ok(Connection { reader, writer })
    }
}
