use std::path::Path;

use mbgate_envelope::Envelope;
use mbgate_frame::{FrameConfig, FrameReader, FrameWriter};
use mbgate_transport::{IpcStream, UnixDomainSocket};
use tracing::debug;

use crate::config::ClientConfig;
use crate::error::{Result, RouterError};

/// Client side of the request/reply channel: one request, one reply.
pub struct RequestClient {
    reader: FrameReader<IpcStream>,
    writer: FrameWriter<IpcStream>,
    config: ClientConfig,
}

impl RequestClient {
    pub fn connect(path: impl AsRef<Path>) -> Result<Self> {
        Self::connect_with_config(path, ClientConfig::default())
    }

    pub fn connect_with_config(path: impl AsRef<Path>, config: ClientConfig) -> Result<Self> {
        let stream = UnixDomainSocket::connect(path)?;
        let reader_stream = stream.try_clone()?;
        let frame_config = FrameConfig {
            max_payload_size: config.max_payload_size,
            read_timeout: Some(config.timeout),
            write_timeout: Some(config.timeout),
        };
        let reader = FrameReader::with_config_ipc(reader_stream, frame_config.clone())?;
        let writer = FrameWriter::with_config_ipc(stream, frame_config)?;
        Ok(Self {
            reader,
            writer,
            config,
        })
    }

    /// Send `request` and wait for the reply. The reply is returned only if
    /// it is a structurally valid envelope.
    pub fn request(&mut self, request: &Envelope) -> Result<Envelope> {
        self.writer.send(request.as_bytes())?;
        let reply = match self.reader.read_message() {
            Ok(reply) => reply,
            Err(err) if err.is_timeout() => return Err(RouterError::Timeout(self.config.timeout)),
            Err(err) if err.is_disconnect() => return Err(RouterError::Disconnected),
            Err(err) => return Err(err.into()),
        };
        debug!(bytes = reply.len(), "received reply");

        let mut envelope = Envelope::new();
        envelope.adopt(reply.to_vec());
        envelope.validate().map_err(RouterError::InvalidReply)?;
        Ok(envelope)
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }
}
