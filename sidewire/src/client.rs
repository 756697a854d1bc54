//! Controller-side client for the peer command protocol.
//!
//! Each operation is one strict send-then-receive cycle: the request is
//! written as a size frame followed by a payload frame, then exactly one
//! length-prefixed reply is read and resolved. There are no request IDs,
//! so at most one cycle may be in flight per connection; every operation
//! takes `&mut self` to enforce that.

use std::borrow::Cow;

use serde::Serialize;
use sidewire_proto::{
    EnableUnsignedExecutionRequest, MAX_FRAME, PREFIX_LEN, ServerResponse, check_length,
    decode_length, length_prefix,
};
use tracing::{debug, warn};

use crate::connection::Connection;
use crate::error::{Error, Result, TransportError};

/// Environment variable consulted for the implicit device identifier.
pub const DEVICE_ID_ENV: &str = "SIDEWIRE_DEVICE_ID";

/// Reads the device identifier from [`DEVICE_ID_ENV`], ignoring empty values.
pub fn device_id_from_env() -> Option<String> {
    std::env::var(DEVICE_ID_ENV).ok().filter(|id| !id.is_empty())
}

/// Body of an outbound request.
#[derive(Debug)]
#[non_exhaustive]
pub enum Payload<'a, T: ?Sized = ()> {
    /// Pre-encoded bytes, sent unchanged.
    Bytes(&'a [u8]),
    /// Structured value, encoded as JSON before framing.
    Value(&'a T),
}

impl<'a> Payload<'a> {
    /// A pre-encoded payload.
    pub const fn bytes(bytes: &'a [u8]) -> Self {
        Self::Bytes(bytes)
    }
}

impl<'a, T: Serialize + ?Sized> Payload<'a, T> {
    /// A structured payload.
    pub const fn value(value: &'a T) -> Self {
        Self::Value(value)
    }

    /// Produces the bytes that go into the payload frame.
    fn to_bytes(&self) -> Result<Cow<'a, [u8]>> {
        match *self {
            Self::Bytes(bytes) => Ok(Cow::Borrowed(bytes)),
            Self::Value(value) => serde_json::to_vec(value)
                .map(Cow::Owned)
                .map_err(Error::invalid_request),
        }
    }
}

/// A session with the peer over a borrowed-for-life [`Connection`].
///
/// Dropping the session disconnects the connection.
#[derive(Debug)]
pub struct ServerConnection<C: Connection> {
    /// The transport to the peer.
    connection: C,
    /// Largest reply payload accepted, in bytes.
    max_frame: u32,
}

impl<C: Connection> ServerConnection<C> {
    /// Starts a session over `connection`.
    pub const fn new(connection: C) -> Self {
        Self {
            connection,
            max_frame: MAX_FRAME,
        }
    }

    /// Sets the largest reply payload accepted (default 16 MiB).
    ///
    /// A larger announced reply fails the request with
    /// [`TransportError::FrameTooLarge`] before any payload byte is read.
    #[must_use]
    pub fn max_frame_len(mut self, max: u32) -> Self {
        self.max_frame = max;
        self
    }

    /// The underlying connection.
    pub const fn connection(&self) -> &C {
        &self.connection
    }

    /// Disconnects the underlying connection.
    pub fn disconnect(&self) {
        self.connection.disconnect();
    }

    /// Asks the peer to allow unsigned code execution for this process.
    pub async fn enable_unsigned_execution(&mut self, identifier: &str) -> Result<()> {
        self.enable_unsigned_execution_for_process(identifier, std::process::id())
            .await
    }

    /// Asks the peer to allow unsigned code execution for `process_id`.
    pub async fn enable_unsigned_execution_for_process(
        &mut self,
        identifier: &str,
        process_id: u32,
    ) -> Result<()> {
        let req = EnableUnsignedExecutionRequest::new(identifier, process_id);
        self.perform_request(Payload::value(&req), |resp| {
            matches!(resp, ServerResponse::EnableUnsignedExecutionAck).then_some(())
        })
        .await
    }

    /// Like [`enable_unsigned_execution`](Self::enable_unsigned_execution),
    /// with the identifier taken from [`DEVICE_ID_ENV`].
    ///
    /// Fails with [`Error::UnknownIdentifier`] without any I/O when the
    /// variable is unset or empty.
    pub async fn enable_unsigned_execution_for_current_device(&mut self) -> Result<()> {
        self.enable_for_identifier(device_id_from_env()).await
    }

    /// Enables unsigned execution for this process if `identifier` is known.
    async fn enable_for_identifier(&mut self, identifier: Option<String>) -> Result<()> {
        let identifier = identifier.ok_or(Error::UnknownIdentifier)?;
        self.enable_unsigned_execution(&identifier).await
    }

    /// Sends `payload` and resolves the peer's reply.
    ///
    /// An [`ServerResponse::Error`] reply becomes [`Error::ApplicationError`].
    /// Any other reply is handed to `expect`; `None` means the reply is not
    /// the kind this command expects and yields [`Error::UnexpectedResponse`].
    pub async fn perform_request<T, R>(
        &mut self,
        payload: Payload<'_, T>,
        expect: impl FnOnce(ServerResponse) -> Option<R>,
    ) -> Result<R>
    where
        T: Serialize + ?Sized,
    {
        let body = payload.to_bytes()?;
        let size = length_prefix(body.len()).map_err(Error::invalid_request)?;

        self.write(&size, &body).await?;
        let response = self.read_response().await?;
        resolve(response, expect)
    }

    /// Writes the size frame, then the payload frame.
    async fn write(&mut self, size: &[u8], body: &[u8]) -> Result<()> {
        debug!(len = body.len(), "sending request");
        if let Err(e) = self.connection.send(size).await {
            warn!(error = %e, "failed to send size frame");
            return Err(e.into());
        }
        if let Err(e) = self.connection.send(body).await {
            warn!(error = %e, "failed to send payload frame");
            return Err(e.into());
        }
        Ok(())
    }

    /// Reads one length-prefixed reply and decodes it.
    async fn read_response(&mut self) -> Result<ServerResponse> {
        let prefix = self.receive_exact(PREFIX_LEN).await?;
        let mut buf = [0u8; PREFIX_LEN];
        buf.copy_from_slice(&prefix);

        let len = decode_length(buf);
        let max = self.max_frame;
        let size = check_length(len, max).map_err(|_| {
            warn!(len, max, "reply exceeds frame limit");
            TransportError::FrameTooLarge { len, max }
        })?;

        let payload = self.receive_exact(size).await?;
        debug!(len, "received reply");
        serde_json::from_slice(&payload).map_err(|e| {
            warn!(error = %e, "failed to decode reply");
            Error::unexpected_response(Some(e))
        })
    }

    /// Receives `len` bytes, treating a short buffer as a lost connection.
    async fn receive_exact(&mut self, len: usize) -> Result<Vec<u8>> {
        let bytes = self.connection.receive(len).await.map_err(|e| {
            warn!(error = %e, len, "failed to receive");
            Error::from(e)
        })?;
        if bytes.len() != len {
            return Err(TransportError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("expected {len} bytes, received {}", bytes.len()),
            ))
            .into());
        }
        Ok(bytes)
    }
}

impl<C: Connection> Drop for ServerConnection<C> {
    fn drop(&mut self) {
        self.connection.disconnect();
    }
}

/// Maps a decoded reply to the operation's outcome.
fn resolve<R>(
    response: ServerResponse,
    expect: impl FnOnce(ServerResponse) -> Option<R>,
) -> Result<R> {
    if let ServerResponse::Error { error } = response {
        warn!(code = error.code, "peer rejected request: {error}");
        return Err(error.into());
    }
    let kind = response.kind();
    expect(response).ok_or_else(|| {
        warn!(kind, "unexpected response kind");
        Error::unexpected_response(None)
    })
}
