//! Transport capability used by [`ServerConnection`](crate::ServerConnection).
//!
//! [`Connection`] is the contract an externally established byte stream
//! must satisfy. [`StreamConnection`] implements it for any tokio stream
//! (TCP, Unix socket, in-memory duplex).

use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpStream, ToSocketAddrs};
use tokio::sync::watch;
use tracing::debug;

use crate::error::TransportError;

/// An ordered, bidirectional byte stream to the peer.
pub trait Connection: Send {
    /// Writes all of `data`.
    fn send(&mut self, data: &[u8]) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Reads exactly `len` bytes. A short read is never reported as success.
    fn receive(
        &mut self,
        len: usize,
    ) -> impl Future<Output = Result<Vec<u8>, TransportError>> + Send;

    /// Closes the connection. Safe to call repeatedly, and after failure.
    fn disconnect(&self);
}

/// Releases a stream held by a [`StreamConnection`].
trait Release: Send + Sync {
    /// Drops the stream if it is idle in its slot.
    fn release(&self);
}

impl<S: Send> Release for Mutex<Option<S>> {
    fn release(&self) {
        let stream = self.lock().unwrap_or_else(PoisonError::into_inner).take();
        drop(stream);
    }
}

/// Cloneable handle that disconnects a [`StreamConnection`] from another task.
///
/// An idle stream is closed immediately. A send or receive in progress when
/// [`disconnect`](Self::disconnect) is called resolves with
/// [`TransportError::Disconnected`] and closes the stream itself.
#[derive(Clone)]
pub struct DisconnectHandle {
    /// Set once disconnected.
    closed: Arc<watch::Sender<bool>>,
    /// Slot of the owning connection.
    stream: Arc<dyn Release>,
}

impl DisconnectHandle {
    /// Marks the connection as disconnected and closes it. Idempotent.
    pub fn disconnect(&self) {
        if !self.closed.send_replace(true) {
            debug!("connection disconnected");
        }
        self.stream.release();
    }

    /// Whether [`disconnect`](Self::disconnect) has been called.
    pub fn is_disconnected(&self) -> bool {
        *self.closed.borrow()
    }

    /// Resolves once the connection is disconnected.
    async fn wait(&self) {
        let mut rx = self.closed.subscribe();
        loop {
            if *rx.borrow_and_update() {
                return;
            }
            if rx.changed().await.is_err() {
                return;
            }
        }
    }
}

impl fmt::Debug for DisconnectHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DisconnectHandle")
            .field("disconnected", &self.is_disconnected())
            .finish_non_exhaustive()
    }
}

/// [`Connection`] over a tokio stream.
///
/// Between operations the stream sits in a shared slot so that a
/// disconnect can drop it; each send or receive takes it out for its
/// duration.
#[derive(Debug)]
pub struct StreamConnection<S> {
    /// The underlying stream, `None` while in use or after disconnect.
    stream: Arc<Mutex<Option<S>>>,
    /// Human-readable endpoint, e.g. `127.0.0.1:5000 (TCP)`.
    description: String,
    /// Shared disconnect flag.
    closed: DisconnectHandle,
}

impl<S> StreamConnection<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    /// Wraps an already established stream.
    pub fn new(stream: S, description: impl Into<String>) -> Self {
        let stream = Arc::new(Mutex::new(Some(stream)));
        let release: Arc<dyn Release> = Arc::<Mutex<Option<S>>>::clone(&stream);
        Self {
            stream,
            description: description.into(),
            closed: DisconnectHandle {
                closed: Arc::new(watch::Sender::new(false)),
                stream: release,
            },
        }
    }

    /// Returns a handle that can disconnect this connection from elsewhere.
    pub fn disconnect_handle(&self) -> DisconnectHandle {
        self.closed.clone()
    }

    /// Whether the connection has been disconnected.
    pub fn is_disconnected(&self) -> bool {
        self.closed.is_disconnected()
    }

    /// Takes the stream out of its slot for one operation.
    fn checkout(&self) -> Result<S, TransportError> {
        if self.is_disconnected() {
            return Err(TransportError::Disconnected);
        }
        self.stream
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .ok_or(TransportError::Disconnected)
    }

    /// Returns the stream to its slot, or drops it if disconnected meanwhile.
    fn checkin(&self, stream: S) {
        let mut slot = self.stream.lock().unwrap_or_else(PoisonError::into_inner);
        if !self.is_disconnected() {
            *slot = Some(stream);
        }
    }

    /// Shuts the stream down after a disconnect. Errors are irrelevant here.
    async fn abort(mut stream: S) -> TransportError {
        let _ = stream.shutdown().await;
        TransportError::Disconnected
    }
}

impl StreamConnection<TcpStream> {
    /// Connects to a peer over TCP.
    pub async fn connect_tcp(addr: impl ToSocketAddrs) -> std::io::Result<Self> {
        let stream = TcpStream::connect(addr).await?;
        stream.set_nodelay(true)?;
        let endpoint = stream
            .peer_addr()
            .map_or_else(|_| "unknown".to_owned(), |a| a.to_string());
        debug!(%endpoint, "connected over TCP");
        Ok(Self::new(stream, format!("{endpoint} (TCP)")))
    }
}

#[cfg(unix)]
impl StreamConnection<tokio::net::UnixStream> {
    /// Connects to a peer over a Unix socket.
    pub async fn connect_unix(path: impl AsRef<std::path::Path>) -> std::io::Result<Self> {
        let path = path.as_ref();
        let stream = tokio::net::UnixStream::connect(path).await?;
        debug!(path = %path.display(), "connected over Unix socket");
        Ok(Self::new(stream, format!("{} (Unix)", path.display())))
    }
}

impl<S> Connection for StreamConnection<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    async fn send(&mut self, data: &[u8]) -> Result<(), TransportError> {
        let mut stream = self.checkout()?;
        let closed = self.closed.clone();
        let result = tokio::select! {
            biased;
            () = closed.wait() => None,
            res = async {
                stream.write_all(data).await?;
                stream.flush().await
            } => Some(res),
        };
        match result {
            Some(res) => {
                self.checkin(stream);
                res.map_err(TransportError::from)
            }
            None => Err(Self::abort(stream).await),
        }
    }

    async fn receive(&mut self, len: usize) -> Result<Vec<u8>, TransportError> {
        let mut stream = self.checkout()?;
        let closed = self.closed.clone();
        let mut buf = vec![0u8; len];
        let result = tokio::select! {
            biased;
            () = closed.wait() => None,
            res = stream.read_exact(&mut buf) => Some(res),
        };
        match result {
            Some(res) => {
                self.checkin(stream);
                res.map(|_| buf).map_err(TransportError::from)
            }
            None => Err(Self::abort(stream).await),
        }
    }

    fn disconnect(&self) {
        self.closed.disconnect();
    }
}

impl<S> fmt::Display for StreamConnection<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.description)
    }
}
