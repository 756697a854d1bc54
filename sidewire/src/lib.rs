//! Controller-side command/response client for a companion peer process.
//!
//! `sidewire` sends privileged commands (such as enabling unsigned code
//! execution) to a peer over any ordered byte stream, using the
//! length-prefixed JSON protocol defined in [`sidewire_proto`].
//!
//! # Quick start
//!
//! ```no_run
//! use sidewire::{ServerConnection, StreamConnection};
//!
//! # async fn run() -> sidewire::Result<()> {
//! let conn = StreamConnection::connect_tcp("127.0.0.1:27015").await?;
//! let mut client = ServerConnection::new(conn);
//! client.enable_unsigned_execution("00008030-001A2D3E0C12802E").await?;
//! client.disconnect();
//! # Ok(())
//! # }
//! ```

mod client;
pub mod compat;
mod connection;
mod error;

pub use client::{DEVICE_ID_ENV, Payload, ServerConnection, device_id_from_env};
pub use connection::{Connection, DisconnectHandle, StreamConnection};
pub use error::{BoxError, Error, ErrorKind, Result, TransportError};
pub use sidewire_proto::{EnableUnsignedExecutionRequest, PeerError, ServerResponse};
