//! Wire protocol for sidewire controller↔peer communication.
//!
//! Messages are serialized as JSON and framed with a 4-byte
//! little-endian length prefix, suitable for any reliable byte stream
//! (TCP, Unix socket).

mod codec;
mod message;

pub use codec::{
    MAX_FRAME, PREFIX_LEN, check_length, decode_length, encode, length_prefix, read_frame, recv,
    send, write_frame,
};
pub use message::{EnableUnsignedExecutionRequest, PeerError, ServerResponse};
