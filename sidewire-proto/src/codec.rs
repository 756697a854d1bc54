//! Length-prefixed frame codec.
//!
//! Each frame is: `[u32 little-endian length][payload]`. The byte order is
//! fixed so that controller and peer agree regardless of host endianness.

use std::io;

use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Size of the length prefix in bytes.
pub const PREFIX_LEN: usize = 4;

/// Default maximum accepted frame payload (16 MiB).
pub const MAX_FRAME: u32 = 16 * 1024 * 1024;

/// Encodes `len` as a little-endian length prefix.
pub fn length_prefix(len: usize) -> io::Result<[u8; PREFIX_LEN]> {
    let len = u32::try_from(len)
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "frame exceeds u32::MAX"))?;
    Ok(len.to_le_bytes())
}

/// Returns `length_prefix(payload.len()) ++ payload`.
pub fn encode(payload: &[u8]) -> io::Result<Vec<u8>> {
    let prefix = length_prefix(payload.len())?;
    let mut frame = Vec::with_capacity(PREFIX_LEN + payload.len());
    frame.extend_from_slice(&prefix);
    frame.extend_from_slice(payload);
    Ok(frame)
}

/// Interprets a length prefix.
pub const fn decode_length(prefix: [u8; PREFIX_LEN]) -> u32 {
    u32::from_le_bytes(prefix)
}

/// Rejects payload lengths above `max`.
pub fn check_length(len: u32, max: u32) -> io::Result<usize> {
    if len > max {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("frame of {len} bytes exceeds {max} byte limit"),
        ));
    }
    Ok(len as usize)
}

/// Writes `payload` as one frame and flushes `w`.
pub async fn write_frame<W: AsyncWrite + Unpin>(w: &mut W, payload: &[u8]) -> io::Result<()> {
    let prefix = length_prefix(payload.len())?;
    w.write_all(&prefix).await?;
    w.write_all(payload).await?;
    w.flush().await
}

/// Reads one frame from `r`, refusing payloads larger than `max`.
pub async fn read_frame<R: AsyncRead + Unpin>(r: &mut R, max: u32) -> io::Result<Vec<u8>> {
    let mut prefix = [0u8; PREFIX_LEN];
    r.read_exact(&mut prefix).await?;
    let len = check_length(decode_length(prefix), max)?;
    let mut payload = vec![0u8; len];
    r.read_exact(&mut payload).await?;
    Ok(payload)
}

/// Encodes `msg` as JSON and writes it as one frame.
pub async fn send<W: AsyncWrite + Unpin>(w: &mut W, msg: &impl Serialize) -> io::Result<()> {
    let payload =
        serde_json::to_vec(msg).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    write_frame(w, &payload).await
}

/// Reads one frame and decodes it from JSON.
pub async fn recv<T: DeserializeOwned>(r: &mut (impl AsyncRead + Unpin)) -> io::Result<T> {
    let payload = read_frame(r, MAX_FRAME).await?;
    serde_json::from_slice(&payload).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{EnableUnsignedExecutionRequest, ServerResponse};

    #[test]
    fn prefix_is_little_endian() {
        assert_eq!(length_prefix(0x0102_0304).unwrap(), [0x04, 0x03, 0x02, 0x01]);
        assert_eq!(decode_length([0x04, 0x03, 0x02, 0x01]), 0x0102_0304);
    }

    #[test]
    fn encode_prepends_length() {
        let lengths = [
            0, 1, 2, 3, 4, 5, 127, 128, 255, 256, 257, 4095, 4096, 65535, 65536, 65537, 1 << 20,
        ];
        for len in lengths {
            #[allow(clippy::cast_possible_truncation)]
            let payload: Vec<u8> = (0..len).map(|i| (i % 251) as u8).collect();
            let frame = encode(&payload).unwrap();
            assert_eq!(frame.len(), PREFIX_LEN + len);

            let mut prefix = [0u8; PREFIX_LEN];
            prefix.copy_from_slice(&frame[..PREFIX_LEN]);
            assert_eq!(prefix, length_prefix(len).unwrap());
            assert_eq!(decode_length(prefix) as usize, len);
            assert_eq!(&frame[PREFIX_LEN..], payload.as_slice());
        }
    }

    #[test]
    fn check_length_enforces_limit() {
        assert_eq!(check_length(16, 16).unwrap(), 16);
        let err = check_length(17, 16).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[tokio::test]
    async fn frame_roundtrip_over_duplex() {
        let (mut a, mut b) = tokio::io::duplex(64);
        let req = EnableUnsignedExecutionRequest::new("ABCD", 123);

        send(&mut a, &req).await.unwrap();
        let decoded: EnableUnsignedExecutionRequest = recv(&mut b).await.unwrap();
        assert_eq!(decoded, req);

        send(&mut b, &ServerResponse::EnableUnsignedExecutionAck)
            .await
            .unwrap();
        let resp: ServerResponse = recv(&mut a).await.unwrap();
        assert_eq!(resp, ServerResponse::EnableUnsignedExecutionAck);
    }

    #[tokio::test]
    async fn rejects_oversized_frame() {
        // Header claiming 32 MiB.
        let header = (32u32 * 1024 * 1024).to_le_bytes();
        let mut cursor = &header[..];
        let err = read_frame(&mut cursor, MAX_FRAME).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[tokio::test]
    async fn truncated_payload_is_eof() {
        let mut bytes = 10u32.to_le_bytes().to_vec();
        bytes.extend_from_slice(b"short");
        let mut cursor = &bytes[..];
        let err = read_frame(&mut cursor, MAX_FRAME).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }
}
