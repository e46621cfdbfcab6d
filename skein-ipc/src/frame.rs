//! Length-prefixed message framing
//!
//! A frame is a 4-byte big-endian payload length followed by the payload.
//! Reads loop over partial reads until each segment is complete.

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::IpcError;

/// Size of the length prefix in bytes
pub const LENGTH_PREFIX: usize = 4;

pub(crate) fn encode_length(len: usize) -> Result<[u8; LENGTH_PREFIX], IpcError> {
    u32::try_from(len)
        .map(u32::to_be_bytes)
        .map_err(|_| IpcError::FrameTooLarge(len))
}

/// Fill `buf` completely, reporting how far we got if the peer closes
pub(crate) async fn read_full<R>(reader: &mut R, buf: &mut [u8]) -> Result<(), IpcError>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut filled = 0;
    while filled < buf.len() {
        let n = reader.read(&mut buf[filled..]).await?;
        if n == 0 {
            return Err(IpcError::Truncated {
                expected: buf.len(),
                received: filled,
            });
        }
        filled += n;
    }
    Ok(())
}

/// Write one frame and flush it
pub async fn write_frame<W>(writer: &mut W, payload: &[u8]) -> Result<(), IpcError>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    let header = encode_length(payload.len())?;
    writer.write_all(&header).await?;
    writer.write_all(payload).await?;
    writer.flush().await?;
    Ok(())
}

/// Read one frame
pub async fn read_frame<R>(reader: &mut R) -> Result<Bytes, IpcError>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut header = [0u8; LENGTH_PREFIX];
    read_full(reader, &mut header).await?;

    let len = u32::from_be_bytes(header) as usize;
    let mut payload = BytesMut::zeroed(len);
    read_full(reader, &mut payload).await?;
    Ok(payload.freeze())
}

/// A byte stream carrying whole frames
#[derive(Debug)]
pub struct MessageStream<S> {
    stream: S,
}

impl<S> MessageStream<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(stream: S) -> Self {
        Self { stream }
    }

    pub async fn send(&mut self, payload: &[u8]) -> Result<(), IpcError> {
        write_frame(&mut self.stream, payload).await
    }

    pub async fn recv(&mut self) -> Result<Bytes, IpcError> {
        read_frame(&mut self.stream).await
    }

    /// Shut down the write half so the peer sees end of stream
    pub async fn close(&mut self) -> Result<(), IpcError> {
        self.stream.shutdown().await?;
        Ok(())
    }

    pub fn get_ref(&self) -> &S {
        &self.stream
    }

    pub fn into_inner(self) -> S {
        self.stream
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::duplex;

    #[tokio::test]
    async fn test_frame_layout() {
        let mut buf = Vec::new();
        write_frame(&mut buf, b"hello").await.unwrap();
        assert_eq!(buf, b"\x00\x00\x00\x05hello");
    }

    #[tokio::test]
    async fn test_payload_sizes_survive_transit() {
        let (client, server) = duplex(64 * 1024);
        let mut client = MessageStream::new(client);
        let mut server = MessageStream::new(server);

        let large: Vec<u8> = (0..1_000_000u32).map(|i| (i % 251) as u8).collect();
        let expected = large.clone();
        let writer = tokio::spawn(async move {
            client.send(b"").await.unwrap();
            client.send(b"x").await.unwrap();
            client.send(&large).await.unwrap();
            client
        });

        assert_eq!(server.recv().await.unwrap(), Bytes::new());
        assert_eq!(server.recv().await.unwrap(), Bytes::from_static(b"x"));
        assert_eq!(server.recv().await.unwrap(), Bytes::from(expected));
        writer.await.unwrap();
    }

    #[tokio::test]
    async fn test_partial_reads_are_reassembled() {
        let (mut tx, mut rx) = duplex(3);
        let writer = tokio::spawn(async move {
            write_frame(&mut tx, b"fragmented payload").await.unwrap();
        });
        assert_eq!(read_frame(&mut rx).await.unwrap(), "fragmented payload");
        writer.await.unwrap();
    }

    #[tokio::test]
    async fn test_truncated_header() {
        let mut short: &[u8] = &[0, 0];
        match read_frame(&mut short).await {
            Err(IpcError::Truncated { expected, received }) => {
                assert_eq!(expected, LENGTH_PREFIX);
                assert_eq!(received, 2);
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_truncated_payload() {
        let mut short: &[u8] = b"\x00\x00\x00\x0aabc";
        assert!(matches!(
            read_frame(&mut short).await,
            Err(IpcError::Truncated {
                expected: 10,
                received: 3
            })
        ));
    }

    #[tokio::test]
    async fn test_close_signals_end_of_stream() {
        let (client, server) = duplex(64);
        let mut client = MessageStream::new(client);
        let mut server = MessageStream::new(server);

        client.send(b"last").await.unwrap();
        client.close().await.unwrap();

        assert_eq!(server.recv().await.unwrap(), "last");
        assert!(matches!(
            server.recv().await,
            Err(IpcError::Truncated { received: 0, .. })
        ));
    }

    #[cfg(target_pointer_width = "64")]
    #[test]
    fn test_oversized_length_rejected() {
        let len = u32::MAX as usize + 1;
        assert!(matches!(encode_length(len), Err(IpcError::FrameTooLarge(n)) if n == len));
        assert_eq!(encode_length(u32::MAX as usize).unwrap(), [0xff; 4]);
    }
}
