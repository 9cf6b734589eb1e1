use bytes::{BufMut, Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::trace;

use crate::error::{FrameError, Result};

/// Frame header: a 4-byte big-endian payload length.
pub const LEN_PREFIX_SIZE: usize = 4;

/// Upper bound (exclusive) on the payload length. A header outside
/// `0 < len < MAX_FRAME_LEN` is a protocol violation and tears the
/// connection down.
pub const MAX_FRAME_LEN: u32 = 10_000_000;

/// Configuration for the frame codec.
#[derive(Debug, Clone)]
pub struct FrameConfig {
    /// Exclusive maximum payload length. Default: [`MAX_FRAME_LEN`].
    pub max_frame_len: u32,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            max_frame_len: MAX_FRAME_LEN,
        }
    }
}

/// Encode a payload into the wire format.
///
/// Wire format:
/// ```text
/// ┌───────────────┬──────────────────┐
/// │ Length (4B BE)│ Payload (N bytes)│
/// └───────────────┴──────────────────┘
/// ```
pub fn encode_frame(payload: &[u8], dst: &mut BytesMut) {
    dst.reserve(LEN_PREFIX_SIZE + payload.len());
    dst.put_u32(payload.len() as u32);
    dst.put_slice(payload);
}

/// Reads complete frames from any async byte stream.
///
/// Handles partial reads internally — callers always get complete payloads.
pub struct FrameReader<R> {
    inner: R,
    config: FrameConfig,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    /// Create a new frame reader with default configuration.
    pub fn new(inner: R) -> Self {
        Self::with_config(inner, FrameConfig::default())
    }

    /// Create a new frame reader with explicit configuration.
    pub fn with_config(inner: R, config: FrameConfig) -> Self {
        Self { inner, config }
    }

    /// Read the next complete frame payload.
    ///
    /// Reads exactly four header bytes, validates the decoded length, then
    /// reads exactly that many payload bytes. End-of-input before either
    /// part is complete fails with [`FrameError::ConnectionClosed`].
    pub async fn receive(&mut self) -> Result<Bytes> {
        let mut header = [0u8; LEN_PREFIX_SIZE];
        read_full(&mut self.inner, &mut header).await?;

        let len = u32::from_be_bytes(header);
        if len == 0 || len >= self.config.max_frame_len {
            return Err(FrameError::InvalidFrameLength(len));
        }

        let mut payload = vec![0u8; len as usize];
        read_full(&mut self.inner, &mut payload).await?;
        trace!(len, "received frame");
        Ok(Bytes::from(payload))
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &R {
        &self.inner
    }

    /// Consume the reader and return the inner stream.
    pub fn into_inner(self) -> R {
        self.inner
    }

    /// Current frame reader configuration.
    pub fn config(&self) -> &FrameConfig {
        &self.config
    }
}

/// Fill `buf` completely, failing with `ConnectionClosed` on EOF.
async fn read_full<R: AsyncRead + Unpin>(inner: &mut R, buf: &mut [u8]) -> Result<()> {
    let mut filled = 0usize;
    while filled < buf.len() {
        let read = match inner.read(&mut buf[filled..]).await {
            Ok(n) => n,
            Err(err) if err.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(FrameError::Io(err)),
        };
        if read == 0 {
            return Err(FrameError::ConnectionClosed);
        }
        filled += read;
    }
    Ok(())
}

/// Writes complete frames to any async byte stream.
pub struct FrameWriter<W> {
    inner: W,
    buf: BytesMut,
    config: FrameConfig,
}

impl<W: AsyncWrite + Unpin> FrameWriter<W> {
    /// Create a new frame writer with default configuration.
    pub fn new(inner: W) -> Self {
        Self::with_config(inner, FrameConfig::default())
    }

    /// Create a new frame writer with explicit configuration.
    pub fn with_config(inner: W, config: FrameConfig) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(8 * 1024),
            config,
        }
    }

    /// Encode and write a payload as a single frame, then flush.
    pub async fn send(&mut self, payload: &[u8]) -> Result<()> {
        let len = u32::try_from(payload.len()).unwrap_or(u32::MAX);
        if len == 0 || len >= self.config.max_frame_len {
            return Err(FrameError::InvalidFrameLength(len));
        }

        self.buf.clear();
        encode_frame(payload, &mut self.buf);
        self.inner.write_all(&self.buf).await?;
        self.inner.flush().await?;
        Ok(())
    }

    /// Shut down the underlying stream, signalling EOF to the peer.
    pub async fn shutdown(&mut self) -> Result<()> {
        self.inner.shutdown().await?;
        Ok(())
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &W {
        &self.inner
    }

    /// Consume the writer and return the inner stream.
    pub fn into_inner(self) -> W {
        self.inner
    }

    /// Current frame writer configuration.
    pub fn config(&self) -> &FrameConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_prepends_big_endian_length() {
        let mut buf = BytesMut::new();
        encode_frame(b"hello", &mut buf);

        assert_eq!(&buf[..LEN_PREFIX_SIZE], &[0, 0, 0, 5]);
        assert_eq!(&buf[LEN_PREFIX_SIZE..], b"hello");
    }

    #[tokio::test]
    async fn receive_single_frame() {
        let mut wire = BytesMut::new();
        encode_frame(b"hello", &mut wire);

        let mut reader = FrameReader::new(&wire[..]);
        let payload = reader.receive().await.unwrap();
        assert_eq!(payload.as_ref(), b"hello");
    }

    #[tokio::test]
    async fn receive_multiple_frames_in_order() {
        let mut wire = BytesMut::new();
        encode_frame(b"one", &mut wire);
        encode_frame(b"two", &mut wire);
        encode_frame(b"three", &mut wire);

        let mut reader = FrameReader::new(&wire[..]);
        assert_eq!(reader.receive().await.unwrap().as_ref(), b"one");
        assert_eq!(reader.receive().await.unwrap().as_ref(), b"two");
        assert_eq!(reader.receive().await.unwrap().as_ref(), b"three");
    }

    #[tokio::test]
    async fn zero_length_header_rejected() {
        let wire = [0u8, 0, 0, 0];
        let mut reader = FrameReader::new(&wire[..]);
        let err = reader.receive().await.unwrap_err();
        assert!(matches!(err, FrameError::InvalidFrameLength(0)));
    }

    #[tokio::test]
    async fn oversized_header_rejected() {
        let wire = (MAX_FRAME_LEN + 1).to_be_bytes();
        let mut reader = FrameReader::new(&wire[..]);
        let err = reader.receive().await.unwrap_err();
        assert!(matches!(err, FrameError::InvalidFrameLength(n) if n > MAX_FRAME_LEN));
    }

    #[tokio::test]
    async fn clean_eof_is_connection_closed() {
        let mut reader = FrameReader::new(&[][..]);
        let err = reader.receive().await.unwrap_err();
        assert!(matches!(err, FrameError::ConnectionClosed));
    }

    #[tokio::test]
    async fn eof_mid_header_is_connection_closed() {
        let wire = [0u8, 0];
        let mut reader = FrameReader::new(&wire[..]);
        let err = reader.receive().await.unwrap_err();
        assert!(matches!(err, FrameError::ConnectionClosed));
    }

    #[tokio::test]
    async fn eof_mid_payload_is_connection_closed() {
        let mut wire = BytesMut::new();
        encode_frame(b"truncated-later", &mut wire);
        wire.truncate(LEN_PREFIX_SIZE + 4);

        let mut reader = FrameReader::new(&wire[..]);
        let err = reader.receive().await.unwrap_err();
        assert!(matches!(err, FrameError::ConnectionClosed));
    }

    #[tokio::test]
    async fn send_rejects_empty_payload() {
        let mut writer = FrameWriter::new(Vec::new());
        let err = writer.send(b"").await.unwrap_err();
        assert!(matches!(err, FrameError::InvalidFrameLength(0)));
    }

    #[tokio::test]
    async fn send_rejects_oversized_payload() {
        let cfg = FrameConfig { max_frame_len: 8 };
        let mut writer = FrameWriter::with_config(Vec::new(), cfg);
        let err = writer.send(b"way too large").await.unwrap_err();
        assert!(matches!(err, FrameError::InvalidFrameLength(_)));
    }

    #[tokio::test]
    async fn roundtrip_over_duplex_pipe() {
        let (client, server) = tokio::io::duplex(64);
        let (server_rd, _server_wr) = tokio::io::split(server);
        let (_client_rd, client_wr) = tokio::io::split(client);

        let mut writer = FrameWriter::new(client_wr);
        let mut reader = FrameReader::new(server_rd);

        writer.send(b"ping").await.unwrap();
        let payload = reader.receive().await.unwrap();
        assert_eq!(payload.as_ref(), b"ping");
    }

    #[tokio::test]
    async fn partial_delivery_is_reassembled() {
        let mut wire = BytesMut::new();
        encode_frame(&vec![0xAB; 64 * 1024], &mut wire);

        // A 16-byte duplex buffer forces many short reads.
        let (client, server) = tokio::io::duplex(16);
        let (server_rd, _server_wr) = tokio::io::split(server);
        let (_client_rd, mut client_wr) = tokio::io::split(client);

        let feeder = tokio::spawn(async move {
            client_wr.write_all(&wire).await.unwrap();
            client_wr.shutdown().await.unwrap();
        });

        let mut reader = FrameReader::new(server_rd);
        let payload = reader.receive().await.unwrap();
        assert_eq!(payload.len(), 64 * 1024);
        assert!(payload.iter().all(|&b| b == 0xAB));

        feeder.await.unwrap();
    }

    #[test]
    fn error_descriptions_are_informative() {
        let errors = [
            FrameError::InvalidFrameLength(0),
            FrameError::ConnectionClosed,
            FrameError::IncompleteRead {
                got: 2,
                expected: 4,
            },
        ];
        for err in errors {
            assert!(!err.to_string().is_empty());
        }
    }
}
