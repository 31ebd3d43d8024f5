//! Length-prefixed framing over async byte streams.
//!
//! A frame is a 4-byte big-endian payload length followed by the payload.
//! [`read_frame`] distinguishes a clean end of stream (EOF exactly at a
//! frame boundary, `Ok(None)`) from a truncation mid-frame
//! ([`FrameError::Truncated`]).

use crate::error::{FrameError, WireResult};
use crate::message::Message;
use bytes::{Buf, BufMut, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Size of the length prefix, in bytes.
pub const PREFIX_LEN: usize = 4;

/// Largest payload a frame may declare.
///
/// A frame above this limit is rejected before its body is read, so a
/// corrupt or hostile length prefix cannot trigger a huge allocation.
pub const MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

/// Writes one frame: length prefix plus payload, as a single write.
pub async fn write_frame<W>(writer: &mut W, payload: &[u8]) -> Result<(), FrameError>
where
    W: AsyncWrite + Unpin,
{
    if payload.len() > MAX_FRAME_LEN {
        return Err(FrameError::Oversized {
            len: payload.len(),
            max: MAX_FRAME_LEN,
        });
    }

    let mut buf = BytesMut::with_capacity(PREFIX_LEN + payload.len());
    buf.put_u32(payload.len() as u32);
    buf.put_slice(payload);
    writer.write_all(&buf).await?;
    writer.flush().await?;
    Ok(())
}

/// Reads one frame payload.
///
/// Returns `Ok(None)` if the stream ended cleanly before any prefix byte
/// arrived. EOF anywhere inside a frame is [`FrameError::Truncated`].
pub async fn read_frame<R>(reader: &mut R) -> Result<Option<Vec<u8>>, FrameError>
where
    R: AsyncRead + Unpin,
{
    let mut prefix = [0u8; PREFIX_LEN];
    let mut filled = 0;
    while filled < PREFIX_LEN {
        let n = reader.read(&mut prefix[filled..]).await?;
        if n == 0 {
            if filled == 0 {
                return Ok(None);
            }
            return Err(FrameError::Truncated);
        }
        filled += n;
    }

    let len = u32::from_be_bytes(prefix) as usize;
    if len > MAX_FRAME_LEN {
        return Err(FrameError::Oversized {
            len,
            max: MAX_FRAME_LEN,
        });
    }

    let mut payload = vec![0u8; len];
    reader
        .read_exact(&mut payload)
        .await
        .map_err(|e| match e.kind() {
            std::io::ErrorKind::UnexpectedEof => FrameError::Truncated,
            _ => FrameError::Io(e),
        })?;
    Ok(Some(payload))
}

/// Incremental frame reader that keeps partial bytes across reads.
///
/// [`read_frame`] holds partially-read prefix and payload bytes in locals,
/// so dropping its future mid-frame (for example when it loses a
/// `select!` race) loses those bytes and desynchronizes the stream.
/// `FrameReader` instead accumulates into an internal buffer via
/// `read_buf`, whose await point either appends the bytes read or reads
/// nothing. [`FrameReader::next_message`] is therefore cancel-safe and is
/// the required inbound path wherever reads race other branches.
pub struct FrameReader<R> {
    reader: R,
    buf: BytesMut,
}

impl<R> FrameReader<R>
where
    R: AsyncRead + Unpin,
{
    /// Wraps a byte stream.
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            buf: BytesMut::with_capacity(4 * 1024),
        }
    }

    /// Reads the next frame payload.
    ///
    /// Returns `Ok(None)` if the stream ended cleanly at a frame boundary.
    /// EOF inside a frame is [`FrameError::Truncated`]. Cancel-safe: a
    /// frame in progress survives in the buffer and is completed by the
    /// next call.
    pub async fn next_frame(&mut self) -> Result<Option<BytesMut>, FrameError> {
        loop {
            if let Some(payload) = self.extract_frame()? {
                return Ok(Some(payload));
            }
            let n = self.reader.read_buf(&mut self.buf).await?;
            if n == 0 {
                if self.buf.is_empty() {
                    return Ok(None);
                }
                return Err(FrameError::Truncated);
            }
        }
    }

    /// Reads and decodes the next message. `Ok(None)` on clean EOF.
    /// Cancel-safe, like [`FrameReader::next_frame`].
    pub async fn next_message(&mut self) -> WireResult<Option<Message>> {
        match self.next_frame().await? {
            Some(payload) => Ok(Some(Message::decode(&payload)?)),
            None => Ok(None),
        }
    }

    fn extract_frame(&mut self) -> Result<Option<BytesMut>, FrameError> {
        if self.buf.len() < PREFIX_LEN {
            return Ok(None);
        }
        let mut prefix = [0u8; PREFIX_LEN];
        prefix.copy_from_slice(&self.buf[..PREFIX_LEN]);
        let len = u32::from_be_bytes(prefix) as usize;
        if len > MAX_FRAME_LEN {
            return Err(FrameError::Oversized {
                len,
                max: MAX_FRAME_LEN,
            });
        }
        if self.buf.len() < PREFIX_LEN + len {
            return Ok(None);
        }
        self.buf.advance(PREFIX_LEN);
        Ok(Some(self.buf.split_to(len)))
    }
}

/// Encodes and writes one message as a frame.
pub async fn write_message<W>(writer: &mut W, message: &Message) -> WireResult<()>
where
    W: AsyncWrite + Unpin,
{
    let payload = message.encode()?;
    write_frame(writer, &payload).await?;
    Ok(())
}

/// Reads and decodes one message. `Ok(None)` on clean EOF.
pub async fn read_message<R>(reader: &mut R) -> WireResult<Option<Message>>
where
    R: AsyncRead + Unpin,
{
    match read_frame(reader).await? {
        Some(payload) => Ok(Some(Message::decode(&payload)?)),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::WireError;
    use crate::message::ItemId;

    fn get_item(request_id: u64, item_id: ItemId) -> Message {
        Message::GetItem {
            request_id,
            item_id,
        }
    }

    #[tokio::test]
    async fn roundtrip_single_frame() {
        let mut buf = Vec::new();
        write_frame(&mut buf, b"hello").await.unwrap();

        let mut reader = buf.as_slice();
        let payload = read_frame(&mut reader).await.unwrap().unwrap();
        assert_eq!(payload, b"hello");
        assert!(read_frame(&mut reader).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn coalesced_frames_decode_separately() {
        // Two messages written back to back land in one contiguous buffer,
        // as a stream transport is free to deliver them in one read.
        let mut buf = Vec::new();
        write_message(&mut buf, &get_item(1, 10)).await.unwrap();
        write_message(&mut buf, &get_item(2, 20)).await.unwrap();

        let mut reader = buf.as_slice();
        let first = read_message(&mut reader).await.unwrap().unwrap();
        let second = read_message(&mut reader).await.unwrap().unwrap();
        assert_eq!(first, get_item(1, 10));
        assert_eq!(second, get_item(2, 20));
        assert!(read_message(&mut reader).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn split_frame_reassembles() {
        // Deliver one frame a few bytes at a time across a duplex pipe.
        let (client, mut server) = tokio::io::duplex(8);

        let writer = tokio::spawn(async move {
            let mut client = client;
            write_message(&mut client, &get_item(3, 30)).await.unwrap();
        });

        let msg = read_message(&mut server).await.unwrap().unwrap();
        assert_eq!(msg, get_item(3, 30));
        writer.await.unwrap();
    }

    #[tokio::test]
    async fn empty_stream_is_clean_eof() {
        let mut reader: &[u8] = &[];
        assert!(read_frame(&mut reader).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn truncated_prefix_is_an_error() {
        let mut reader: &[u8] = &[0, 0];
        let err = read_frame(&mut reader).await.unwrap_err();
        assert!(matches!(err, FrameError::Truncated));
    }

    #[tokio::test]
    async fn truncated_body_is_an_error() {
        let mut buf = Vec::new();
        write_frame(&mut buf, b"hello").await.unwrap();
        buf.truncate(buf.len() - 2);

        let mut reader = buf.as_slice();
        let err = read_frame(&mut reader).await.unwrap_err();
        assert!(matches!(err, FrameError::Truncated));
    }

    #[tokio::test]
    async fn oversized_declared_length_is_rejected() {
        let len = (MAX_FRAME_LEN as u32) + 1;
        let buf = len.to_be_bytes().to_vec();

        let mut reader = buf.as_slice();
        let err = read_frame(&mut reader).await.unwrap_err();
        assert!(matches!(err, FrameError::Oversized { .. }));
    }

    #[tokio::test]
    async fn frame_reader_extracts_coalesced_frames() {
        let mut buf = Vec::new();
        write_message(&mut buf, &get_item(1, 10)).await.unwrap();
        write_message(&mut buf, &get_item(2, 20)).await.unwrap();

        let mut reader = FrameReader::new(buf.as_slice());
        assert_eq!(reader.next_message().await.unwrap().unwrap(), get_item(1, 10));
        assert_eq!(reader.next_message().await.unwrap().unwrap(), get_item(2, 20));
        assert!(reader.next_message().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn frame_reader_survives_cancellation_mid_frame() {
        let (mut client, server) = tokio::io::duplex(64);
        let mut reader = FrameReader::new(server);

        let payload = get_item(4, 40).encode().unwrap();
        let mut framed = Vec::new();
        write_frame(&mut framed, &payload).await.unwrap();
        let (head, tail) = framed.split_at(3);

        // Deliver part of the frame, then drop the read future mid-frame.
        client.write_all(head).await.unwrap();
        let aborted = tokio::time::timeout(
            std::time::Duration::from_millis(20),
            reader.next_message(),
        )
        .await;
        assert!(aborted.is_err());

        // The buffered bytes must survive; the frame completes on the
        // next call.
        client.write_all(tail).await.unwrap();
        let msg = reader.next_message().await.unwrap().unwrap();
        assert_eq!(msg, get_item(4, 40));
    }

    #[tokio::test]
    async fn frame_reader_truncation_and_oversize() {
        let mut buf = Vec::new();
        write_frame(&mut buf, b"hello").await.unwrap();
        buf.truncate(buf.len() - 2);
        let mut reader = FrameReader::new(buf.as_slice());
        let err = reader.next_frame().await.unwrap_err();
        assert!(matches!(err, FrameError::Truncated));

        let len = (MAX_FRAME_LEN as u32) + 1;
        let buf = len.to_be_bytes().to_vec();
        let mut reader = FrameReader::new(buf.as_slice());
        let err = reader.next_frame().await.unwrap_err();
        assert!(matches!(err, FrameError::Oversized { .. }));
    }

    #[tokio::test]
    async fn malformed_payload_is_a_wire_error() {
        let mut buf = Vec::new();
        write_frame(&mut buf, b"not json").await.unwrap();

        let mut reader = buf.as_slice();
        let err = read_message(&mut reader).await.unwrap_err();
        assert!(matches!(err, WireError::Malformed(_)));
    }
}
