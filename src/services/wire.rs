//! Frame codec for the worker process pipes.
//!
//! Every frame is a one byte tag, a big-endian `u32` payload length and the
//! payload. Control frames travel UI -> worker on the child's stdin, chunk
//! frames travel worker -> UI on its stdout. Frame boundaries preserve
//! message and chunk boundaries, so the channel pair keeps its FIFO
//! semantics across the process boundary.

use crate::models::{ChunkKind, InboundChunk, OutboundMessage};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Largest payload either side will accept
pub const MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

const TAG_COMMAND: u8 = 0x01;
const TAG_STOP: u8 = 0x02;

const TAG_DATA: u8 = 0x10;
const TAG_READY: u8 = 0x11;
const TAG_OPEN_FAILED: u8 = 0x12;
const TAG_WORKER_EXITED: u8 = 0x13;

#[derive(Error, Debug)]
pub enum WireError {
    #[error("pipe I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("unknown frame tag 0x{0:02x}")]
    UnknownTag(u8),

    #[error("frame of {0} bytes exceeds the {MAX_FRAME_LEN} byte limit")]
    TooLarge(usize),

    #[error("stream ended inside a frame")]
    Truncated,
}

/// UI -> worker frames
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlFrame {
    Command(OutboundMessage),
    /// Ask the worker to stop; nothing follows it
    Stop,
}

fn chunk_tag(kind: ChunkKind) -> u8 {
    match kind {
        ChunkKind::Data => TAG_DATA,
        ChunkKind::Ready => TAG_READY,
        ChunkKind::OpenFailed => TAG_OPEN_FAILED,
        ChunkKind::WorkerExited => TAG_WORKER_EXITED,
    }
}

fn chunk_kind(tag: u8) -> Result<ChunkKind, WireError> {
    match tag {
        TAG_DATA => Ok(ChunkKind::Data),
        TAG_READY => Ok(ChunkKind::Ready),
        TAG_OPEN_FAILED => Ok(ChunkKind::OpenFailed),
        TAG_WORKER_EXITED => Ok(ChunkKind::WorkerExited),
        other => Err(WireError::UnknownTag(other)),
    }
}

async fn write_frame<W>(writer: &mut W, tag: u8, payload: &[u8]) -> Result<(), WireError>
where
    W: AsyncWrite + Unpin,
{
    if payload.len() > MAX_FRAME_LEN {
        return Err(WireError::TooLarge(payload.len()));
    }
    writer.write_u8(tag).await?;
    writer.write_u32(payload.len() as u32).await?;
    writer.write_all(payload).await?;
    writer.flush().await?;
    Ok(())
}

/// Read one raw frame. `Ok(None)` means the stream ended cleanly between frames.
async fn read_frame<R>(reader: &mut R) -> Result<Option<(u8, Vec<u8>)>, WireError>
where
    R: AsyncRead + Unpin,
{
    let tag = match reader.read_u8().await {
        Ok(tag) => tag,
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    };

    let len = reader.read_u32().await.map_err(truncated)? as usize;
    if len > MAX_FRAME_LEN {
        return Err(WireError::TooLarge(len));
    }

    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload).await.map_err(truncated)?;
    Ok(Some((tag, payload)))
}

fn truncated(e: std::io::Error) -> WireError {
    if e.kind() == std::io::ErrorKind::UnexpectedEof {
        WireError::Truncated
    } else {
        WireError::Io(e)
    }
}

pub async fn write_control<W>(writer: &mut W, frame: &ControlFrame) -> Result<(), WireError>
where
    W: AsyncWrite + Unpin,
{
    match frame {
        ControlFrame::Command(message) => write_frame(writer, TAG_COMMAND, message.as_bytes()).await,
        ControlFrame::Stop => write_frame(writer, TAG_STOP, &[]).await,
    }
}

pub async fn read_control<R>(reader: &mut R) -> Result<Option<ControlFrame>, WireError>
where
    R: AsyncRead + Unpin,
{
    match read_frame(reader).await? {
        None => Ok(None),
        Some((TAG_COMMAND, payload)) => Ok(Some(ControlFrame::Command(OutboundMessage::from_bytes(payload)))),
        Some((TAG_STOP, _)) => Ok(Some(ControlFrame::Stop)),
        Some((tag, _)) => Err(WireError::UnknownTag(tag)),
    }
}

pub async fn write_chunk<W>(writer: &mut W, chunk: &InboundChunk) -> Result<(), WireError>
where
    W: AsyncWrite + Unpin,
{
    write_frame(writer, chunk_tag(chunk.kind()), chunk.bytes()).await
}

pub async fn read_chunk<R>(reader: &mut R) -> Result<Option<InboundChunk>, WireError>
where
    R: AsyncRead + Unpin,
{
    match read_frame(reader).await? {
        None => Ok(None),
        Some((tag, payload)) => Ok(Some(InboundChunk::from_parts(chunk_kind(tag)?, payload))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::duplex;

    #[tokio::test]
    async fn test_control_frames_in_order() {
        let (mut a, mut b) = duplex(1024);

        write_control(&mut a, &ControlFrame::Command(OutboundMessage::from_command("AT")))
            .await
            .unwrap();
        write_control(&mut a, &ControlFrame::Stop).await.unwrap();
        drop(a);

        let first = read_control(&mut b).await.unwrap();
        assert_eq!(
            first,
            Some(ControlFrame::Command(OutboundMessage::from_bytes(b"AT\r\n".to_vec())))
        );
        assert_eq!(read_control(&mut b).await.unwrap(), Some(ControlFrame::Stop));
        assert_eq!(read_control(&mut b).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_chunk_kind_survives() {
        let (mut a, mut b) = duplex(1024);
        write_chunk(&mut a, &InboundChunk::ready()).await.unwrap();
        write_chunk(&mut a, &InboundChunk::data(vec![0xff, 0x00, b'\r'])).await.unwrap();
        drop(a);

        let ready = read_chunk(&mut b).await.unwrap().unwrap();
        assert_eq!(ready.kind(), ChunkKind::Ready);

        let data = read_chunk(&mut b).await.unwrap().unwrap();
        assert_eq!(data.kind(), ChunkKind::Data);
        assert_eq!(data.bytes(), &[0xff, 0x00, b'\r']);
    }

    #[tokio::test]
    async fn test_eof_mid_frame_is_truncated() {
        let (mut a, mut b) = duplex(64);
        a.write_u8(TAG_DATA).await.unwrap();
        a.write_u32(10).await.unwrap();
        a.write_all(b"abc").await.unwrap();
        drop(a);

        assert!(matches!(read_chunk(&mut b).await, Err(WireError::Truncated)));
    }

    #[tokio::test]
    async fn test_unknown_tag_rejected() {
        let (mut a, mut b) = duplex(64);
        write_frame(&mut a, 0x7f, b"x").await.unwrap();
        drop(a);

        assert!(matches!(read_chunk(&mut b).await, Err(WireError::UnknownTag(0x7f))));
    }

    #[tokio::test]
    async fn test_oversized_length_rejected() {
        let (mut a, mut b) = duplex(64);
        a.write_u8(TAG_COMMAND).await.unwrap();
        a.write_u32(u32::MAX).await.unwrap();
        drop(a);

        assert!(matches!(read_control(&mut b).await, Err(WireError::TooLarge(_))));
    }
}
