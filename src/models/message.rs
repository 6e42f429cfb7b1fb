use std::fmt;

/// Terminator appended to every outbound command
pub const LINE_TERMINATOR: &[u8] = b"\r\n";

const READY_TEXT: &str = "[SYSTEM] PORT OPENED\r\n";

/// One user command on its way to the device, terminator included.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    bytes: Vec<u8>,
}

impl OutboundMessage {
    /// Encode a typed command and append CR+LF.
    pub fn from_command(command: &str) -> Self {
        let mut bytes = Vec::with_capacity(command.len() + LINE_TERMINATOR.len());
        bytes.extend_from_slice(command.as_bytes());
        bytes.extend_from_slice(LINE_TERMINATOR);
        Self { bytes }
    }

    /// Wrap bytes that are already framed (used on the worker side of a pipe).
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// What an inbound chunk carries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChunkKind {
    /// Raw bytes read from the device
    Data,
    /// The worker opened the device
    Ready,
    /// The worker could not open the device and has stopped
    OpenFailed,
    /// The worker went away without being asked to
    WorkerExited,
}

impl ChunkKind {
    pub fn is_system(self) -> bool {
        !matches!(self, ChunkKind::Data)
    }

    pub fn is_fatal(self) -> bool {
        matches!(self, ChunkKind::OpenFailed | ChunkKind::WorkerExited)
    }
}

/// Bytes observed at one poll instant, or a system notice from the worker.
///
/// Chunk boundaries follow whatever the driver returned and have no relation
/// to line boundaries.
#[derive(Clone, PartialEq, Eq)]
pub struct InboundChunk {
    kind: ChunkKind,
    bytes: Vec<u8>,
}

impl InboundChunk {
    pub fn data(bytes: Vec<u8>) -> Self {
        Self {
            kind: ChunkKind::Data,
            bytes,
        }
    }

    pub fn ready() -> Self {
        Self {
            kind: ChunkKind::Ready,
            bytes: READY_TEXT.as_bytes().to_vec(),
        }
    }

    pub fn open_failed(error: impl fmt::Display) -> Self {
        Self {
            kind: ChunkKind::OpenFailed,
            bytes: format!("[SYSTEM] ERROR: {}\r\n", error).into_bytes(),
        }
    }

    pub fn worker_exited(detail: impl fmt::Display) -> Self {
        Self {
            kind: ChunkKind::WorkerExited,
            bytes: format!("[SYSTEM] WORKER EXITED: {}\r\n", detail).into_bytes(),
        }
    }

    /// Rebuild a chunk received over the process pipe.
    pub fn from_parts(kind: ChunkKind, bytes: Vec<u8>) -> Self {
        Self { kind, bytes }
    }

    pub fn kind(&self) -> ChunkKind {
        self.kind
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl fmt::Debug for InboundChunk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InboundChunk")
            .field("kind", &self.kind)
            .field("bytes", &String::from_utf8_lossy(&self.bytes))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_gets_crlf() {
        let msg = OutboundMessage::from_command("AT");
        assert_eq!(msg.as_bytes(), b"AT\r\n");
        assert_eq!(msg.len(), 4);
    }

    #[test]
    fn test_system_chunks() {
        let ready = InboundChunk::ready();
        assert_eq!(ready.kind(), ChunkKind::Ready);
        assert!(ready.kind().is_system());
        assert!(!ready.kind().is_fatal());

        let failed = InboundChunk::open_failed("Permission denied");
        assert!(failed.kind().is_fatal());
        assert_eq!(failed.bytes(), b"[SYSTEM] ERROR: Permission denied\r\n");
    }

    #[test]
    fn test_data_chunk_is_not_system() {
        let chunk = InboundChunk::data(b"OK\r\n".to_vec());
        assert!(!chunk.kind().is_system());
        assert_eq!(chunk.len(), 4);
    }
}
