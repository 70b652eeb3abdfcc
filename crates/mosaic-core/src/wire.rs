//! Mosaic wire format: how a `Message` is laid onto a byte stream.
//!
//! Every message is one frame: a fixed 8-byte header followed by a JSON
//! payload of exactly `length` bytes. The header is a zerocopy struct with a
//! compile-time size guard; changing it is a protocol break.
//!
//! One frame per direction per connection: the client writes a request, reads
//! one response, and closes. A stream that ends before the first header byte
//! is a clean close; one that ends anywhere later is a truncated frame.

use std::time::Duration;

use bytes::{BufMut, Bytes, BytesMut};
use static_assertions::assert_eq_size;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use zerocopy::{AsBytes, FromBytes, FromZeroes};

use crate::message::{Message, MessageKind, Node, Status};

// ── Frame Header ──────────────────────────────────────────────────────────────

/// Precedes every payload.
///
/// Wire size: 8 bytes.
#[derive(Debug, Clone, AsBytes, FromBytes, FromZeroes)]
#[repr(C)]
pub struct FrameHeader {
    /// Always `FRAME_MAGIC`. Anything else is not a Mosaic frame.
    pub magic: [u8; 2],

    /// Wire format version. Currently 0x01.
    pub version: u8,

    /// `MessageKind` discriminator. Must agree with the payload's variant.
    pub kind: u8,

    /// Payload length in bytes, big-endian, not including this header.
    pub length: [u8; 4],
}

// Compile-time size guard. If this fails, the wire format has silently changed.
assert_eq_size!(FrameHeader, [u8; 8]);

impl FrameHeader {
    pub fn new(kind: MessageKind, length: u32) -> Self {
        Self {
            magic: FRAME_MAGIC,
            version: FRAME_VERSION,
            kind: kind as u8,
            length: length.to_be_bytes(),
        }
    }

    pub fn payload_len(&self) -> usize {
        u32::from_be_bytes(self.length) as usize
    }

    /// Check magic, version, kind and length. Returns the kind and payload length.
    pub fn validate(&self) -> Result<(MessageKind, usize), CodecError> {
        if self.magic != FRAME_MAGIC {
            return Err(CodecError::BadMagic(self.magic));
        }
        if self.version != FRAME_VERSION {
            return Err(CodecError::UnknownVersion(self.version));
        }
        let kind = MessageKind::from_u8(self.kind).ok_or(CodecError::UnknownKind(self.kind))?;
        let len = self.payload_len();
        if len > MAX_PAYLOAD {
            return Err(CodecError::PayloadTooLarge(len));
        }
        Ok((kind, len))
    }
}

// ── Constants ─────────────────────────────────────────────────────────────────

pub const FRAME_MAGIC: [u8; 2] = *b"MZ";

/// Current frame format version.
pub const FRAME_VERSION: u8 = 0x01;

pub const HEADER_LEN: usize = std::mem::size_of::<FrameHeader>();

/// Maximum payload size in bytes. Chunk data is hex-encoded inside the JSON
/// body, so this bounds a single chunk to a little under half of it.
pub const MAX_PAYLOAD: usize = 64 * 1024 * 1024;

// ── Errors ────────────────────────────────────────────────────────────────────

/// Errors that can arise when framing or parsing a message.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("bad frame magic: {0:02x?}")]
    BadMagic([u8; 2]),

    #[error("unknown frame version: 0x{0:02x}")]
    UnknownVersion(u8),

    #[error("unknown message kind: 0x{0:02x}")]
    UnknownKind(u8),

    #[error("payload length {0} exceeds maximum {}", MAX_PAYLOAD)]
    PayloadTooLarge(usize),

    #[error("truncated frame: expected {expected} bytes, got {got}")]
    Truncated { expected: usize, got: usize },

    #[error("{0} trailing bytes after frame")]
    TrailingBytes(usize),

    #[error("header says {header:?} but payload is {payload:?}")]
    KindMismatch {
        header: MessageKind,
        payload: MessageKind,
    },

    #[error("malformed payload: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

impl CodecError {
    /// Truncation and I/O failures mean the connection went away; everything
    /// else means the bytes that did arrive were wrong.
    pub fn is_connection_loss(&self) -> bool {
        matches!(self, CodecError::Truncated { .. } | CodecError::Io(_))
    }
}

/// Why a single request/response exchange with a peer failed.
#[derive(Debug, thiserror::Error)]
pub enum ExchangeError {
    #[error("failed to connect to {node}: {source}")]
    Connect {
        node: Node,
        #[source]
        source: std::io::Error,
    },

    #[error("no response within {0:?}")]
    Timeout(Duration),

    #[error("peer closed the connection without responding")]
    Closed,

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error("expected {expected:?}, got {got:?}")]
    UnexpectedResponse {
        expected: MessageKind,
        got: MessageKind,
    },
}

impl ExchangeError {
    /// Status recorded for the peer when this error ends an exchange.
    pub fn status(&self) -> Status {
        match self {
            ExchangeError::Connect { .. } | ExchangeError::Timeout(_) | ExchangeError::Closed => {
                Status::NetworkError
            }
            ExchangeError::Codec(e) if e.is_connection_loss() => Status::NetworkError,
            ExchangeError::Codec(_) | ExchangeError::UnexpectedResponse { .. } => {
                Status::ProcessingError
            }
        }
    }
}

// ── Encoding ──────────────────────────────────────────────────────────────────

/// Encode a message into one self-delimiting frame.
pub fn encode(message: &Message) -> Result<Bytes, CodecError> {
    let payload = serde_json::to_vec(message)?;
    if payload.len() > MAX_PAYLOAD {
        return Err(CodecError::PayloadTooLarge(payload.len()));
    }

    let header = FrameHeader::new(message.kind(), payload.len() as u32);
    let mut frame = BytesMut::with_capacity(HEADER_LEN + payload.len());
    frame.put_slice(header.as_bytes());
    frame.put_slice(&payload);
    Ok(frame.freeze())
}

/// Decode exactly one frame. The slice must hold the whole frame and nothing else.
pub fn decode(frame: &[u8]) -> Result<Message, CodecError> {
    let header = FrameHeader::read_from_prefix(frame).ok_or(CodecError::Truncated {
        expected: HEADER_LEN,
        got: frame.len(),
    })?;
    let (kind, len) = header.validate()?;

    let body = &frame[HEADER_LEN..];
    if body.len() < len {
        return Err(CodecError::Truncated {
            expected: len,
            got: body.len(),
        });
    }
    if body.len() > len {
        return Err(CodecError::TrailingBytes(body.len() - len));
    }
    decode_payload(kind, body)
}

fn decode_payload(kind: MessageKind, payload: &[u8]) -> Result<Message, CodecError> {
    let message: Message = serde_json::from_slice(payload)?;
    if message.kind() != kind {
        return Err(CodecError::KindMismatch {
            header: kind,
            payload: message.kind(),
        });
    }
    Ok(message)
}

// ── Stream helpers ────────────────────────────────────────────────────────────

/// Read one frame from a stream.
///
/// `Ok(None)` means the peer closed cleanly before sending anything.
pub async fn read_message<R>(reader: &mut R) -> Result<Option<Message>, CodecError>
where
    R: AsyncRead + Unpin,
{
    let mut header_buf = [0u8; HEADER_LEN];
    let got = read_full(reader, &mut header_buf).await?;
    if got == 0 {
        return Ok(None);
    }
    if got < HEADER_LEN {
        return Err(CodecError::Truncated {
            expected: HEADER_LEN,
            got,
        });
    }

    let header = FrameHeader::read_from(&header_buf[..]).ok_or(CodecError::Truncated {
        expected: HEADER_LEN,
        got,
    })?;
    let (kind, len) = header.validate()?;

    let mut payload = vec![0u8; len];
    let got = read_full(reader, &mut payload).await?;
    if got < len {
        return Err(CodecError::Truncated { expected: len, got });
    }
    decode_payload(kind, &payload).map(Some)
}

/// Write one frame and flush.
pub async fn write_message<W>(writer: &mut W, message: &Message) -> Result<(), CodecError>
where
    W: AsyncWrite + Unpin,
{
    let frame = encode(message)?;
    writer.write_all(&frame).await?;
    writer.flush().await?;
    Ok(())
}

/// Fill `buf` until it is full or the stream ends. Returns bytes read.
async fn read_full<R>(reader: &mut R, buf: &mut [u8]) -> Result<usize, CodecError>
where
    R: AsyncRead + Unpin,
{
    let mut filled = 0;
    while filled < buf.len() {
        let n = reader.read(&mut buf[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
