//! Binary frame codec.
//!
//! Wire format, big-endian, no padding:
//!
//! ```text
//! u8   type
//! u16  field count
//! repeat field count times:
//!   u16          byte length
//!   [u8; len]    UTF-8 text
//! ```
//!
//! Decoding is lenient in two ways kept for compatibility with existing
//! browser clients: invalid UTF-8 is replaced with U+FFFD, and bytes after
//! the last declared field are ignored.

use bytes::{BufMut, Bytes, BytesMut};
use tracing::debug;

use crate::error::ProtocolError;

/// Maximum number of fields in one frame.
pub const MAX_FIELDS: usize = u16::MAX as usize;

/// Maximum UTF-8 byte length of a single field.
pub const MAX_FIELD_LEN: usize = u16::MAX as usize;

/// Size of the type byte plus the field count.
const HEADER_LEN: usize = 3;

/// Frame kinds understood by this server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MessageType {
    /// Server → client: delivered messages as `[display name, text, unix seconds]` triples.
    ReceivedMessage = 0,
    /// Client → server: `[text]` to publish.
    SendMessage = 1,
    /// Server → client: human-readable error text.
    Error = 2,
    /// Server → client: greeting sent once on connect.
    Hello = 3,
    /// Server → client: recent history, same triples as `ReceivedMessage`.
    MessageHistory = 4,
}

impl MessageType {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::ReceivedMessage),
            1 => Some(Self::SendMessage),
            2 => Some(Self::Error),
            3 => Some(Self::Hello),
            4 => Some(Self::MessageHistory),
            _ => None,
        }
    }

    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

impl From<MessageType> for u8 {
    fn from(kind: MessageType) -> u8 {
        kind as u8
    }
}

/// A single protocol unit: a type byte and an ordered list of text fields.
///
/// Size limits are checked when the frame is built, so a `Frame` always encodes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    kind: u8,
    fields: Vec<String>,
}

impl Frame {
    /// Build a frame, rejecting more than [`MAX_FIELDS`] fields or any field
    /// longer than [`MAX_FIELD_LEN`] bytes.
    pub fn new(kind: impl Into<u8>, fields: Vec<String>) -> Result<Self, ProtocolError> {
        if fields.len() > MAX_FIELDS {
            return Err(ProtocolError::FieldCountOverflow {
                count: fields.len(),
            });
        }
        if let Some((index, field)) = fields
            .iter()
            .enumerate()
            .find(|(_, f)| f.len() > MAX_FIELD_LEN)
        {
            return Err(ProtocolError::FieldTooLarge {
                index,
                len: field.len(),
            });
        }
        Ok(Self {
            kind: kind.into(),
            fields,
        })
    }

    /// Raw type byte.
    pub fn kind(&self) -> u8 {
        self.kind
    }

    /// Type byte as a known [`MessageType`], if it is one.
    pub fn message_type(&self) -> Option<MessageType> {
        MessageType::from_u8(self.kind)
    }

    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    pub fn into_fields(self) -> Vec<String> {
        self.fields
    }

    /// Number of bytes [`Frame::encode`] will produce.
    pub fn encoded_len(&self) -> usize {
        HEADER_LEN + self.fields.iter().map(|f| 2 + f.len()).sum::<usize>()
    }

    /// Serialize to wire bytes. Deterministic for a given frame.
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.encoded_len());
        buf.put_u8(self.kind);
        // Lengths were bounded in `new`.
        buf.put_u16(self.fields.len() as u16);
        for field in &self.fields {
            buf.put_u16(field.len() as u16);
            buf.put_slice(field.as_bytes());
        }
        buf.freeze()
    }

    /// Parse wire bytes.
    ///
    /// Fails with [`ProtocolError::TruncatedFrame`] when the input ends before
    /// a declared length is satisfied.
    pub fn decode(data: &[u8]) -> Result<Self, ProtocolError> {
        let mut reader = Reader { data, offset: 0 };

        let kind = reader.take(1)?[0];
        let count = reader.read_u16()?;
        // Cap the preallocation by what the input could possibly hold.
        let mut fields = Vec::with_capacity((count as usize).min(data.len() / 2));
        for _ in 0..count {
            let len = reader.read_u16()? as usize;
            let bytes = reader.take(len)?;
            fields.push(String::from_utf8_lossy(bytes).into_owned());
        }

        let trailing = data.len() - reader.offset;
        if trailing > 0 {
            debug!(kind, trailing, "ignoring trailing bytes after last field");
        }

        Ok(Self { kind, fields })
    }
}

/// Sequential big-endian reader over a byte slice.
struct Reader<'a> {
    data: &'a [u8],
    offset: usize,
}

impl<'a> Reader<'a> {
    fn take(&mut self, n: usize) -> Result<&'a [u8], ProtocolError> {
        let available = self.data.len() - self.offset;
        if available < n {
            return Err(ProtocolError::TruncatedFrame {
                offset: self.offset,
                needed: n,
                available,
            });
        }
        let slice = &self.data[self.offset..self.offset + n];
        self.offset += n;
        Ok(slice)
    }

    fn read_u16(&mut self) -> Result<u16, ProtocolError> {
        let bytes = self.take(2)?;
        Ok(u16::from_be_bytes([bytes[0], bytes[1]]))
    }
}
