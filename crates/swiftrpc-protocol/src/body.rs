//! Payload bodies carried after the header.

use std::io::{self, Cursor};

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};

use crate::wire::HEADER_LEN;

/// Encoded size of an [`AckBody`].
pub const ACK_BODY_LEN: usize = 6;

/// Selective acknowledgment state of an inbound message.
///
/// `first_missing_frag` is the lowest fragment the receiver has not yet
/// appended in order. Bit `i` of `staging_vector` set means the fragment at
/// `first_missing_frag + 1 + i` is already staged out of order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AckBody {
    /// Lowest fragment index not yet received in order.
    pub first_missing_frag: u16,
    /// Occupancy bitmap of the receiver's staging ring.
    pub staging_vector: u32,
}

impl AckBody {
    /// Appends the encoded body to `buffer`.
    pub fn encode_into(&self, buffer: &mut Vec<u8>) {
        buffer.write_u16::<BigEndian>(self.first_missing_frag).unwrap();
        buffer.write_u32::<BigEndian>(self.staging_vector).unwrap();
    }

    /// Decodes the body that follows the header in `frame`.
    pub fn decode(frame: &[u8]) -> io::Result<Self> {
        if frame.len() < HEADER_LEN + ACK_BODY_LEN {
            return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "truncated ack body"));
        }
        let mut cursor = Cursor::new(&frame[HEADER_LEN..]);
        Ok(Self {
            first_missing_frag: cursor.read_u16::<BigEndian>()?,
            staging_vector: cursor.read_u32::<BigEndian>()?,
        })
    }
}

/// Body of a session-open response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionOpenBody {
    /// Highest channel id the server will accept on this session.
    pub max_channel_id: u8,
}

impl SessionOpenBody {
    /// Appends the encoded body to `buffer`.
    pub fn encode_into(&self, buffer: &mut Vec<u8>) {
        buffer.write_u8(self.max_channel_id).unwrap();
    }

    /// Decodes the body that follows the header in `frame`.
    pub fn decode(frame: &[u8]) -> io::Result<Self> {
        match frame.get(HEADER_LEN) {
            Some(&max_channel_id) => Ok(Self { max_channel_id }),
            None => Err(io::Error::new(io::ErrorKind::UnexpectedEof, "truncated session open body")),
        }
    }
}
