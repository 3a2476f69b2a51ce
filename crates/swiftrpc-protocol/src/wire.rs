//! The fixed datagram header.
//!
//! Wire layout (big-endian, 26 bytes):
//!
//! | offset | field               | type |
//! |--------|---------------------|------|
//! | 0      | session_token       | u64  |
//! | 8      | rpc_id              | u32  |
//! | 12     | client_session_hint | u32  |
//! | 16     | server_session_hint | u32  |
//! | 20     | frag_number         | u16  |
//! | 22     | total_frags         | u16  |
//! | 24     | channel_id          | u8   |
//! | 25     | flags               | u8   |
//!
//! The flags byte packs the direction bit, the request-ack bit, the
//! test-only please-drop bit, and the payload kind nibble.

use std::io::{self, Cursor};

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};

/// Size of the encoded header in bytes.
pub const HEADER_LEN: usize = 26;

/// Token value of a session slot that is not live.
pub const INVALID_TOKEN: u64 = 0xCCCC_CCCC_CCCC_CCCC;

/// Hint value naming no session-table slot.
pub const INVALID_HINT: u32 = 0xCCCC_CCCC;

const DIRECTION_BIT: u8 = 0x01;
const REQUEST_ACK_BIT: u8 = 0x02;
const PLEASE_DROP_BIT: u8 = 0x04;
const PAYLOAD_KIND_SHIFT: u8 = 4;
const PAYLOAD_KIND_MASK: u8 = 0xF0;

/// Which way a datagram is travelling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// From a client session to a server session.
    ClientToServer,
    /// From a server session to a client session.
    ServerToClient,
}

/// What the bytes after the header mean.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadKind {
    /// Opaque message bytes.
    Data,
    /// An [`crate::body::AckBody`].
    Ack,
    /// Session handshake: empty as a request, a
    /// [`crate::body::SessionOpenBody`] as a response.
    SessionOpen,
    /// Server's reply to a packet whose session hint or token is stale.
    BadSession,
}

impl PayloadKind {
    fn from_nibble(nibble: u8) -> Option<Self> {
        match nibble {
            0 => Some(PayloadKind::Data),
            1 => Some(PayloadKind::Ack),
            2 => Some(PayloadKind::SessionOpen),
            3 => Some(PayloadKind::BadSession),
            _ => None,
        }
    }

    fn to_nibble(self) -> u8 {
        match self {
            PayloadKind::Data => 0,
            PayloadKind::Ack => 1,
            PayloadKind::SessionOpen => 2,
            PayloadKind::BadSession => 3,
        }
    }
}

/// The header present on every datagram.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    /// Random server-minted token authenticating session reuse.
    pub session_token: u64,
    /// Monotonic per-channel RPC identifier.
    pub rpc_id: u32,
    /// Sender-of-the-request's index into its own session table.
    pub client_session_hint: u32,
    /// Server's index into its own session table.
    pub server_session_hint: u32,
    /// 0-based index of this fragment within the message.
    pub frag_number: u16,
    /// Total fragments in the message.
    pub total_frags: u16,
    /// Which channel within the session.
    pub channel_id: u8,
    /// Travel direction.
    pub direction: Direction,
    /// Sender asks the receiver to emit an ACK after handling.
    pub request_ack: bool,
    /// Test-only lossy-link simulation; receivers drop marked frames.
    pub please_drop: bool,
    /// Payload body kind.
    pub payload_kind: PayloadKind,
}

impl Header {
    /// A header with everything zeroed out, travelling client to server,
    /// carrying data. Senders overwrite the fields they care about.
    pub fn new(direction: Direction, payload_kind: PayloadKind) -> Self {
        Self {
            session_token: INVALID_TOKEN,
            rpc_id: 0,
            client_session_hint: INVALID_HINT,
            server_session_hint: INVALID_HINT,
            frag_number: 0,
            total_frags: 0,
            channel_id: 0,
            direction,
            request_ack: false,
            please_drop: false,
            payload_kind,
        }
    }

    /// Appends the encoded header to `buffer`.
    pub fn encode_into(&self, buffer: &mut Vec<u8>) {
        // Writing into a Vec cannot fail.
        buffer.write_u64::<BigEndian>(self.session_token).unwrap();
        buffer.write_u32::<BigEndian>(self.rpc_id).unwrap();
        buffer.write_u32::<BigEndian>(self.client_session_hint).unwrap();
        buffer.write_u32::<BigEndian>(self.server_session_hint).unwrap();
        buffer.write_u16::<BigEndian>(self.frag_number).unwrap();
        buffer.write_u16::<BigEndian>(self.total_frags).unwrap();
        buffer.write_u8(self.channel_id).unwrap();
        buffer.write_u8(self.flags()).unwrap();
    }

    /// Decodes a header from the front of `frame`.
    ///
    /// Fails on short input or an unknown payload kind; callers treat either
    /// as a malformed frame and drop it.
    pub fn decode(frame: &[u8]) -> io::Result<Self> {
        if frame.len() < HEADER_LEN {
            return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "frame shorter than header"));
        }
        let mut cursor = Cursor::new(frame);
        let session_token = cursor.read_u64::<BigEndian>()?;
        let rpc_id = cursor.read_u32::<BigEndian>()?;
        let client_session_hint = cursor.read_u32::<BigEndian>()?;
        let server_session_hint = cursor.read_u32::<BigEndian>()?;
        let frag_number = cursor.read_u16::<BigEndian>()?;
        let total_frags = cursor.read_u16::<BigEndian>()?;
        let channel_id = cursor.read_u8()?;
        let flags = cursor.read_u8()?;

        let payload_kind = PayloadKind::from_nibble((flags & PAYLOAD_KIND_MASK) >> PAYLOAD_KIND_SHIFT)
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "unknown payload kind"))?;
        let direction = if flags & DIRECTION_BIT == 0 {
            Direction::ClientToServer
        } else {
            Direction::ServerToClient
        };

        Ok(Self {
            session_token,
            rpc_id,
            client_session_hint,
            server_session_hint,
            frag_number,
            total_frags,
            channel_id,
            direction,
            request_ack: flags & REQUEST_ACK_BIT != 0,
            please_drop: flags & PLEASE_DROP_BIT != 0,
            payload_kind,
        })
    }

    fn flags(&self) -> u8 {
        let mut flags = self.payload_kind.to_nibble() << PAYLOAD_KIND_SHIFT;
        if self.direction == Direction::ServerToClient {
            flags |= DIRECTION_BIT;
        }
        if self.request_ack {
            flags |= REQUEST_ACK_BIT;
        }
        if self.please_drop {
            flags |= PLEASE_DROP_BIT;
        }
        flags
    }
}
