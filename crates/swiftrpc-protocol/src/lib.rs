#![warn(missing_docs)]

//! swiftrpc-protocol: wire framing for the datagram transport.
//!
//! Every datagram starts with a fixed [`wire::Header`]; what follows is one
//! of the payload bodies in [`body`]. Layout is explicit big-endian integer
//! fields, never in-memory struct packing, so the format is identical on
//! every platform.

/// ACK and session-open payload bodies.
pub mod body;
/// The fixed datagram header and its flag fields.
pub mod wire;

pub use body::{AckBody, SessionOpenBody};
pub use wire::{Direction, Header, PayloadKind, HEADER_LEN, INVALID_HINT, INVALID_TOKEN};
