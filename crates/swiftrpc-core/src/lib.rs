#![warn(missing_docs)]

//! swiftrpc-core: foundational types and utilities.
//!
//! This crate provides the minimal set of utilities shared across all layers:
//! - Configuration types
//! - Error handling
//! - The datagram driver abstraction and received-packet wrapper
//! - Monotonic clock abstraction
//! - Memory utilities (packet pooling, shared payload bytes, reassembly
//!   buffers backed by stolen driver memory)
//!
//! Protocol-specific logic lives in the specialized crates:
//! - `swiftrpc-protocol`: wire header and payload body codecs
//! - `swiftrpc-session`: messages, channels, sessions, timers
//! - `swiftrpc-host`: the transport dispatcher and concrete drivers

/// Reassembly buffers owning driver-backed packet memory.
pub mod assembly;
/// Monotonic tick sources.
pub mod clock;
/// Configuration options for the protocol and drivers.
pub mod config;
/// The datagram driver abstraction.
pub mod driver;
/// Error types and results.
pub mod error;
/// Packet pooling for receive/send buffer reuse.
pub mod packet_pool;
/// Shared, reference-counted byte slices with zero-copy slicing.
pub mod shared;

pub use assembly::AssemblyBuffer;
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::Config;
pub use driver::{Driver, ReceivedPacket};
pub use error::{Error, Result};
pub use shared::SharedBytes;
