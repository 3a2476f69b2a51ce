//! swiftrpc-host: the transport dispatcher and concrete drivers.
//!
//! [`Transport`] is the top-level object: it owns the driver, both session
//! tables, the server-side ready queue, and the timer list, and drives all
//! progress from its non-blocking `poll`. [`UdpDriver`] is the production
//! datagram driver; anything implementing `swiftrpc_core::Driver` works in
//! its place.

/// Caller-facing RPC handle and service addressing.
pub mod rpc;
/// The top-level transport dispatcher.
pub mod transport;
/// UDP datagram driver.
pub mod udp;

pub use rpc::{ClientRpc, Service};
pub use transport::Transport;
pub use udp::UdpDriver;
