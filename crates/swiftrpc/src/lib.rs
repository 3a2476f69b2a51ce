#![warn(missing_docs)]

//! Swiftrpc: a small public API facade for the workspace.
//!
//! Swiftrpc is a reliable, low-latency request/response transport layered
//! on an unreliable datagram driver. This crate re-exports the surface
//! most applications need:
//!
//! - Transport and RPC handles (`Transport`, `ClientRpc`, `ServerRpc`)
//! - Service addressing (`Service`)
//! - Core configuration and errors (`Config`, `Error`)
//! - The driver and clock seams for tests and custom I/O
//!
//! Example
//! ```ignore
//! use swiftrpc::{Config, Service, Transport, UdpDriver};
//! use swiftrpc::clock::SystemClock;
//!
//! let config = Config::default();
//! let driver = UdpDriver::bind("127.0.0.1:0", &config).unwrap();
//! let mut transport =
//!     Transport::new(Box::new(driver), Box::new(SystemClock::new()), config);
//!
//! let mut service = Service::new("127.0.0.1:7400").unwrap();
//! let rpc = transport.client_send(&mut service, b"hello".to_vec());
//! let reply = rpc.get_reply(&mut transport).unwrap();
//! ```

// Core config, errors, and the pluggable seams
pub use swiftrpc_core::{clock, driver, AssemblyBuffer, Config, Error, Result};
// Host: the transport dispatcher, RPC handles, and the UDP driver
pub use swiftrpc_host::{ClientRpc, Service, Transport, UdpDriver};
// Session layer types surfaced through the API
pub use swiftrpc_session::{RpcStatus, ServerRpc};

/// Convenience prelude with the most commonly used items.
pub mod prelude {
    pub use crate::{ClientRpc, Config, Error, RpcStatus, ServerRpc, Service, Transport, UdpDriver};
}
