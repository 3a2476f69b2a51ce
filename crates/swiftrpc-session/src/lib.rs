//! swiftrpc-session: the reliability engine.
//!
//! Everything between the wire format and the dispatcher lives here: the
//! sliding-window outbound message, the staging-ring inbound message, the
//! per-channel state machines, client and server sessions, the session
//! table, and the flat timer list. All of it is single-threaded; progress
//! happens only when the dispatcher drives it through a [`context::Ctx`].

/// Per-RPC channel state machines.
pub mod channel;
/// The dispatch context threaded through the engine.
pub mod context;
/// Inbound message reassembly.
pub mod inbound;
/// Outbound message transmission under a sliding window.
pub mod outbound;
/// Shift rings for staging slots and send timestamps.
pub mod ring;
/// RPC state shared between the engine and the caller-facing handles.
pub mod rpc;
/// Client and server sessions.
pub mod session;
/// The session pool indexed by wire hints.
pub mod table;
/// The flat timer list and timer identities.
pub mod timer;

pub use channel::{ClientChannel, ClientChannelState, ServerChannel, ServerChannelState};
pub use context::{Ctx, SendContext};
pub use inbound::InboundMessage;
pub use outbound::OutboundMessage;
pub use rpc::{ClientRpcHandle, ClientRpcInner, RpcStatus, ServerRpc};
pub use session::{ClientSession, ServerSession};
pub use table::{PooledSession, SessionHandle, SessionTable};
pub use timer::{Side, TimerDisposition, TimerKey, TimerKind, TimerList, SessionRef};

#[cfg(test)]
pub(crate) mod test_support;
