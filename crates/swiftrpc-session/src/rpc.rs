use std::{cell::RefCell, rc::Rc};

use swiftrpc_core::{assembly::AssemblyBuffer, shared::SharedBytes};

/// Lifecycle of a client RPC.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RpcStatus {
    /// Submitted; the transport is working on it.
    InProgress,
    /// The full response has been reassembled.
    Completed,
    /// The session was torn down before a response arrived.
    Aborted,
}

/// State of one client RPC, shared between the engine (which completes or
/// aborts it) and the caller-facing handle (which waits on it).
#[derive(Debug)]
pub struct ClientRpcInner {
    status: RpcStatus,
    request: SharedBytes,
    response: Option<AssemblyBuffer>,
}

/// Shared ownership of a client RPC's state. The transport is
/// single-threaded, so a plain `Rc<RefCell>` is the right tool.
pub type ClientRpcHandle = Rc<RefCell<ClientRpcInner>>;

impl ClientRpcInner {
    /// A freshly submitted RPC.
    pub fn new(request: SharedBytes) -> Self {
        Self { status: RpcStatus::InProgress, request, response: None }
    }

    /// Wraps a new RPC in its shared handle.
    pub fn handle(request: SharedBytes) -> ClientRpcHandle {
        Rc::new(RefCell::new(Self::new(request)))
    }

    /// Current lifecycle state.
    pub fn status(&self) -> RpcStatus {
        self.status
    }

    /// The request payload. Kept for the RPC's whole life so a session
    /// reset can re-queue and re-send it without copying.
    pub fn request(&self) -> SharedBytes {
        self.request.clone()
    }

    /// Marks the RPC completed with its reassembled response.
    pub fn complete(&mut self, response: AssemblyBuffer) {
        self.status = RpcStatus::Completed;
        self.response = Some(response);
    }

    /// Marks the RPC aborted. The response stays unpopulated.
    pub fn abort(&mut self) {
        self.status = RpcStatus::Aborted;
    }

    /// Takes the response out of a completed RPC.
    pub fn take_response(&mut self) -> Option<AssemblyBuffer> {
        self.response.take()
    }
}

/// A fully reassembled request awaiting server-side processing.
///
/// Holds the identity of the channel it arrived on so the reply can be
/// routed back; the epoch guards against the session slot having been
/// recycled by the time the application replies.
#[derive(Debug)]
pub struct ServerRpc {
    /// Slot of the owning session in the server table.
    pub session_index: u32,
    /// Allocation epoch of that slot when the request arrived.
    pub epoch: u64,
    /// Channel the request arrived on.
    pub channel_id: u8,
    /// RPC id the reply must carry.
    pub rpc_id: u32,
    /// The reassembled request payload.
    pub request: AssemblyBuffer,
}

impl ServerRpc {
    /// The request as one contiguous byte vector.
    pub fn request_bytes(&self) -> Vec<u8> {
        self.request.to_vec()
    }
}
