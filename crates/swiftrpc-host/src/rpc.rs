use std::net::{SocketAddr, ToSocketAddrs};

use swiftrpc_core::{Error, Result};
use swiftrpc_session::{ClientRpcHandle, RpcStatus, SessionHandle};

use crate::transport::Transport;

/// A destination for RPCs, with a cached session handle.
///
/// The handle is weak: it names a session-table slot and the allocation
/// epoch observed when it was cached. The transport validates it on every
/// use and silently acquires a fresh session when it has gone stale.
#[derive(Debug, Clone)]
pub struct Service {
    addr: SocketAddr,
    pub(crate) session: Option<SessionHandle>,
}

impl Service {
    /// Resolves `addr` (host:port) now; failure is an immediate error and
    /// nothing is sent.
    pub fn new(addr: &str) -> Result<Self> {
        let resolved = addr
            .to_socket_addrs()
            .map_err(|_| Error::AddressResolve(addr.to_string()))?
            .next()
            .ok_or_else(|| Error::AddressResolve(addr.to_string()))?;
        Ok(Self::from_addr(resolved))
    }

    /// Wraps an already resolved address.
    pub fn from_addr(addr: SocketAddr) -> Self {
        Self { addr, session: None }
    }

    /// The resolved destination address.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }
}

/// Handle to one in-flight client RPC.
///
/// The transport shares the underlying state; only it moves the RPC out of
/// `InProgress`, and only from inside `poll`.
#[derive(Debug)]
pub struct ClientRpc {
    inner: ClientRpcHandle,
}

impl ClientRpc {
    pub(crate) fn new(inner: ClientRpcHandle) -> Self {
        Self { inner }
    }

    /// Current lifecycle state.
    pub fn status(&self) -> RpcStatus {
        self.inner.borrow().status()
    }

    /// Whether the RPC has reached a terminal state.
    pub fn is_done(&self) -> bool {
        self.status() != RpcStatus::InProgress
    }

    /// Blocks until the response is complete, spinning on the transport's
    /// `poll`. Fails with [`Error::RpcAborted`] if the session was torn
    /// down first.
    pub fn get_reply(&self, transport: &mut Transport) -> Result<Vec<u8>> {
        loop {
            match self.try_reply() {
                Some(result) => return result,
                None => transport.poll(),
            }
        }
    }

    /// Non-blocking check: the reply, the abort error, or `None` while the
    /// RPC is still in progress.
    pub fn try_reply(&self) -> Option<Result<Vec<u8>>> {
        let status = self.inner.borrow().status();
        match status {
            RpcStatus::InProgress => None,
            RpcStatus::Aborted => Some(Err(Error::RpcAborted)),
            RpcStatus::Completed => {
                let response = self.inner.borrow_mut().take_response();
                Some(Ok(response.map(|buffer| buffer.into_vec()).unwrap_or_default()))
            }
        }
    }
}
