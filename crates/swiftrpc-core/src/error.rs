use std::{fmt, io};

/// Convenience alias used across the workspace.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced to callers of the transport.
///
/// The protocol recovers from wire-level anomalies locally (logged and
/// dropped), so only three kinds ever reach the API surface: socket I/O
/// failures, synchronous address resolution failures at service
/// construction, and RPCs aborted by session teardown.
#[derive(Debug)]
pub enum Error {
    /// An underlying socket operation failed.
    Io(io::Error),
    /// The service address could not be resolved.
    AddressResolve(String),
    /// The RPC's session was closed before a reply arrived; the response
    /// buffer was not populated.
    RpcAborted,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Io(err) => write!(f, "socket error: {}", err),
            Error::AddressResolve(addr) => {
                write!(f, "could not resolve service address `{}`", addr)
            }
            Error::RpcAborted => write!(f, "rpc aborted"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Error::Io(err)
    }
}
