use std::{io, net::SocketAddr};

/// Low-level unreliable datagram driver.
///
/// The transport owns exactly one driver and reaches the wire only through
/// it. A driver may lose, reorder, or duplicate frames; the reliability
/// layer above assumes nothing else. Implementations hand out owned receive
/// buffers which the protocol may "steal" into a reassembly buffer or a
/// staging ring; stolen buffers are returned with [`Driver::release`] once
/// their payload has been consumed so the driver can recycle them.
pub trait Driver {
    /// Sends one frame (header plus payload) to `addr`. Fire and forget.
    fn send_frame(&mut self, addr: SocketAddr, frame: &[u8]) -> io::Result<usize>;

    /// Non-blocking receive. Returns `None` when no frame is ready.
    fn try_recv(&mut self) -> Option<ReceivedPacket>;

    /// Returns a previously stolen buffer for reuse.
    fn release(&mut self, buffer: Vec<u8>);

    /// Largest frame this driver can carry, header included.
    fn max_payload_size(&self) -> usize;
}

/// One received frame plus its source address.
///
/// The raw buffer can be stolen exactly once, transferring ownership to the
/// caller. Whatever is not stolen by the end of dispatch is handed back to
/// the driver via [`ReceivedPacket::into_unstolen`].
#[derive(Debug)]
pub struct ReceivedPacket {
    addr: SocketAddr,
    raw: Option<Vec<u8>>,
    len: usize,
}

impl ReceivedPacket {
    /// Wraps a raw frame. `raw` must hold at least `len` valid bytes.
    pub fn new(addr: SocketAddr, raw: Vec<u8>, len: usize) -> Self {
        debug_assert!(raw.len() >= len);
        Self { addr, raw: Some(raw), len }
    }

    /// Source address of the frame.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Number of valid bytes in the frame.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns true if the frame carries no bytes.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The valid bytes of the frame. Empty once stolen.
    pub fn bytes(&self) -> &[u8] {
        match &self.raw {
            Some(raw) => &raw[..self.len],
            None => &[],
        }
    }

    /// Takes ownership of the raw buffer. Panics if already stolen.
    pub fn steal(&mut self) -> Vec<u8> {
        self.raw.take().expect("packet buffer already stolen")
    }

    /// True if the buffer is still owned by this wrapper.
    pub fn has_buffer(&self) -> bool {
        self.raw.is_some()
    }

    /// Consumes the wrapper, yielding the buffer if nobody stole it.
    pub fn into_unstolen(self) -> Option<Vec<u8>> {
        self.raw
    }
}
