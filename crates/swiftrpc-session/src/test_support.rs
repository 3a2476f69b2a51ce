//! Shared helpers for the unit tests in this crate.

use std::{io, net::SocketAddr};

use swiftrpc_core::{
    clock::ManualClock,
    config::Config,
    driver::{Driver, ReceivedPacket},
};
use swiftrpc_protocol::{Header, HEADER_LEN};

use crate::{context::Ctx, timer::TimerList};

/// A driver that records every frame it is asked to send.
pub struct CaptureDriver {
    pub sent: Vec<(SocketAddr, Vec<u8>)>,
    pub released: Vec<Vec<u8>>,
    pub max_payload: usize,
}

impl CaptureDriver {
    pub fn new(max_payload: usize) -> Self {
        Self { sent: Vec::new(), released: Vec::new(), max_payload }
    }

    /// Decoded headers of everything sent so far.
    pub fn sent_headers(&self) -> Vec<Header> {
        self.sent.iter().map(|(_, frame)| Header::decode(frame).unwrap()).collect()
    }

    /// Payload bytes of the `index`th sent frame.
    pub fn sent_body(&self, index: usize) -> &[u8] {
        &self.sent[index].1[HEADER_LEN..]
    }
}

impl Driver for CaptureDriver {
    fn send_frame(&mut self, addr: SocketAddr, frame: &[u8]) -> io::Result<usize> {
        self.sent.push((addr, frame.to_vec()));
        Ok(frame.len())
    }

    fn try_recv(&mut self) -> Option<ReceivedPacket> {
        None
    }

    fn release(&mut self, buffer: Vec<u8>) {
        self.released.push(buffer);
    }

    fn max_payload_size(&self) -> usize {
        self.max_payload
    }
}

/// Driver, clock, and timer list bundled so tests can borrow a [`Ctx`].
pub struct Harness {
    pub driver: CaptureDriver,
    pub clock: ManualClock,
    pub timers: TimerList,
    pub config: Config,
}

impl Harness {
    /// A harness whose driver carries `data_per_fragment` message bytes per
    /// frame, with the clock advanced off the reserved zero tick.
    pub fn new(config: Config, data_per_fragment: usize) -> Self {
        let clock = ManualClock::new();
        clock.advance(1_000);
        Self {
            driver: CaptureDriver::new(HEADER_LEN + data_per_fragment),
            clock,
            timers: TimerList::new(),
            config,
        }
    }

    pub fn ctx(&mut self) -> Ctx<'_> {
        Ctx {
            driver: &mut self.driver,
            clock: &self.clock,
            timers: &mut self.timers,
            config: &self.config,
        }
    }
}

pub fn peer_addr() -> SocketAddr {
    "127.0.0.1:7000".parse().unwrap()
}

/// Builds a received DATA frame the way a remote sender would.
pub fn data_frame(header: &Header, body: &[u8]) -> ReceivedPacket {
    let mut frame = Vec::new();
    header.encode_into(&mut frame);
    frame.extend_from_slice(body);
    let len = frame.len();
    ReceivedPacket::new(peer_addr(), frame, len)
}
