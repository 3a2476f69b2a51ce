use std::net::SocketAddr;

use swiftrpc_core::{config::Config, clock::Clock, driver::Driver};
use swiftrpc_protocol::{Direction, Header, PayloadKind, HEADER_LEN, INVALID_HINT, INVALID_TOKEN};

use crate::timer::{SessionRef, TimerKey, TimerKind, TimerList};

/// Everything a session or message needs to make progress, borrowed from
/// the dispatcher for the duration of one dispatch step.
///
/// Sessions and messages hold no back-references; the dispatcher owns the
/// driver, clock, and timer list and lends them down the call tree.
pub struct Ctx<'a> {
    /// The datagram driver.
    pub driver: &'a mut dyn Driver,
    /// The monotonic tick source.
    pub clock: &'a dyn Clock,
    /// The pending timer list.
    pub timers: &'a mut TimerList,
    /// Protocol constants.
    pub config: &'a Config,
}

impl Ctx<'_> {
    /// Current tick. Never returns 0: tick zero is reserved as the
    /// never-sent marker in the outbound sent-times ring.
    pub fn now(&self) -> u64 {
        self.clock.now_ns().max(1)
    }

    /// Message bytes that fit in one fragment.
    pub fn data_per_fragment(&self) -> usize {
        self.driver.max_payload_size() - HEADER_LEN
    }

    /// Fragments required to carry `len` bytes.
    pub fn num_frags(&self, len: usize) -> u16 {
        let per_fragment = self.data_per_fragment();
        ((len + per_fragment - 1) / per_fragment) as u16
    }

    /// Encodes and transmits one frame.
    ///
    /// Applies the egress lossy-link simulation: with probability
    /// `packet_loss_percentage` percent the frame is marked `please_drop`,
    /// which the receiver honors by discarding it.
    pub fn send_frame(&mut self, addr: SocketAddr, header: &mut Header, body: &[u8]) {
        let loss = self.config.packet_loss_percentage;
        if loss > 0 && rand::random_range(0..100u8) < loss {
            header.please_drop = true;
        }

        let mut frame = Vec::with_capacity(HEADER_LEN + body.len());
        header.encode_into(&mut frame);
        frame.extend_from_slice(body);
        if let Err(err) = self.driver.send_frame(addr, &frame) {
            tracing::error!("error sending a frame to {}: {}", addr, err);
        }
    }
}

/// Per-channel header and addressing state, computed by the owning session
/// and handed down to its messages for the duration of one call.
///
/// This is what lets a message stamp outgoing headers and name its timers
/// without holding a pointer back to the session.
#[derive(Debug, Clone)]
pub struct SendContext {
    /// Where frames for this channel go.
    pub peer: SocketAddr,
    /// Session token for the header, or the invalid sentinel.
    pub token: Option<u64>,
    /// The channel's current RPC id.
    pub rpc_id: u32,
    /// Client table index, if known.
    pub client_hint: Option<u32>,
    /// Server table index, if known.
    pub server_hint: Option<u32>,
    /// The channel this context describes.
    pub channel_id: u8,
    /// Which way frames from here travel.
    pub direction: Direction,
    /// Timer identity of the owning session.
    pub session: SessionRef,
}

impl SendContext {
    /// A header stamped with this channel's identity.
    pub fn header(&self, payload_kind: PayloadKind) -> Header {
        let mut header = Header::new(self.direction, payload_kind);
        header.session_token = self.token.unwrap_or(INVALID_TOKEN);
        header.rpc_id = self.rpc_id;
        header.client_session_hint = self.client_hint.unwrap_or(INVALID_HINT);
        header.server_session_hint = self.server_hint.unwrap_or(INVALID_HINT);
        header.channel_id = self.channel_id;
        header
    }

    /// The timer key for this channel's inbound or outbound message.
    pub fn timer_key(&self, kind: TimerKind) -> TimerKey {
        TimerKey { session: self.session, channel_id: self.channel_id, kind }
    }
}
