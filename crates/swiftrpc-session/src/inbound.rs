use tracing::{debug, trace};

use swiftrpc_core::{assembly::AssemblyBuffer, config::Config, driver::ReceivedPacket};
use swiftrpc_protocol::{AckBody, Header, PayloadKind, HEADER_LEN};

use crate::{
    context::{Ctx, SendContext},
    ring::Ring,
    timer::{TimerDisposition, TimerKind},
};

/// A whole received frame whose ownership was stolen from the driver while
/// it waits in the staging ring. The message payload sits after the header.
#[derive(Debug, Default)]
struct StagedFrame {
    raw: Vec<u8>,
    len: usize,
}

/// Reassembles one multi-fragment message from received datagrams.
///
/// Fragments at exactly `first_missing_frag` are appended to the assembly
/// buffer immediately; later fragments wait in the staging ring, indexed by
/// `frag_number - first_missing_frag - 1`, and slide into the buffer once
/// the gap before them closes. Everything below `first_missing_frag` is a
/// stale duplicate and ignored.
#[derive(Debug)]
pub struct InboundMessage {
    use_timer: bool,
    total_frags: u16,
    first_missing_frag: u16,
    staging: Ring<Option<StagedFrame>>,
    assembly: AssemblyBuffer,
    num_timeouts: u32,
}

impl InboundMessage {
    /// Creates an inactive message. [`InboundMessage::init`] makes it live.
    pub fn new(config: &Config, use_timer: bool) -> Self {
        Self {
            use_timer,
            total_frags: 0,
            first_missing_frag: 0,
            staging: Ring::new(config.max_staging_fragments as usize),
            assembly: AssemblyBuffer::new(),
            num_timeouts: 0,
        }
    }

    /// Prepares the message to receive a `total_frags`-fragment payload.
    pub fn init(&mut self, ctx: &mut Ctx<'_>, sctx: &SendContext, total_frags: u16) {
        self.clear(ctx, sctx);
        self.total_frags = total_frags;
        if self.use_timer {
            let deadline = ctx.now() + ctx.config.timeout_ns;
            ctx.timers.schedule(sctx.timer_key(TimerKind::Inbound), deadline);
        }
    }

    /// Releases staged and assembled packet memory to the driver, cancels
    /// the timer, and marks the message inactive.
    pub fn clear(&mut self, ctx: &mut Ctx<'_>, sctx: &SendContext) {
        self.total_frags = 0;
        self.first_missing_frag = 0;
        self.num_timeouts = 0;
        for index in 0..self.staging.len() {
            if let Some(frame) = self.staging.take(index) {
                ctx.driver.release(frame.raw);
            }
        }
        self.staging.reset();
        self.assembly.release_into(ctx.driver);
        if self.use_timer {
            ctx.timers.cancel(sctx.timer_key(TimerKind::Inbound));
        }
    }

    /// True once every fragment has been appended in order.
    pub fn is_complete(&self) -> bool {
        self.first_missing_frag == self.total_frags
    }

    /// Lowest fragment index not yet appended.
    pub fn first_missing_frag(&self) -> u16 {
        self.first_missing_frag
    }

    /// Moves the assembled payload out. Reassembly counters stay intact so
    /// the message can keep answering ACK requests afterwards.
    pub fn take_assembly(&mut self) -> AssemblyBuffer {
        std::mem::take(&mut self.assembly)
    }

    /// Incorporates one DATA fragment. Returns whether the message is now
    /// (or already was) complete.
    pub fn process_data(
        &mut self,
        ctx: &mut Ctx<'_>,
        sctx: &SendContext,
        packet: &mut ReceivedPacket,
        header: &Header,
    ) -> bool {
        if header.total_frags != self.total_frags {
            debug!(
                got = header.total_frags,
                expected = self.total_frags,
                "fragment disagrees on message length"
            );
            return self.is_complete();
        }

        if header.frag_number == self.first_missing_frag {
            self.append(packet);
            // Slide in anything contiguous that was staged out of order.
            loop {
                let staged = self.staging.take(0);
                self.staging.advance(1);
                match staged {
                    Some(frame) => self.append_staged(frame),
                    None => break,
                }
            }
        } else if header.frag_number > self.first_missing_frag {
            let gap = u32::from(header.frag_number - self.first_missing_frag);
            if gap > ctx.config.max_staging_fragments {
                debug!(frag = header.frag_number, "fragment beyond staging window");
            } else {
                let slot = (gap - 1) as usize;
                if self.staging.get(slot).is_none() {
                    let len = packet.len();
                    self.staging.set(slot, Some(StagedFrame { raw: packet.steal(), len }));
                } else {
                    debug!(frag = header.frag_number, "duplicate fragment received");
                }
            }
        } else {
            trace!(frag = header.frag_number, "stale fragment");
        }

        if header.request_ack {
            self.send_ack(ctx, sctx);
        }
        if self.use_timer {
            let deadline = ctx.now() + ctx.config.timeout_ns;
            ctx.timers.schedule(sctx.timer_key(TimerKind::Inbound), deadline);
        }
        self.num_timeouts = 0;

        self.is_complete()
    }

    /// Transmits an ACK describing which fragments are still missing.
    pub fn send_ack(&self, ctx: &mut Ctx<'_>, sctx: &SendContext) {
        let mut body = AckBody { first_missing_frag: self.first_missing_frag, staging_vector: 0 };
        for (index, slot) in self.staging.iter().enumerate() {
            if slot.is_some() {
                body.staging_vector |= 1 << index;
            }
        }

        let mut header = sctx.header(PayloadKind::Ack);
        let mut bytes = Vec::new();
        body.encode_into(&mut bytes);
        ctx.send_frame(sctx.peer, &mut header, &bytes);
    }

    /// Keepalive tick: nudge the sender with our ACK state, or give up on
    /// the session after too many silent timeouts.
    pub fn fire_timer(&mut self, ctx: &mut Ctx<'_>, sctx: &SendContext) -> TimerDisposition {
        self.num_timeouts += 1;
        if self.num_timeouts >= ctx.config.timeouts_until_aborting {
            debug!("closing session: inbound message timed out too many times");
            return TimerDisposition::AbortSession;
        }
        self.send_ack(ctx, sctx);
        let deadline = ctx.now() + ctx.config.timeout_ns;
        ctx.timers.schedule(sctx.timer_key(TimerKind::Inbound), deadline);
        TimerDisposition::Continue
    }

    fn append(&mut self, packet: &mut ReceivedPacket) {
        let len = packet.len();
        self.assembly.append_stolen(packet.steal(), HEADER_LEN, len - HEADER_LEN);
        self.first_missing_frag += 1;
    }

    fn append_staged(&mut self, frame: StagedFrame) {
        self.assembly.append_stolen(frame.raw, HEADER_LEN, frame.len - HEADER_LEN);
        self.first_missing_frag += 1;
    }
}
