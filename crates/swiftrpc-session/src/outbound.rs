use tracing::debug;

use swiftrpc_core::{config::Config, shared::SharedBytes};
use swiftrpc_protocol::{AckBody, PayloadKind};

use crate::{
    context::{Ctx, SendContext},
    ring::Ring,
    timer::{TimerDisposition, TimerKind},
};

/// Sentinel in the sent-times ring marking a selectively acknowledged
/// fragment. Slot value 0 means never sent; anything else is a send tick.
const ACKED: u64 = u64::MAX;

/// Transmits one payload reliably under a sliding window.
///
/// `sent_times[i]` tracks fragment `first_missing_frag + i`. Fragments are
/// (re)sent by [`OutboundMessage::send`], which clamps the candidate range
/// by the window, by what the receiver can stage, and by the end of the
/// message; ACKs advance the window and free it to send more.
#[derive(Debug)]
pub struct OutboundMessage {
    use_timer: bool,
    send_buffer: Option<SharedBytes>,
    total_frags: u16,
    first_missing_frag: u16,
    num_acked: u32,
    packets_since_ack_req: u32,
    sent_times: Ring<u64>,
    num_timeouts: u32,
}

impl OutboundMessage {
    /// Creates an inactive message.
    pub fn new(config: &Config, use_timer: bool) -> Self {
        Self {
            use_timer,
            send_buffer: None,
            total_frags: 0,
            first_missing_frag: 0,
            num_acked: 0,
            packets_since_ack_req: 0,
            sent_times: Ring::new(config.sent_times_len()),
            num_timeouts: 0,
        }
    }

    /// Marks the message inactive and cancels its timer. Must run before a
    /// used instance is recycled with [`OutboundMessage::begin_sending`].
    pub fn clear(&mut self, ctx: &mut Ctx<'_>, sctx: &SendContext) {
        self.send_buffer = None;
        self.total_frags = 0;
        self.first_missing_frag = 0;
        self.num_acked = 0;
        self.packets_since_ack_req = 0;
        self.num_timeouts = 0;
        self.sent_times.reset();
        if self.use_timer {
            ctx.timers.cancel(sctx.timer_key(TimerKind::Outbound));
        }
    }

    /// True once the receiver has acknowledged every fragment in order.
    pub fn is_complete(&self) -> bool {
        self.send_buffer.is_some() && self.first_missing_frag == self.total_frags
    }

    /// Whether a payload is currently being transmitted.
    pub fn is_active(&self) -> bool {
        self.send_buffer.is_some()
    }

    /// Lowest unacknowledged fragment.
    pub fn first_missing_frag(&self) -> u16 {
        self.first_missing_frag
    }

    /// Starts transmitting `payload`. The message must be inactive.
    pub fn begin_sending(&mut self, ctx: &mut Ctx<'_>, sctx: &SendContext, payload: SharedBytes) {
        debug_assert!(self.send_buffer.is_none(), "outbound message already active");
        self.total_frags = ctx.num_frags(payload.len());
        self.send_buffer = Some(payload);
        self.send(ctx, sctx);
    }

    /// The core transmission pass.
    ///
    /// Retransmits at most one timed-out fragment per call (it goes out
    /// with `request_ack` set, then the pass stops); otherwise fills the
    /// open window with fresh fragments, requesting an ACK on every
    /// `req_ack_after`th one except the last fragment of the message.
    pub fn send(&mut self, ctx: &mut Ctx<'_>, sctx: &SendContext) {
        let buffer = match &self.send_buffer {
            Some(buffer) => buffer.clone(),
            None => return,
        };
        let now = ctx.now();
        let timeout_ns = ctx.config.timeout_ns;

        // Candidate range: bounded by the message end, the ack window, and
        // what the receiver can hold in its staging ring.
        let first = u32::from(self.first_missing_frag);
        let mut stop = u32::from(self.total_frags);
        stop = stop.min(self.num_acked + ctx.config.window_size);
        stop = stop.min(first + ctx.config.max_staging_fragments + 1);

        for i in 0..(stop.saturating_sub(first) as usize) {
            let sent_time = *self.sent_times.get(i);
            if sent_time == ACKED || (sent_time != 0 && sent_time + timeout_ns >= now) {
                continue;
            }
            let is_retransmit = sent_time != 0;
            let frag_number = self.first_missing_frag + i as u16;
            let request_ack = is_retransmit
                || (self.packets_since_ack_req == ctx.config.req_ack_after - 1
                    && frag_number != self.total_frags - 1);
            self.send_one(ctx, sctx, &buffer, frag_number, request_ack);
            self.sent_times.set(i, now);
            if is_retransmit {
                break;
            }
        }

        // Rearm the timer for the in-flight fragment that times out first.
        if self.use_timer {
            let mut oldest = None;
            for i in 0..(stop.saturating_sub(first) as usize) {
                let sent_time = *self.sent_times.get(i);
                if sent_time == 0 {
                    break;
                }
                if sent_time != ACKED && oldest.map_or(true, |t| sent_time < t) {
                    oldest = Some(sent_time);
                }
            }
            if let Some(oldest) = oldest {
                ctx.timers.schedule(sctx.timer_key(TimerKind::Outbound), oldest + timeout_ns);
            }
        }
    }

    /// Applies a selective ACK and exploits any newly opened window.
    /// Returns whether the message is now fully acknowledged.
    pub fn process_ack(&mut self, ctx: &mut Ctx<'_>, sctx: &SendContext, frame: &[u8]) -> bool {
        if self.send_buffer.is_none() {
            return false;
        }
        let ack = match AckBody::decode(frame) {
            Ok(ack) => ack,
            Err(_) => {
                debug!("dropped truncated ack");
                return self.is_complete();
            }
        };

        if ack.first_missing_frag < self.first_missing_frag {
            debug!(ack = ack.first_missing_frag, "dropped stale ack");
        } else if ack.first_missing_frag > self.total_frags {
            debug!(ack = ack.first_missing_frag, "dropped ack past end of message");
        } else if u32::from(ack.first_missing_frag)
            > u32::from(self.first_missing_frag) + self.sent_times.len() as u32
        {
            debug!(ack = ack.first_missing_frag, "dropped ack that advanced too far");
        } else {
            self.sent_times.advance((ack.first_missing_frag - self.first_missing_frag) as usize);
            self.first_missing_frag = ack.first_missing_frag;
            self.num_acked = u32::from(ack.first_missing_frag);
            for i in 0..self.sent_times.len() - 1 {
                if i >= 32 {
                    break;
                }
                if (ack.staging_vector >> i) & 1 == 1 {
                    self.sent_times.set(i + 1, ACKED);
                    self.num_acked += 1;
                }
            }
            self.num_timeouts = 0;
        }

        self.send(ctx, sctx);
        self.first_missing_frag == self.total_frags
    }

    /// Retransmission tick: run a send pass, or give up on the session
    /// after too many consecutive timeouts.
    pub fn fire_timer(&mut self, ctx: &mut Ctx<'_>, sctx: &SendContext) -> TimerDisposition {
        self.num_timeouts += 1;
        if self.num_timeouts >= ctx.config.timeouts_until_aborting {
            debug!("closing session: outbound message timed out too many times");
            return TimerDisposition::AbortSession;
        }
        self.send(ctx, sctx);
        TimerDisposition::Continue
    }

    fn send_one(
        &mut self,
        ctx: &mut Ctx<'_>,
        sctx: &SendContext,
        buffer: &SharedBytes,
        frag_number: u16,
        request_ack: bool,
    ) {
        let mut header = sctx.header(PayloadKind::Data);
        header.frag_number = frag_number;
        header.total_frags = self.total_frags;
        header.request_ack = request_ack;

        let body = buffer.fragment(u32::from(frag_number), ctx.data_per_fragment());
        ctx.send_frame(sctx.peer, &mut header, body.as_slice());

        if request_ack {
            self.packets_since_ack_req = 0;
        } else {
            self.packets_since_ack_req += 1;
        }
    }
}
