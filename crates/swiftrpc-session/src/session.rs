use std::{collections::VecDeque, net::SocketAddr};

use tracing::{debug, warn};

use swiftrpc_core::{config::Config, driver::ReceivedPacket, shared::SharedBytes};
use swiftrpc_protocol::{Direction, Header, PayloadKind, SessionOpenBody, INVALID_HINT};

use crate::{
    channel::{ClientChannel, ClientChannelState, ServerChannel, ServerChannelState},
    context::{Ctx, SendContext},
    rpc::{ClientRpcHandle, ServerRpc},
    table::PooledSession,
    timer::{SessionRef, Side, TimerDisposition, TimerKey, TimerKind},
};

/// Server-side half of a (client, server) binding.
///
/// Owns a fixed set of channels and the token minted at session open. A
/// server session never initiates anything: it reacts to inbound frames
/// and to the application handing it a reply.
#[derive(Debug)]
pub struct ServerSession {
    id: u32,
    epoch: u64,
    token: Option<u64>,
    client_address: Option<SocketAddr>,
    client_hint: Option<u32>,
    last_activity: u64,
    channels: Vec<ServerChannel>,
}

impl ServerSession {
    /// True if `token` matches the token this session minted.
    pub fn token_matches(&self, token: u64) -> bool {
        self.token == Some(token)
    }

    /// This slot's allocation epoch.
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// State of channel `channel_id`, if it exists.
    pub fn channel_state(&self, channel_id: u8) -> Option<ServerChannelState> {
        self.channels.get(channel_id as usize).map(|c| c.state)
    }

    /// Binds this session to a client and transmits the session-open
    /// response carrying the freshly minted token and the channel count.
    pub fn start_session(
        &mut self,
        ctx: &mut Ctx<'_>,
        client_address: SocketAddr,
        client_hint: u32,
    ) {
        self.client_address = Some(client_address);
        self.client_hint = Some(client_hint);
        let token = (u64::from(rand::random::<u32>()) << 32) | u64::from(rand::random::<u32>());
        self.token = Some(token);

        let mut header = Header::new(Direction::ServerToClient, PayloadKind::SessionOpen);
        header.session_token = token;
        header.client_session_hint = client_hint;
        header.server_session_hint = self.id;

        let mut body = Vec::new();
        let max_channel_id = (self.channels.len() - 1) as u8;
        SessionOpenBody { max_channel_id }.encode_into(&mut body);
        ctx.send_frame(client_address, &mut header, &body);
        self.last_activity = ctx.now();
    }

    /// Routes one inbound frame to the right channel and action.
    ///
    /// A frame for the channel's current RPC id is dispatched by payload
    /// kind; a DATA frame for the successor id resets the channel and
    /// starts the next RPC; anything else is dropped.
    pub fn process_inbound(
        &mut self,
        ctx: &mut Ctx<'_>,
        packet: &mut ReceivedPacket,
        header: &Header,
        ready: &mut VecDeque<ServerRpc>,
    ) {
        self.last_activity = ctx.now();
        let ch = header.channel_id as usize;
        if ch >= self.channels.len() {
            debug!(channel = header.channel_id, "drop: invalid channel");
            return;
        }

        let current_rpc_id = self.channels[ch].rpc_id;
        if header.rpc_id == current_rpc_id {
            match header.payload_kind {
                PayloadKind::Data => self.process_data(ctx, header, packet, ready),
                PayloadKind::Ack => self.process_ack(ctx, header, packet),
                _ => debug!("drop: unexpected payload kind for current rpc"),
            }
        } else if header.rpc_id == current_rpc_id.wrapping_add(1) {
            if header.payload_kind == PayloadKind::Data {
                self.accept_next_rpc(ctx, header);
                self.process_data(ctx, header, packet, ready);
            } else {
                debug!("drop: next rpc must start with data");
            }
        } else {
            debug!(rpc = header.rpc_id, current = current_rpc_id, "drop: old rpc id");
        }
    }

    /// Hands the reply for the RPC on `channel_id` to the outbound message.
    /// The channel must be processing a completed request.
    pub fn begin_sending(&mut self, ctx: &mut Ctx<'_>, channel_id: u8, reply: SharedBytes) {
        let ch = channel_id as usize;
        if ch >= self.channels.len() || self.channels[ch].state != ServerChannelState::Processing {
            warn!(channel = channel_id, "reply for a channel that is not processing; dropped");
            return;
        }
        self.channels[ch].state = ServerChannelState::SendingWaiting;
        let sctx = self.send_context(channel_id);
        self.channels[ch].outbound.begin_sending(ctx, &sctx, reply);
        self.last_activity = ctx.now();
    }

    fn accept_next_rpc(&mut self, ctx: &mut Ctx<'_>, header: &Header) {
        let ch = header.channel_id as usize;
        let sctx = self.send_context(header.channel_id);
        self.channels[ch].inbound.clear(ctx, &sctx);
        self.channels[ch].outbound.clear(ctx, &sctx);
        self.channels[ch].state = ServerChannelState::Receiving;
        self.channels[ch].rpc_id = header.rpc_id;
        let sctx = self.send_context(header.channel_id);
        self.channels[ch].inbound.init(ctx, &sctx, header.total_frags);
    }

    fn process_data(
        &mut self,
        ctx: &mut Ctx<'_>,
        header: &Header,
        packet: &mut ReceivedPacket,
        ready: &mut VecDeque<ServerRpc>,
    ) {
        let sctx = self.send_context(header.channel_id);
        let ch = header.channel_id as usize;
        match self.channels[ch].state {
            ServerChannelState::Idle => {}
            ServerChannelState::Receiving => {
                if self.channels[ch].inbound.process_data(ctx, &sctx, packet, header) {
                    let request = self.channels[ch].inbound.take_assembly();
                    ready.push_back(ServerRpc {
                        session_index: self.id,
                        epoch: self.epoch,
                        channel_id: header.channel_id,
                        rpc_id: self.channels[ch].rpc_id,
                        request,
                    });
                    self.channels[ch].state = ServerChannelState::Processing;
                }
            }
            ServerChannelState::Processing => {
                // The client is still resending the tail of a request we
                // already hold in full; answer so it can stop.
                if header.request_ack {
                    self.channels[ch].inbound.send_ack(ctx, &sctx);
                }
            }
            ServerChannelState::SendingWaiting => {
                warn!("received extraneous data while sending reply");
                self.channels[ch].outbound.send(ctx, &sctx);
            }
        }
    }

    fn process_ack(&mut self, ctx: &mut Ctx<'_>, header: &Header, packet: &ReceivedPacket) {
        let ch = header.channel_id as usize;
        if self.channels[ch].state == ServerChannelState::SendingWaiting {
            let sctx = self.send_context(header.channel_id);
            self.channels[ch].outbound.process_ack(ctx, &sctx, packet.bytes());
        }
    }

    fn send_context(&self, channel_id: u8) -> SendContext {
        SendContext {
            peer: self.client_address.expect("server session has no peer"),
            token: self.token,
            rpc_id: self.channels[channel_id as usize].rpc_id,
            client_hint: self.client_hint,
            server_hint: Some(self.id),
            channel_id,
            direction: Direction::ServerToClient,
            session: SessionRef { side: Side::Server, index: self.id },
        }
    }
}

impl PooledSession for ServerSession {
    fn new(id: u32, config: &Config) -> Self {
        let channels =
            (0..config.num_channels_per_session).map(|_| ServerChannel::new(config)).collect();
        Self {
            id,
            epoch: 0,
            token: None,
            client_address: None,
            client_hint: None,
            last_activity: 0,
            channels,
        }
    }

    fn set_epoch(&mut self, epoch: u64) {
        self.epoch = epoch;
    }

    fn last_activity(&self) -> u64 {
        self.last_activity
    }

    /// A session with a request being processed must stay; everything else
    /// is torn down and the slot reported reclaimable.
    fn try_expire(&mut self, ctx: &mut Ctx<'_>) -> bool {
        if self.last_activity == 0 {
            return true;
        }
        if self.channels.iter().any(|c| c.state == ServerChannelState::Processing) {
            return false;
        }

        for ch in 0..self.channels.len() {
            if self.channels[ch].state == ServerChannelState::Idle {
                continue;
            }
            let sctx = self.send_context(ch as u8);
            self.channels[ch].inbound.clear(ctx, &sctx);
            self.channels[ch].outbound.clear(ctx, &sctx);
            self.channels[ch].state = ServerChannelState::Idle;
            self.channels[ch].rpc_id = u32::MAX;
        }
        self.token = None;
        self.client_hint = None;
        self.client_address = None;
        self.last_activity = 0;
        true
    }
}

/// Client-side half of a (client, server) binding.
///
/// Channels are not allocated until the session-open response reveals how
/// many the server offers; RPCs submitted before that (or while every
/// channel is busy) wait in the channel queue.
#[derive(Debug)]
pub struct ClientSession {
    id: u32,
    epoch: u64,
    token: Option<u64>,
    server_address: Option<SocketAddr>,
    server_hint: Option<u32>,
    last_activity: u64,
    channels: Vec<ClientChannel>,
    channel_queue: VecDeque<ClientRpcHandle>,
}

impl ClientSession {
    /// This slot's allocation epoch.
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Connected means the session-open handshake has completed.
    pub fn is_connected(&self) -> bool {
        !self.channels.is_empty()
    }

    /// Number of allocated channels.
    pub fn num_channels(&self) -> usize {
        self.channels.len()
    }

    /// RPCs waiting for a free channel.
    pub fn queue_len(&self) -> usize {
        self.channel_queue.len()
    }

    /// State of channel `channel_id`, if allocated.
    pub fn channel_state(&self, channel_id: u8) -> Option<ClientChannelState> {
        self.channels.get(channel_id as usize).map(|c| c.state)
    }

    /// Current RPC id of channel `channel_id`, if allocated.
    pub fn channel_rpc_id(&self, channel_id: u8) -> Option<u32> {
        self.channels.get(channel_id as usize).map(|c| c.rpc_id)
    }

    /// Emits a session-open request. `server_address` is remembered on the
    /// first call so a reconnect can pass `None`.
    pub fn connect(&mut self, ctx: &mut Ctx<'_>, server_address: Option<SocketAddr>) {
        if server_address.is_some() {
            self.server_address = server_address;
        }
        let addr = self.server_address.expect("client session connect without an address");

        let mut header = Header::new(Direction::ClientToServer, PayloadKind::SessionOpen);
        header.client_session_hint = self.id;
        header.server_session_hint = self.server_hint.unwrap_or(INVALID_HINT);
        if let Some(token) = self.token {
            header.session_token = token;
        }
        ctx.send_frame(addr, &mut header, &[]);
        self.last_activity = ctx.now();
    }

    /// Runs `rpc` on an idle channel, or queues it until one frees up.
    pub fn start_rpc(&mut self, ctx: &mut Ctx<'_>, rpc: ClientRpcHandle) {
        self.last_activity = ctx.now();
        match self.channels.iter().position(|c| c.state == ClientChannelState::Idle) {
            Some(ch) => self.assign_rpc(ctx, ch, rpc),
            None => {
                debug!("no idle channel; queueing rpc");
                self.channel_queue.push_back(rpc);
            }
        }
    }

    /// Routes one inbound frame.
    ///
    /// Frames for a channel beyond what we allocated can only be the
    /// session-open response. A BAD_SESSION for a current RPC triggers the
    /// requeue-and-reconnect recovery.
    pub fn process_inbound(&mut self, ctx: &mut Ctx<'_>, packet: &mut ReceivedPacket, header: &Header) {
        self.last_activity = ctx.now();
        let ch = header.channel_id as usize;
        if ch >= self.channels.len() {
            if header.payload_kind == PayloadKind::SessionOpen {
                self.process_session_open_response(ctx, packet, header);
            } else {
                debug!(channel = header.channel_id, "drop: invalid channel");
            }
            return;
        }

        if self.channels[ch].rpc_id == header.rpc_id {
            match header.payload_kind {
                PayloadKind::Data => self.process_data(ctx, header, packet),
                PayloadKind::Ack => self.process_ack(ctx, header, packet),
                PayloadKind::BadSession => self.handle_bad_session(ctx),
                _ => debug!("drop: unexpected payload kind for current rpc"),
            }
        } else if header.payload_kind == PayloadKind::Data && header.request_ack {
            debug!("data for a finished rpc requesting ack; dropped");
        } else {
            debug!("drop: old packet");
        }
    }

    /// Aborts every RPC this session carries and releases its channels.
    pub fn close(&mut self, ctx: &mut Ctx<'_>) {
        debug!(session = self.id, "closing client session");
        for channel in &self.channels {
            if let Some(rpc) = &channel.current_rpc {
                rpc.borrow_mut().abort();
            }
        }
        while let Some(rpc) = self.channel_queue.pop_front() {
            rpc.borrow_mut().abort();
        }
        self.clear_channels(ctx);
        self.server_hint = None;
        self.token = None;
    }

    /// Routes a fired timer to the owning message.
    pub fn fire_timer(&mut self, ctx: &mut Ctx<'_>, key: TimerKey) -> TimerDisposition {
        let ch = key.channel_id as usize;
        if ch >= self.channels.len() {
            return TimerDisposition::Continue;
        }
        let sctx = self.send_context(key.channel_id);
        match key.kind {
            TimerKind::Inbound => self.channels[ch].inbound.fire_timer(ctx, &sctx),
            TimerKind::Outbound => self.channels[ch].outbound.fire_timer(ctx, &sctx),
        }
    }

    fn assign_rpc(&mut self, ctx: &mut Ctx<'_>, ch: usize, rpc: ClientRpcHandle) {
        let request = rpc.borrow().request();
        self.channels[ch].state = ClientChannelState::Sending;
        self.channels[ch].current_rpc = Some(rpc);
        let sctx = self.send_context(ch as u8);
        self.channels[ch].outbound.begin_sending(ctx, &sctx, request);
    }

    fn process_data(&mut self, ctx: &mut Ctx<'_>, header: &Header, packet: &mut ReceivedPacket) {
        let ch = header.channel_id as usize;
        if self.channels[ch].state == ClientChannelState::Idle {
            return;
        }
        // First response fragment: the request must have arrived in full,
        // so flip the channel around to receive.
        if self.channels[ch].state == ClientChannelState::Sending {
            let sctx = self.send_context(header.channel_id);
            self.channels[ch].outbound.clear(ctx, &sctx);
            self.channels[ch].inbound.init(ctx, &sctx, header.total_frags);
            self.channels[ch].state = ClientChannelState::Receiving;
        }

        let sctx = self.send_context(header.channel_id);
        if self.channels[ch].inbound.process_data(ctx, &sctx, packet, header) {
            let response = self.channels[ch].inbound.take_assembly();
            if let Some(rpc) = &self.channels[ch].current_rpc {
                rpc.borrow_mut().complete(response);
            }
            self.channels[ch].rpc_id = self.channels[ch].rpc_id.wrapping_add(1);
            self.channels[ch].inbound.clear(ctx, &sctx);
            self.channels[ch].outbound.clear(ctx, &sctx);
            self.channels[ch].current_rpc = None;
            match self.channel_queue.pop_front() {
                None => self.channels[ch].state = ClientChannelState::Idle,
                Some(next) => self.assign_rpc(ctx, ch, next),
            }
        }
    }

    fn process_ack(&mut self, ctx: &mut Ctx<'_>, header: &Header, packet: &ReceivedPacket) {
        let ch = header.channel_id as usize;
        if self.channels[ch].state == ClientChannelState::Sending {
            let sctx = self.send_context(header.channel_id);
            self.channels[ch].outbound.process_ack(ctx, &sctx, packet.bytes());
        }
    }

    fn handle_bad_session(&mut self, ctx: &mut Ctx<'_>) {
        debug!(session = self.id, "bad session: requeueing rpcs and reconnecting");
        let Self { channels, channel_queue, .. } = self;
        for channel in channels.iter_mut() {
            if let Some(rpc) = channel.current_rpc.take() {
                channel_queue.push_back(rpc);
            }
        }
        self.clear_channels(ctx);
        self.server_hint = None;
        self.token = None;
        self.connect(ctx, None);
    }

    fn process_session_open_response(
        &mut self,
        ctx: &mut Ctx<'_>,
        packet: &ReceivedPacket,
        header: &Header,
    ) {
        if self.is_connected() {
            return;
        }
        let body = match SessionOpenBody::decode(packet.bytes()) {
            Ok(body) => body,
            Err(_) => {
                debug!("drop: truncated session open response");
                return;
            }
        };
        self.server_hint = Some(header.server_session_hint);
        self.token = Some(header.session_token);

        let offered = u32::from(body.max_channel_id) + 1;
        let num_channels =
            offered.min(u32::from(ctx.config.max_channels_per_session)) as usize;
        debug!(num_channels, "session open response");
        self.channels = (0..num_channels).map(|_| ClientChannel::new(ctx.config)).collect();

        for ch in 0..num_channels {
            match self.channel_queue.pop_front() {
                Some(rpc) => self.assign_rpc(ctx, ch, rpc),
                None => break,
            }
        }
    }

    fn clear_channels(&mut self, ctx: &mut Ctx<'_>) {
        for ch in 0..self.channels.len() {
            let sctx = self.send_context(ch as u8);
            self.channels[ch].inbound.clear(ctx, &sctx);
            self.channels[ch].outbound.clear(ctx, &sctx);
        }
        self.channels.clear();
    }

    fn send_context(&self, channel_id: u8) -> SendContext {
        SendContext {
            peer: self.server_address.expect("client session has no peer"),
            token: self.token,
            rpc_id: self.channels[channel_id as usize].rpc_id,
            client_hint: Some(self.id),
            server_hint: self.server_hint,
            channel_id,
            direction: Direction::ClientToServer,
            session: SessionRef { side: Side::Client, index: self.id },
        }
    }
}

impl PooledSession for ClientSession {
    fn new(id: u32, _config: &Config) -> Self {
        Self {
            id,
            epoch: 0,
            token: None,
            server_address: None,
            server_hint: None,
            last_activity: 0,
            channels: Vec::new(),
            channel_queue: VecDeque::new(),
        }
    }

    fn set_epoch(&mut self, epoch: u64) {
        self.epoch = epoch;
    }

    fn last_activity(&self) -> u64 {
        self.last_activity
    }

    /// Only a session with no RPC anywhere (running or queued) may go.
    fn try_expire(&mut self, ctx: &mut Ctx<'_>) -> bool {
        if self.channels.iter().any(|c| c.current_rpc.is_some()) {
            return false;
        }
        if !self.channel_queue.is_empty() {
            return false;
        }
        self.close(ctx);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc::{ClientRpcInner, RpcStatus};
    use crate::test_support::{data_frame, peer_addr, Harness};
    use swiftrpc_protocol::AckBody;

    fn server_session(harness: &mut Harness) -> ServerSession {
        let mut session = ServerSession::new(0, &harness.config);
        session.set_epoch(1);
        session.start_session(&mut harness.ctx(), peer_addr(), 5);
        harness.driver.sent.clear();
        session
    }

    fn data_header(session: &ServerSession, channel_id: u8, rpc_id: u32) -> Header {
        let mut header = Header::new(Direction::ClientToServer, PayloadKind::Data);
        header.session_token = match session.token {
            Some(token) => token,
            None => panic!("session not started"),
        };
        header.server_session_hint = 0;
        header.client_session_hint = 5;
        header.channel_id = channel_id;
        header.rpc_id = rpc_id;
        header.total_frags = 1;
        header
    }

    fn deliver_data(
        session: &mut ServerSession,
        harness: &mut Harness,
        header: &Header,
        body: &[u8],
        ready: &mut VecDeque<ServerRpc>,
    ) {
        let mut packet = data_frame(header, body);
        session.process_inbound(&mut harness.ctx(), &mut packet, header, ready);
    }

    #[test]
    fn test_session_open_response_carries_channel_count() {
        let mut harness = Harness::new(Config::default(), 100);
        let mut session = ServerSession::new(0, &harness.config);
        session.start_session(&mut harness.ctx(), peer_addr(), 5);

        let (_, frame) = &harness.driver.sent[0];
        let header = Header::decode(frame).unwrap();
        assert_eq!(header.payload_kind, PayloadKind::SessionOpen);
        assert_eq!(header.client_session_hint, 5);
        assert_eq!(header.server_session_hint, 0);
        assert!(session.token_matches(header.session_token));

        let body = SessionOpenBody::decode(frame).unwrap();
        assert_eq!(body.max_channel_id, harness.config.num_channels_per_session - 1);
    }

    #[test]
    fn test_first_rpc_is_accepted_and_queued_when_complete() {
        let mut harness = Harness::new(Config::default(), 100);
        let mut session = server_session(&mut harness);
        let mut ready = VecDeque::new();

        let header = data_header(&session, 2, 0);
        deliver_data(&mut session, &mut harness, &header, b"ping", &mut ready);

        assert_eq!(ready.len(), 1);
        let rpc = ready.pop_front().unwrap();
        assert_eq!(rpc.channel_id, 2);
        assert_eq!(rpc.rpc_id, 0);
        assert_eq!(rpc.request_bytes(), b"ping");
        assert_eq!(session.channel_state(2), Some(ServerChannelState::Processing));
    }

    #[test]
    fn test_stale_and_future_rpc_ids_are_dropped() {
        let mut harness = Harness::new(Config::default(), 100);
        let mut session = server_session(&mut harness);
        let mut ready = VecDeque::new();

        // rpc id 2 is neither current (MAX) nor its successor (0).
        let header = data_header(&session, 0, 2);
        deliver_data(&mut session, &mut harness, &header, b"x", &mut ready);
        assert!(ready.is_empty());
        assert_eq!(session.channel_state(0), Some(ServerChannelState::Idle));
    }

    #[test]
    fn test_processing_channel_still_answers_ack_requests() {
        let mut harness = Harness::new(Config::default(), 100);
        let mut session = server_session(&mut harness);
        let mut ready = VecDeque::new();

        let header = data_header(&session, 0, 0);
        deliver_data(&mut session, &mut harness, &header, b"req", &mut ready);
        assert_eq!(harness.driver.sent.len(), 0);

        // Client is unsure its tail arrived and asks again.
        let mut again = header.clone();
        again.request_ack = true;
        deliver_data(&mut session, &mut harness, &again, b"req", &mut ready);

        let headers = harness.driver.sent_headers();
        assert_eq!(headers.len(), 1);
        assert_eq!(headers[0].payload_kind, PayloadKind::Ack);
        let ack = AckBody::decode(&harness.driver.sent[0].1).unwrap();
        assert_eq!(ack.first_missing_frag, 1);
        // Still exactly one ready RPC; re-delivery is idempotent.
        assert_eq!(ready.len(), 1);
    }

    #[test]
    fn test_reply_flows_and_next_rpc_resets_channel() {
        let mut harness = Harness::new(Config::default(), 100);
        let mut session = server_session(&mut harness);
        let mut ready = VecDeque::new();

        let header = data_header(&session, 0, 0);
        deliver_data(&mut session, &mut harness, &header, b"one", &mut ready);
        session.begin_sending(&mut harness.ctx(), 0, vec![0xAB; 20].into());
        assert_eq!(session.channel_state(0), Some(ServerChannelState::SendingWaiting));
        assert_eq!(harness.driver.sent_headers()[0].payload_kind, PayloadKind::Data);

        // The next RPC arrives on the same channel with the successor id.
        harness.driver.sent.clear();
        let header = data_header(&session, 0, 1);
        deliver_data(&mut session, &mut harness, &header, b"two", &mut ready);
        assert_eq!(ready.len(), 2);
        assert_eq!(ready[1].rpc_id, 1);
        assert_eq!(session.channel_state(0), Some(ServerChannelState::Processing));
    }

    #[test]
    fn test_extraneous_data_while_sending_triggers_resend() {
        let mut harness = Harness::new(Config::default(), 100);
        let mut session = server_session(&mut harness);
        let mut ready = VecDeque::new();

        let header = data_header(&session, 0, 0);
        deliver_data(&mut session, &mut harness, &header, b"req", &mut ready);
        session.begin_sending(&mut harness.ctx(), 0, vec![1; 20].into());
        harness.driver.sent.clear();

        // A duplicate request fragment shows up mid-reply. The reply pass
        // reruns; nothing is due yet, so nothing actually goes out.
        deliver_data(&mut session, &mut harness, &header, b"req", &mut ready);
        assert!(harness.driver.sent.is_empty());

        // Once the reply fragment has timed out, the same nudge resends it.
        harness.clock.advance(harness.config.timeout_ns + 1);
        deliver_data(&mut session, &mut harness, &header, b"req", &mut ready);
        let headers = harness.driver.sent_headers();
        assert_eq!(headers.len(), 1);
        assert_eq!(headers[0].payload_kind, PayloadKind::Data);
        assert!(headers[0].request_ack);
    }

    #[test]
    fn test_server_expire_blocked_by_processing() {
        let mut harness = Harness::new(Config::default(), 100);
        let mut session = server_session(&mut harness);
        let mut ready = VecDeque::new();

        let header = data_header(&session, 0, 0);
        deliver_data(&mut session, &mut harness, &header, b"busy", &mut ready);
        assert!(!session.try_expire(&mut harness.ctx()));

        session.begin_sending(&mut harness.ctx(), 0, vec![1; 4].into());
        assert!(session.try_expire(&mut harness.ctx()));
        assert_eq!(session.channel_state(0), Some(ServerChannelState::Idle));
        assert!(!session.token_matches(0));
    }

    fn connected_client(harness: &mut Harness) -> ClientSession {
        let mut session = ClientSession::new(0, &harness.config);
        session.set_epoch(1);
        session.connect(&mut harness.ctx(), Some(peer_addr()));
        open_session(&mut session, harness, 0xFEED, 3);
        harness.driver.sent.clear();
        session
    }

    fn open_session(
        session: &mut ClientSession,
        harness: &mut Harness,
        token: u64,
        server_hint: u32,
    ) {
        let mut header = Header::new(Direction::ServerToClient, PayloadKind::SessionOpen);
        header.session_token = token;
        header.client_session_hint = 0;
        header.server_session_hint = server_hint;
        let mut frame = Vec::new();
        header.encode_into(&mut frame);
        SessionOpenBody { max_channel_id: harness.config.num_channels_per_session - 1 }
            .encode_into(&mut frame);
        let len = frame.len();
        let mut packet = ReceivedPacket::new(peer_addr(), frame, len);
        session.process_inbound(&mut harness.ctx(), &mut packet, &header);
    }

    fn response_header(token: u64, channel_id: u8, rpc_id: u32, total_frags: u16) -> Header {
        let mut header = Header::new(Direction::ServerToClient, PayloadKind::Data);
        header.session_token = token;
        header.client_session_hint = 0;
        header.server_session_hint = 3;
        header.channel_id = channel_id;
        header.rpc_id = rpc_id;
        header.total_frags = total_frags;
        header
    }

    #[test]
    fn test_connect_emits_session_open_request() {
        let mut harness = Harness::new(Config::default(), 100);
        let mut session = ClientSession::new(4, &harness.config);
        session.connect(&mut harness.ctx(), Some(peer_addr()));

        let headers = harness.driver.sent_headers();
        assert_eq!(headers[0].payload_kind, PayloadKind::SessionOpen);
        assert_eq!(headers[0].client_session_hint, 4);
        assert_eq!(headers[0].server_session_hint, INVALID_HINT);
        assert!(!session.is_connected());
    }

    #[test]
    fn test_session_open_response_allocates_and_drains_queue() {
        let mut harness = Harness::new(Config::default(), 100);
        let mut session = ClientSession::new(0, &harness.config);
        session.connect(&mut harness.ctx(), Some(peer_addr()));

        // Two RPCs pile up before the handshake completes.
        let first = ClientRpcInner::handle(vec![1; 10].into());
        let second = ClientRpcInner::handle(vec![2; 10].into());
        session.start_rpc(&mut harness.ctx(), first.clone());
        session.start_rpc(&mut harness.ctx(), second.clone());
        assert_eq!(session.queue_len(), 2);

        harness.driver.sent.clear();
        open_session(&mut session, &mut harness, 0xFEED, 3);

        assert!(session.is_connected());
        assert_eq!(session.queue_len(), 0);
        assert_eq!(session.channel_state(0), Some(ClientChannelState::Sending));
        assert_eq!(session.channel_state(1), Some(ClientChannelState::Sending));
        // Both queued requests started transmitting.
        assert_eq!(harness.driver.sent.len(), 2);
        // A duplicated response is ignored once connected.
        open_session(&mut session, &mut harness, 0xBEEF, 9);
        assert_eq!(session.num_channels(), harness.config.num_channels_per_session as usize);
    }

    #[test]
    fn test_response_completes_rpc_and_advances_rpc_id() {
        let mut harness = Harness::new(Config::default(), 100);
        let mut session = connected_client(&mut harness);

        let rpc = ClientRpcInner::handle(vec![9; 10].into());
        session.start_rpc(&mut harness.ctx(), rpc.clone());
        assert_eq!(session.channel_state(0), Some(ClientChannelState::Sending));

        let header = response_header(0xFEED, 0, 0, 1);
        let mut packet = data_frame(&header, b"pong");
        session.process_inbound(&mut harness.ctx(), &mut packet, &header);

        assert_eq!(rpc.borrow().status(), RpcStatus::Completed);
        assert_eq!(rpc.borrow_mut().take_response().unwrap().to_vec(), b"pong");
        assert_eq!(session.channel_state(0), Some(ClientChannelState::Idle));
        assert_eq!(session.channel_rpc_id(0), Some(1));
    }

    #[test]
    fn test_completion_starts_next_queued_rpc() {
        let mut harness = Harness::new(Config::default(), 100);
        let mut session = connected_client(&mut harness);
        let num_channels = session.num_channels();

        let mut rpcs = Vec::new();
        for i in 0..num_channels + 2 {
            let rpc = ClientRpcInner::handle(vec![i as u8; 10].into());
            session.start_rpc(&mut harness.ctx(), rpc.clone());
            rpcs.push(rpc);
        }
        assert_eq!(session.queue_len(), 2);

        let header = response_header(0xFEED, 0, 0, 1);
        let mut packet = data_frame(&header, b"done");
        session.process_inbound(&mut harness.ctx(), &mut packet, &header);

        // Channel 0 immediately picks up the first queued RPC.
        assert_eq!(session.queue_len(), 1);
        assert_eq!(session.channel_state(0), Some(ClientChannelState::Sending));
        assert_eq!(rpcs[0].borrow().status(), RpcStatus::Completed);
        assert_eq!(rpcs[num_channels].borrow().status(), RpcStatus::InProgress);
    }

    #[test]
    fn test_bad_session_requeues_and_reconnects() {
        let mut harness = Harness::new(Config::default(), 100);
        let mut session = connected_client(&mut harness);

        let rpc = ClientRpcInner::handle(vec![7; 10].into());
        session.start_rpc(&mut harness.ctx(), rpc.clone());
        harness.driver.sent.clear();

        let mut header = response_header(0xFEED, 0, 0, 0);
        header.payload_kind = PayloadKind::BadSession;
        let mut packet = data_frame(&header, &[]);
        session.process_inbound(&mut harness.ctx(), &mut packet, &header);

        assert!(!session.is_connected());
        assert_eq!(session.queue_len(), 1);
        assert_eq!(rpc.borrow().status(), RpcStatus::InProgress);
        // The reconnect went out with the hint and token reset.
        let headers = harness.driver.sent_headers();
        assert_eq!(headers[0].payload_kind, PayloadKind::SessionOpen);
        assert_eq!(headers[0].server_session_hint, INVALID_HINT);

        // The fresh session-open response resumes the queued RPC.
        open_session(&mut session, &mut harness, 0xF00D, 8);
        assert_eq!(session.queue_len(), 0);
        assert_eq!(session.channel_state(0), Some(ClientChannelState::Sending));
    }

    #[test]
    fn test_close_aborts_running_and_queued_rpcs() {
        let mut harness = Harness::new(Config::default(), 100);
        let mut session = connected_client(&mut harness);
        let num_channels = session.num_channels();

        let mut rpcs = Vec::new();
        for _ in 0..num_channels + 1 {
            let rpc = ClientRpcInner::handle(vec![0; 4].into());
            session.start_rpc(&mut harness.ctx(), rpc.clone());
            rpcs.push(rpc);
        }

        session.close(&mut harness.ctx());
        assert!(rpcs.iter().all(|rpc| rpc.borrow().status() == RpcStatus::Aborted));
        assert!(!session.is_connected());
        // Channel timers died with the channels.
        assert!(harness.timers.is_empty());
    }

    #[test]
    fn test_client_expire_requires_no_rpcs() {
        let mut harness = Harness::new(Config::default(), 100);
        let mut session = connected_client(&mut harness);

        let rpc = ClientRpcInner::handle(vec![0; 4].into());
        session.start_rpc(&mut harness.ctx(), rpc.clone());
        assert!(!session.try_expire(&mut harness.ctx()));

        let header = response_header(0xFEED, 0, 0, 1);
        let mut packet = data_frame(&header, b"ok");
        session.process_inbound(&mut harness.ctx(), &mut packet, &header);
        assert!(session.try_expire(&mut harness.ctx()));
    }
}
