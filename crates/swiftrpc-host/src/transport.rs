use std::collections::VecDeque;

use tracing::{debug, trace, warn};

use swiftrpc_core::{clock::Clock, config::Config, driver::Driver, shared::SharedBytes};
use swiftrpc_protocol::{Direction, Header, PayloadKind};
use swiftrpc_session::{
    ClientRpcInner, ClientSession, Ctx, ServerRpc, ServerSession, SessionHandle, SessionTable,
    Side, TimerDisposition, TimerList,
};

use crate::rpc::{ClientRpc, Service};

/// The top-level request/response transport over one datagram driver.
///
/// Single-threaded and cooperative: nothing happens between calls to
/// [`Transport::poll`] (or the blocking helpers that spin on it). Inbound
/// frames are routed by direction and session hint, verified against the
/// session token, and handed to the owning session; due timers fire after
/// every drained frame.
pub struct Transport {
    driver: Box<dyn Driver>,
    clock: Box<dyn Clock>,
    config: Config,
    client_sessions: SessionTable<ClientSession>,
    server_sessions: SessionTable<ServerSession>,
    ready_queue: VecDeque<ServerRpc>,
    timers: TimerList,
}

impl Transport {
    /// Creates a transport over `driver`, timed by `clock`.
    pub fn new(driver: Box<dyn Driver>, clock: Box<dyn Clock>, config: Config) -> Self {
        Self {
            driver,
            clock,
            config,
            client_sessions: SessionTable::new(),
            server_sessions: SessionTable::new(),
            ready_queue: VecDeque::new(),
            timers: TimerList::new(),
        }
    }

    /// Submits an RPC to `service` and returns a handle to wait on.
    ///
    /// Reuses the service's cached session when its handle is still valid;
    /// otherwise acquires a session from the table (expiring one idle
    /// session first) and connects it. The RPC starts on an idle channel
    /// or waits in the session's queue.
    pub fn client_send(&mut self, service: &mut Service, request: Vec<u8>) -> ClientRpc {
        let rpc = ClientRpcInner::handle(SharedBytes::from_vec(request));

        let Self { driver, clock, timers, config, client_sessions, .. } = self;
        let config: &Config = config;
        let mut ctx =
            Ctx { driver: driver.as_mut(), clock: clock.as_ref(), timers, config };

        let index = match service.session {
            Some(handle)
                if client_sessions.get_live(handle.index).map(ClientSession::epoch)
                    == Some(handle.epoch) =>
            {
                handle.index
            }
            _ => {
                client_sessions.expire(&mut ctx);
                client_sessions.get(config)
            }
        };
        let session = match client_sessions.get_live_mut(index) {
            Some(session) => session,
            None => unreachable!("freshly allocated session slot is live"),
        };
        if !session.is_connected() {
            session.connect(&mut ctx, Some(service.addr()));
        }
        service.session = Some(SessionHandle { index, epoch: session.epoch() });
        debug!(session = index, "using client session");
        session.start_rpc(&mut ctx, rpc.clone());

        ClientRpc::new(rpc)
    }

    /// Blocks until a fully reassembled request is available, driving the
    /// transport in the meantime.
    pub fn server_recv(&mut self) -> ServerRpc {
        loop {
            if let Some(rpc) = self.ready_queue.pop_front() {
                return rpc;
            }
            self.poll();
        }
    }

    /// Takes the next ready request without driving the transport.
    pub fn try_server_recv(&mut self) -> Option<ServerRpc> {
        self.ready_queue.pop_front()
    }

    /// Starts transmitting the reply for `rpc`.
    ///
    /// If the owning session slot was expired and recycled since the
    /// request arrived, the reply has nowhere to go and is dropped.
    pub fn send_reply(&mut self, rpc: ServerRpc, reply: Vec<u8>) {
        let Self { driver, clock, timers, config, server_sessions, .. } = self;
        let mut ctx =
            Ctx { driver: driver.as_mut(), clock: clock.as_ref(), timers, config };

        match server_sessions.get_live_mut(rpc.session_index) {
            Some(session) if session.epoch() == rpc.epoch => {
                session.begin_sending(&mut ctx, rpc.channel_id, SharedBytes::from_vec(reply));
            }
            _ => warn!(session = rpc.session_index, "reply for an expired session dropped"),
        }
    }

    /// Drains every frame the driver has ready, dispatching each and
    /// firing due timers in between; a final timer sweep runs even when
    /// the driver yields nothing.
    pub fn poll(&mut self) {
        while self.try_process_packet() {
            self.fire_timers();
        }
        self.fire_timers();
    }

    /// The driver this transport sends and receives through.
    pub fn driver(&self) -> &dyn Driver {
        self.driver.as_ref()
    }

    /// The client session at `index`, if live. For inspection and tests.
    pub fn client_session(&self, index: u32) -> Option<&ClientSession> {
        self.client_sessions.get_live(index)
    }

    /// The server session at `index`, if live. For inspection and tests.
    pub fn server_session(&self, index: u32) -> Option<&ServerSession> {
        self.server_sessions.get_live(index)
    }

    /// Number of pending timers. For inspection and tests.
    pub fn pending_timers(&self) -> usize {
        self.timers.len()
    }

    fn try_process_packet(&mut self) -> bool {
        let Self {
            driver,
            clock,
            timers,
            config,
            client_sessions,
            server_sessions,
            ready_queue,
        } = self;
        let config: &Config = config;
        let mut ctx =
            Ctx { driver: driver.as_mut(), clock: clock.as_ref(), timers, config };

        let mut received = match ctx.driver.try_recv() {
            Some(received) => received,
            None => {
                trace!("no packet ready");
                return false;
            }
        };
        let header = match Header::decode(received.bytes()) {
            Ok(header) => header,
            Err(err) => {
                debug!("drop: malformed frame: {}", err);
                ctx.driver.release(received.steal());
                return true;
            }
        };
        if header.please_drop {
            trace!("drop: frame marked by loss injection");
            ctx.driver.release(received.steal());
            return true;
        }

        match header.direction {
            Direction::ClientToServer => {
                let mut handled = false;
                if let Some(session) = server_sessions.get_live_mut(header.server_session_hint) {
                    if session.token_matches(header.session_token) {
                        session.process_inbound(&mut ctx, &mut received, &header, ready_queue);
                        handled = true;
                    } else {
                        debug!("bad token");
                    }
                }
                if !handled {
                    if header.payload_kind == PayloadKind::SessionOpen {
                        debug!("session open");
                        server_sessions.expire(&mut ctx);
                        let index = server_sessions.get(config);
                        if let Some(session) = server_sessions.get_live_mut(index) {
                            session.start_session(
                                &mut ctx,
                                received.addr(),
                                header.client_session_hint,
                            );
                        }
                    } else {
                        debug!("bad session");
                        let mut reply =
                            Header::new(Direction::ServerToClient, PayloadKind::BadSession);
                        reply.session_token = header.session_token;
                        reply.rpc_id = header.rpc_id;
                        reply.client_session_hint = header.client_session_hint;
                        reply.server_session_hint = header.server_session_hint;
                        reply.channel_id = header.channel_id;
                        ctx.send_frame(received.addr(), &mut reply, &[]);
                    }
                }
            }
            Direction::ServerToClient => {
                match client_sessions.get_live_mut(header.client_session_hint) {
                    Some(session) => {
                        trace!("client session processing packet");
                        session.process_inbound(&mut ctx, &mut received, &header);
                    }
                    None => debug!("bad client session hint"),
                }
            }
        }

        if let Some(buffer) = received.into_unstolen() {
            ctx.driver.release(buffer);
        }
        true
    }

    fn fire_timers(&mut self) {
        let now = self.clock.now_ns();
        let due = self.timers.pop_due(now);
        if due.is_empty() {
            return;
        }

        let Self { driver, clock, timers, config, client_sessions, .. } = self;
        let mut ctx =
            Ctx { driver: driver.as_mut(), clock: clock.as_ref(), timers, config };
        for key in due {
            match key.session.side {
                Side::Client => {
                    if let Some(session) = client_sessions.get_live_mut(key.session.index) {
                        if session.fire_timer(&mut ctx, key) == TimerDisposition::AbortSession {
                            session.close(&mut ctx);
                        }
                    }
                }
                // Server channels run no timers; a key here is a bug.
                Side::Server => warn!("ignoring unexpected server-side timer"),
            }
        }
    }
}
