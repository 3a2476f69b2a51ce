use swiftrpc_core::config::Config;

use crate::{
    inbound::InboundMessage,
    outbound::OutboundMessage,
    rpc::ClientRpcHandle,
};

/// Server-side channel lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerChannelState {
    /// No RPC has ever run here (or the session was reset).
    Idle,
    /// Collecting request fragments.
    Receiving,
    /// Full request handed to the application; reply not started.
    Processing,
    /// Reply transmission in progress. The channel stays here until the
    /// next RPC arrives; there is no explicit transition back to idle when
    /// the reply is fully acknowledged.
    SendingWaiting,
}

/// One server-side RPC pipeline: an inbound request and an outbound reply.
///
/// Server channels run no timers; all loss recovery is driven by the
/// client's ACKs and retransmissions.
#[derive(Debug)]
pub struct ServerChannel {
    /// Current lifecycle state.
    pub state: ServerChannelState,
    /// Id of the RPC this channel is serving. A fresh channel holds
    /// `u32::MAX` so the first accepted RPC, at id 0, is its successor in
    /// wrapping arithmetic.
    pub rpc_id: u32,
    /// Request reassembly.
    pub inbound: InboundMessage,
    /// Reply transmission.
    pub outbound: OutboundMessage,
}

impl ServerChannel {
    /// A fresh channel, idle and one step before RPC id 0.
    pub fn new(config: &Config) -> Self {
        Self {
            state: ServerChannelState::Idle,
            rpc_id: u32::MAX,
            inbound: InboundMessage::new(config, false),
            outbound: OutboundMessage::new(config, false),
        }
    }
}

/// Client-side channel lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientChannelState {
    /// Free to take on an RPC.
    Idle,
    /// Transmitting the request.
    Sending,
    /// Collecting response fragments.
    Receiving,
}

/// One client-side RPC pipeline.
///
/// Client channels own both timers: the outbound timer drives request
/// retransmission, the inbound timer keeps nudging the server with ACK
/// state while the response is incomplete.
#[derive(Debug)]
pub struct ClientChannel {
    /// Current lifecycle state.
    pub state: ClientChannelState,
    /// Id of the next (or current) RPC on this channel.
    pub rpc_id: u32,
    /// The RPC currently occupying this channel.
    pub current_rpc: Option<ClientRpcHandle>,
    /// Request transmission.
    pub outbound: OutboundMessage,
    /// Response reassembly.
    pub inbound: InboundMessage,
}

impl ClientChannel {
    /// A fresh idle channel starting at RPC id 0.
    pub fn new(config: &Config) -> Self {
        Self {
            state: ClientChannelState::Idle,
            rpc_id: 0,
            current_rpc: None,
            outbound: OutboundMessage::new(config, true),
            inbound: InboundMessage::new(config, true),
        }
    }
}
