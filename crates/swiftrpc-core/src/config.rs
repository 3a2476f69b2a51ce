use std::default::Default;

/// Nanoseconds in one millisecond, for timeout defaults.
const NS_PER_MS: u64 = 1_000_000;

#[derive(Clone, Debug)]
/// Configuration options to tune protocol and driver behavior.
///
/// Every protocol constant lives here so tests can override it.
pub struct Config {
    /// Max number of unacknowledged outbound fragments in flight per message.
    pub window_size: u32,
    /// Capacity of the inbound staging ring for out-of-order fragments.
    /// Bounded at 32 by the width of the ACK staging vector.
    pub max_staging_fragments: u32,
    /// An ACK is requested every this many fresh data fragments.
    pub req_ack_after: u32,
    /// Retransmit / keepalive timeout in nanoseconds.
    pub timeout_ns: u64,
    /// Consecutive timeouts without progress before the session is closed.
    pub timeouts_until_aborting: u32,
    /// Number of channels a server session offers.
    pub num_channels_per_session: u8,
    /// Upper bound on channels a client session will allocate, regardless of
    /// what the server offers.
    pub max_channels_per_session: u8,
    /// Probability (percent) that an outgoing frame is marked to be dropped
    /// by the receiver. Test hook for lossy-link simulation; 0 in production.
    pub packet_loss_percentage: u8,
    /// Max datagram payload for the UDP driver, header included.
    pub max_datagram_size: usize,
    /// Socket receive buffer size in bytes (None = system default).
    pub socket_recv_buffer_size: Option<usize>,
    /// Socket send buffer size in bytes (None = system default).
    pub socket_send_buffer_size: Option<usize>,
}

impl Config {
    /// Length of the outbound sent-times ring. One longer than the staging
    /// ring so the fragment at the receiver's first gap has a slot too.
    pub fn sent_times_len(&self) -> usize {
        self.max_staging_fragments as usize + 1
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            window_size: 10,
            max_staging_fragments: 32,
            req_ack_after: 5,
            timeout_ns: 10 * NS_PER_MS,
            timeouts_until_aborting: 500,
            num_channels_per_session: 8,
            max_channels_per_session: 8,
            packet_loss_percentage: 0,
            max_datagram_size: 1400,
            socket_recv_buffer_size: None,
            socket_send_buffer_size: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_consistent() {
        let config = Config::default();
        assert!(config.max_staging_fragments <= 32);
        assert_eq!(config.sent_times_len(), 33);
        assert!(config.window_size > 0);
        assert_eq!(config.packet_loss_percentage, 0);
    }
}
