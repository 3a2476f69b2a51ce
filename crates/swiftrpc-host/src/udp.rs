use std::{
    io,
    net::{SocketAddr, ToSocketAddrs, UdpSocket},
};

use socket2::Socket as Socket2;
use tracing::error;

use swiftrpc_core::{
    config::Config,
    driver::{Driver, ReceivedPacket},
    packet_pool::PacketPool,
    Result,
};

/// The production datagram driver: a non-blocking UDP socket plus a buffer
/// pool for the receive path.
pub struct UdpDriver {
    socket: UdpSocket,
    pool: PacketPool,
    max_payload: usize,
}

impl UdpDriver {
    /// Binds a non-blocking UDP socket and applies the configured socket
    /// options.
    pub fn bind<A: ToSocketAddrs>(addr: A, config: &Config) -> Result<Self> {
        let socket = UdpSocket::bind(addr)?;
        socket.set_nonblocking(true)?;
        apply_socket_options(&socket, config)?;
        Ok(Self {
            socket,
            pool: PacketPool::new(config.max_datagram_size, 256),
            max_payload: config.max_datagram_size,
        })
    }

    /// The address this driver is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }
}

fn apply_socket_options(socket: &UdpSocket, config: &Config) -> io::Result<()> {
    let socket2 = Socket2::from(socket.try_clone()?);
    if let Some(size) = config.socket_recv_buffer_size {
        socket2.set_recv_buffer_size(size)?;
    }
    if let Some(size) = config.socket_send_buffer_size {
        socket2.set_send_buffer_size(size)?;
    }
    Ok(())
}

impl Driver for UdpDriver {
    fn send_frame(&mut self, addr: SocketAddr, frame: &[u8]) -> io::Result<usize> {
        self.socket.send_to(frame, addr)
    }

    fn try_recv(&mut self) -> Option<ReceivedPacket> {
        let mut buffer = self.pool.allocate();
        match self.socket.recv_from(&mut buffer) {
            Ok((len, addr)) => Some(ReceivedPacket::new(addr, buffer, len)),
            Err(err) => {
                self.pool.recycle(buffer);
                if err.kind() != io::ErrorKind::WouldBlock {
                    error!("error receiving a datagram: {}", err);
                }
                None
            }
        }
    }

    fn release(&mut self, buffer: Vec<u8>) {
        self.pool.recycle(buffer);
    }

    fn max_payload_size(&self) -> usize {
        self.max_payload
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bind_and_round_trip_a_datagram() {
        let config = Config::default();
        let mut a = UdpDriver::bind("127.0.0.1:0", &config).unwrap();
        let mut b = UdpDriver::bind("127.0.0.1:0", &config).unwrap();
        let b_addr = b.local_addr().unwrap();

        a.send_frame(b_addr, b"hello over udp").unwrap();

        // Non-blocking receive; give the loopback a few tries.
        let mut received = None;
        for _ in 0..100 {
            if let Some(packet) = b.try_recv() {
                received = Some(packet);
                break;
            }
            std::thread::sleep(std::time::Duration::from_millis(1));
        }
        let received = received.expect("datagram never arrived on loopback");
        assert_eq!(received.bytes(), b"hello over udp");
        assert_eq!(received.addr(), a.local_addr().unwrap());
    }

    #[test]
    fn test_socket_buffer_options_apply() {
        let mut config = Config::default();
        config.socket_recv_buffer_size = Some(131072);
        config.socket_send_buffer_size = Some(65536);
        assert!(UdpDriver::bind("127.0.0.1:0", &config).is_ok());
    }
}
