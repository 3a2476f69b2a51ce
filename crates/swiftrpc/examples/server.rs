//! Simple echo server using swiftrpc.
//!
//! Run:
//! - cargo run -p swiftrpc --example server
//! - cargo run -p swiftrpc --example server -- 127.0.0.1:7400

use std::{env, net::SocketAddr};

use swiftrpc::clock::SystemClock;
use swiftrpc::{Config, Transport, UdpDriver};

fn parse_bind_addr() -> Option<SocketAddr> {
    let mut args = env::args().skip(1);
    args.next().and_then(|s| s.parse().ok())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::default();
    let bind_addr = parse_bind_addr().unwrap_or_else(|| "127.0.0.1:7400".parse().unwrap());

    let driver = UdpDriver::bind(bind_addr, &config)?;
    let local = driver.local_addr()?;
    let mut transport = Transport::new(Box::new(driver), Box::new(SystemClock::new()), config);
    println!("swiftrpc echo server listening on {}", local);

    loop {
        let rpc = transport.server_recv();
        let request = rpc.request_bytes();
        println!(
            "[request] channel={} rpc={} len={} payload=\"{}\"",
            rpc.channel_id,
            rpc.rpc_id,
            request.len(),
            String::from_utf8_lossy(&request)
        );
        transport.send_reply(rpc, request);
    }
}
